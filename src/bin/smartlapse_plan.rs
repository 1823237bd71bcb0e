use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use smartlapse::{run_path, RunCallbacks, RunConfig, RunOutcome};
use tracing::{error, info};

struct Args {
    config: PathBuf,
    positions: PathBuf,
    output: Option<PathBuf>,
}

fn usage() -> ! {
    eprintln!("usage: smartlapse-plan --config <json> --positions <ndjson> [--output <path>]");
    eprintln!();
    eprintln!("  -c, --config     run configuration (JSON)");
    eprintln!("  -p, --positions  position records, one JSON object per line");
    eprintln!("  -o, --output     write the result here instead of the configured result_path or stdout");
    std::process::exit(2);
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config = None;
    let mut positions = None;
    let mut output = None;

    let mut i = 1;
    while i < args.len() {
        let slot = match args[i].as_str() {
            "-c" | "--config" => &mut config,
            "-p" | "--positions" => &mut positions,
            "-o" | "--output" => &mut output,
            "-h" | "--help" => usage(),
            other => {
                eprintln!("error: unknown argument: {other}");
                usage();
            }
        };
        let Some(value) = args.get(i + 1) else {
            eprintln!("error: {} requires a value", args[i]);
            usage();
        };
        *slot = Some(PathBuf::from(value));
        i += 2;
    }

    match (config, positions) {
        (Some(config), Some(positions)) => Args {
            config,
            positions,
            output,
        },
        _ => usage(),
    }
}

fn write_outcome(outcome: &RunOutcome, destination: Option<&PathBuf>) -> io::Result<()> {
    let json = serde_json::to_string_pretty(outcome).map_err(io::Error::other)?;
    match destination {
        Some(path) => fs::write(path, json + "\n"),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = parse_args();

    let (outcome, destination) = match RunConfig::from_path(&args.config) {
        Ok(config) => {
            let destination = args.output.clone().or_else(|| config.result_path.clone());
            (run_path(&args.positions, config, RunCallbacks::default()), destination)
        }
        Err(err) => {
            error!(error = %err, "cannot load configuration");
            (RunOutcome::rejected(&err.into()), args.output.clone())
        }
    };

    if let Err(err) = write_outcome(&outcome, destination.as_ref()) {
        error!(error = %err, "cannot write result");
        std::process::exit(1);
    }
    if let Some(path) = &destination {
        info!(path = %path.display(), plans = outcome.plans.len(), "result written");
    }
    if !outcome.is_success() {
        std::process::exit(1);
    }
}
