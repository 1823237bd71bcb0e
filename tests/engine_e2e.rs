use std::fs;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use smartlapse::{
    run_path, spawn, MemoryStream, PlanAction, Position, ProgressSignal, RunCallbacks, RunConfig,
    SmartLayerStrategy, StabilizationJob,
};

fn print_records() -> Vec<Position> {
    let mut positions = vec![Position::at(1, 0.0, 0.0, 0.0)];
    let mut line = 1;
    for layer in 1..=5u32 {
        for step in 0..20u32 {
            line += 1;
            let x = f64::from(step) * 5.0;
            positions.push(
                Position::at(line, x, 100.0 - x, 0.2 * f64::from(layer))
                    .extruding(1500.0)
                    .on_layer(layer)
                    .with_command(format!("G1 X{x} E0.1")),
            );
        }
    }
    positions
}

fn write_ndjson(dir: &tempfile::TempDir, positions: &[Position], extra: &[&str]) -> std::path::PathBuf {
    let path = dir.path().join("positions.ndjson");
    let mut file = fs::File::create(&path).unwrap();
    for (i, position) in positions.iter().enumerate() {
        if i == 30 {
            for line in extra {
                writeln!(file, "{line}").unwrap();
            }
        }
        writeln!(file, "{}", serde_json::to_string(position).unwrap()).unwrap();
    }
    path
}

#[test]
fn run_path_reads_ndjson_and_plans_each_layer() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ndjson(&dir, &print_records(), &[]);

    let config = RunConfig::from_json_str(r#"{"x_coordinate": 50.0, "y_coordinate": 50.0}"#).unwrap();
    let outcome = run_path(&path, config, RunCallbacks::default());

    assert!(outcome.is_success(), "{:?}", outcome.summary.failure);
    assert_eq!(outcome.plans.len(), 5);
    assert_eq!(outcome.summary.counts.lines_processed, 101);
    for plan in &outcome.plans {
        assert_eq!((plan.trigger_x, plan.trigger_y), (50.0, 50.0));
        assert_eq!(plan.triggering_command.as_deref(), Some("G1 X50 E0.1"));
        assert_eq!(plan.pre_steps[0].action, PlanAction::Travel);
        assert_eq!(plan.pre_steps[1].action, PlanAction::Snapshot);
        assert_eq!(plan.post_steps[0].x, Some(50.0));
    }
}

#[test]
fn run_path_skips_malformed_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ndjson(&dir, &print_records(), &["{not json", "", r#"{"line_number": "seven"}"#]);

    let outcome = run_path(&path, RunConfig::default(), RunCallbacks::default());

    assert!(outcome.is_success());
    assert_eq!(outcome.plans.len(), 5);
    assert_eq!(outcome.summary.counts.records_rejected, 2);
    assert_eq!(outcome.summary.diagnostics.len(), 2);
    assert!(outcome.summary.diagnostics.iter().all(|d| !d.fatal));
}

#[test]
fn invalid_utf8_line_is_skipped_and_layers_are_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("positions.ndjson");
    let mut bytes = Vec::new();
    for (i, position) in print_records().iter().enumerate() {
        if i == 45 {
            bytes.extend_from_slice(b"\xff\xfe garbage\n");
        }
        bytes.extend_from_slice(serde_json::to_string(position).unwrap().as_bytes());
        bytes.push(b'\n');
    }
    fs::write(&path, bytes).unwrap();

    let outcome = run_path(&path, RunConfig::default(), RunCallbacks::default());

    assert!(outcome.is_success(), "{:?}", outcome.summary.failure);
    assert_eq!(outcome.plans.len(), 5);
    assert_eq!(outcome.summary.counts.records_rejected, 1);
    assert!(!outcome.summary.diagnostics[0].fatal);
}

#[test]
fn config_file_drives_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let positions = write_ndjson(&dir, &print_records(), &[]);
    let config_path = dir.path().join("config.json");
    fs::write(
        &config_path,
        r#"{
            "x_coordinate": 0.0,
            "y_coordinate": 100.0,
            "y_disabled": true,
            "smart_layer": { "trigger_type": "fast", "speed_threshold": 5.0, "snap_to_fastest": true }
        }"#,
    )
    .unwrap();

    let config = RunConfig::from_path(&config_path).unwrap();
    let outcome = run_path(&positions, config, RunCallbacks::default());

    assert!(outcome.is_success());
    assert_eq!(outcome.plans.len(), 5);
    for plan in &outcome.plans {
        assert_eq!(plan.trigger_x, 0.0);
        assert_eq!(plan.trigger_y, 100.0);
    }
}

#[test]
fn outcome_round_trips_through_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ndjson(&dir, &print_records(), &[]);
    let outcome = run_path(&path, RunConfig::default(), RunCallbacks::default());

    let json = serde_json::to_string(&outcome).unwrap();
    let back: smartlapse::RunOutcome = serde_json::from_str(&json).unwrap();
    assert_eq!(back.summary.run_id, outcome.summary.run_id);
    assert_eq!(back.summary.counts, outcome.summary.counts);
    assert_eq!(back.summary.plan_digest, outcome.summary.plan_digest);
    assert_eq!(
        back.plans.iter().map(|p| (p.layer, p.source_line)).collect::<Vec<_>>(),
        outcome.plans.iter().map(|p| (p.layer, p.source_line)).collect::<Vec<_>>()
    );
}

#[test]
fn progress_reaches_completion_on_file_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ndjson(&dir, &print_records(), &[]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let config = RunConfig {
        notification_period_seconds: 0.0,
        ..RunConfig::default()
    };

    let outcome = run_path(
        &path,
        config,
        RunCallbacks::with_progress(move |report| {
            sink.lock().unwrap().push(report.percent_complete);
            ProgressSignal::Continue
        }),
    );

    assert!(outcome.is_success());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 101);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert!((seen.last().unwrap() - 100.0).abs() < 1e-9);
}

#[test]
fn worker_run_matches_inline_run() {
    let config = RunConfig {
        x_coordinate: 20.0,
        y_coordinate: 80.0,
        ..RunConfig::default()
    };

    let inline = {
        let mut strategy = SmartLayerStrategy::new(&config);
        let mut stream = MemoryStream::new(print_records());
        smartlapse::run(&mut stream, &mut strategy, config.clone(), RunCallbacks::default())
    };

    let job = StabilizationJob::new(
        Box::new(MemoryStream::new(print_records())),
        Box::new(SmartLayerStrategy::new(&config)),
        config,
    );
    let worker = spawn(job).unwrap().join_timeout(Duration::from_secs(10)).unwrap();

    assert_eq!(worker.plans, inline.plans);
    assert_eq!(worker.summary.plan_digest, inline.summary.plan_digest);
}

#[test]
fn worker_cancel_returns_partial_success() {
    let config = RunConfig {
        notification_period_seconds: 0.0,
        ..RunConfig::default()
    };
    let job = StabilizationJob::new(
        Box::new(MemoryStream::new(print_records())),
        Box::new(SmartLayerStrategy::new(&config)),
        config,
    )
    .with_callbacks(RunCallbacks::with_progress(|report| {
        if report.lines_processed == 50 {
            ProgressSignal::Cancel
        } else {
            ProgressSignal::Continue
        }
    }));

    let outcome = spawn(job).unwrap().join().unwrap();
    assert!(outcome.is_success());
    assert!(outcome.summary.cancelled);
    assert_eq!(outcome.summary.counts.lines_processed, 50);
    // Layers 1 and 2 were closed by line 50; layer 3 was still open.
    assert_eq!(outcome.plans.len(), 2);
}
