//! Stabilization engine.
//!
//! The engine drives a single forward pass over a [`PositionStream`]: it keeps
//! the counters, throttles progress notification, hands each consecutive pair
//! of valid positions to a [`TriggerStrategy`] and collects the plans it
//! commits. A run always ends in a [`RunOutcome`]; fatal errors become a failed
//! summary rather than an `Err`.

/// Throttled progress notification.
pub mod progress;
/// Dedicated worker thread for runs.
pub mod runtime;
/// Run results.
pub mod summary;

use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::error::StabilizationError;
use crate::plan::{plan_digest, SnapshotPlan};
use crate::position::Position;
use crate::stream::{PositionReader, PositionStream};
use crate::strategy::{self, StrategyContext, TargetOverride, TriggerStrategy};

pub use progress::{ProgressCallback, ProgressReport, ProgressSignal, ProgressThrottle};
pub use runtime::{spawn, RunHandle, StabilizationJob};
pub use summary::{Diagnostic, RunCounts, RunId, RunOutcome, RunSummary};

/// Caller-owned closures for one run.
///
/// The run takes these by value and drops them when it returns.
#[derive(Default)]
pub struct RunCallbacks {
    /// Periodic progress; may cancel the run.
    pub on_progress: Option<ProgressCallback>,
    /// Replaces the stabilization point at the start of each layer.
    pub next_target: Option<TargetOverride>,
}

impl RunCallbacks {
    /// Callbacks with only a progress handler.
    #[must_use]
    pub fn with_progress(
        on_progress: impl FnMut(&ProgressReport) -> ProgressSignal + Send + 'static,
    ) -> Self {
        Self {
            on_progress: Some(Box::new(on_progress)),
            next_target: None,
        }
    }

    /// Adds a stabilization point override.
    #[must_use]
    pub fn next_target(mut self, next_target: impl FnMut(f64, f64) -> (f64, f64) + Send + 'static) -> Self {
        self.next_target = Some(Box::new(next_target));
        self
    }
}

impl std::fmt::Debug for RunCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCallbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("next_target", &self.next_target.is_some())
            .finish()
    }
}

/// One stabilization run over a borrowed strategy.
pub struct StabilizationEngine<'s> {
    strategy: &'s mut dyn TriggerStrategy,
    config: RunConfig,
    callbacks: RunCallbacks,
}

impl<'s> StabilizationEngine<'s> {
    /// Creates an engine for one run.
    pub fn new(strategy: &'s mut dyn TriggerStrategy, config: RunConfig, callbacks: RunCallbacks) -> Self {
        Self {
            strategy,
            config,
            callbacks,
        }
    }

    /// Scans `stream` to exhaustion, cancellation or a fatal error.
    pub fn run(self, stream: &mut dyn PositionStream) -> RunOutcome {
        let Self {
            strategy,
            config,
            callbacks,
        } = self;
        let RunCallbacks {
            mut on_progress,
            mut next_target,
        } = callbacks;

        let run_id = RunId::new();
        let started_at = Utc::now();
        let clock = Instant::now();

        if let Err(err) = config.validate() {
            let err = StabilizationError::from(err);
            warn!(%run_id, error = %err, "rejecting run configuration");
            let mut outcome = RunOutcome::rejected(&err);
            outcome.summary.run_id = run_id;
            return outcome;
        }

        info!(
            %run_id,
            stabilization = config.stabilization_type.as_str(),
            strategy = strategy.name(),
            x = config.x_coordinate,
            y = config.y_coordinate,
            "stabilization run started"
        );

        let mut plans: Vec<SnapshotPlan> = Vec::new();
        let mut counts = RunCounts::default();
        let mut diagnostics = Vec::new();
        let mut throttle = ProgressThrottle::new(config.notification_period(), clock);
        let mut previous: Option<Position> = None;
        let mut cancelled = false;
        let mut fatal: Option<StabilizationError> = None;

        while let Some(item) = stream.next() {
            counts.lines_processed += 1;

            let accepted = item.and_then(|current| {
                current.validate()?;
                Ok(current)
            });
            let outcome = accepted.and_then(|current| {
                let moved = current.is_motion_from(previous.as_ref());
                if let Some(prev) = previous.as_ref() {
                    let mut ctx = StrategyContext::new(&mut plans, next_target.as_mut());
                    strategy.process_pair(&mut ctx, &current, prev)?;
                }
                if moved {
                    counts.gcodes_processed += 1;
                }
                previous = Some(current);
                Ok(())
            });

            match outcome {
                Ok(()) => {}
                Err(err) if err.is_recoverable() => {
                    counts.records_rejected += 1;
                    warn!(%run_id, error = %err, "skipping record");
                    diagnostics.push(Diagnostic::from_error(&err));
                }
                Err(err) => {
                    fatal = Some(err);
                    break;
                }
            }

            if throttle.poll(Instant::now()) {
                if let Some(callback) = on_progress.as_mut() {
                    let report = ProgressReport::new(
                        stream.fraction_complete(),
                        clock.elapsed(),
                        counts.gcodes_processed,
                        counts.lines_processed,
                    );
                    if callback(&report) == ProgressSignal::Cancel {
                        info!(%run_id, lines = counts.lines_processed, "stabilization run cancelled");
                        cancelled = true;
                        break;
                    }
                }
            }
        }

        if fatal.is_none() && !cancelled {
            let mut ctx = StrategyContext::new(&mut plans, next_target.as_mut());
            strategy.on_complete(&mut ctx);
        }

        counts.plans_emitted = plans.len() as u64;
        let failure = fatal.as_ref().map(|err| {
            warn!(%run_id, error = %err, "stabilization run failed");
            diagnostics.push(Diagnostic::from_error(err));
            err.to_string()
        });
        let elapsed_seconds = clock.elapsed().as_secs_f64();

        info!(
            %run_id,
            success = failure.is_none(),
            cancelled,
            plans = counts.plans_emitted,
            lines = counts.lines_processed,
            rejected = counts.records_rejected,
            elapsed_seconds,
            "stabilization run finished"
        );

        let summary = RunSummary {
            run_id,
            success: failure.is_none(),
            cancelled,
            failure,
            diagnostics,
            counts,
            elapsed_seconds,
            started_at,
            finished_at: Utc::now(),
            plan_digest: plan_digest(&plans),
        };
        RunOutcome { plans, summary }
    }
}

/// Runs `strategy` over `stream`.
pub fn run(
    stream: &mut dyn PositionStream,
    strategy: &mut dyn TriggerStrategy,
    config: RunConfig,
    callbacks: RunCallbacks,
) -> RunOutcome {
    StabilizationEngine::new(strategy, config, callbacks).run(stream)
}

/// Opens the position file at `path` and runs the strategy selected by `config`.
///
/// Configuration and open failures are reported before any record is read.
pub fn run_path(path: &Path, config: RunConfig, callbacks: RunCallbacks) -> RunOutcome {
    let mut strategy = match strategy::for_config(&config) {
        Ok(strategy) => strategy,
        Err(err) => return RunOutcome::rejected(&err.into()),
    };
    let mut stream = match PositionReader::open(path) {
        Ok(stream) => stream,
        Err(err) => {
            let err = StabilizationError::from(err);
            warn!(error = %err, "cannot open position stream");
            return RunOutcome::rejected(&err);
        }
    };
    run(&mut stream, strategy.as_mut(), config, callbacks)
}
