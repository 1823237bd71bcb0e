//! Worker-thread execution for stabilization runs.
//!
//! A run is one synchronous scan. Callers that must stay responsive hand the
//! whole job to a dedicated thread and observe it through a [`RunHandle`]:
//! progress reports arrive on a bounded channel, cancellation is a flag the
//! worker checks at every progress notification, and the outcome is delivered
//! once on a reply channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TrySendError};

use crate::config::RunConfig;
use crate::error::{StabilizationError, StabilizationResult};
use crate::stream::PositionStream;
use crate::strategy::TriggerStrategy;

use super::progress::{ProgressReport, ProgressSignal};
use super::summary::RunOutcome;
use super::RunCallbacks;

/// Default capacity of the progress report channel.
pub const DEFAULT_PROGRESS_CAPACITY: usize = 64;

/// Everything a worker needs for one run.
pub struct StabilizationJob {
    /// Source of positions.
    pub stream: Box<dyn PositionStream + Send>,
    /// Strategy that decides the trigger points.
    pub strategy: Box<dyn TriggerStrategy + Send>,
    /// Run configuration.
    pub config: RunConfig,
    /// Caller callbacks, wrapped by the worker.
    pub callbacks: RunCallbacks,
    /// Capacity of the progress channel; reports are dropped when it is full.
    pub progress_capacity: usize,
}

impl StabilizationJob {
    /// A job with default progress capacity and no callbacks.
    pub fn new(
        stream: Box<dyn PositionStream + Send>,
        strategy: Box<dyn TriggerStrategy + Send>,
        config: RunConfig,
    ) -> Self {
        Self {
            stream,
            strategy,
            config,
            callbacks: RunCallbacks::default(),
            progress_capacity: DEFAULT_PROGRESS_CAPACITY,
        }
    }

    /// Replaces the caller callbacks.
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: RunCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }
}

/// Handle to a run executing on a worker thread.
///
/// Dropping the handle requests cancellation but does not wait for the worker.
#[derive(Debug)]
pub struct RunHandle {
    rx: Receiver<RunOutcome>,
    progress_rx: Receiver<ProgressReport>,
    cancel: Arc<AtomicBool>,
    dropped_reports: Arc<AtomicU64>,
    join: Option<JoinHandle<()>>,
}

impl RunHandle {
    /// Progress reports, in order. Reports are dropped rather than blocking the worker.
    #[must_use]
    pub const fn progress(&self) -> &Receiver<ProgressReport> {
        &self.progress_rx
    }

    /// Number of progress reports dropped because the channel was full.
    #[must_use]
    pub fn dropped_reports(&self) -> u64 {
        self.dropped_reports.load(Ordering::Relaxed)
    }

    /// Asks the worker to stop at its next progress notification.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Waits for the run to finish.
    pub fn join(mut self) -> StabilizationResult<RunOutcome> {
        let outcome = self.rx.recv().map_err(|_| StabilizationError::WorkerDisconnected);
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
        outcome
    }

    /// Waits for the run to finish, giving up after `timeout`.
    pub fn join_timeout(mut self, timeout: Duration) -> StabilizationResult<RunOutcome> {
        let outcome = self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => StabilizationError::WorkerTimeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            },
            RecvTimeoutError::Disconnected => StabilizationError::WorkerDisconnected,
        })?;
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
        Ok(outcome)
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.cancel();
        }
    }
}

/// Starts `job` on a dedicated worker thread.
///
/// # Errors
/// `Internal` if the thread cannot be spawned.
pub fn spawn(job: StabilizationJob) -> StabilizationResult<RunHandle> {
    let StabilizationJob {
        mut stream,
        mut strategy,
        config,
        callbacks,
        progress_capacity,
    } = job;
    let RunCallbacks {
        mut on_progress,
        next_target,
    } = callbacks;

    let (tx, rx) = bounded::<RunOutcome>(1);
    let (progress_tx, progress_rx) = bounded::<ProgressReport>(progress_capacity.max(1));
    let cancel = Arc::new(AtomicBool::new(false));
    let dropped_reports = Arc::new(AtomicU64::new(0));

    let worker_cancel = Arc::clone(&cancel);
    let worker_dropped = Arc::clone(&dropped_reports);
    let forward = move |report: &ProgressReport| {
        match progress_tx.try_send(*report) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                worker_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        let caller = on_progress
            .as_mut()
            .map_or(ProgressSignal::Continue, |callback| callback(report));
        if caller == ProgressSignal::Cancel || worker_cancel.load(Ordering::Acquire) {
            ProgressSignal::Cancel
        } else {
            ProgressSignal::Continue
        }
    };
    let callbacks = RunCallbacks {
        on_progress: Some(Box::new(forward)),
        next_target,
    };

    let join = thread::Builder::new()
        .name("smartlapse-run".to_string())
        .spawn(move || {
            let outcome = super::run(stream.as_mut(), strategy.as_mut(), config, callbacks);
            let _ = tx.send(outcome);
        })
        .map_err(|e| StabilizationError::internal(format!("failed to spawn run worker: {e}")))?;

    Ok(RunHandle {
        rx,
        progress_rx,
        cancel,
        dropped_reports,
        join: Some(join),
    })
}
