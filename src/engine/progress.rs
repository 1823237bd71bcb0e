//! Throttled progress notification.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Callback invoked with periodic progress; returning `Cancel` stops the run.
pub type ProgressCallback = Box<dyn FnMut(&ProgressReport) -> ProgressSignal + Send>;

/// Continue/stop answer from a progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProgressSignal {
    #[default]
    Continue,
    Cancel,
}

/// One progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    /// 0 to 100.
    pub percent_complete: f64,
    pub elapsed_seconds: f64,
    /// Linear extrapolation from elapsed time and completion fraction.
    pub estimated_remaining_seconds: f64,
    pub gcodes_processed: u64,
    pub lines_processed: u64,
}

impl ProgressReport {
    /// Builds a report for `fraction` (0 to 1) of the input consumed after `elapsed`.
    #[must_use]
    pub fn new(fraction: f64, elapsed: Duration, gcodes_processed: u64, lines_processed: u64) -> Self {
        let fraction = fraction.clamp(0.0, 1.0);
        let elapsed_seconds = elapsed.as_secs_f64();
        let estimated_remaining_seconds = if fraction > 0.0 {
            elapsed_seconds / fraction - elapsed_seconds
        } else {
            0.0
        };
        Self {
            percent_complete: fraction * 100.0,
            elapsed_seconds,
            estimated_remaining_seconds,
            gcodes_processed,
            lines_processed,
        }
    }
}

/// Decides when the next notification is due.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    period: Duration,
    last_notified: Instant,
}

impl ProgressThrottle {
    /// Starts timing from `start`.
    #[must_use]
    pub const fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            last_notified: start,
        }
    }

    /// True if at least one period has passed since the last notification;
    /// restarts the period when it has.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_notified) < self.period {
            return false;
        }
        self.last_notified = now;
        true
    }
}
