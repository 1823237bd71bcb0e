//! Run results handed to external writers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StabilizationError;
use crate::plan::{plan_digest, SnapshotPlan};

/// Unique identifier for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random run id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A problem noticed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Source line (or record ordinal) the problem refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    pub message: String,
    /// The problem ended the run.
    pub fatal: bool,
}

impl Diagnostic {
    /// Builds a diagnostic from an error.
    #[must_use]
    pub fn from_error(err: &StabilizationError) -> Self {
        let line = match err {
            StabilizationError::Input(input) => Some(input.line()),
            _ => None,
        };
        Self {
            line,
            message: err.to_string(),
            fatal: !err.is_recoverable(),
        }
    }
}

/// Counters maintained while scanning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    /// Records read from the stream, including rejected ones.
    pub lines_processed: u64,
    /// Records that moved an axis or extruded.
    pub gcodes_processed: u64,
    /// Records skipped as invalid.
    pub records_rejected: u64,
    pub plans_emitted: u64,
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    /// False only when a fatal error ended the run.
    pub success: bool,
    /// The progress callback asked to stop.
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub counts: RunCounts,
    pub elapsed_seconds: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// blake3 digest of the ordered plan list.
    pub plan_digest: String,
}

/// Plans plus summary; every run ends with one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub plans: Vec<SnapshotPlan>,
    pub summary: RunSummary,
}

impl RunOutcome {
    /// True if the run finished without a fatal error.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.summary.success
    }

    /// Outcome of a run that failed before reading any input.
    #[must_use]
    pub fn rejected(err: &StabilizationError) -> Self {
        let now = Utc::now();
        Self {
            plans: Vec::new(),
            summary: RunSummary {
                run_id: RunId::new(),
                success: false,
                cancelled: false,
                failure: Some(err.to_string()),
                diagnostics: vec![Diagnostic::from_error(err)],
                counts: RunCounts::default(),
                elapsed_seconds: 0.0,
                started_at: now,
                finished_at: now,
                plan_digest: plan_digest(&[]),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, InputError};

    #[test]
    fn diagnostic_from_input_error_is_recoverable() {
        let err: StabilizationError = InputError::NonFinite { line: 12, field: "x" }.into();
        let d = Diagnostic::from_error(&err);
        assert_eq!(d.line, Some(12));
        assert!(!d.fatal);
        assert!(d.message.contains("Line 12"));
    }

    #[test]
    fn rejected_outcome_carries_reason() {
        let err: StabilizationError = ConfigError::MissingField {
            field: "x_coordinate".to_string(),
        }
        .into();
        let outcome = RunOutcome::rejected(&err);
        assert!(!outcome.is_success());
        assert!(outcome.plans.is_empty());
        assert!(outcome.summary.failure.unwrap().contains("x_coordinate"));
        assert_eq!(outcome.summary.diagnostics.len(), 1);
        assert!(outcome.summary.diagnostics[0].fatal);
    }

    #[test]
    fn outcome_serializes_to_json() {
        let err = StabilizationError::internal("boom");
        let outcome = RunOutcome::rejected(&err);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["summary"]["success"], false);
        assert!(json["plans"].as_array().unwrap().is_empty());
    }
}
