//! Error types for smartlapse.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the specific condition. Only [`InputError`]s are recoverable: a run skips
//! the offending record, records a diagnostic and keeps scanning. Everything
//! else halts the run before or during processing.

use thiserror::Error;

/// Invalid or missing run settings. Always fatal and detected before a run starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Setting '{field}' has an invalid value: {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },

    #[error("Required setting '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Failed to parse configuration: {message}")]
    Parse {
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// A single position record could not be used.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("Line {line}: field '{field}' is not a finite number")]
    NonFinite {
        line: u64,
        field: &'static str,
    },

    #[error("Record {record}: malformed position record: {message}")]
    Malformed {
        record: u64,
        message: String,
    },

    #[error("Line {line}: rejected by strategy: {reason}")]
    Rejected {
        line: u64,
        reason: String,
    },
}

impl InputError {
    /// Source line (or record ordinal for unparsable records) the error refers to.
    #[must_use]
    pub const fn line(&self) -> u64 {
        match self {
            Self::NonFinite { line, .. } | Self::Rejected { line, .. } => *line,
            Self::Malformed { record, .. } => *record,
        }
    }
}

/// The position source could not be opened or read.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StreamError {
    #[error("Cannot open position stream '{path}': {message}")]
    Open {
        path: String,
        message: String,
    },

    #[error("Failed to read position stream: {message}")]
    Read {
        message: String,
    },
}

/// Top-level error type for smartlapse.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StabilizationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Stabilization worker did not finish within {duration_ms}ms")]
    WorkerTimeout {
        duration_ms: u64,
    },

    #[error("Stabilization worker disconnected before reporting a result")]
    WorkerDisconnected,

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl StabilizationError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is an input error.
    #[must_use]
    pub const fn is_input(&self) -> bool {
        matches!(self, Self::Input(_))
    }

    /// Returns true if this is a stream error.
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Returns true if a run may skip the offending record and continue.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Input(_))
    }
}

/// Result type alias for smartlapse operations.
pub type StabilizationResult<T> = Result<T, StabilizationError>;
