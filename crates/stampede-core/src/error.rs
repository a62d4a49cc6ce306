//! Error taxonomy for the load core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified failure kinds.
///
/// The set is closed: every task failure maps to exactly one kind, and retry
/// and threshold policy are written against these tags rather than raw error
/// values. Callers must not invent kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A per-attempt deadline elapsed, or the task reported a timeout.
    Timeout,
    /// The transport failed: refused, reset, unreachable, DNS, and friends.
    ConnectionError,
    /// An HTTP 4xx/5xx surfaced as a structured error.
    HttpError,
    /// An assertion raised by the user task.
    AssertionError,
    /// Input validation rejected the request before it was sent.
    ValidationError,
    /// Out-of-memory or another OS-level fault. Always fatal for the run.
    SystemError,
    /// Everything else, including panics escaping the task.
    Other,
}

impl ErrorKind {
    /// All kinds, in classifier priority order.
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::Timeout,
        ErrorKind::ConnectionError,
        ErrorKind::HttpError,
        ErrorKind::AssertionError,
        ErrorKind::ValidationError,
        ErrorKind::SystemError,
        ErrorKind::Other,
    ];

    /// The snake_case tag used in serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::HttpError => "http_error",
            ErrorKind::AssertionError => "assertion_error",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::SystemError => "system_error",
            ErrorKind::Other => "other",
        }
    }

    /// Fatal kinds abort the run regardless of threshold configuration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::SystemError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified task failure: one kind plus a free-form message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    /// Creates an error with an explicit kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates an error whose kind is derived from the message by the
    /// classifier.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = crate::classify::classify_message(&message);
        Self { kind, message }
    }

    /// Classifies an arbitrary error value.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self {
            kind: crate::classify::classify_error(err),
            message: err.to_string(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TaskError {}

/// Errors raised while validating a [`TestConfig`](crate::config::TestConfig).
///
/// This is the only error surfaced by the public API; operational failures
/// during a run are reported as outcomes, never as errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A numeric field must be strictly positive.
    #[error("{field} must be greater than zero (got {value})")]
    NotPositive { field: &'static str, value: f64 },

    /// A numeric field must not be negative.
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },

    /// A numeric field fell outside its valid range.
    #[error("{field} must be within {min}..={max} (got {value})")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },

    /// A field required by the selected profile is missing.
    #[error("{field} is required for the {profile} profile")]
    Missing {
        field: &'static str,
        profile: &'static str,
    },

    /// The runner was built without a load task.
    #[error("a load task is required")]
    MissingTask,
}
