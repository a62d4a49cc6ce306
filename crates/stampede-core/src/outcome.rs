//! Task boundary value types.
//!
//! A task reports a [`TaskResult`]; the retry executor wraps the final
//! attempt into a [`TaskOutcome`], which is what the aggregator records and
//! the outcome callback observes.

use crate::error::{ErrorKind, TaskError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current UTC wall clock as fractional UNIX seconds.
pub fn unix_time_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Connection details a task may attach to its result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Whether the attempt reused a pooled connection.
    #[serde(default)]
    pub reused: bool,
    /// Connection-level error, when establishing the connection failed.
    #[serde(default)]
    pub error: Option<String>,
}

/// What a single task invocation reports back to the core.
///
/// `success == false` should be accompanied by an [`error`](Self::error);
/// missing detail is normalized to [`ErrorKind::Other`] when the outcome is
/// built. A task may also return `Err(TaskError)` from its future, which the
/// core treats identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub status_code: Option<u16>,
    /// Response time in milliseconds as measured by the task. Zero means
    /// "not measured"; the executor substitutes the attempt wall clock.
    pub response_time_ms: f64,
    pub transaction_name: Option<String>,
    pub error: Option<TaskError>,
    pub latency_breakdown: Option<BTreeMap<String, f64>>,
    pub connection_info: Option<ConnectionInfo>,
}

impl TaskResult {
    /// A successful result with the given response time.
    pub fn success(response_time_ms: f64) -> Self {
        Self {
            success: true,
            status_code: None,
            response_time_ms,
            transaction_name: None,
            error: None,
            latency_breakdown: None,
            connection_info: None,
        }
    }

    /// A failed result carrying a classified error.
    pub fn failure(error: TaskError) -> Self {
        Self {
            success: false,
            status_code: None,
            response_time_ms: 0.0,
            transaction_name: None,
            error: Some(error),
            latency_breakdown: None,
            connection_info: None,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_transaction(mut self, name: impl Into<String>) -> Self {
        self.transaction_name = Some(name.into());
        self
    }

    pub fn with_response_time(mut self, response_time_ms: f64) -> Self {
        self.response_time_ms = response_time_ms;
        self
    }

    pub fn with_latency_breakdown(mut self, breakdown: BTreeMap<String, f64>) -> Self {
        self.latency_breakdown = Some(breakdown);
        self
    }

    pub fn with_connection_info(mut self, info: ConnectionInfo) -> Self {
        self.connection_info = Some(info);
        self
    }
}

/// One recorded outcome per final attempt.
///
/// Invariants: `success` implies `error_kind == None` and vice versa, and
/// `ended_at >= started_at`. Both are enforced by the constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    /// UNIX seconds, set before dispatch of the covered attempt(s).
    pub started_at: f64,
    /// UNIX seconds, set after completion.
    pub ended_at: f64,
    pub response_time_ms: f64,
    pub status_code: Option<u16>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub transaction_name: Option<String>,
    pub latency_breakdown: Option<BTreeMap<String, f64>>,
    pub connection_info: Option<ConnectionInfo>,
    /// How many attempts the retry executor consumed, including the first.
    pub attempts: u32,
}

impl TaskOutcome {
    /// Builds a successful outcome from a task result.
    ///
    /// `started_at`/`ended_at` cover the winning attempt only. A result that
    /// did not measure its own response time gets the attempt wall clock.
    pub fn success_from(result: TaskResult, started_at: f64, ended_at: f64, attempts: u32) -> Self {
        let ended_at = ended_at.max(started_at);
        let response_time_ms = if result.response_time_ms > 0.0 {
            result.response_time_ms
        } else {
            (ended_at - started_at) * 1000.0
        };
        Self {
            success: true,
            started_at,
            ended_at,
            response_time_ms,
            status_code: result.status_code,
            error_kind: None,
            error_message: None,
            transaction_name: result.transaction_name,
            latency_breakdown: result.latency_breakdown,
            connection_info: result.connection_info,
            attempts,
        }
    }

    /// Builds a failed outcome.
    ///
    /// `started_at`/`ended_at` span every attempt including backoff sleeps;
    /// `last_attempt_ms` is the wall clock of the final attempt and becomes
    /// the response time when the task did not report one. When a partial
    /// `result` is available its request metadata is carried over.
    pub fn failure_from(
        result: Option<TaskResult>,
        error: TaskError,
        started_at: f64,
        ended_at: f64,
        last_attempt_ms: f64,
        attempts: u32,
    ) -> Self {
        let ended_at = ended_at.max(started_at);
        let (status_code, transaction_name, latency_breakdown, connection_info, reported_ms) =
            match result {
                Some(r) => (
                    r.status_code,
                    r.transaction_name,
                    r.latency_breakdown,
                    r.connection_info,
                    r.response_time_ms,
                ),
                None => (None, None, None, None, 0.0),
            };
        Self {
            success: false,
            started_at,
            ended_at,
            response_time_ms: if reported_ms > 0.0 { reported_ms } else { last_attempt_ms },
            status_code,
            error_kind: Some(error.kind),
            error_message: Some(error.message),
            transaction_name,
            latency_breakdown,
            connection_info,
            attempts,
        }
    }

    /// Wall-clock duration of this outcome in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.ended_at - self.started_at
    }

    /// The classified error, when this outcome is a failure.
    pub fn error(&self) -> Option<TaskError> {
        match (self.error_kind, &self.error_message) {
            (Some(kind), Some(message)) => Some(TaskError::new(kind, message.clone())),
            (Some(kind), None) => Some(TaskError::new(kind, "")),
            _ => None,
        }
    }
}
