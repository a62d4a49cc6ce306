//! Interior metrics state, mutated only under the aggregator's lock.

use serde::{Deserialize, Serialize};
use stampede_core::{ErrorKind, TaskOutcome};
use std::collections::BTreeMap;

/// Distinct raw error messages tracked before new ones collapse into the
/// overflow key. Keeps a pathological failure mode from growing the map
/// without bound; bucketing/simplification is a report-layer concern.
pub(crate) const MAX_DISTINCT_ERROR_MESSAGES: usize = 256;
pub(crate) const ERROR_MESSAGE_OVERFLOW_KEY: &str = "(other errors)";

/// One second of recorded traffic, keyed by `floor(started_at)` UTC seconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SecondBucket {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    /// Response times of successful requests that started in this second.
    pub response_times: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct TransactionState {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    pub response_times: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ConnectionState {
    pub total: u64,
    pub failed: u64,
    pub errors: BTreeMap<String, u64>,
}

/// Running counts, cheap to copy out for checks and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounts {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    pub consecutive_errors: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct MetricsState {
    pub started_at: f64,
    pub ended_at: Option<f64>,
    /// Earliest `started_at` / latest `ended_at` across recorded outcomes,
    /// used for the observed duration when `finalize` was never called.
    pub first_started: Option<f64>,
    pub last_ended: Option<f64>,

    pub total: u64,
    pub success: u64,
    pub failure: u64,
    pub consecutive_errors: u64,
    pub max_concurrent_users: usize,

    pub response_times: Vec<f64>,
    pub kinds: BTreeMap<ErrorKind, u64>,
    pub status_codes: BTreeMap<u16, u64>,
    pub error_messages: BTreeMap<String, u64>,
    pub buckets: BTreeMap<i64, SecondBucket>,
    pub latency: BTreeMap<String, Vec<f64>>,
    pub connections: ConnectionState,
    pub transactions: BTreeMap<String, TransactionState>,

    /// First fatal error seen, if any. Fatal kinds abort unconditionally.
    pub fatal: Option<(ErrorKind, String)>,
}

impl MetricsState {
    pub fn new(started_at: f64) -> Self {
        Self {
            started_at,
            ended_at: None,
            first_started: None,
            last_ended: None,
            total: 0,
            success: 0,
            failure: 0,
            consecutive_errors: 0,
            max_concurrent_users: 0,
            response_times: Vec::new(),
            kinds: BTreeMap::new(),
            status_codes: BTreeMap::new(),
            error_messages: BTreeMap::new(),
            buckets: BTreeMap::new(),
            latency: BTreeMap::new(),
            connections: ConnectionState::default(),
            transactions: BTreeMap::new(),
            fatal: None,
        }
    }

    pub fn counts(&self) -> RequestCounts {
        RequestCounts {
            total: self.total,
            success: self.success,
            failure: self.failure,
            consecutive_errors: self.consecutive_errors,
        }
    }

    pub fn record(&mut self, outcome: &TaskOutcome) {
        self.total += 1;
        self.first_started = Some(match self.first_started {
            Some(v) => v.min(outcome.started_at),
            None => outcome.started_at,
        });
        self.last_ended = Some(match self.last_ended {
            Some(v) => v.max(outcome.ended_at),
            None => outcome.ended_at,
        });

        let bucket = self
            .buckets
            .entry(outcome.started_at.floor() as i64)
            .or_default();
        bucket.total += 1;

        if outcome.success {
            self.success += 1;
            self.consecutive_errors = 0;
            self.response_times.push(outcome.response_time_ms);
            bucket.success += 1;
            bucket.response_times.push(outcome.response_time_ms);
            if let Some(status) = outcome.status_code {
                *self.status_codes.entry(status).or_default() += 1;
            }
        } else {
            self.failure += 1;
            self.consecutive_errors += 1;
            bucket.failure += 1;

            let kind = outcome.error_kind.unwrap_or(ErrorKind::Other);
            *self.kinds.entry(kind).or_default() += 1;

            let message = outcome.error_message.as_deref().unwrap_or("");
            self.record_error_message(message);

            if kind.is_fatal() && self.fatal.is_none() {
                self.fatal = Some((kind, message.to_string()));
            }
        }

        if let Some(breakdown) = &outcome.latency_breakdown {
            for (phase, value) in breakdown {
                self.latency.entry(phase.clone()).or_default().push(*value);
            }
        }

        if let Some(info) = &outcome.connection_info {
            self.connections.total += 1;
            if let Some(error) = &info.error {
                if !outcome.success {
                    self.connections.failed += 1;
                    *self.connections.errors.entry(error.clone()).or_default() += 1;
                }
            }
        }

        if let Some(name) = &outcome.transaction_name {
            let tx = self.transactions.entry(name.clone()).or_default();
            tx.total += 1;
            if outcome.success {
                tx.success += 1;
                tx.response_times.push(outcome.response_time_ms);
            } else {
                tx.failure += 1;
            }
        }
    }

    fn record_error_message(&mut self, message: &str) {
        if self.error_messages.contains_key(message)
            || self.error_messages.len() < MAX_DISTINCT_ERROR_MESSAGES
        {
            *self.error_messages.entry(message.to_string()).or_default() += 1;
        } else {
            *self
                .error_messages
                .entry(ERROR_MESSAGE_OVERFLOW_KEY.to_string())
                .or_default() += 1;
        }
    }

    pub fn update_concurrent_users(&mut self, current: usize) {
        if current > self.max_concurrent_users {
            self.max_concurrent_users = current;
        }
    }

    /// Wall clock covered by this state: `finalize` timestamp when present,
    /// otherwise the recorded first-start/last-end range.
    pub fn observed_duration(&self) -> f64 {
        let duration = match self.ended_at {
            Some(ended) => ended - self.started_at,
            None => match (self.first_started, self.last_ended) {
                (Some(first), Some(last)) => last - first,
                _ => 0.0,
            },
        };
        duration.max(0.0)
    }
}
