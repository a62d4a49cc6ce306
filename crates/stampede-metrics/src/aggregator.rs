//! The thread-safe metrics sink.

use crate::snapshot::{build_snapshot, MetricsSnapshot};
use crate::state::{MetricsState, RequestCounts};
use crate::thresholds::{ThresholdBreach, ThresholdVerdict};
use stampede_core::{unix_time_now, TaskOutcome, ThresholdConfig};
use std::sync::{Mutex, MutexGuard};

#[cfg(feature = "metrics")]
use metrics::counter;

/// Single serialization point for all metric mutations.
///
/// One mutex guards the whole state; every operation takes a short critical
/// section and no user code ever runs inside one. Constructed by the
/// coordinator, shared with the scheduler, frozen into the final result at
/// end of run.
pub struct MetricsAggregator {
    state: Mutex<MetricsState>,
    thresholds: ThresholdConfig,
}

impl MetricsAggregator {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self::with_start_time(unix_time_now(), thresholds)
    }

    /// Starts the run clock at an explicit timestamp. Useful in tests.
    pub fn with_start_time(started_at: f64, thresholds: ThresholdConfig) -> Self {
        Self {
            state: Mutex::new(MetricsState::new(started_at)),
            thresholds,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        // A poisoned lock means a panic inside a critical section, which is
        // a bug in this crate; propagating the panic aborts the run.
        self.state.lock().expect("metrics state lock poisoned")
    }

    /// Records one outcome: counters, samples, buckets, distributions and
    /// the consecutive-error counter, all under one lock acquisition.
    pub fn record(&self, outcome: &TaskOutcome) {
        self.lock().record(outcome);

        #[cfg(feature = "metrics")]
        counter!(
            "load_outcomes_total",
            "result" => if outcome.success { "success" } else { "failure" }
        )
        .increment(1);
    }

    /// Tracks the maximum observed in-flight task count.
    pub fn update_concurrent_users(&self, current: usize) {
        self.lock().update_concurrent_users(current);
    }

    /// Cheap copy of the running counters.
    pub fn counts(&self) -> RequestCounts {
        self.lock().counts()
    }

    /// Evaluates the configured abort thresholds against current state.
    ///
    /// Fatal kinds abort regardless of configured limits. All other checks
    /// use `>=` comparisons and require at least one matching failure, so an
    /// accidental zero limit behaves like a limit of one.
    pub fn check_thresholds(&self) -> ThresholdVerdict {
        let state = self.lock();

        if let Some((kind, message)) = &state.fatal {
            return ThresholdVerdict::Abort(ThresholdBreach::Fatal {
                kind: *kind,
                message: message.clone(),
            });
        }

        if let Some(limit) = self.thresholds.max_errors {
            if state.failure > 0 && state.failure >= limit {
                return ThresholdVerdict::Abort(ThresholdBreach::MaxErrors {
                    count: state.failure,
                    limit,
                });
            }
        }

        if let Some(limit) = self.thresholds.max_error_rate {
            if state.total > 0 {
                let rate = state.failure as f64 / state.total as f64;
                if rate >= limit {
                    return ThresholdVerdict::Abort(ThresholdBreach::MaxErrorRate { rate, limit });
                }
            }
        }

        if let Some(limit) = self.thresholds.max_consecutive_errors {
            if state.consecutive_errors > 0 && state.consecutive_errors >= limit {
                return ThresholdVerdict::Abort(ThresholdBreach::MaxConsecutiveErrors {
                    count: state.consecutive_errors,
                    limit,
                });
            }
        }

        for (kind, limit) in &self.thresholds.kind_limits {
            let count = state.kinds.get(kind).copied().unwrap_or(0);
            if count > 0 && count >= *limit {
                return ThresholdVerdict::Abort(ThresholdBreach::KindLimit {
                    kind: *kind,
                    count,
                    limit: *limit,
                });
            }
        }

        ThresholdVerdict::Continue
    }

    /// Stamps the end of the run clock. Idempotent; later records still land
    /// but the observed duration stays frozen.
    pub fn finalize(&self) {
        let mut state = self.lock();
        if state.ended_at.is_none() {
            state.ended_at = Some(unix_time_now());
        }
    }

    /// Freezes the current state into an aggregated snapshot.
    ///
    /// Pure and idempotent: state is only read, and two calls with no
    /// intervening `record` return equal snapshots.
    pub fn snapshot(&self) -> MetricsSnapshot {
        build_snapshot(&self.lock())
    }

    pub fn started_at(&self) -> f64 {
        self.lock().started_at
    }
}
