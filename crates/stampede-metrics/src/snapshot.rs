//! Snapshot types: the aggregated view frozen into a [`RunResult`].
//!
//! Everything here is serde-serializable with snake_case field names,
//! durations as f64 seconds, timestamps as integer UTC seconds and response
//! times in milliseconds. This is the stable shape report renderers read.

use crate::state::MetricsState;
use crate::stats::{mean, nearest_rank, population_std_dev, sorted};
use crate::thresholds::AbortReason;
use serde::{Deserialize, Serialize};
use stampede_core::{ErrorKind, LoadProfile, TaskOutcome, TestConfig};
use std::collections::BTreeMap;

/// Aggregate statistics over the whole load phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Percentage in `[0, 100]`.
    pub success_rate: f64,
    pub test_duration: f64,

    pub rps: f64,
    pub successful_rps: f64,
    pub failed_rps: f64,
    pub max_rps: f64,
    pub min_rps: f64,
    pub avg_second_rps: f64,
    pub p95_rps: f64,
    pub max_success_rps: f64,
    pub avg_success_rps: f64,
    pub max_failed_rps: f64,
    pub avg_failed_rps: f64,
    /// Std-dev of per-second request counts.
    pub throughput_variation: f64,

    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    pub p50_response_time: f64,
    pub p90_response_time: f64,
    pub p95_response_time: f64,
    pub p99_response_time: f64,
    pub p999_response_time: f64,
    pub response_time_std_dev: f64,

    pub max_concurrent_users: usize,
}

/// Distributions kept verbatim for report-layer drill-down.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedResults {
    pub status_codes_distribution: BTreeMap<u16, u64>,
    pub error_kinds_distribution: BTreeMap<ErrorKind, u64>,
    pub errors_distribution: BTreeMap<String, u64>,
}

/// One per-second point of the time series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    pub timestamp: i64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub rps: f64,
    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
}

/// Aggregated statistics for one latency-breakdown phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStat {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub total_connections: u64,
    pub failed_connections: u64,
    /// Percentage in `[0, 100]`; 100 when no connections were reported.
    pub connection_success_rate: f64,
    pub connection_errors: BTreeMap<String, u64>,
}

/// Per-transaction summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    pub p50_response_time: f64,
    pub p90_response_time: f64,
    pub p95_response_time: f64,
    pub p99_response_time: f64,
}

/// One ramp-up step's tally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// 1-based step index; the stable phase is `ramp_up_steps + 1`.
    pub step: u32,
    pub stable: bool,
    pub users: usize,
    pub duration_sec: f64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub error_rate: f64,
}

/// One stability check window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntervalResult {
    /// 1-based check index.
    pub index: u32,
    pub total_requests: u64,
    pub error_rate: f64,
    pub p50_response_time: f64,
    pub p95_response_time: f64,
    pub p99_response_time: f64,
    /// True for the interval whose thresholds triggered the abort.
    pub exceeded: bool,
}

/// Profile-specific result extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "profile")]
pub enum ProfileExtras {
    Concurrent {
        concurrent_users: usize,
    },
    Rate {
        target_rate: f64,
        achieved_rate: f64,
    },
    RampUp {
        step_results: Vec<StepResult>,
    },
    Stability {
        check_interval_sec: f64,
        interval_results: Vec<IntervalResult>,
    },
}

/// Run identity and wall-clock framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportInfo {
    /// UTC seconds when the run started.
    pub started_at: i64,
    /// UTC seconds when the run finished.
    pub ended_at: i64,
    /// Whole-run elapsed wall clock including before/after phases.
    pub elapsed_sec: f64,
    /// Load-phase elapsed wall clock.
    pub load_duration_sec: f64,
    pub profile: LoadProfile,
    pub abort_reason: Option<AbortReason>,
}

/// The aggregated part of a snapshot, before run-level framing is attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub summary_statistics: SummaryStatistics,
    pub detailed_results: DetailedResults,
    pub time_series: Vec<TimePoint>,
    pub latency_stats: BTreeMap<String, LatencyStat>,
    pub connection_metrics: ConnectionMetrics,
    pub transaction_metrics: BTreeMap<String, TransactionSummary>,
}

/// The final frozen result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub report_info: ReportInfo,
    pub test_config: TestConfig,
    pub summary_statistics: SummaryStatistics,
    pub detailed_results: DetailedResults,
    pub time_series: Vec<TimePoint>,
    pub latency_stats: BTreeMap<String, LatencyStat>,
    pub connection_metrics: ConnectionMetrics,
    pub transaction_metrics: BTreeMap<String, TransactionSummary>,
    pub before_results: Vec<TaskOutcome>,
    pub after_results: Vec<TaskOutcome>,
    pub profile_extras: ProfileExtras,
}

impl RunResult {
    /// Attaches run-level framing to an aggregated snapshot.
    pub fn compose(
        report_info: ReportInfo,
        test_config: TestConfig,
        snapshot: MetricsSnapshot,
        before_results: Vec<TaskOutcome>,
        after_results: Vec<TaskOutcome>,
        profile_extras: ProfileExtras,
    ) -> Self {
        Self {
            report_info,
            test_config,
            summary_statistics: snapshot.summary_statistics,
            detailed_results: snapshot.detailed_results,
            time_series: snapshot.time_series,
            latency_stats: snapshot.latency_stats,
            connection_metrics: snapshot.connection_metrics,
            transaction_metrics: snapshot.transaction_metrics,
            before_results,
            after_results,
            profile_extras,
        }
    }
}

/// Builds the aggregated snapshot from interior state. Pure: the state is
/// only read, so repeated calls with no intervening records are identical.
pub(crate) fn build_snapshot(state: &MetricsState) -> MetricsSnapshot {
    let duration = state.observed_duration();
    let samples = sorted(state.response_times.clone());

    let (avg_rt, min_rt, max_rt, std_dev_rt) = if samples.is_empty() {
        (0.0, 0.0, 0.0, 0.0)
    } else {
        (
            mean(&samples),
            samples[0],
            samples[samples.len() - 1],
            population_std_dev(&samples),
        )
    };

    let per_second: Vec<f64> = state.buckets.values().map(|b| b.total as f64).collect();
    let success_seconds: Vec<f64> = state
        .buckets
        .values()
        .filter(|b| b.success > 0)
        .map(|b| b.success as f64)
        .collect();
    let failed_seconds: Vec<f64> = state
        .buckets
        .values()
        .filter(|b| b.failure > 0)
        .map(|b| b.failure as f64)
        .collect();
    let per_second_sorted = sorted(per_second.clone());

    let rate = |count: u64| if duration > 0.0 { count as f64 / duration } else { 0.0 };

    let summary_statistics = SummaryStatistics {
        total_requests: state.total,
        successful_requests: state.success,
        failed_requests: state.failure,
        success_rate: if state.total > 0 {
            state.success as f64 / state.total as f64 * 100.0
        } else {
            0.0
        },
        test_duration: duration,
        rps: rate(state.total),
        successful_rps: rate(state.success),
        failed_rps: rate(state.failure),
        max_rps: per_second.iter().copied().fold(0.0, f64::max),
        min_rps: if per_second.is_empty() {
            0.0
        } else {
            per_second.iter().copied().fold(f64::INFINITY, f64::min)
        },
        avg_second_rps: mean(&per_second),
        p95_rps: nearest_rank(&per_second_sorted, 95.0),
        max_success_rps: success_seconds.iter().copied().fold(0.0, f64::max),
        avg_success_rps: mean(&success_seconds),
        max_failed_rps: failed_seconds.iter().copied().fold(0.0, f64::max),
        avg_failed_rps: mean(&failed_seconds),
        throughput_variation: population_std_dev(&per_second),
        avg_response_time: avg_rt,
        min_response_time: min_rt,
        max_response_time: max_rt,
        p50_response_time: nearest_rank(&samples, 50.0),
        p90_response_time: nearest_rank(&samples, 90.0),
        p95_response_time: nearest_rank(&samples, 95.0),
        p99_response_time: nearest_rank(&samples, 99.0),
        p999_response_time: nearest_rank(&samples, 99.9),
        response_time_std_dev: std_dev_rt,
        max_concurrent_users: state.max_concurrent_users,
    };

    let detailed_results = DetailedResults {
        status_codes_distribution: state.status_codes.clone(),
        error_kinds_distribution: state.kinds.clone(),
        errors_distribution: state.error_messages.clone(),
    };

    let time_series = state
        .buckets
        .iter()
        .map(|(timestamp, bucket)| {
            let (avg, min, max) = if bucket.response_times.is_empty() {
                (0.0, 0.0, 0.0)
            } else {
                let sorted_times = sorted(bucket.response_times.clone());
                (
                    mean(&sorted_times),
                    sorted_times[0],
                    sorted_times[sorted_times.len() - 1],
                )
            };
            TimePoint {
                timestamp: *timestamp,
                total_requests: bucket.total,
                successful_requests: bucket.success,
                failed_requests: bucket.failure,
                success_rate: if bucket.total > 0 {
                    bucket.success as f64 / bucket.total as f64 * 100.0
                } else {
                    0.0
                },
                rps: bucket.total as f64,
                avg_response_time: avg,
                min_response_time: min,
                max_response_time: max,
            }
        })
        .collect();

    let latency_stats = state
        .latency
        .iter()
        .map(|(phase, values)| {
            let sorted_values = sorted(values.clone());
            let stat = if sorted_values.is_empty() {
                LatencyStat::default()
            } else {
                LatencyStat {
                    avg: mean(&sorted_values),
                    min: sorted_values[0],
                    max: sorted_values[sorted_values.len() - 1],
                    p50: nearest_rank(&sorted_values, 50.0),
                    p95: nearest_rank(&sorted_values, 95.0),
                    count: sorted_values.len() as u64,
                }
            };
            (phase.clone(), stat)
        })
        .collect();

    let connection_metrics = ConnectionMetrics {
        total_connections: state.connections.total,
        failed_connections: state.connections.failed,
        connection_success_rate: if state.connections.total > 0 {
            (1.0 - state.connections.failed as f64 / state.connections.total as f64) * 100.0
        } else {
            100.0
        },
        connection_errors: state.connections.errors.clone(),
    };

    let transaction_metrics = state
        .transactions
        .iter()
        .map(|(name, tx)| {
            let sorted_times = sorted(tx.response_times.clone());
            let summary = TransactionSummary {
                total_requests: tx.total,
                successful_requests: tx.success,
                failed_requests: tx.failure,
                success_rate: if tx.total > 0 {
                    tx.success as f64 / tx.total as f64 * 100.0
                } else {
                    0.0
                },
                avg_response_time: mean(&sorted_times),
                min_response_time: sorted_times.first().copied().unwrap_or(0.0),
                max_response_time: sorted_times.last().copied().unwrap_or(0.0),
                p50_response_time: nearest_rank(&sorted_times, 50.0),
                p90_response_time: nearest_rank(&sorted_times, 90.0),
                p95_response_time: nearest_rank(&sorted_times, 95.0),
                p99_response_time: nearest_rank(&sorted_times, 99.0),
            };
            (name.clone(), summary)
        })
        .collect();

    MetricsSnapshot {
        summary_statistics,
        detailed_results,
        time_series,
        latency_stats,
        connection_metrics,
        transaction_metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::{TaskError, TaskResult};

    fn state_with_traffic() -> MetricsState {
        let mut state = MetricsState::new(100.0);
        for i in 0..10 {
            let started = 100.0 + i as f64 * 0.4;
            state.record(&TaskOutcome::success_from(
                TaskResult::success(10.0 + i as f64).with_status(200),
                started,
                started + 0.01,
                1,
            ));
        }
        state.record(&TaskOutcome::failure_from(
            None,
            TaskError::new(ErrorKind::HttpError, "HTTP 500"),
            104.1,
            104.2,
            100.0,
            1,
        ));
        state.ended_at = Some(105.0);
        state
    }

    #[test]
    fn summary_counts_and_rates() {
        let snapshot = build_snapshot(&state_with_traffic());
        let summary = &snapshot.summary_statistics;
        assert_eq!(summary.total_requests, 11);
        assert_eq!(summary.successful_requests, 10);
        assert_eq!(summary.failed_requests, 1);
        assert!((summary.test_duration - 5.0).abs() < 1e-9);
        assert!((summary.rps - 11.0 / 5.0).abs() < 1e-9);
        assert!(summary.success_rate > 90.0 && summary.success_rate < 91.0);
    }

    #[test]
    fn percentiles_are_monotone() {
        let snapshot = build_snapshot(&state_with_traffic());
        let s = &snapshot.summary_statistics;
        assert!(s.p50_response_time <= s.p90_response_time);
        assert!(s.p90_response_time <= s.p95_response_time);
        assert!(s.p95_response_time <= s.p99_response_time);
        assert!(s.p99_response_time <= s.p999_response_time);
        assert!(s.p999_response_time <= s.max_response_time);
    }

    #[test]
    fn empty_state_snapshots_without_dividing_by_zero() {
        let snapshot = build_snapshot(&MetricsState::new(0.0));
        let s = &snapshot.summary_statistics;
        assert_eq!(s.total_requests, 0);
        assert_eq!(s.rps, 0.0);
        assert_eq!(s.min_rps, 0.0);
        assert_eq!(s.p99_response_time, 0.0);
        assert_eq!(snapshot.connection_metrics.connection_success_rate, 100.0);
        assert!(snapshot.time_series.is_empty());
    }

    #[test]
    fn time_series_is_ordered_and_complete() {
        let snapshot = build_snapshot(&state_with_traffic());
        let timestamps: Vec<i64> = snapshot.time_series.iter().map(|p| p.timestamp).collect();
        let mut expected = timestamps.clone();
        expected.sort_unstable();
        assert_eq!(timestamps, expected);
        let total: u64 = snapshot.time_series.iter().map(|p| p.total_requests).sum();
        assert_eq!(total, 11);
    }

    #[test]
    fn snapshot_is_idempotent() {
        let state = state_with_traffic();
        assert_eq!(build_snapshot(&state), build_snapshot(&state));
    }

    #[test]
    fn run_result_round_trips_through_json() {
        let state = state_with_traffic();
        let snapshot = build_snapshot(&state);
        let result = RunResult::compose(
            ReportInfo {
                started_at: 100,
                ended_at: 105,
                elapsed_sec: 5.0,
                load_duration_sec: 5.0,
                profile: LoadProfile::Concurrent,
                abort_reason: None,
            },
            TestConfig::default(),
            snapshot,
            Vec::new(),
            Vec::new(),
            ProfileExtras::Concurrent { concurrent_users: 10 },
        );
        let json = serde_json::to_string_pretty(&result).unwrap();
        let back: RunResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, back);
    }

    #[test]
    fn profile_extras_tag_by_profile() {
        let extras = ProfileExtras::Rate {
            target_rate: 10.0,
            achieved_rate: 9.6,
        };
        let json = serde_json::to_value(&extras).unwrap();
        assert_eq!(json["profile"], "rate");
        assert_eq!(json["achieved_rate"], 9.6);
    }
}
