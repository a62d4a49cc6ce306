//! Property tests for the aggregator.
//!
//! Invariants tested:
//! - `total == success + failure` after every record
//! - per-kind counts sum to the failure count
//! - snapshot percentiles are monotone
//! - snapshot is idempotent and JSON round-trips

use proptest::prelude::*;
use stampede_core::{ErrorKind, TaskError, TaskOutcome, TaskResult, ThresholdConfig};
use stampede_metrics::{MetricsAggregator, MetricsSnapshot};

#[derive(Debug, Clone)]
struct RecordedEvent {
    success: bool,
    kind: ErrorKind,
    response_time_ms: f64,
    second_offset: u8,
    transaction: Option<u8>,
}

fn kind_strategy() -> impl Strategy<Value = ErrorKind> {
    prop::sample::select(ErrorKind::ALL.to_vec())
}

fn event_strategy() -> impl Strategy<Value = RecordedEvent> {
    (
        any::<bool>(),
        kind_strategy(),
        1.0f64..5_000.0,
        0u8..30,
        prop::option::of(0u8..3),
    )
        .prop_map(
            |(success, kind, response_time_ms, second_offset, transaction)| RecordedEvent {
                success,
                kind,
                response_time_ms,
                second_offset,
                transaction,
            },
        )
}

fn outcome_for(event: &RecordedEvent) -> TaskOutcome {
    let started = 1_000_000.0 + event.second_offset as f64;
    let ended = started + event.response_time_ms / 1000.0;
    let mut outcome = if event.success {
        TaskOutcome::success_from(
            TaskResult::success(event.response_time_ms),
            started,
            ended,
            1,
        )
    } else {
        TaskOutcome::failure_from(
            None,
            TaskError::new(event.kind, format!("{} failure", event.kind)),
            started,
            ended,
            event.response_time_ms,
            1,
        )
    };
    outcome.transaction_name = event.transaction.map(|t| format!("tx-{t}"));
    outcome
}

fn record_all(events: &[RecordedEvent]) -> (MetricsAggregator, MetricsSnapshot) {
    let aggregator = MetricsAggregator::with_start_time(1_000_000.0, ThresholdConfig::default());
    for event in events {
        aggregator.record(&outcome_for(event));
    }
    let snapshot = aggregator.snapshot();
    (aggregator, snapshot)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn totals_balance_after_every_record(events in prop::collection::vec(event_strategy(), 0..200)) {
        let aggregator = MetricsAggregator::with_start_time(1_000_000.0, ThresholdConfig::default());
        for event in &events {
            aggregator.record(&outcome_for(event));
            let counts = aggregator.counts();
            prop_assert_eq!(counts.total, counts.success + counts.failure);
        }
    }

    #[test]
    fn kind_counts_sum_to_failures(events in prop::collection::vec(event_strategy(), 0..200)) {
        let (_, snapshot) = record_all(&events);
        let kind_sum: u64 = snapshot.detailed_results.error_kinds_distribution.values().sum();
        prop_assert_eq!(kind_sum, snapshot.summary_statistics.failed_requests);
    }

    #[test]
    fn percentiles_are_monotone(events in prop::collection::vec(event_strategy(), 0..200)) {
        let (_, snapshot) = record_all(&events);
        let s = &snapshot.summary_statistics;
        prop_assert!(s.p50_response_time <= s.p90_response_time);
        prop_assert!(s.p90_response_time <= s.p95_response_time);
        prop_assert!(s.p95_response_time <= s.p99_response_time);
        prop_assert!(s.p99_response_time <= s.p999_response_time);
        prop_assert!(s.p999_response_time <= s.max_response_time);
    }

    #[test]
    fn snapshot_is_idempotent(events in prop::collection::vec(event_strategy(), 0..100)) {
        let (aggregator, snapshot) = record_all(&events);
        prop_assert_eq!(aggregator.snapshot(), snapshot);
    }

    #[test]
    fn snapshot_round_trips_through_json(events in prop::collection::vec(event_strategy(), 0..100)) {
        let (_, snapshot) = record_all(&events);
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(snapshot, back);
    }

    #[test]
    fn time_series_is_strictly_ordered(events in prop::collection::vec(event_strategy(), 0..200)) {
        let (_, snapshot) = record_all(&events);
        for pair in snapshot.time_series.windows(2) {
            prop_assert!(pair[0].timestamp < pair[1].timestamp);
        }
        let series_total: u64 = snapshot.time_series.iter().map(|p| p.total_requests).sum();
        prop_assert_eq!(series_total, snapshot.summary_statistics.total_requests);
    }

    #[test]
    fn transaction_counts_partition_their_traffic(events in prop::collection::vec(event_strategy(), 0..200)) {
        let (_, snapshot) = record_all(&events);
        let tagged = events.iter().filter(|e| e.transaction.is_some()).count() as u64;
        let tx_total: u64 = snapshot.transaction_metrics.values().map(|t| t.total_requests).sum();
        prop_assert_eq!(tx_total, tagged);
    }
}
