//! Retry semantics observed through a full run.

mod common;

use common::OutcomeLog;
use stampede_core::{ErrorKind, FnTask, TaskError, TaskResult, TestConfig};
use stampede_runner::LoadRunner;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
async fn timeouts_exhaust_the_budget_and_span_backoffs() {
    let log = OutcomeLog::new();
    let sink = log.clone();

    let config = TestConfig::builder()
        .concurrent(2, 1.5)
        .max_retries(2)
        .retry_base_delay_sec(0.05)
        .retryable_kinds([ErrorKind::Timeout])
        .build()
        .unwrap();

    let runner = LoadRunner::builder()
        .config(config)
        .task(FnTask::new(|| async {
            Err(TaskError::timeout("upstream timed out"))
        }))
        .on_outcome(move |outcome| sink.push(outcome))
        .build()
        .unwrap();

    let result = runner.run().await;
    let summary = &result.summary_statistics;

    assert!(summary.total_requests > 0);
    assert_eq!(summary.failed_requests, summary.total_requests);

    for outcome in log.snapshot() {
        assert_eq!(outcome.error_kind, Some(ErrorKind::Timeout));
        assert_eq!(outcome.attempts, 3);
        // Backoffs: 0.05 * (1 + 2) seconds minimum per outcome.
        assert!(
            outcome.duration_secs() >= 0.15 - 1e-3,
            "outcome finished too fast: {}s",
            outcome.duration_secs()
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_retry_budget_fails_after_one_attempt() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let config = TestConfig::builder().concurrent(1, 0.3).build().unwrap();
    let runner = LoadRunner::builder()
        .config(config)
        .task(FnTask::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(TaskError::from_message("connection refused")) }
        }))
        .build()
        .unwrap();

    let result = runner.run().await;
    assert_eq!(
        calls.load(Ordering::SeqCst) as u64,
        result.summary_statistics.total_requests
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn flaky_task_recovers_within_budget() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let config = TestConfig::builder()
        .concurrent(1, 0.5)
        .max_retries(1)
        .retry_base_delay_sec(0.001)
        .retryable_kinds([ErrorKind::ConnectionError])
        .build()
        .unwrap();

    // Alternate calls fail retryably, so every outcome ends up a success
    // after at most one retry.
    let runner = LoadRunner::builder()
        .config(config)
        .task(FnTask::new(move || {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if count % 2 == 0 {
                    Err(TaskError::from_message("connection reset by peer"))
                } else {
                    Ok(TaskResult::success(5.0))
                }
            }
        }))
        .build()
        .unwrap();

    let result = runner.run().await;
    assert!(result.summary_statistics.total_requests > 0);
    assert_eq!(result.summary_statistics.failed_requests, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn task_panics_surface_as_other_outcomes() {
    let config = TestConfig::builder().concurrent(1, 0.2).build().unwrap();
    let runner = LoadRunner::builder()
        .config(config)
        .task(FnTask::new(|| async { panic!("bug in user task") }))
        .build()
        .unwrap();

    let result = runner.run().await;
    let summary = &result.summary_statistics;
    assert!(summary.total_requests > 0);
    assert_eq!(summary.failed_requests, summary.total_requests);
    assert_eq!(
        result.detailed_results.error_kinds_distribution.get(&ErrorKind::Other),
        Some(&summary.failed_requests)
    );
}
