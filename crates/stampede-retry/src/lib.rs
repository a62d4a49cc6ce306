//! Retry execution for load tasks.
//!
//! [`RetryExecutor`] runs a single task with bounded retries: each attempt
//! gets a hard deadline, failures are classified, retryable kinds back off
//! exponentially, and the final attempt is folded into one
//! [`TaskOutcome`]. Nothing escapes as an error: panics, timeouts and task
//! failures all come back as classified outcomes, so the scheduler above
//! never has to unwind.
//!
//! # Example
//!
//! ```
//! use stampede_core::{CancelSignal, ErrorKind, FnTask, TaskResult};
//! use stampede_retry::RetryExecutor;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let executor = RetryExecutor::builder()
//!     .max_retries(2)
//!     .base_delay(Duration::from_millis(100))
//!     .retryable_kinds([ErrorKind::ConnectionError])
//!     .task_timeout(Duration::from_secs(5))
//!     .cancel(CancelSignal::new())
//!     .build();
//!
//! let task = FnTask::new(|| async { Ok(TaskResult::success(10.0)) });
//! let outcome = executor.execute(&task).await;
//! assert!(outcome.success);
//! # }
//! ```

mod backoff;
mod policy;

pub use backoff::{ExponentialBackoff, FixedInterval, FnInterval, IntervalFunction};
pub use policy::RetryPolicy;

use futures::FutureExt;
use stampede_core::{
    unix_time_now, CancelSignal, LoadTask, TaskError, TaskOutcome, TaskResult, TestConfig,
};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use metrics::counter;

/// Runs one task to a final [`TaskOutcome`], with bounded retries.
#[derive(Clone)]
pub struct RetryExecutor {
    max_retries: u32,
    backoff: Arc<dyn IntervalFunction>,
    policy: RetryPolicy,
    task_timeout: Option<Duration>,
    cancel: CancelSignal,
}

impl RetryExecutor {
    pub fn builder() -> RetryExecutorBuilder {
        RetryExecutorBuilder::new()
    }

    /// Builds an executor from a run configuration and its cancel signal.
    pub fn from_config(config: &TestConfig, cancel: CancelSignal) -> Self {
        Self::builder()
            .max_retries(config.retry.max_retries)
            .base_delay(Duration::from_secs_f64(config.retry.base_delay_sec))
            .retryable_kinds(config.retry.retryable_kinds.iter().copied())
            .task_timeout(config.task_timeout())
            .cancel(cancel)
            .build()
    }

    /// Runs the task at most `max_retries + 1` times and returns the final
    /// outcome.
    ///
    /// On success the outcome's timings cover the winning attempt only; on
    /// failure they span every attempt including backoff sleeps, so wall
    /// clocks reflect what the caller actually waited.
    pub async fn execute(&self, task: &dyn LoadTask) -> TaskOutcome {
        let run_started = unix_time_now();
        let mut attempt: u32 = 0;

        loop {
            let attempt_started = unix_time_now();
            let attempt_clock = Instant::now();
            let attempt_result = self.run_attempt(task).await;
            let attempt_ended = unix_time_now();
            let attempt_ms = attempt_clock.elapsed().as_secs_f64() * 1000.0;

            let (carried, error) = match attempt_result {
                Ok(result) if result.success && result.error.is_none() => {
                    if attempt > 0 {
                        debug!(attempts = attempt + 1, "task succeeded after retries");
                    }
                    return TaskOutcome::success_from(
                        result,
                        attempt_started,
                        attempt_ended,
                        attempt + 1,
                    );
                }
                Ok(result) => {
                    let error = failure_detail(&result);
                    (Some(result), error)
                }
                Err(error) => (None, error),
            };

            let retryable = self.policy.should_retry(error.kind);
            if !retryable || attempt >= self.max_retries || self.cancel.is_cancelled() {
                if retryable && attempt >= self.max_retries && self.max_retries > 0 {
                    warn!(
                        attempts = attempt + 1,
                        kind = %error.kind,
                        "retry attempts exhausted"
                    );
                }
                #[cfg(feature = "metrics")]
                counter!("load_task_failures_total", "kind" => error.kind.as_str()).increment(1);

                return TaskOutcome::failure_from(
                    carried,
                    error,
                    run_started,
                    attempt_ended,
                    attempt_ms,
                    attempt + 1,
                );
            }

            let delay = self.backoff.interval_for(attempt);
            debug!(
                attempt = attempt + 1,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                kind = %error.kind,
                "task failed, retrying after backoff"
            );

            #[cfg(feature = "metrics")]
            counter!("load_task_retries_total", "kind" => error.kind.as_str()).increment(1);

            let interrupted = tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = self.cancel.cancelled() => true,
            };
            if interrupted {
                return TaskOutcome::failure_from(
                    carried,
                    error,
                    run_started,
                    unix_time_now(),
                    attempt_ms,
                    attempt + 1,
                );
            }

            attempt += 1;
        }
    }

    /// One attempt: per-attempt deadline plus a panic shim. Never errors out
    /// of the executor; every failure mode becomes a `TaskError`.
    async fn run_attempt(&self, task: &dyn LoadTask) -> Result<TaskResult, TaskError> {
        let attempt = AssertUnwindSafe(task.run()).catch_unwind();

        let caught = match self.task_timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(caught) => caught,
                Err(_) => {
                    return Err(TaskError::timeout(format!(
                        "task exceeded its {:.3}s deadline",
                        limit.as_secs_f64()
                    )))
                }
            },
            None => attempt.await,
        };

        match caught {
            Ok(result) => result,
            Err(payload) => Err(TaskError::other(panic_message(payload.as_ref()))),
        }
    }
}

/// Extracts the failure detail from a task-reported failure, normalizing
/// results that forgot to attach one.
fn failure_detail(result: &TaskResult) -> TaskError {
    if let Some(error) = &result.error {
        return error.clone();
    }
    if let Some(status) = result.status_code {
        if let Some(kind) = stampede_core::classify_status(status) {
            return TaskError::new(kind, format!("HTTP {status}"));
        }
    }
    TaskError::other("task reported failure without detail")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task panicked with a non-string payload".to_string())
}

/// Builder for [`RetryExecutor`].
///
/// Defaults: no retries, 100ms doubling backoff, the default retryable set,
/// no per-attempt deadline, a fresh cancel signal.
pub struct RetryExecutorBuilder {
    max_retries: u32,
    backoff: Option<Arc<dyn IntervalFunction>>,
    policy: RetryPolicy,
    task_timeout: Option<Duration>,
    cancel: CancelSignal,
}

impl RetryExecutorBuilder {
    pub fn new() -> Self {
        Self {
            max_retries: 0,
            backoff: None,
            policy: RetryPolicy::default(),
            task_timeout: None,
            cancel: CancelSignal::new(),
        }
    }

    /// Additional attempts after the first.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Exponential backoff starting at `initial`, doubling each attempt.
    pub fn base_delay(mut self, initial: Duration) -> Self {
        self.backoff = Some(Arc::new(ExponentialBackoff::new(initial)));
        self
    }

    /// The same delay between every attempt.
    pub fn fixed_backoff(mut self, interval: Duration) -> Self {
        self.backoff = Some(Arc::new(FixedInterval::new(interval)));
        self
    }

    /// A custom interval function.
    pub fn backoff<I>(mut self, interval_fn: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        self.backoff = Some(Arc::new(interval_fn));
        self
    }

    /// Kinds eligible for retry (`Timeout` is always eligible).
    pub fn retryable_kinds(
        mut self,
        kinds: impl IntoIterator<Item = stampede_core::ErrorKind>,
    ) -> Self {
        self.policy = RetryPolicy::new(kinds);
        self
    }

    /// Hard per-attempt deadline.
    pub fn task_timeout(mut self, limit: Duration) -> Self {
        self.task_timeout = Some(limit);
        self
    }

    /// Cancel signal observed while sleeping between attempts.
    pub fn cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> RetryExecutor {
        RetryExecutor {
            max_retries: self.max_retries,
            backoff: self
                .backoff
                .unwrap_or_else(|| Arc::new(ExponentialBackoff::new(Duration::from_millis(100)))),
            policy: self.policy,
            task_timeout: self.task_timeout,
            cancel: self.cancel,
        }
    }
}

impl Default for RetryExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::{ErrorKind, FnTask};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn flaky_task(
        failures_before_success: usize,
        error: TaskError,
    ) -> (Arc<AtomicUsize>, Arc<dyn LoadTask>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let task: Arc<dyn LoadTask> = Arc::new(FnTask::new(move || {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            let error = error.clone();
            async move {
                if count < failures_before_success {
                    Err(error)
                } else {
                    Ok(TaskResult::success(5.0))
                }
            }
        }));
        (calls, task)
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let (calls, task) = flaky_task(0, TaskError::timeout("never used"));
        let executor = RetryExecutor::builder().max_retries(3).build();

        let outcome = executor.execute(&task).await;
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let (calls, task) = flaky_task(2, TaskError::timeout("slow upstream"));
        let executor = RetryExecutor::builder()
            .max_retries(3)
            .fixed_backoff(Duration::from_millis(5))
            .build();

        let outcome = executor.execute(&task).await;
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_the_retry_budget() {
        let (calls, task) = flaky_task(usize::MAX, TaskError::timeout("always slow"));
        let executor = RetryExecutor::builder()
            .max_retries(2)
            .fixed_backoff(Duration::from_millis(1))
            .build();

        let outcome = executor.execute(&task).await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_kinds_fail_fast() {
        let (calls, task) = flaky_task(
            usize::MAX,
            TaskError::new(ErrorKind::AssertionError, "body mismatch"),
        );
        let executor = RetryExecutor::builder()
            .max_retries(5)
            .fixed_backoff(Duration::from_millis(1))
            .build();

        let outcome = executor.execute(&task).await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_is_retried_even_when_not_configured() {
        let (calls, task) = flaky_task(1, TaskError::timeout("slow"));
        let executor = RetryExecutor::builder()
            .max_retries(1)
            .fixed_backoff(Duration::from_millis(1))
            .retryable_kinds([])
            .build();

        let outcome = executor.execute(&task).await;
        assert!(outcome.success);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_budget_means_one_attempt() {
        let (calls, task) = flaky_task(usize::MAX, TaskError::timeout("slow"));
        let executor = RetryExecutor::builder().max_retries(0).build();

        let outcome = executor.execute(&task).await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn deadline_surfaces_as_timeout() {
        let task = FnTask::new(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(TaskResult::success(1.0))
        });
        let executor = RetryExecutor::builder()
            .task_timeout(Duration::from_millis(20))
            .build();

        let outcome = executor.execute(&task).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn panics_become_other_outcomes() {
        let task = FnTask::new(|| async { panic!("worker bug") });
        let executor = RetryExecutor::builder().build();

        let outcome = executor.execute(&task).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Other));
        assert!(outcome.error_message.as_deref().unwrap().contains("worker bug"));
    }

    #[tokio::test]
    async fn failure_without_detail_is_normalized() {
        let task = FnTask::new(|| async {
            Ok(TaskResult {
                success: false,
                ..TaskResult::success(3.0)
            })
        });
        let executor = RetryExecutor::builder().build();

        let outcome = executor.execute(&task).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Other));
    }

    #[tokio::test]
    async fn failure_with_error_status_classifies_as_http() {
        let task = FnTask::new(|| async {
            Ok(TaskResult {
                success: false,
                ..TaskResult::success(3.0).with_status(503)
            })
        });
        let executor = RetryExecutor::builder().build();

        let outcome = executor.execute(&task).await;
        assert_eq!(outcome.error_kind, Some(ErrorKind::HttpError));
        assert_eq!(outcome.status_code, Some(503));
    }

    #[tokio::test]
    async fn failed_outcome_spans_backoffs() {
        let (_, task) = flaky_task(usize::MAX, TaskError::timeout("slow"));
        let executor = RetryExecutor::builder()
            .max_retries(2)
            .base_delay(Duration::from_millis(20))
            .build();

        let outcome = executor.execute(&task).await;
        // Backoffs: 20ms + 40ms.
        assert!(outcome.duration_secs() >= 0.060);
    }

    #[tokio::test]
    async fn cancellation_stops_retrying() {
        let cancel = CancelSignal::new();
        let (calls, task) = flaky_task(usize::MAX, TaskError::timeout("slow"));
        let executor = RetryExecutor::builder()
            .max_retries(10)
            .base_delay(Duration::from_millis(50))
            .cancel(cancel.clone())
            .build();

        let started = Instant::now();
        let handle = tokio::spawn(async move { executor.execute(&task).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let outcome = handle.await.unwrap();
        assert!(!outcome.success);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(calls.load(Ordering::SeqCst) < 11);
    }
}
