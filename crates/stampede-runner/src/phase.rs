//! Before/after phase execution.

use stampede_core::{unix_time_now, LoadTask, TaskError, TaskOutcome};
use stampede_retry::RetryExecutor;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::info;

/// Runs a phase task `concurrency` times in parallel and collects every
/// outcome. Used for both the before and after phases; the caller decides
/// what a failure means.
pub(crate) async fn run_phase(
    name: &'static str,
    task: Arc<dyn LoadTask>,
    concurrency: usize,
    executor: RetryExecutor,
) -> Vec<TaskOutcome> {
    info!(phase = name, concurrency, "phase starting");

    let mut workers = JoinSet::new();
    for _ in 0..concurrency {
        let task = Arc::clone(&task);
        let executor = executor.clone();
        workers.spawn(async move { executor.execute(&task).await });
    }

    let mut outcomes = Vec::with_capacity(concurrency);
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            // The executor already shields against task panics, so a join
            // error is a bug in this crate; surface it as an outcome rather
            // than unwinding through the coordinator.
            Err(join_error) => {
                let now = unix_time_now();
                outcomes.push(TaskOutcome::failure_from(
                    None,
                    TaskError::other(format!("phase worker failed: {join_error}")),
                    now,
                    now,
                    0.0,
                    1,
                ));
            }
        }
    }

    info!(
        phase = name,
        completed = outcomes.len(),
        failed = outcomes.iter().filter(|o| !o.success).count(),
        "phase finished"
    );
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::{FnTask, TaskResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_the_task_once_per_slot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let task: Arc<dyn LoadTask> = Arc::new(FnTask::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(TaskResult::success(1.0)) }
        }));

        let outcomes = run_phase("before", task, 3, RetryExecutor::builder().build()).await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(outcomes.iter().all(|o| o.success));
    }

    #[tokio::test]
    async fn failures_are_collected_not_raised() {
        let task: Arc<dyn LoadTask> = Arc::new(FnTask::new(|| async {
            Err(TaskError::from_message("connection refused"))
        }));

        let outcomes = run_phase("after", task, 2, RetryExecutor::builder().build()).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| !o.success));
    }
}
