//! Shared task helpers for the integration tests.
#![allow(dead_code)]

use stampede_core::{FnTask, LoadTask, TaskError, TaskOutcome, TaskResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

/// Installs a test subscriber once per binary; raise the level to see the
/// scheduler's dispatch and checkpoint logging while debugging a test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing_subscriber::filter::LevelFilter::WARN)
            .with_test_writer()
            .try_init();
    });
}

/// A task that sleeps `latency` and reports `response_ms`.
pub fn ok_task(latency: Duration, response_ms: f64) -> Arc<dyn LoadTask> {
    Arc::new(FnTask::new(move || async move {
        tokio::time::sleep(latency).await;
        Ok(TaskResult::success(response_ms).with_status(200))
    }))
}

/// A task that always fails with the given error after `latency`.
pub fn failing_task(latency: Duration, error: TaskError) -> Arc<dyn LoadTask> {
    Arc::new(FnTask::new(move || {
        let error = error.clone();
        async move {
            tokio::time::sleep(latency).await;
            Err(error)
        }
    }))
}

/// A task that alternates failure and success deterministically, failure
/// first, so every prefix of calls is at least half failures.
pub fn alternating_task(latency: Duration) -> Arc<dyn LoadTask> {
    let calls = Arc::new(AtomicUsize::new(0));
    Arc::new(FnTask::new(move || {
        let count = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(latency).await;
            if count % 2 == 0 {
                Err(TaskError::from_message("HTTP 500 internal server error"))
            } else {
                Ok(TaskResult::success(10.0).with_status(200))
            }
        }
    }))
}

/// Collects every outcome delivered to the callback.
#[derive(Clone, Default)]
pub struct OutcomeLog(Arc<Mutex<Vec<TaskOutcome>>>);

impl OutcomeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: &TaskOutcome) {
        self.0.lock().unwrap().push(outcome.clone());
    }

    pub fn snapshot(&self) -> Vec<TaskOutcome> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}
