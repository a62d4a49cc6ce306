//! Concurrent profile: sustain a fixed in-flight count for the duration.

use crate::scheduler::LoadScheduler;
use stampede_core::{LoadTask, TaskOutcome};
use stampede_metrics::ProfileExtras;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::info;

pub(crate) async fn run(
    scheduler: &LoadScheduler,
    task: &Arc<dyn LoadTask>,
    tx: &mpsc::Sender<TaskOutcome>,
) -> ProfileExtras {
    let users = scheduler.config.concurrent_users;
    let duration = scheduler.config.duration();
    info!(users, duration_sec = duration.as_secs_f64(), "concurrent load starting");

    let deadline = Instant::now() + duration;
    scheduler.closed_loop(task, users, deadline, None, tx).await;

    ProfileExtras::Concurrent {
        concurrent_users: users,
    }
}
