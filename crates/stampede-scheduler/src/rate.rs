//! TPS/QPS profile: dispatch at a target rate, clamped by the pool.
//!
//! Pacing uses absolute deadlines re-anchored to the run start clock
//! (`start + n * interval`), so per-iteration scheduling jitter never
//! accumulates into drift. When workers are saturated the dispatch loop
//! blocks on a permit and the effective rate drops below target; that is
//! observable in `achieved_rate` and is not an error.

use crate::scheduler::LoadScheduler;
use stampede_core::{LoadTask, TaskOutcome};
use stampede_metrics::ProfileExtras;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{sleep_until, Instant};
use tracing::info;

pub(crate) async fn run(
    scheduler: &LoadScheduler,
    task: &Arc<dyn LoadTask>,
    tx: &mpsc::Sender<TaskOutcome>,
) -> ProfileExtras {
    // Validated positive for rate profiles; the fallback only guards against
    // a hand-rolled config that skipped validation.
    let Some(target_rate) = scheduler.config.target_rate.filter(|rate| *rate > 0.0) else {
        return ProfileExtras::Rate {
            target_rate: 0.0,
            achieved_rate: 0.0,
        };
    };

    let interval = std::time::Duration::from_secs_f64(1.0 / target_rate);
    let limit = scheduler.config.worker_limit(target_rate.ceil() as usize);
    let semaphore = Arc::new(Semaphore::new(limit));
    let start = Instant::now();
    let deadline = start + scheduler.config.duration();

    info!(
        target_rate,
        limit,
        profile = %scheduler.config.profile,
        "rate-paced load starting"
    );

    let mut dispatched: u64 = 0;
    loop {
        if scheduler.cancel.is_cancelled() {
            break;
        }
        let next = start + interval.mul_f64(dispatched as f64);
        if next >= deadline {
            break;
        }
        tokio::select! {
            _ = sleep_until(next) => {}
            _ = scheduler.cancel.cancelled() => break,
        }

        let permit = tokio::select! {
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = sleep_until(deadline) => break,
            _ = scheduler.cancel.cancelled() => break,
        };
        scheduler.spawn_worker(Arc::clone(task), permit, tx.clone(), None);
        dispatched += 1;
    }

    scheduler.drain(&semaphore, limit).await;

    // The achieved rate is recomputed once the consumer has drained; see
    // `LoadScheduler::finish_extras`.
    ProfileExtras::Rate {
        target_rate,
        achieved_rate: 0.0,
    }
}
