//! Ramp-up profile: a discrete concurrency schedule, then a stable hold.
//!
//! Step `k` of `ramp_up_steps` runs `round(concurrent_users * k / steps)`
//! users for `ramp_up_time_sec / steps`. After the last step the terminal
//! concurrency holds for `duration_sec`. Each step's outcomes are tallied
//! separately for step-by-step analysis.

use crate::scheduler::{LoadScheduler, StepTally};
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
    let steps = scheduler.config.ramp_up_steps;
    let step_time = scheduler.config.ramp_step_time();
    let mut step_results = Vec::with_capacity(steps as usize + 1);

    info!(
        steps,
        target_users = scheduler.config.concurrent_users,
        ramp_up_time_sec = scheduler.config.ramp_up_time_sec,
        "ramp-up load starting"
    );

    for step in 1..=steps {
        if scheduler.cancel.is_cancelled() {
            break;
        }
        let users = scheduler.config.ramp_step_users(step);
        info!(step, steps, users, "ramp-up step");

        let tally = Arc::new(StepTally::default());
        let started = Instant::now();
        scheduler
            .closed_loop(task, users, started + step_time, Some(Arc::clone(&tally)), tx)
            .await;
        step_results.push(tally.result(step, false, users, started.elapsed()));
    }

    if !scheduler.cancel.is_cancelled() {
        let users = scheduler.config.concurrent_users;
        let duration = scheduler.config.duration();
        info!(users, duration_sec = duration.as_secs_f64(), "ramp-up stable phase");

        let tally = Arc::new(StepTally::default());
        let started = Instant::now();
        scheduler
            .closed_loop(task, users, started + duration, Some(Arc::clone(&tally)), tx)
            .await;
        step_results.push(tally.result(steps + 1, true, users, started.elapsed()));
    }

    ProfileExtras::RampUp { step_results }
}
