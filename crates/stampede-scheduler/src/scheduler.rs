//! The load scheduler: one dispatch state machine per profile.
//!
//! All profiles share the same shape: dispatch work obeying the profile
//! (Dispatching), stop dispatching on deadline or cancellation and wait for
//! in-flight work to finish (Draining), then yield the profile extras
//! (Done). Every completion flows through the bounded outcome channel into
//! the single consumer, which records it, notifies listeners and evaluates
//! thresholds.

use crate::pool::{spawn_consumer, InFlightGauge, WindowBuffer, OUTCOME_QUEUE_DEPTH};
use crate::{concurrent, ramp, rate, stability};
use stampede_core::{
    CancelSignal, LoadProfile, LoadTask, OutcomeListeners, TaskOutcome, TestConfig,
};
use stampede_metrics::{AbortSlot, MetricsAggregator, ProfileExtras, StepResult};
use stampede_retry::RetryExecutor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, warn};

/// Drives the configured load profile against a task.
pub struct LoadScheduler {
    pub(crate) config: Arc<TestConfig>,
    pub(crate) aggregator: Arc<MetricsAggregator>,
    pub(crate) cancel: CancelSignal,
    pub(crate) abort: AbortSlot,
    listeners: OutcomeListeners,
    executor: RetryExecutor,
    gauge: InFlightGauge,
}

impl LoadScheduler {
    pub fn new(
        config: Arc<TestConfig>,
        aggregator: Arc<MetricsAggregator>,
        cancel: CancelSignal,
        abort: AbortSlot,
        listeners: OutcomeListeners,
    ) -> Self {
        let executor = RetryExecutor::from_config(&config, cancel.clone());
        Self {
            config,
            aggregator,
            cancel,
            abort,
            listeners,
            executor,
            gauge: InFlightGauge::default(),
        }
    }

    /// Runs the load phase to completion and returns the profile extras.
    ///
    /// Cancellation stops new dispatches within one loop iteration; in-flight
    /// tasks complete and their outcomes are still recorded.
    pub async fn run(&self, task: Arc<dyn LoadTask>) -> ProfileExtras {
        let (tx, rx) = mpsc::channel(OUTCOME_QUEUE_DEPTH);
        let window = matches!(self.config.profile, LoadProfile::Stability)
            .then(WindowBuffer::default);
        let consumer = spawn_consumer(
            rx,
            Arc::clone(&self.aggregator),
            self.listeners.clone(),
            self.cancel.clone(),
            self.abort.clone(),
            self.config.stop_on_error,
            window.clone(),
        );

        let started = Instant::now();
        let extras = match self.config.profile {
            LoadProfile::Concurrent => concurrent::run(self, &task, &tx).await,
            LoadProfile::Tps | LoadProfile::Qps => rate::run(self, &task, &tx).await,
            LoadProfile::RampUp => ramp::run(self, &task, &tx).await,
            LoadProfile::Stability => {
                stability::run(self, &task, &tx, window.clone().unwrap_or_default()).await
            }
        };

        drop(tx);
        if consumer.await.is_err() {
            error!("outcome consumer task failed");
        }

        self.finish_extras(extras, started.elapsed(), window)
    }

    /// Post-drain fixups that need the consumer to have caught up: the
    /// achieved rate for paced profiles and the final partial stability
    /// window.
    fn finish_extras(
        &self,
        extras: ProfileExtras,
        elapsed: Duration,
        window: Option<WindowBuffer>,
    ) -> ProfileExtras {
        match extras {
            ProfileExtras::Rate { target_rate, .. } => {
                let elapsed = elapsed.as_secs_f64();
                let total = self.aggregator.counts().total;
                ProfileExtras::Rate {
                    target_rate,
                    achieved_rate: if elapsed > 0.0 { total as f64 / elapsed } else { 0.0 },
                }
            }
            ProfileExtras::Stability {
                check_interval_sec,
                mut interval_results,
            } => {
                if let Some(window) = window {
                    let leftover = window.drain();
                    if !leftover.is_empty() {
                        interval_results.push(stability::analyze_window(
                            interval_results.len() as u32 + 1,
                            &leftover,
                        ));
                    }
                }
                ProfileExtras::Stability {
                    check_interval_sec,
                    interval_results,
                }
            }
            other => other,
        }
    }

    /// Closed-loop dispatch: keep up to `users` tasks in flight until the
    /// deadline, replacing each completion immediately.
    pub(crate) async fn closed_loop(
        &self,
        task: &Arc<dyn LoadTask>,
        users: usize,
        deadline: Instant,
        tally: Option<Arc<StepTally>>,
        tx: &mpsc::Sender<TaskOutcome>,
    ) {
        let limit = self.config.worker_limit(users);
        let semaphore = Arc::new(Semaphore::new(limit));
        debug!(users, limit, "closed-loop dispatch starting");

        loop {
            if self.cancel.is_cancelled() || Instant::now() >= deadline {
                break;
            }
            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = sleep_until(deadline) => break,
                _ = self.cancel.cancelled() => break,
            };
            if Instant::now() >= deadline {
                break;
            }
            self.spawn_worker(Arc::clone(task), permit, tx.clone(), tally.clone());
        }

        self.drain(&semaphore, limit).await;
    }

    /// Waits until every worker has returned its permit.
    pub(crate) async fn drain(&self, semaphore: &Arc<Semaphore>, limit: usize) {
        if let Ok(permits) = semaphore.acquire_many(limit as u32).await {
            drop(permits);
        }
        debug!("dispatch drained");
    }

    /// Spawns one worker: run the task through the retry executor, tally,
    /// ship the outcome, observe think time, release the concurrency slot.
    pub(crate) fn spawn_worker(
        &self,
        task: Arc<dyn LoadTask>,
        permit: OwnedSemaphorePermit,
        tx: mpsc::Sender<TaskOutcome>,
        tally: Option<Arc<StepTally>>,
    ) {
        let executor = self.executor.clone();
        let gauge = self.gauge.clone();
        let cancel = self.cancel.clone();
        let think_time = self.config.think_time();

        self.aggregator.update_concurrent_users(gauge.enter());

        tokio::spawn(async move {
            let outcome = executor.execute(&task).await;
            gauge.exit();
            if let Some(tally) = &tally {
                tally.observe(&outcome);
            }
            if tx.send(outcome).await.is_err() {
                // Only reachable during teardown, after the run is decided.
                warn!("outcome consumer is gone, dropping outcome");
            }
            if let Some(pause) = think_time {
                if !cancel.is_cancelled() {
                    tokio::time::sleep(pause).await;
                }
            }
            drop(permit);
        });
    }
}

/// Per-step completion counters for the ramp-up profile, bumped by workers
/// before their outcome is shipped.
#[derive(Default)]
pub(crate) struct StepTally {
    total: AtomicU64,
    failed: AtomicU64,
}

impl StepTally {
    pub fn observe(&self, outcome: &TaskOutcome) {
        self.total.fetch_add(1, Ordering::SeqCst);
        if !outcome.success {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn result(&self, step: u32, stable: bool, users: usize, duration: Duration) -> StepResult {
        let total = self.total.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        StepResult {
            step,
            stable,
            users,
            duration_sec: duration.as_secs_f64(),
            total_requests: total,
            failed_requests: failed,
            error_rate: if total > 0 { failed as f64 / total as f64 } else { 0.0 },
        }
    }
}
