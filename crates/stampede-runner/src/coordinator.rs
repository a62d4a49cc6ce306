//! The run coordinator: before phase, load phase, after phase.

use crate::phase::run_phase;
use stampede_core::{
    unix_time_now, CancelSignal, ConfigError, FnListener, LoadProfile, LoadTask, OutcomeListener,
    OutcomeListeners, TaskOutcome, TestConfig,
};
use stampede_metrics::{
    AbortReason, AbortSlot, MetricsAggregator, ProfileExtras, ReportInfo, RunResult,
};
use stampede_retry::RetryExecutor;
use stampede_scheduler::LoadScheduler;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Orchestrates one load run.
///
/// Owns the aggregator and the cancellation signal, runs the optional before
/// phase, hands the task to the scheduler, always runs the after phase, and
/// freezes everything into a [`RunResult`]. Operational failures never
/// escape as errors; a cancelled or aborted run still returns a result
/// carrying the abort reason.
///
/// A runner drives a single run: once its cancel signal is set, subsequent
/// runs report `user_cancel` immediately.
pub struct LoadRunner {
    config: Arc<TestConfig>,
    task: Arc<dyn LoadTask>,
    before: Option<Arc<dyn LoadTask>>,
    after: Option<Arc<dyn LoadTask>>,
    listeners: OutcomeListeners,
    cancel: CancelSignal,
}

impl std::fmt::Debug for LoadRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadRunner")
            .field("config", &self.config)
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish_non_exhaustive()
    }
}

impl LoadRunner {
    pub fn builder() -> LoadRunnerBuilder {
        LoadRunnerBuilder::new()
    }

    /// A handle callers can use to cancel the run from outside. External
    /// cancellation is reported as `user_cancel`.
    pub fn cancel_handle(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Runs before → load → after and returns the frozen result.
    pub async fn run(&self) -> RunResult {
        let wall_started = unix_time_now();
        let run_clock = Instant::now();
        let cancel = self.cancel.clone();
        let abort = AbortSlot::new();
        let aggregator = Arc::new(MetricsAggregator::new(self.config.thresholds.clone()));

        info!(profile = %self.config.profile, "run starting");

        // Before phase: failures escalate only with stop_on_error.
        let before_results = match &self.before {
            Some(before) => {
                let outcomes = run_phase(
                    "before",
                    Arc::clone(before),
                    self.config.worker_limit(self.config.before_concurrency),
                    RetryExecutor::from_config(&self.config, cancel.clone()),
                )
                .await;
                if self.config.stop_on_error && outcomes.iter().any(|o| !o.success) {
                    warn!("before phase failed, skipping load phase");
                    abort.set(AbortReason::BeforeFailed);
                    cancel.cancel();
                }
                outcomes
            }
            None => Vec::new(),
        };

        // Load phase.
        let load_clock = Instant::now();
        let extras = if cancel.is_cancelled() {
            empty_extras(&self.config)
        } else {
            let scheduler = LoadScheduler::new(
                Arc::clone(&self.config),
                Arc::clone(&aggregator),
                cancel.clone(),
                abort.clone(),
                self.listeners.clone(),
            );
            scheduler.run(Arc::clone(&self.task)).await
        };
        let load_duration = load_clock.elapsed();
        aggregator.finalize();

        // After phase: always runs, best effort, never escalates. A fresh
        // cancel signal keeps its retries alive during teardown.
        let after_results = match &self.after {
            Some(after) => {
                run_phase(
                    "after",
                    Arc::clone(after),
                    self.config.worker_limit(self.config.after_concurrency),
                    RetryExecutor::from_config(&self.config, CancelSignal::new()),
                )
                .await
            }
            None => Vec::new(),
        };

        let abort_reason = abort
            .get()
            .or_else(|| cancel.is_cancelled().then_some(AbortReason::UserCancel));
        if let Some(reason) = abort_reason {
            info!(%reason, "run ended early");
        }

        let report_info = ReportInfo {
            started_at: wall_started.floor() as i64,
            ended_at: unix_time_now().floor() as i64,
            elapsed_sec: run_clock.elapsed().as_secs_f64(),
            load_duration_sec: load_duration.as_secs_f64(),
            profile: self.config.profile,
            abort_reason,
        };

        RunResult::compose(
            report_info,
            (*self.config).clone(),
            aggregator.snapshot(),
            before_results,
            after_results,
            extras,
        )
    }
}

/// Extras for a load phase that never dispatched.
fn empty_extras(config: &TestConfig) -> ProfileExtras {
    match config.profile {
        LoadProfile::Concurrent => ProfileExtras::Concurrent {
            concurrent_users: config.concurrent_users,
        },
        LoadProfile::Tps | LoadProfile::Qps => ProfileExtras::Rate {
            target_rate: config.target_rate.unwrap_or(0.0),
            achieved_rate: 0.0,
        },
        LoadProfile::RampUp => ProfileExtras::RampUp {
            step_results: Vec::new(),
        },
        LoadProfile::Stability => ProfileExtras::Stability {
            check_interval_sec: config.stability_check_interval_sec,
            interval_results: Vec::new(),
        },
    }
}

/// Builder for [`LoadRunner`].
pub struct LoadRunnerBuilder {
    config: TestConfig,
    task: Option<Arc<dyn LoadTask>>,
    before: Option<Arc<dyn LoadTask>>,
    after: Option<Arc<dyn LoadTask>>,
    listeners: OutcomeListeners,
}

impl LoadRunnerBuilder {
    pub fn new() -> Self {
        Self {
            config: TestConfig::default(),
            task: None,
            before: None,
            after: None,
            listeners: OutcomeListeners::new(),
        }
    }

    pub fn config(mut self, config: TestConfig) -> Self {
        self.config = config;
        self
    }

    /// The load task. Required.
    pub fn task<T>(mut self, task: T) -> Self
    where
        T: LoadTask + 'static,
    {
        self.task = Some(Arc::new(task));
        self
    }

    /// Optional setup task, run with `before_concurrency`.
    pub fn before_task<T>(mut self, task: T) -> Self
    where
        T: LoadTask + 'static,
    {
        self.before = Some(Arc::new(task));
        self
    }

    /// Optional teardown task, run with `after_concurrency`. Always runs.
    pub fn after_task<T>(mut self, task: T) -> Self
    where
        T: LoadTask + 'static,
    {
        self.after = Some(Arc::new(task));
        self
    }

    /// Registers a per-outcome callback, invoked after the aggregator has
    /// recorded the outcome. Must be safe to call from worker context.
    pub fn on_outcome<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskOutcome) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(f));
        self
    }

    /// Registers a full listener implementation.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: OutcomeListener + 'static,
    {
        self.listeners.add(listener);
        self
    }

    /// Validates the configuration and builds the runner.
    pub fn build(self) -> Result<LoadRunner, ConfigError> {
        self.config.validate()?;
        let task = self.task.ok_or(ConfigError::MissingTask)?;
        Ok(LoadRunner {
            config: Arc::new(self.config),
            task,
            before: self.before,
            after: self.after,
            listeners: self.listeners,
            cancel: CancelSignal::new(),
        })
    }
}

impl Default for LoadRunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
