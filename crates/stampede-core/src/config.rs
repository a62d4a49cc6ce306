//! Run configuration.
//!
//! A [`TestConfig`] is built once, validated, and borrowed read-only for the
//! whole run. Durations are stored as f64 seconds so the serialized form
//! matches the report contract; accessors convert to [`Duration`] where the
//! runtime needs one.

use crate::error::{ConfigError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

/// The load profile the scheduler drives.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LoadProfile {
    /// Sustain a fixed number of in-flight tasks for the duration.
    Concurrent,
    /// Target a sustained dispatch rate in transactions per second.
    Tps,
    /// Target a sustained dispatch rate in queries per second.
    Qps,
    /// Step concurrency up on a monotone schedule, then hold.
    RampUp,
    /// Long-duration run with periodic health checks.
    Stability,
}

impl LoadProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadProfile::Concurrent => "concurrent",
            LoadProfile::Tps => "tps",
            LoadProfile::Qps => "qps",
            LoadProfile::RampUp => "ramp_up",
            LoadProfile::Stability => "stability",
        }
    }

    /// True for the rate-paced profiles.
    pub fn is_rate(&self) -> bool {
        matches!(self, LoadProfile::Tps | LoadProfile::Qps)
    }
}

impl fmt::Display for LoadProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry behavior for individual tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first. Zero disables retries.
    pub max_retries: u32,
    /// Base backoff delay; attempt `n` sleeps `base_delay_sec * 2^n`.
    pub base_delay_sec: f64,
    /// Kinds eligible for retry. `Timeout` is always retried regardless.
    pub retryable_kinds: BTreeSet<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_sec: 0.1,
            retryable_kinds: BTreeSet::from([ErrorKind::Timeout, ErrorKind::ConnectionError]),
        }
    }
}

/// Run-level abort thresholds. Unset fields are not checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Abort once this many failures have been recorded.
    pub max_errors: Option<u64>,
    /// Abort once `failure / total` reaches this ratio (total > 0).
    pub max_error_rate: Option<f64>,
    /// Abort once this many consecutive failures have been recorded.
    pub max_consecutive_errors: Option<u64>,
    /// Per-kind failure limits checked alongside the aggregate ones.
    pub kind_limits: BTreeMap<ErrorKind, u64>,
}

impl ThresholdConfig {
    pub fn is_empty(&self) -> bool {
        self.max_errors.is_none()
            && self.max_error_rate.is_none()
            && self.max_consecutive_errors.is_none()
            && self.kind_limits.is_empty()
    }
}

/// Abort thresholds for the stability profile's periodic checks.
///
/// Response-time thresholds are in seconds, matching the serialized config
/// contract; the checker converts to milliseconds when comparing against
/// window percentiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityThresholds {
    pub error_rate: f64,
    pub response_time_p95: f64,
    pub response_time_p99: f64,
}

impl Default for StabilityThresholds {
    fn default() -> Self {
        Self {
            error_rate: 0.05,
            response_time_p95: 1.0,
            response_time_p99: 2.0,
        }
    }
}

/// Immutable configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    pub profile: LoadProfile,
    /// Load-phase wall clock. For `RampUp` this is the stable phase only.
    pub duration_sec: f64,
    /// Cap on in-flight tasks (nominal; also clamped by the pool size).
    pub concurrent_users: usize,
    /// Target requests per second. Required for `Tps`/`Qps`.
    pub target_rate: Option<f64>,
    pub ramp_up_time_sec: f64,
    pub ramp_up_steps: u32,
    pub stability_duration_sec: f64,
    pub stability_check_interval_sec: f64,
    pub stability_thresholds: StabilityThresholds,
    /// Hard per-attempt deadline.
    pub task_timeout_sec: f64,
    /// Per-worker pause after each completion.
    pub think_time_sec: f64,
    pub retry: RetryConfig,
    pub thresholds: ThresholdConfig,
    pub before_concurrency: usize,
    pub after_concurrency: usize,
    pub max_thread_pool_size: usize,
    /// Cancel the run on the first non-recoverable failure.
    pub stop_on_error: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            profile: LoadProfile::Concurrent,
            duration_sec: 60.0,
            concurrent_users: 10,
            target_rate: None,
            ramp_up_time_sec: 0.0,
            ramp_up_steps: 0,
            stability_duration_sec: 3600.0,
            stability_check_interval_sec: 600.0,
            stability_thresholds: StabilityThresholds::default(),
            task_timeout_sec: 30.0,
            think_time_sec: 0.0,
            retry: RetryConfig::default(),
            thresholds: ThresholdConfig::default(),
            before_concurrency: 1,
            after_concurrency: 1,
            max_thread_pool_size: 1000,
            stop_on_error: false,
        }
    }
}

impl TestConfig {
    pub fn builder() -> TestConfigBuilder {
        TestConfigBuilder::default()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_sec)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.task_timeout_sec)
    }

    pub fn think_time(&self) -> Option<Duration> {
        (self.think_time_sec > 0.0).then(|| Duration::from_secs_f64(self.think_time_sec))
    }

    pub fn stability_duration(&self) -> Duration {
        Duration::from_secs_f64(self.stability_duration_sec)
    }

    pub fn stability_check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.stability_check_interval_sec)
    }

    /// Duration of one ramp-up step.
    pub fn ramp_step_time(&self) -> Duration {
        if self.ramp_up_steps == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.ramp_up_time_sec / self.ramp_up_steps as f64)
    }

    /// Concurrency for ramp-up step `k` (1-based): `round(users * k / steps)`,
    /// never below one.
    pub fn ramp_step_users(&self, step: u32) -> usize {
        if self.ramp_up_steps == 0 {
            return self.concurrent_users.max(1);
        }
        let users = (self.concurrent_users as f64 * step as f64 / self.ramp_up_steps as f64)
            .round() as usize;
        users.max(1)
    }

    /// Clamps a nominal parallelism to the configured pool ceiling.
    pub fn worker_limit(&self, nominal: usize) -> usize {
        nominal.min(self.max_thread_pool_size).max(1)
    }

    /// Validates the configuration. Called by the builder and the runner.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
            if value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::NotPositive { field, value })
            }
        }
        fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
            if value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Negative { field, value })
            }
        }

        positive("concurrent_users", self.concurrent_users as f64)?;
        positive("max_thread_pool_size", self.max_thread_pool_size as f64)?;
        positive("before_concurrency", self.before_concurrency as f64)?;
        positive("after_concurrency", self.after_concurrency as f64)?;
        positive("task_timeout_sec", self.task_timeout_sec)?;
        non_negative("think_time_sec", self.think_time_sec)?;
        non_negative("retry.base_delay_sec", self.retry.base_delay_sec)?;

        if self.profile != LoadProfile::Stability {
            positive("duration_sec", self.duration_sec)?;
        }

        if self.profile.is_rate() {
            match self.target_rate {
                None => {
                    return Err(ConfigError::Missing {
                        field: "target_rate",
                        profile: self.profile.as_str(),
                    })
                }
                Some(rate) => positive("target_rate", rate)?,
            }
        }

        if self.profile == LoadProfile::RampUp {
            if self.ramp_up_steps < 1 {
                return Err(ConfigError::NotPositive {
                    field: "ramp_up_steps",
                    value: self.ramp_up_steps as f64,
                });
            }
            non_negative("ramp_up_time_sec", self.ramp_up_time_sec)?;
        }

        if self.profile == LoadProfile::Stability {
            positive("stability_duration_sec", self.stability_duration_sec)?;
            positive(
                "stability_check_interval_sec",
                self.stability_check_interval_sec,
            )?;
            let thr = &self.stability_thresholds;
            if !(0.0..=1.0).contains(&thr.error_rate) {
                return Err(ConfigError::OutOfRange {
                    field: "stability_thresholds.error_rate",
                    min: 0.0,
                    max: 1.0,
                    value: thr.error_rate,
                });
            }
            non_negative("stability_thresholds.response_time_p95", thr.response_time_p95)?;
            non_negative("stability_thresholds.response_time_p99", thr.response_time_p99)?;
        }

        if let Some(rate) = self.thresholds.max_error_rate {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(ConfigError::OutOfRange {
                    field: "thresholds.max_error_rate",
                    min: 0.0,
                    max: 1.0,
                    value: rate,
                });
            }
        }

        Ok(())
    }
}

/// Fluent builder for [`TestConfig`]. `build` validates.
#[derive(Debug, Clone, Default)]
pub struct TestConfigBuilder {
    config: TestConfig,
}

impl TestConfigBuilder {
    /// Selects a concurrent-users profile.
    pub fn concurrent(mut self, users: usize, duration_sec: f64) -> Self {
        self.config.profile = LoadProfile::Concurrent;
        self.config.concurrent_users = users;
        self.config.duration_sec = duration_sec;
        self
    }

    /// Selects a TPS profile targeting `rate` dispatches per second.
    pub fn tps(mut self, rate: f64, duration_sec: f64) -> Self {
        self.config.profile = LoadProfile::Tps;
        self.config.target_rate = Some(rate);
        self.config.duration_sec = duration_sec;
        self
    }

    /// Selects a QPS profile targeting `rate` dispatches per second.
    pub fn qps(mut self, rate: f64, duration_sec: f64) -> Self {
        self.config.profile = LoadProfile::Qps;
        self.config.target_rate = Some(rate);
        self.config.duration_sec = duration_sec;
        self
    }

    /// Selects a ramp-up profile: `steps` levels over `ramp_up_time_sec`,
    /// then a stable phase of `duration_sec` at `users`.
    pub fn ramp_up(mut self, users: usize, ramp_up_time_sec: f64, steps: u32, duration_sec: f64) -> Self {
        self.config.profile = LoadProfile::RampUp;
        self.config.concurrent_users = users;
        self.config.ramp_up_time_sec = ramp_up_time_sec;
        self.config.ramp_up_steps = steps;
        self.config.duration_sec = duration_sec;
        self
    }

    /// Selects a stability profile with periodic health checks.
    pub fn stability(mut self, users: usize, duration_sec: f64, check_interval_sec: f64) -> Self {
        self.config.profile = LoadProfile::Stability;
        self.config.concurrent_users = users;
        self.config.stability_duration_sec = duration_sec;
        self.config.stability_check_interval_sec = check_interval_sec;
        self
    }

    pub fn stability_thresholds(mut self, thresholds: StabilityThresholds) -> Self {
        self.config.stability_thresholds = thresholds;
        self
    }

    pub fn task_timeout_sec(mut self, seconds: f64) -> Self {
        self.config.task_timeout_sec = seconds;
        self
    }

    pub fn think_time_sec(mut self, seconds: f64) -> Self {
        self.config.think_time_sec = seconds;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.retry.max_retries = retries;
        self
    }

    pub fn retry_base_delay_sec(mut self, seconds: f64) -> Self {
        self.config.retry.base_delay_sec = seconds;
        self
    }

    pub fn retryable_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.config.retry.retryable_kinds = kinds.into_iter().collect();
        self
    }

    pub fn thresholds(mut self, thresholds: ThresholdConfig) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn max_errors(mut self, limit: u64) -> Self {
        self.config.thresholds.max_errors = Some(limit);
        self
    }

    pub fn max_error_rate(mut self, rate: f64) -> Self {
        self.config.thresholds.max_error_rate = Some(rate);
        self
    }

    pub fn max_consecutive_errors(mut self, limit: u64) -> Self {
        self.config.thresholds.max_consecutive_errors = Some(limit);
        self
    }

    pub fn kind_limit(mut self, kind: ErrorKind, limit: u64) -> Self {
        self.config.thresholds.kind_limits.insert(kind, limit);
        self
    }

    pub fn before_concurrency(mut self, concurrency: usize) -> Self {
        self.config.before_concurrency = concurrency;
        self
    }

    pub fn after_concurrency(mut self, concurrency: usize) -> Self {
        self.config.after_concurrency = concurrency;
        self
    }

    pub fn max_thread_pool_size(mut self, size: usize) -> Self {
        self.config.max_thread_pool_size = size;
        self
    }

    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.config.stop_on_error = stop;
        self
    }

    pub fn build(self) -> Result<TestConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
