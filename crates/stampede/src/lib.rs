//! Load generation and metrics core for HTTP performance testing.
//!
//! `stampede` drives a user-defined task at a target load profile, classifies
//! every outcome, aggregates timing statistics, and terminates safely on
//! thresholds or cancellation. It is a library: the HTTP client, assertion
//! DSL and report renderers live elsewhere and talk to the core through the
//! task interface, the outcome callback and the serializable run result.
//!
//! # Components
//!
//! - **[core](stampede_core)**: error taxonomy and classifier, task
//!   interface, cancellation, configuration
//! - **[retry](stampede_retry)**: bounded retries with exponential backoff
//!   and per-attempt deadlines
//! - **[metrics](stampede_metrics)**: the concurrent aggregator, abort
//!   thresholds and the frozen run snapshot
//! - **[scheduler](stampede_scheduler)**: the load profiles (concurrent,
//!   TPS, QPS, ramp-up, stability)
//! - **[runner](stampede_runner)**: before/load/after orchestration
//!
//! # Quick start
//!
//! ```no_run
//! use stampede::{FnTask, LoadRunner, TaskResult, TestConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TestConfig::builder()
//!     .tps(50.0, 30.0)
//!     .task_timeout_sec(2.0)
//!     .max_error_rate(0.1)
//!     .build()?;
//!
//! let runner = LoadRunner::builder()
//!     .config(config)
//!     .task(FnTask::new(|| async {
//!         // one logical unit of work, e.g. one HTTP request
//!         Ok(TaskResult::success(12.5).with_status(200))
//!     }))
//!     .build()?;
//!
//! let result = runner.run().await;
//! println!(
//!     "{} requests, p95 {:.1}ms",
//!     result.summary_statistics.total_requests,
//!     result.summary_statistics.p95_response_time,
//! );
//! # Ok(())
//! # }
//! ```
//!
//! # Contracts
//!
//! - Every task failure mode surfaces as a recorded outcome, never as an
//!   error from `run`. The only caller-visible error is configuration
//!   validation at build time.
//! - Cancellation is level-triggered: once set, no new dispatches; in-flight
//!   work completes and is still recorded.
//! - The run result serializes to snake_case JSON with durations in seconds,
//!   timestamps in integer UTC seconds and response times in milliseconds.

pub use stampede_core::*;

#[cfg(feature = "metrics")]
pub use stampede_metrics::{
    AbortReason, ConnectionMetrics, DetailedResults, IntervalResult, LatencyStat,
    MetricsAggregator, MetricsSnapshot, ProfileExtras, ReportInfo, RequestCounts, RunResult,
    StepResult, SummaryStatistics, ThresholdBreach, ThresholdVerdict, TimePoint,
    TransactionSummary,
};

#[cfg(feature = "retry")]
pub use stampede_retry::{
    ExponentialBackoff, FixedInterval, FnInterval, IntervalFunction, RetryExecutor,
    RetryExecutorBuilder, RetryPolicy,
};

#[cfg(feature = "scheduler")]
pub use stampede_scheduler::LoadScheduler;

#[cfg(feature = "runner")]
pub use stampede_runner::{LoadRunner, LoadRunnerBuilder};
