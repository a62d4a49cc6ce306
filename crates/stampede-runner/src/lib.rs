//! Run coordination for stampede.
//!
//! [`LoadRunner`] is the top of the core: it owns the metrics aggregator and
//! the cancellation signal, runs the optional before phase, drives the load
//! phase through the scheduler, always runs the after phase, and returns the
//! frozen [`RunResult`](stampede_metrics::RunResult).
//!
//! # Example
//!
//! ```no_run
//! use stampede_core::{FnTask, TaskResult, TestConfig};
//! use stampede_runner::LoadRunner;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TestConfig::builder()
//!     .concurrent(4, 10.0)
//!     .task_timeout_sec(2.0)
//!     .build()?;
//!
//! let runner = LoadRunner::builder()
//!     .config(config)
//!     .task(FnTask::new(|| async {
//!         // issue one request here
//!         Ok(TaskResult::success(12.5).with_status(200))
//!     }))
//!     .on_outcome(|outcome| {
//!         // stream outcomes to a sink
//!         let _ = outcome.response_time_ms;
//!     })
//!     .build()?;
//!
//! let result = runner.run().await;
//! println!("{} requests", result.summary_statistics.total_requests);
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod phase;

pub use coordinator::{LoadRunner, LoadRunnerBuilder};
