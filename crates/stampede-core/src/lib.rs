//! Core types for the stampede load-generation toolkit.
//!
//! This crate provides the shared vocabulary used across all stampede
//! components:
//! - The closed [`ErrorKind`] taxonomy and the total failure classifier
//! - Task boundary values: [`TaskResult`] in, [`TaskOutcome`] out
//! - The [`LoadTask`] trait shared by load, before and after tasks
//! - The level-triggered [`CancelSignal`]
//! - [`TestConfig`] with builder and validation
//! - Outcome listener infrastructure for live consumers

pub mod cancel;
pub mod classify;
pub mod config;
pub mod error;
pub mod events;
pub mod outcome;
pub mod task;

pub use cancel::CancelSignal;
pub use classify::{classify_error, classify_message, classify_status};
pub use config::{
    LoadProfile, RetryConfig, StabilityThresholds, TestConfig, TestConfigBuilder, ThresholdConfig,
};
pub use error::{ConfigError, ErrorKind, TaskError};
pub use events::{BoxedOutcomeListener, FnListener, OutcomeListener, OutcomeListeners};
pub use outcome::{unix_time_now, ConnectionInfo, TaskOutcome, TaskResult};
pub use task::{FnTask, LoadTask, TaskFuture};
