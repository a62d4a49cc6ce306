//! Metrics aggregation for stampede load runs.
//!
//! The [`MetricsAggregator`] is the single serialization point for every
//! per-request outcome: counters, success-only response-time samples,
//! per-second buckets, error/status/transaction distributions and the
//! consecutive-error counter all live behind one lock. On demand it
//! evaluates abort thresholds ([`ThresholdVerdict`]) and freezes a pure,
//! idempotent [`MetricsSnapshot`] that the coordinator composes into the
//! final, JSON-stable [`RunResult`].

mod aggregator;
mod snapshot;
mod state;
pub mod stats;
mod thresholds;

pub use aggregator::MetricsAggregator;
pub use snapshot::{
    ConnectionMetrics, DetailedResults, IntervalResult, LatencyStat, MetricsSnapshot,
    ProfileExtras, ReportInfo, RunResult, StepResult, SummaryStatistics, TimePoint,
    TransactionSummary,
};
pub use state::RequestCounts;
pub use thresholds::{AbortReason, AbortSlot, ThresholdBreach, ThresholdVerdict};
