//! Backoff interval strategies.

use std::sync::Arc;
use std::time::Duration;

/// Computes the delay before retry attempt `attempt` (0-based: the delay
/// slept after the first failure is `interval_for(0)`).
pub trait IntervalFunction: Send + Sync {
    fn interval_for(&self, attempt: u32) -> Duration;
}

impl IntervalFunction for Arc<dyn IntervalFunction> {
    fn interval_for(&self, attempt: u32) -> Duration {
        (**self).interval_for(attempt)
    }
}

/// The same delay for every attempt.
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval {
    interval: Duration,
}

impl FixedInterval {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl IntervalFunction for FixedInterval {
    fn interval_for(&self, _attempt: u32) -> Duration {
        self.interval
    }
}

/// Exponential backoff: `initial * multiplier^attempt`, optionally capped.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
    max: Option<Duration>,
}

impl ExponentialBackoff {
    /// Doubling backoff from `initial`, uncapped.
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            multiplier: 2.0,
            max: None,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }
}

impl IntervalFunction for ExponentialBackoff {
    fn interval_for(&self, attempt: u32) -> Duration {
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let delay = Duration::try_from_secs_f64(scaled).unwrap_or(Duration::MAX);
        match self.max {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// A custom interval backed by a closure.
pub struct FnInterval<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    f: F,
}

impl<F> FnInterval<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> IntervalFunction for FnInterval<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn interval_for(&self, attempt: u32) -> Duration {
        (self.f)(attempt)
    }
}
