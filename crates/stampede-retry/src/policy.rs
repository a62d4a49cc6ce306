//! Retry eligibility.

use stampede_core::{ErrorKind, RetryConfig};
use std::collections::BTreeSet;

/// Decides whether a classified failure may be retried.
///
/// `Timeout` is always retryable, whatever the configured set says. This
/// mirrors the empirical behavior the toolkit has always had; flipping it is
/// a product decision, not a config knob.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    retryable: BTreeSet<ErrorKind>,
}

impl RetryPolicy {
    pub fn new(retryable: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            retryable: retryable.into_iter().collect(),
        }
    }

    pub fn should_retry(&self, kind: ErrorKind) -> bool {
        kind == ErrorKind::Timeout || self.retryable.contains(&kind)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.retryable_kinds.iter().copied())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}
