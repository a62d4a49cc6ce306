//! Threshold verdicts and abort bookkeeping.

use serde::{Deserialize, Serialize};
use stampede_core::ErrorKind;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Why a run ended before its nominal deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    UserCancel,
    ThresholdExceeded,
    StabilityThreshold,
    BeforeFailed,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::UserCancel => "user_cancel",
            AbortReason::ThresholdExceeded => "threshold_exceeded",
            AbortReason::StabilityThreshold => "stability_threshold",
            AbortReason::BeforeFailed => "before_failed",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A specific threshold that was met.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdBreach {
    #[error("error count {count} reached the configured limit {limit}")]
    MaxErrors { count: u64, limit: u64 },

    #[error("error rate {rate:.4} reached the configured limit {limit:.4}")]
    MaxErrorRate { rate: f64, limit: f64 },

    #[error("{count} consecutive errors reached the configured limit {limit}")]
    MaxConsecutiveErrors { count: u64, limit: u64 },

    #[error("{kind} errors ({count}) reached the configured limit {limit}")]
    KindLimit {
        kind: ErrorKind,
        count: u64,
        limit: u64,
    },

    #[error("fatal {kind} error recorded: {message}")]
    Fatal { kind: ErrorKind, message: String },
}

/// Result of a threshold check.
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdVerdict {
    Continue,
    Abort(ThresholdBreach),
}

impl ThresholdVerdict {
    pub fn is_abort(&self) -> bool {
        matches!(self, ThresholdVerdict::Abort(_))
    }
}

/// First-writer-wins slot for the run's abort reason.
///
/// Several places can decide to end a run (threshold check, stability check,
/// before-phase failure, external cancel); the first recorded reason is the
/// one reported.
#[derive(Clone, Default)]
pub struct AbortSlot {
    inner: Arc<Mutex<Option<AbortReason>>>,
}

impl AbortSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `reason` if the slot is empty. Returns true for the winner.
    pub fn set(&self, reason: AbortReason) -> bool {
        let mut slot = match self.inner.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_none() {
            *slot = Some(reason);
            true
        } else {
            false
        }
    }

    pub fn get(&self) -> Option<AbortReason> {
        match self.inner.lock() {
            Ok(slot) => *slot,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for AbortSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AbortSlot").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_reason_tags() {
        assert_eq!(AbortReason::ThresholdExceeded.as_str(), "threshold_exceeded");
        let json = serde_json::to_string(&AbortReason::BeforeFailed).unwrap();
        assert_eq!(json, "\"before_failed\"");
    }

    #[test]
    fn first_reason_wins() {
        let slot = AbortSlot::new();
        assert_eq!(slot.get(), None);
        assert!(slot.set(AbortReason::StabilityThreshold));
        assert!(!slot.set(AbortReason::UserCancel));
        assert_eq!(slot.get(), Some(AbortReason::StabilityThreshold));
    }

    #[test]
    fn breach_messages_are_descriptive() {
        let breach = ThresholdBreach::MaxErrorRate {
            rate: 0.42,
            limit: 0.4,
        };
        assert!(breach.to_string().contains("0.42"));
        assert!(ThresholdVerdict::Abort(breach).is_abort());
        assert!(!ThresholdVerdict::Continue.is_abort());
    }
}
