//! Worker-pool plumbing shared by all load profiles.

use stampede_core::{CancelSignal, OutcomeListeners, TaskOutcome};
use stampede_metrics::{AbortReason, AbortSlot, MetricsAggregator, ThresholdVerdict};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

#[cfg(feature = "metrics")]
use metrics::gauge;

/// Depth of the bounded outcome channel. Workers block on send when the
/// consumer falls behind, which in turn stalls dispatch instead of growing
/// memory.
pub(crate) const OUTCOME_QUEUE_DEPTH: usize = 1024;

/// Current in-flight task count. Peak tracking lives in the aggregator.
#[derive(Clone, Default)]
pub(crate) struct InFlightGauge(Arc<AtomicUsize>);

impl InFlightGauge {
    /// Increments and returns the new count.
    pub fn enter(&self) -> usize {
        let current = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        #[cfg(feature = "metrics")]
        gauge!("load_inflight_tasks").set(current as f64);
        current
    }

    pub fn exit(&self) {
        let current = self.0.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        #[cfg(feature = "metrics")]
        gauge!("load_inflight_tasks").set(current as f64);
        #[cfg(not(feature = "metrics"))]
        let _ = current;
    }

    #[allow(dead_code)]
    pub fn current(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Samples pushed into the stability window by the outcome consumer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WindowSample {
    pub success: bool,
    pub response_time_ms: f64,
}

/// Shared buffer of outcomes recorded since the last stability check.
#[derive(Clone, Default)]
pub(crate) struct WindowBuffer(Arc<std::sync::Mutex<Vec<WindowSample>>>);

impl WindowBuffer {
    pub fn push(&self, outcome: &TaskOutcome) {
        let mut samples = match self.0.lock() {
            Ok(samples) => samples,
            Err(poisoned) => poisoned.into_inner(),
        };
        samples.push(WindowSample {
            success: outcome.success,
            response_time_ms: outcome.response_time_ms,
        });
    }

    /// Takes the current window, leaving it empty for the next interval.
    pub fn drain(&self) -> Vec<WindowSample> {
        let mut samples = match self.0.lock() {
            Ok(samples) => samples,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *samples)
    }
}

/// Spawns the single outcome consumer.
///
/// Order per outcome: record into the aggregator, feed the stability window,
/// notify listeners, then evaluate stop-on-error and the configured
/// thresholds. A breach flips the cancel signal with `threshold_exceeded`;
/// the dispatch loops observe it within one iteration. The task ends when
/// every sender is gone and the queue is drained.
pub(crate) fn spawn_consumer(
    mut rx: mpsc::Receiver<TaskOutcome>,
    aggregator: Arc<MetricsAggregator>,
    listeners: OutcomeListeners,
    cancel: CancelSignal,
    abort: AbortSlot,
    stop_on_error: bool,
    window: Option<WindowBuffer>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(outcome) = rx.recv().await {
            aggregator.record(&outcome);
            if let Some(window) = &window {
                window.push(&outcome);
            }
            listeners.emit(&outcome);

            if cancel.is_cancelled() {
                continue;
            }
            if stop_on_error && !outcome.success {
                warn!(
                    kind = outcome.error_kind.map(|k| k.as_str()).unwrap_or(""),
                    "failure recorded with stop_on_error set, aborting run"
                );
                abort.set(AbortReason::ThresholdExceeded);
                cancel.cancel();
            } else if let ThresholdVerdict::Abort(breach) = aggregator.check_thresholds() {
                warn!(%breach, "threshold reached, aborting run");
                abort.set(AbortReason::ThresholdExceeded);
                cancel.cancel();
            }
        }
    })
}
