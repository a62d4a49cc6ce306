//! Outcome callback fan-out.
//!
//! Listeners receive every recorded [`TaskOutcome`], after the aggregator has
//! recorded it. They are invoked from worker-side context and must be
//! `Send + Sync`; the core does not serialize calls across listeners.

use crate::outcome::TaskOutcome;
use std::sync::Arc;

/// Observer for recorded outcomes.
pub trait OutcomeListener: Send + Sync {
    fn on_outcome(&self, outcome: &TaskOutcome);
}

/// Type alias for shared listeners.
pub type BoxedOutcomeListener = Arc<dyn OutcomeListener>;

/// A collection of outcome listeners.
#[derive(Clone, Default)]
pub struct OutcomeListeners {
    listeners: Vec<BoxedOutcomeListener>,
}

impl OutcomeListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: OutcomeListener + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an outcome to all registered listeners.
    ///
    /// A panicking listener is caught and the remaining listeners still run;
    /// one misbehaving sink must not take a worker down with it.
    pub fn emit(&self, outcome: &TaskOutcome) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_outcome(outcome);
            }));

            if result.is_err() {
                tracing::warn!(listener_index = index, "outcome listener panicked");
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

/// A simple function-based outcome listener.
pub struct FnListener<F>
where
    F: Fn(&TaskOutcome) + Send + Sync,
{
    f: F,
}

impl<F> FnListener<F>
where
    F: Fn(&TaskOutcome) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> OutcomeListener for FnListener<F>
where
    F: Fn(&TaskOutcome) + Send + Sync,
{
    fn on_outcome(&self, outcome: &TaskOutcome) {
        (self.f)(outcome)
    }
}
