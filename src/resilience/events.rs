//! Circuit event notifications.
//!
//! Listeners are called synchronously after the circuit lock is released, so a
//! listener may query the registry. They must not block.

use std::sync::{Arc, PoisonError, RwLock};

use crate::resilience::circuit_breaker::CircuitState;

/// Something observable happened on a circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitEvent {
    /// A circuit was created in the Closed state.
    Registered { key: Arc<str> },
    StateChanged {
        key: Arc<str>,
        from: CircuitState,
        to: CircuitState,
    },
    Success { key: Arc<str> },
    Failure { key: Arc<str> },
    /// The invocation was short-circuited without running.
    Rejected { key: Arc<str> },
}

impl CircuitEvent {
    pub fn key(&self) -> &str {
        match self {
            CircuitEvent::Registered { key }
            | CircuitEvent::StateChanged { key, .. }
            | CircuitEvent::Success { key }
            | CircuitEvent::Failure { key }
            | CircuitEvent::Rejected { key } => key,
        }
    }
}

/// Observer for circuit events.
pub trait CircuitListener: Send + Sync {
    fn on_event(&self, event: &CircuitEvent);
}

impl<F> CircuitListener for F
where
    F: Fn(&CircuitEvent) + Send + Sync,
{
    fn on_event(&self, event: &CircuitEvent) {
        self(event)
    }
}

/// Listener list shared between a registry and its circuits.
#[derive(Default)]
pub struct Listeners {
    inner: RwLock<Vec<Arc<dyn CircuitListener>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn CircuitListener>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, event: CircuitEvent) {
        // Snapshot first: a listener may subscribe another listener.
        let listeners = self.inner.read().unwrap_or_else(PoisonError::into_inner).clone();
        for listener in &listeners {
            listener.on_event(&event);
        }
    }
}
