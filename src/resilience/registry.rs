//! Keyed circuit registry.
//!
//! # Responsibilities
//! - Own the `key → Circuit` map for the process lifetime
//! - Merge caller options over defaults once, on first registration
//! - Route executions to the right circuit, or pass through when unregistered
//!
//! # Design Decisions
//! - Registration is idempotent: re-registering never resets counters
//! - Concurrent first registrations resolve to one circuit (DashMap entry API)
//! - Unregistered executions fail open, with a warning

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::schema::BreakerDefaults;
use crate::resilience::circuit_breaker::{Circuit, CircuitSnapshot, CircuitState};
use crate::resilience::error::CircuitError;
use crate::resilience::events::{CircuitEvent, CircuitListener, Listeners};
use crate::resilience::options::CircuitOptions;

/// Registry of circuits sharing one output and error type.
pub struct CircuitRegistry<T, E> {
    circuits: DashMap<String, Arc<Circuit<T, E>>>,
    defaults: BreakerDefaults,
    listeners: Arc<Listeners>,
}

impl<T, E> CircuitRegistry<T, E> {
    pub fn new(defaults: BreakerDefaults) -> Self {
        Self {
            circuits: DashMap::new(),
            defaults,
            listeners: Arc::new(Listeners::new()),
        }
    }

    pub fn defaults(&self) -> &BreakerDefaults {
        &self.defaults
    }

    /// Register a circuit. Returns false (and changes nothing) if `key` exists.
    pub fn register(&self, key: impl Into<String>, options: CircuitOptions<T, E>) -> bool {
        let created = match self.circuits.entry(key.into()) {
            Entry::Occupied(entry) => {
                tracing::trace!(circuit = %entry.key(), "Circuit already registered");
                None
            }
            Entry::Vacant(entry) => {
                let resolved = options.resolve(&self.defaults);
                tracing::info!(
                    circuit = %entry.key(),
                    failure_threshold = resolved.failure_threshold,
                    success_threshold = resolved.success_threshold,
                    reset_timeout_ms = resolved.reset_timeout.as_millis() as u64,
                    trial_policy = ?resolved.trial_policy,
                    fallback = resolved.fallback.is_some(),
                    "Circuit registered"
                );
                let circuit = Circuit::new(entry.key().as_str(), resolved, self.listeners.clone());
                let key = Arc::from(circuit.key());
                entry.insert(Arc::new(circuit));
                Some(key)
            }
        };

        // The map shard is unlocked here, so listeners may query the registry.
        match created {
            Some(key) => {
                self.listeners.notify(CircuitEvent::Registered { key });
                true
            }
            None => false,
        }
    }

    /// Execute `operation` through the circuit registered under `key`.
    ///
    /// Unregistered keys run the operation directly; no circuit is created.
    pub async fn execute<F, Fut>(&self, key: &str, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let Some(circuit) = self.get(key) else {
            tracing::warn!(circuit = %key, "Executing against unregistered circuit, running unprotected");
            return operation()
                .await
                .map_err(|source| CircuitError::OperationFailed {
                    key: key.to_string(),
                    source,
                });
        };
        circuit.execute(operation).await
    }

    /// Look up a circuit.
    pub fn get(&self, key: &str) -> Option<Arc<Circuit<T, E>>> {
        self.circuits.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Current state, or `None` if unregistered. Never mutates.
    pub fn state(&self, key: &str) -> Option<CircuitState> {
        self.get(key).map(|circuit| circuit.state())
    }

    pub fn snapshot(&self, key: &str) -> Option<CircuitSnapshot> {
        self.get(key).map(|circuit| circuit.snapshot())
    }

    /// Snapshots of every circuit, sorted by key.
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let circuits: Vec<_> = self.circuits.iter().map(|entry| entry.value().clone()).collect();
        let mut snapshots: Vec<_> = circuits.iter().map(|circuit| circuit.snapshot()).collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    /// Force a circuit closed. Returns false if `key` is unregistered.
    pub fn reset(&self, key: &str) -> bool {
        match self.get(key) {
            Some(circuit) => {
                circuit.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        let circuits: Vec<_> = self.circuits.iter().map(|entry| entry.value().clone()).collect();
        for circuit in circuits {
            circuit.reset();
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.circuits.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }

    /// Subscribe to events from every circuit, current and future.
    pub fn subscribe<L>(&self, listener: L)
    where
        L: CircuitListener + 'static,
    {
        self.listeners.add(Arc::new(listener));
    }
}

impl<T, E> Default for CircuitRegistry<T, E> {
    fn default() -> Self {
        Self::new(BreakerDefaults::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("upstream down")]
    struct Down;

    type Registry = CircuitRegistry<&'static str, Down>;

    #[tokio::test]
    async fn test_unregistered_passes_through() {
        let registry = Registry::default();
        let calls = AtomicUsize::new(0);

        let value = registry
            .execute("orders", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("ok")
            })
            .await
            .unwrap();
        assert_eq!(value, "ok");

        let err = registry.execute("orders", || async { Err(Down) }).await.unwrap_err();
        assert!(matches!(err, CircuitError::OperationFailed { .. }));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.state("orders"), None);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_register_is_configure_once() {
        let registry = Registry::default();
        assert!(registry.register("orders", CircuitOptions::new().failure_threshold(2)));

        let _ = registry.execute("orders", || async { Err(Down) }).await;
        assert!(!registry.register("orders", CircuitOptions::new().failure_threshold(10)));

        let snap = registry.snapshot("orders").unwrap();
        assert_eq!(snap.failure_count, 1);
        assert_eq!(snap.failure_threshold, 2);

        let _ = registry.execute("orders", || async { Err(Down) }).await;
        assert_eq!(registry.state("orders"), Some(CircuitState::Open));
    }

    #[tokio::test]
    async fn test_reset() {
        let registry = Registry::default();
        assert!(!registry.reset("missing"));

        registry.register("orders", CircuitOptions::new().failure_threshold(1));
        let _ = registry.execute("orders", || async { Err(Down) }).await;
        assert_eq!(registry.state("orders"), Some(CircuitState::Open));

        assert!(registry.reset("orders"));
        let snap = registry.snapshot("orders").unwrap();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failure_count, 0);
        assert_eq!(snap.success_count, 0);
    }

    #[tokio::test]
    async fn test_state_is_read_only() {
        let registry = Registry::default();
        registry.register(
            "orders",
            CircuitOptions::new()
                .failure_threshold(1)
                .reset_timeout(Duration::ZERO),
        );
        let _ = registry.execute("orders", || async { Err(Down) }).await;

        // Recovery is due, but only an invocation performs the transition.
        assert_eq!(registry.state("orders"), Some(CircuitState::Open));
        assert_eq!(registry.state("orders"), Some(CircuitState::Open));
    }

    #[tokio::test]
    async fn test_listeners_see_transitions() {
        let registry = Registry::default();
        let transitions = Arc::new(Mutex::new(Vec::new()));
        let sink = transitions.clone();
        registry.subscribe(move |event: &CircuitEvent| {
            if let CircuitEvent::StateChanged { key, from, to } = event {
                sink.lock().unwrap().push(format!("{key}:{from}->{to}"));
            }
        });

        registry.register("orders", CircuitOptions::new().failure_threshold(1));
        let _ = registry.execute("orders", || async { Err(Down) }).await;
        registry.reset("orders");

        assert_eq!(
            *transitions.lock().unwrap(),
            vec!["orders:closed->open".to_string(), "orders:open->closed".to_string()]
        );
    }

    #[test]
    fn test_registration_notifies_once() {
        let registry = Arc::new(Registry::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (sink, lookup) = (seen.clone(), registry.clone());
        registry.subscribe(move |event: &CircuitEvent| {
            if let CircuitEvent::Registered { key } = event {
                // The new circuit is already visible to listeners.
                sink.lock().unwrap().push((key.to_string(), lookup.state(key)));
            }
        });

        assert!(registry.register("orders", CircuitOptions::new()));
        assert!(!registry.register("orders", CircuitOptions::new()));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("orders".to_string(), Some(CircuitState::Closed))]
        );
    }

    #[tokio::test]
    async fn test_snapshots_sorted() {
        let registry = Registry::default();
        registry.register("b", CircuitOptions::new());
        registry.register("a", CircuitOptions::new());
        let keys: Vec<_> = registry.snapshots().into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["a", "b"]);

        registry.reset_all();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("a"));
    }
}
