//! Circuit breaker for protecting a failing operation.
//!
//! # States
//! - Closed: normal operation, invocations pass through
//! - Open: operation assumed down, invocations are short-circuited
//! - Half-Open: testing if the operation recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first invocation at or after next_attempt_at
//! Half-Open → Closed: consecutive successes >= success_threshold
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - Recovery is checked lazily at invocation time, no timers
//! - The lock covers the admission decision and the outcome record, never the call
//! - A dropped (cancelled) invocation counts as a failure

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::resilience::error::CircuitError;
use crate::resilience::events::{CircuitEvent, Listeners};
use crate::resilience::options::{FallbackContext, ResolvedOptions, TrialPolicy};

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a circuit.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout_ms: u64,
    /// Milliseconds until an Open circuit admits a trial.
    pub retry_in_ms: Option<u64>,
    pub last_failure: Option<String>,
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
    next_attempt_at: Option<Instant>,
    last_failure: Option<String>,
    trial_in_flight: bool,
}

impl CircuitInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
            next_attempt_at: None,
            last_failure: None,
            trial_in_flight: false,
        }
    }

    fn open(&mut self, now: Instant, reset_timeout: Duration) {
        self.state = CircuitState::Open;
        self.success_count = 0;
        self.trial_in_flight = false;
        self.next_attempt_at = Some(now + reset_timeout);
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.next_attempt_at = None;
    }
}

/// Outcome of the admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Admission {
    /// Run the operation. `trial_slot` is set when the caller holds the single trial.
    Proceed { trial_slot: bool },
    ShortCircuit {
        state: CircuitState,
        retry_in: Duration,
        last_failure: Option<String>,
    },
}

type Transition = (CircuitState, CircuitState);

/// A single circuit: state machine, counters and resolved options.
pub struct Circuit<T, E> {
    key: Arc<str>,
    options: ResolvedOptions<T, E>,
    inner: Mutex<CircuitInner>,
    listeners: Arc<Listeners>,
}

impl<T, E> Circuit<T, E> {
    /// Create a closed circuit.
    pub fn new(key: impl Into<Arc<str>>, options: ResolvedOptions<T, E>, listeners: Arc<Listeners>) -> Self {
        Self {
            key: key.into(),
            options,
            inner: Mutex::new(CircuitInner::new()),
            listeners,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> &ResolvedOptions<T, E> {
        &self.options
    }

    /// Current state. Does not perform the lazy Open → Half-Open transition.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        let retry_in_ms = match (inner.state, inner.next_attempt_at) {
            (CircuitState::Open, Some(at)) => {
                Some(at.saturating_duration_since(Instant::now()).as_millis() as u64)
            }
            _ => None,
        };
        CircuitSnapshot {
            key: self.key.to_string(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            failure_threshold: self.options.failure_threshold,
            success_threshold: self.options.success_threshold,
            reset_timeout_ms: self.options.reset_timeout.as_millis() as u64,
            retry_in_ms,
            last_failure: inner.last_failure.clone(),
        }
    }

    /// Force the circuit closed and clear all counters.
    pub fn reset(&self) {
        let previous = {
            let mut inner = self.lock();
            let previous = inner.state;
            *inner = CircuitInner::new();
            previous
        };
        tracing::info!(circuit = %self.key, from = %previous, "Circuit reset");
        if previous != CircuitState::Closed {
            self.transitioned((previous, CircuitState::Closed));
        }
    }

    /// Run `operation` through the circuit.
    pub async fn execute<F, Fut>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let trial_slot = match self.admit(Instant::now()) {
            Admission::Proceed { trial_slot } => trial_slot,
            Admission::ShortCircuit {
                state,
                retry_in,
                last_failure,
            } => {
                self.listeners.notify(CircuitEvent::Rejected {
                    key: self.key.clone(),
                });
                return self.short_circuit(state, None, last_failure, retry_in).await;
            }
        };

        let guard = InvocationGuard {
            circuit: self,
            trial_slot,
            armed: true,
        };
        let outcome = operation().await;
        guard.disarm();

        match outcome {
            Ok(value) => {
                self.record_success(trial_slot);
                Ok(value)
            }
            Err(error) => {
                let prior = self.record_failure(error.to_string(), trial_slot);
                if prior == CircuitState::HalfOpen && self.options.fallback.is_some() {
                    let (retry_in, last_failure) = {
                        let inner = self.lock();
                        (
                            inner
                                .next_attempt_at
                                .map(|at| at.saturating_duration_since(Instant::now()))
                                .unwrap_or_default(),
                            inner.last_failure.clone(),
                        )
                    };
                    return self
                        .short_circuit(CircuitState::Open, Some(error), last_failure, retry_in)
                        .await;
                }
                Err(CircuitError::OperationFailed {
                    key: self.key.to_string(),
                    source: error,
                })
            }
        }
    }

    async fn short_circuit(
        &self,
        state: CircuitState,
        error: Option<E>,
        last_failure: Option<String>,
        retry_in: Duration,
    ) -> Result<T, CircuitError<E>> {
        match &self.options.fallback {
            Some(fallback) => {
                tracing::debug!(circuit = %self.key, state = %state, "Invoking fallback");
                let ctx = FallbackContext {
                    key: self.key.to_string(),
                    state,
                    error,
                    last_failure,
                    retry_in,
                };
                fallback(ctx).await.map_err(CircuitError::Fallback)
            }
            None => Err(CircuitError::Open {
                key: self.key.to_string(),
                retry_in,
            }),
        }
    }

    fn admit(&self, now: Instant) -> Admission {
        let (admission, transition) = {
            let mut inner = self.lock();
            let mut transition = None;

            if inner.state == CircuitState::Open {
                match inner.next_attempt_at {
                    Some(at) if now < at => {
                        return Admission::ShortCircuit {
                            state: CircuitState::Open,
                            retry_in: at - now,
                            last_failure: inner.last_failure.clone(),
                        };
                    }
                    _ => {
                        inner.state = CircuitState::HalfOpen;
                        inner.success_count = 0;
                        inner.next_attempt_at = None;
                        transition = Some((CircuitState::Open, CircuitState::HalfOpen));
                    }
                }
            }

            let admission = match (inner.state, self.options.trial_policy) {
                (CircuitState::HalfOpen, TrialPolicy::SingleTrial) if inner.trial_in_flight => {
                    Admission::ShortCircuit {
                        state: CircuitState::HalfOpen,
                        retry_in: Duration::ZERO,
                        last_failure: inner.last_failure.clone(),
                    }
                }
                (CircuitState::HalfOpen, TrialPolicy::SingleTrial) => {
                    inner.trial_in_flight = true;
                    Admission::Proceed { trial_slot: true }
                }
                _ => Admission::Proceed { trial_slot: false },
            };
            (admission, transition)
        };

        if let Some(transition) = transition {
            tracing::debug!(circuit = %self.key, "Reset timeout elapsed, admitting trial invocation");
            self.transitioned(transition);
        }
        admission
    }

    fn record_success(&self, trial_slot: bool) {
        let transition = {
            let mut inner = self.lock();
            if trial_slot {
                inner.trial_in_flight = false;
            }
            match inner.state {
                CircuitState::Closed => {
                    inner.failure_count = 0;
                    None
                }
                CircuitState::HalfOpen => {
                    inner.success_count = inner.success_count.saturating_add(1);
                    if inner.success_count >= self.options.success_threshold {
                        inner.close();
                        Some((CircuitState::HalfOpen, CircuitState::Closed))
                    } else {
                        None
                    }
                }
                // Late result from a call admitted before the circuit opened.
                CircuitState::Open => None,
            }
        };

        self.listeners.notify(CircuitEvent::Success {
            key: self.key.clone(),
        });
        if let Some(transition) = transition {
            self.transitioned(transition);
        }
    }

    /// Record a failure. Returns the state the failure was observed in.
    fn record_failure(&self, message: String, trial_slot: bool) -> CircuitState {
        let now = Instant::now();
        let (prior, transition, failures) = {
            let mut inner = self.lock();
            let prior = inner.state;
            if trial_slot {
                inner.trial_in_flight = false;
            }
            inner.last_failure_at = Some(now);
            inner.last_failure = Some(message);

            let transition = match prior {
                CircuitState::Closed => {
                    inner.failure_count = inner.failure_count.saturating_add(1);
                    if inner.failure_count >= self.options.failure_threshold {
                        inner.open(now, self.options.reset_timeout);
                        Some((CircuitState::Closed, CircuitState::Open))
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    inner.open(now, self.options.reset_timeout);
                    Some((CircuitState::HalfOpen, CircuitState::Open))
                }
                CircuitState::Open => {
                    inner.next_attempt_at = Some(now + self.options.reset_timeout);
                    None
                }
            };
            (prior, transition, inner.failure_count)
        };

        tracing::debug!(circuit = %self.key, state = %prior, failures, "Invocation failed");
        self.listeners.notify(CircuitEvent::Failure {
            key: self.key.clone(),
        });
        if let Some(transition) = transition {
            self.transitioned(transition);
        }
        prior
    }

    fn transitioned(&self, (from, to): Transition) {
        match to {
            CircuitState::Open => tracing::warn!(
                circuit = %self.key,
                from = %from,
                reset_timeout_ms = self.options.reset_timeout.as_millis() as u64,
                "Circuit opened"
            ),
            CircuitState::HalfOpen => {
                tracing::info!(circuit = %self.key, "Circuit half-open")
            }
            CircuitState::Closed => tracing::info!(circuit = %self.key, from = %from, "Circuit closed"),
        }
        self.listeners.notify(CircuitEvent::StateChanged {
            key: self.key.clone(),
            from,
            to,
        });
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        // Every critical section leaves the inner state consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Records a failure if the invocation future is dropped before completing.
struct InvocationGuard<'a, T, E> {
    circuit: &'a Circuit<T, E>,
    trial_slot: bool,
    armed: bool,
}

impl<T, E> InvocationGuard<'_, T, E> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T, E> Drop for InvocationGuard<'_, T, E> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(circuit = %self.circuit.key, "Invocation cancelled");
            self.circuit
                .record_failure("invocation cancelled".to_string(), self.trial_slot);
        }
    }
}
