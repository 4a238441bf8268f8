//! Per-circuit options.
//!
//! Callers hand a partial [`CircuitOptions`] to the registry; it is merged over
//! [`BreakerDefaults`] exactly once, when the circuit is first registered.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use crate::config::schema::{BreakerDefaults, CircuitSettings};
use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::error::FallbackError;

/// How a Half-Open circuit admits concurrent invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialPolicy {
    /// Every invocation arriving after the reset timeout is let through.
    #[default]
    Permissive,
    /// One trial at a time; others are short-circuited until it completes.
    SingleTrial,
}

/// Information handed to a fallback when a circuit short-circuits.
#[derive(Debug)]
pub struct FallbackContext<E> {
    /// Circuit key.
    pub key: String,
    /// Circuit state at the moment the fallback was chosen.
    pub state: CircuitState,
    /// The failure that just reopened the circuit, if the fallback follows a failed trial.
    pub error: Option<E>,
    /// Rendered message of the most recent recorded failure.
    pub last_failure: Option<String>,
    /// Time left before the circuit admits a trial invocation.
    pub retry_in: Duration,
}

/// Substitute computation for a short-circuited invocation.
pub type Fallback<T, E> =
    Arc<dyn Fn(FallbackContext<E>) -> BoxFuture<'static, Result<T, FallbackError>> + Send + Sync>;

/// Caller-supplied circuit configuration. Every field is optional.
pub struct CircuitOptions<T, E> {
    /// Key override for collaborators that derive keys from call-site identity.
    pub key: Option<String>,
    pub failure_threshold: Option<u32>,
    pub success_threshold: Option<u32>,
    pub reset_timeout: Option<Duration>,
    pub trial_policy: Option<TrialPolicy>,
    pub fallback: Option<Fallback<T, E>>,
}

impl<T, E> CircuitOptions<T, E> {
    pub fn new() -> Self {
        Self {
            key: None,
            failure_threshold: None,
            success_threshold: None,
            reset_timeout: None,
            trial_policy: None,
            fallback: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = Some(threshold);
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = Some(timeout);
        self
    }

    pub fn trial_policy(mut self, policy: TrialPolicy) -> Self {
        self.trial_policy = Some(policy);
        self
    }

    /// Install an async fallback.
    pub fn fallback<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(FallbackContext<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FallbackError>> + Send + 'static,
        T: 'static,
        E: 'static,
    {
        let fallback: Fallback<T, E> = Arc::new(move |ctx: FallbackContext<E>| f(ctx).boxed());
        self.fallback = Some(fallback);
        self
    }

    /// Merge over `defaults`. Zero thresholds are raised to one.
    pub fn resolve(&self, defaults: &BreakerDefaults) -> ResolvedOptions<T, E> {
        ResolvedOptions {
            failure_threshold: self
                .failure_threshold
                .unwrap_or(defaults.failure_threshold)
                .max(1),
            success_threshold: self
                .success_threshold
                .unwrap_or(defaults.success_threshold)
                .max(1),
            reset_timeout: self.reset_timeout.unwrap_or_else(|| defaults.reset_timeout()),
            trial_policy: self.trial_policy.unwrap_or(defaults.trial_policy),
            fallback: self.fallback.clone(),
        }
    }
}

impl<T, E> Default for CircuitOptions<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for CircuitOptions<T, E> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            reset_timeout: self.reset_timeout,
            trial_policy: self.trial_policy,
            fallback: self.fallback.clone(),
        }
    }
}

impl<T, E> fmt::Debug for CircuitOptions<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitOptions")
            .field("key", &self.key)
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field("trial_policy", &self.trial_policy)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl<T, E> From<&CircuitSettings> for CircuitOptions<T, E> {
    fn from(settings: &CircuitSettings) -> Self {
        Self {
            key: Some(settings.key.clone()),
            failure_threshold: settings.failure_threshold,
            success_threshold: settings.success_threshold,
            reset_timeout: settings.reset_timeout_ms.map(Duration::from_millis),
            trial_policy: settings.trial_policy,
            fallback: None,
        }
    }
}

/// Options after the defaults merge. Fixed for the lifetime of a circuit.
pub struct ResolvedOptions<T, E> {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout: Duration,
    pub trial_policy: TrialPolicy,
    pub fallback: Option<Fallback<T, E>>,
}

impl<T, E> fmt::Debug for ResolvedOptions<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedOptions")
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field("trial_policy", &self.trial_policy)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
