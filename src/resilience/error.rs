//! Circuit breaker error types.

use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;

/// Errors returned by [`CircuitRegistry::execute`](crate::resilience::CircuitRegistry::execute).
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The protected operation ran and failed.
    #[error("operation on circuit '{key}' failed: {source}")]
    OperationFailed {
        key: String,
        #[source]
        source: E,
    },

    /// The circuit short-circuited the call and no fallback is configured.
    #[error("circuit '{key}' is open, retry in {}ms", .retry_in.as_millis())]
    Open { key: String, retry_in: Duration },

    /// The fallback ran and failed.
    #[error(transparent)]
    Fallback(#[from] FallbackError),
}

impl<E> CircuitError<E> {
    /// Returns true if the call was rejected without running.
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    /// The circuit key, when known.
    pub fn key(&self) -> Option<&str> {
        match self {
            CircuitError::OperationFailed { key, .. } | CircuitError::Open { key, .. } => Some(key),
            CircuitError::Fallback(_) => None,
        }
    }

    /// Unwrap the underlying operation error.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            CircuitError::OperationFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A fallback failed. Never counted against the circuit.
#[derive(Debug, Error)]
#[error("fallback failed: {message}")]
pub struct FallbackError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl FallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn from_error<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
