//! Circuit breaker middleware.
//!
//! # Responsibilities
//! - Derive a stable circuit key per protected route
//! - Register the circuit on first use (configure-once)
//! - Run the inner handler through the registry
//! - Translate short-circuits into 503 responses
//!
//! # Design Decisions
//! - Any 5xx from the inner handler is a failure; 4xx are client errors and count as success
//! - A failing response is still returned to the client unchanged
//! - Key defaults to "{METHOD} {matched path}" when the options carry none

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::config::StaticFallback;
use crate::http::response::{circuit_open_response, fallback_failed_response};
use crate::resilience::{
    CircuitError, CircuitOptions, CircuitRegistry, FallbackContext, FallbackError,
};

/// Registry type used by the HTTP layer.
pub type HttpCircuits = CircuitRegistry<Response, UpstreamFailure>;

/// Options type used by the HTTP layer.
pub type HttpCircuitOptions = CircuitOptions<Response, UpstreamFailure>;

/// The inner handler answered with a server error.
#[derive(Debug, Error)]
#[error("upstream responded with {status}")]
pub struct UpstreamFailure {
    pub status: StatusCode,
    response: Response,
}

impl UpstreamFailure {
    pub fn new(response: Response) -> Self {
        Self {
            status: response.status(),
            response,
        }
    }
}

impl IntoResponse for UpstreamFailure {
    fn into_response(self) -> Response {
        self.response
    }
}

/// Middleware state: the shared registry plus this route's options.
#[derive(Clone)]
pub struct CircuitGuard {
    registry: Arc<HttpCircuits>,
    options: HttpCircuitOptions,
}

impl CircuitGuard {
    pub fn new(registry: Arc<HttpCircuits>, options: HttpCircuitOptions) -> Self {
        Self { registry, options }
    }

    fn resolve_key(&self, request: &Request<Body>) -> String {
        if let Some(key) = &self.options.key {
            return key.clone();
        }
        let path = request
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());
        format!("{} {}", request.method(), path)
    }
}

/// Middleware function protecting the wrapped routes with a circuit.
pub async fn circuit_breaker_middleware(
    State(guard): State<CircuitGuard>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = guard.resolve_key(&request);
    if !guard.registry.contains(&key) {
        guard.registry.register(key.clone(), guard.options.clone());
    }

    let outcome = guard
        .registry
        .execute(&key, || async move {
            let response = next.run(request).await;
            if response.status().is_server_error() {
                Err(UpstreamFailure::new(response))
            } else {
                Ok(response)
            }
        })
        .await;

    match outcome {
        Ok(response) => response,
        Err(CircuitError::OperationFailed { source, .. }) => source.into_response(),
        Err(CircuitError::Open { key, retry_in }) => {
            tracing::debug!(circuit = %key, retry_in_ms = retry_in.as_millis() as u64, "Request short-circuited");
            circuit_open_response(&key, retry_in)
        }
        Err(CircuitError::Fallback(error)) => {
            tracing::warn!(circuit = %key, error = %error, "Fallback failed");
            fallback_failed_response(&key, &error)
        }
    }
}

/// Install a canned response as the fallback of `options`.
pub fn with_static_fallback(options: HttpCircuitOptions, fallback: &StaticFallback) -> HttpCircuitOptions {
    let status = StatusCode::from_u16(fallback.status).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    let body = fallback.body.clone();
    let content_type = fallback.content_type.clone();

    options.fallback(move |ctx: FallbackContext<UpstreamFailure>| {
        let body = body.clone();
        let content_type = content_type.clone();
        async move {
            tracing::debug!(circuit = %ctx.key, state = %ctx.state, "Serving static fallback");
            Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, content_type)
                .header("x-circuit-state", HeaderValue::from_static(ctx.state.as_str()))
                .body(Body::from(body))
                .map_err(FallbackError::from_error)
        }
    })
}
