//! Responses for short-circuited requests.
//!
//! Open circuits answer 503 Service Unavailable with a JSON body and a
//! `Retry-After` header rounded up to whole seconds.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::resilience::FallbackError;

/// Seconds to advertise in `Retry-After`, never below one.
pub fn retry_after_secs(retry_in: Duration) -> u64 {
    let millis = retry_in.as_millis() as u64;
    millis.div_ceil(1000).max(1)
}

/// 503 for an open circuit without a fallback.
pub fn circuit_open_response(key: &str, retry_in: Duration) -> Response {
    let body = json!({
        "statusCode": 503,
        "error": "Service Unavailable",
        "message": format!("Circuit {key} is open"),
        "circuit": key,
        "retryAfterMs": retry_in.as_millis() as u64,
    });
    let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
    response.headers_mut().insert(
        header::RETRY_AFTER,
        HeaderValue::from(retry_after_secs(retry_in)),
    );
    response
}

/// 503 for a fallback that failed.
pub fn fallback_failed_response(key: &str, error: &FallbackError) -> Response {
    let body = json!({
        "statusCode": 503,
        "error": "Service Unavailable",
        "message": error.message(),
        "circuit": key,
    });
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}
