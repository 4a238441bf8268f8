//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, timeouts > 0)
//! - Detect duplicate circuit keys, route names and path prefixes
//! - Check upstream URLs and bind addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: String },

    #[error("duplicate circuit key '{0}'")]
    DuplicateCircuit(String),

    #[error("duplicate route name '{0}'")]
    DuplicateRoute(String),

    #[error("duplicate path prefix '{0}'")]
    DuplicatePrefix(String),

    #[error("route '{route}': invalid path prefix '{prefix}': {reason}")]
    InvalidPrefix {
        route: String,
        prefix: String,
        reason: &'static str,
    },

    #[error("route '{route}': invalid upstream '{upstream}': {reason}")]
    InvalidUpstream {
        route: String,
        upstream: String,
        reason: String,
    },

    #[error("invalid {field} '{value}'")]
    InvalidAddress { field: String, value: String },

    #[error("route '{route}': invalid fallback status {status}")]
    InvalidFallbackStatus { route: String, status: u16 },
}

fn zero(field: impl Into<String>) -> ValidationError {
    ValidationError::Zero {
        field: field.into(),
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.defaults.failure_threshold == 0 {
        errors.push(zero("defaults.failure_threshold"));
    }
    if config.defaults.success_threshold == 0 {
        errors.push(zero("defaults.success_threshold"));
    }
    if config.defaults.reset_timeout_ms == 0 {
        errors.push(zero("defaults.reset_timeout_ms"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(zero("timeouts.request_secs"));
    }

    let mut keys = HashSet::new();
    for circuit in &config.circuits {
        if !keys.insert(circuit.key.as_str()) {
            errors.push(ValidationError::DuplicateCircuit(circuit.key.clone()));
        }
        if circuit.failure_threshold == Some(0) {
            errors.push(zero(format!("circuits.{}.failure_threshold", circuit.key)));
        }
        if circuit.success_threshold == Some(0) {
            errors.push(zero(format!("circuits.{}.success_threshold", circuit.key)));
        }
        if circuit.reset_timeout_ms == Some(0) {
            errors.push(zero(format!("circuits.{}.reset_timeout_ms", circuit.key)));
        }
    }

    let mut names = HashSet::new();
    let mut prefixes = HashSet::new();
    for route in &config.routes {
        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }
        if let Some(reason) = prefix_problem(&route.path_prefix) {
            errors.push(ValidationError::InvalidPrefix {
                route: route.name.clone(),
                prefix: route.path_prefix.clone(),
                reason,
            });
        } else if !prefixes.insert(route.path_prefix.trim_end_matches('/')) {
            errors.push(ValidationError::DuplicatePrefix(route.path_prefix.clone()));
        }

        match Url::parse(&route.upstream) {
            Ok(url) if url.scheme() == "http" => {}
            Ok(url) => errors.push(ValidationError::InvalidUpstream {
                route: route.name.clone(),
                upstream: route.upstream.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError::InvalidUpstream {
                route: route.name.clone(),
                upstream: route.upstream.clone(),
                reason: e.to_string(),
            }),
        }

        if let Some(fallback) = &route.fallback {
            if !(100..=599).contains(&fallback.status) {
                errors.push(ValidationError::InvalidFallbackStatus {
                    route: route.name.clone(),
                    status: fallback.status,
                });
            }
        }
    }

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Prefixes are literal paths; router capture syntax would change their meaning.
fn prefix_problem(prefix: &str) -> Option<&'static str> {
    if !prefix.starts_with('/') {
        return Some("must start with '/'");
    }
    if prefix.contains(['{', '}']) {
        return Some("must not contain '{' or '}'");
    }
    if prefix
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        return Some("segments must not start with ':' or '*'");
    }
    None
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}
