//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::options::TrialPolicy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Defaults merged into every circuit on registration.
    pub defaults: BreakerDefaults,

    /// Per-circuit overrides, keyed by circuit key.
    pub circuits: Vec<CircuitSettings>,

    /// Protected routes forwarded to upstreams.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

impl GatewayConfig {
    /// Per-circuit overrides for `key`, if any.
    pub fn circuit(&self, key: &str) -> Option<&CircuitSettings> {
        self.circuits.iter().find(|c| c.key == key)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Built-in circuit defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerDefaults {
    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,

    /// Delay before an open circuit admits a trial, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Half-open admission policy.
    pub trial_policy: TrialPolicy,
}

impl BreakerDefaults {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

impl Default for BreakerDefaults {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_ms: 30_000,
            trial_policy: TrialPolicy::Permissive,
        }
    }
}

/// Overrides for a single circuit. Unset fields fall back to [`BreakerDefaults`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitSettings {
    /// Circuit key.
    pub key: String,

    #[serde(default)]
    pub failure_threshold: Option<u32>,

    #[serde(default)]
    pub success_threshold: Option<u32>,

    #[serde(default)]
    pub reset_timeout_ms: Option<u64>,

    #[serde(default)]
    pub trial_policy: Option<TrialPolicy>,
}

/// A protected route.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging.
    pub name: String,

    /// Path prefix served by this route (e.g., "/inventory").
    pub path_prefix: String,

    /// Upstream base URL (e.g., "http://127.0.0.1:3000").
    pub upstream: String,

    /// Circuit key guarding this route. Defaults to the route name.
    #[serde(default)]
    pub circuit: Option<String>,

    /// Response served while the circuit short-circuits.
    #[serde(default)]
    pub fallback: Option<StaticFallback>,
}

impl RouteConfig {
    pub fn circuit_key(&self) -> &str {
        self.circuit.as_deref().unwrap_or(&self.name)
    }
}

/// A canned response used as a route fallback.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticFallback {
    #[serde(default = "default_fallback_status")]
    pub status: u16,

    #[serde(default)]
    pub body: String,

    #[serde(default = "default_fallback_content_type")]
    pub content_type: String,
}

fn default_fallback_status() -> u16 {
    200
}

fn default_fallback_content_type() -> String {
    "application/json".to_string()
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Upstream request timeout in seconds. A timed-out request is a circuit failure.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.defaults.failure_threshold, 5);
        assert_eq!(config.defaults.reset_timeout(), Duration::from_secs(30));
        assert!(config.routes.is_empty());
        assert!(!config.admin.enabled);
    }

    #[test]
    fn test_full_config() {
        let raw = r#"
            [defaults]
            failure_threshold = 3
            success_threshold = 3
            reset_timeout_ms = 60000
            trial_policy = "single_trial"

            [[circuits]]
            key = "inventory"
            failure_threshold = 2

            [[routes]]
            name = "inventory"
            path_prefix = "/inventory"
            upstream = "http://127.0.0.1:3000"

            [routes.fallback]
            status = 200
            body = '{"items":[]}'

            [observability]
            log_format = "json"
        "#;
        let config: GatewayConfig = toml::from_str(raw).unwrap();

        assert_eq!(config.defaults.trial_policy, TrialPolicy::SingleTrial);
        assert_eq!(config.circuit("inventory").unwrap().failure_threshold, Some(2));
        assert!(config.circuit("payments").is_none());

        let route = &config.routes[0];
        assert_eq!(route.circuit_key(), "inventory");
        let fallback = route.fallback.as_ref().unwrap();
        assert_eq!(fallback.content_type, "application/json");
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
