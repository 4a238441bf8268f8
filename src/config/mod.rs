//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → defaults feed the circuit registry, routes feed the gateway router
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; circuits are configure-once, so there is no reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, BreakerDefaults, CircuitSettings, GatewayConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, RouteConfig, StaticFallback, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
