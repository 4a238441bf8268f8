//! Keyed circuit breakers with an HTTP interception layer.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use resilience::{
    Circuit, CircuitError, CircuitEvent, CircuitListener, CircuitOptions, CircuitRegistry,
    CircuitState,
};
