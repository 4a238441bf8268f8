//! HTTP middleware.

pub mod circuit;

pub use circuit::{
    circuit_breaker_middleware, with_static_fallback, CircuitGuard, HttpCircuitOptions,
    HttpCircuits, UpstreamFailure,
};
