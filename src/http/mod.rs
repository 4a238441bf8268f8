//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, one sub-router per configured route)
//!     → middleware/circuit.rs (resolve key, execute through the registry)
//!     → server.rs proxy handler (forward to upstream with a deadline)
//!     → response.rs (503 when short-circuited)
//!     → Send to client
//! ```

pub mod middleware;
pub mod response;
pub mod server;

pub use middleware::{CircuitGuard, HttpCircuitOptions, HttpCircuits, UpstreamFailure};
pub use server::GatewayServer;
