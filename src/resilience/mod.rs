//! Resilience subsystem: keyed circuit breakers.
//!
//! # Data Flow
//! ```text
//! Caller resolves a key
//!     → registry.rs (register once, look up circuit)
//!     → circuit_breaker.rs (admit, run, record outcome)
//!     → events.rs (notify listeners: logging, metrics)
//!     → error.rs (Open / OperationFailed / Fallback)
//! ```
//!
//! # Design Decisions
//! - Circuits are never evicted; one key per logical operation, not per request
//! - No retries or timeouts here; the caller's invocation enforces its own deadline
//! - Fallbacks substitute short-circuited calls and failed trials; Closed-state failures always surface

pub mod circuit_breaker;
pub mod error;
pub mod events;
pub mod options;
pub mod registry;

pub use circuit_breaker::{Circuit, CircuitSnapshot, CircuitState};
pub use error::{CircuitError, FallbackError};
pub use events::{CircuitEvent, CircuitListener};
pub use options::{CircuitOptions, Fallback, FallbackContext, TrialPolicy};
pub use registry::CircuitRegistry;
