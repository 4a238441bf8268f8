//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Circuits produce:
//!     → tracing events (transitions, rejections, unregistered executions)
//!     → CircuitEvent notifications
//!
//! Consumers:
//!     → logging.rs (fmt subscriber, pretty or JSON)
//!     → metrics.rs (MetricsListener → Prometheus scrape endpoint)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are a circuit listener, the core never depends on the exporter

pub mod logging;
pub mod metrics;
