//! Metrics collection and exposition.
//!
//! # Metrics
//! - `circuit_transitions_total` (counter): state changes by circuit, from, to
//! - `circuit_calls_total` (counter): outcomes by circuit (success, failure, rejected)
//! - `circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder they are no-ops
//! - Labels are the circuit key, which is bounded by configuration

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::{CircuitEvent, CircuitListener, CircuitState};

/// Install the Prometheus exporter with an HTTP scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!("circuit_transitions_total", "Circuit state transitions");
    describe_counter!("circuit_calls_total", "Invocations by outcome");
    describe_gauge!("circuit_state", "Current state: 0=closed, 1=half-open, 2=open");
}

/// Gauge value for a state.
pub fn state_value(state: CircuitState) -> f64 {
    match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    }
}

/// Circuit listener that records events as metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsListener;

impl CircuitListener for MetricsListener {
    fn on_event(&self, event: &CircuitEvent) {
        let circuit = event.key().to_string();
        match event {
            CircuitEvent::Registered { .. } => {
                gauge!("circuit_state", "circuit" => circuit).set(state_value(CircuitState::Closed));
            }
            CircuitEvent::StateChanged { from, to, .. } => {
                counter!(
                    "circuit_transitions_total",
                    "circuit" => circuit.clone(),
                    "from" => from.as_str(),
                    "to" => to.as_str()
                )
                .increment(1);
                gauge!("circuit_state", "circuit" => circuit).set(state_value(*to));
            }
            CircuitEvent::Success { .. } => {
                counter!("circuit_calls_total", "circuit" => circuit, "outcome" => "success").increment(1);
            }
            CircuitEvent::Failure { .. } => {
                counter!("circuit_calls_total", "circuit" => circuit, "outcome" => "failure").increment(1);
            }
            CircuitEvent::Rejected { .. } => {
                counter!("circuit_calls_total", "circuit" => circuit, "outcome" => "rejected").increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_values() {
        assert_eq!(state_value(CircuitState::Closed), 0.0);
        assert_eq!(state_value(CircuitState::HalfOpen), 1.0);
        assert_eq!(state_value(CircuitState::Open), 2.0);
    }

    #[test]
    fn test_listener_without_recorder() {
        // No recorder installed: recording must be a silent no-op.
        let listener = MetricsListener;
        listener.on_event(&CircuitEvent::StateChanged {
            key: "inventory".into(),
            from: CircuitState::Closed,
            to: CircuitState::Open,
        });
        listener.on_event(&CircuitEvent::Rejected { key: "inventory".into() });
    }

    #[test]
    fn test_registered_circuit_exports_closed_gauge() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            MetricsListener.on_event(&CircuitEvent::Registered { key: "orders".into() });
        });

        let rendered = handle.render();
        assert!(
            rendered.contains(r#"circuit_state{circuit="orders"} 0"#),
            "{rendered}"
        );
    }
}
