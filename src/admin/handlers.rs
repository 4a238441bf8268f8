use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::resilience::{CircuitSnapshot, CircuitState};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub circuits: usize,
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshots = state.registry.snapshots();
    let count = |s: CircuitState| snapshots.iter().filter(|c| c.state == s).count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        circuits: snapshots.len(),
        closed: count(CircuitState::Closed),
        open: count(CircuitState::Open),
        half_open: count(CircuitState::HalfOpen),
    })
}

pub async fn list_circuits(State(state): State<AdminState>) -> Json<Vec<CircuitSnapshot>> {
    Json(state.registry.snapshots())
}

pub async fn get_circuit(
    State(state): State<AdminState>,
    Path(key): Path<String>,
) -> Result<Json<CircuitSnapshot>, StatusCode> {
    state
        .registry
        .snapshot(&key)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn reset_circuit(
    State(state): State<AdminState>,
    Path(key): Path<String>,
) -> Result<Json<CircuitSnapshot>, StatusCode> {
    if !state.registry.reset(&key) {
        return Err(StatusCode::NOT_FOUND);
    }
    tracing::info!(circuit = %key, "Circuit reset via admin API");
    state
        .registry
        .snapshot(&key)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
