//! Admin API.
//!
//! # Endpoints
//! - `GET  /admin/status`: version and circuit counts by state
//! - `GET  /admin/circuits`: snapshot of every registered circuit
//! - `GET  /admin/circuits/{key}`: snapshot of one circuit
//! - `POST /admin/circuits/{key}/reset`: force a circuit closed
//!
//! Every endpoint requires `Authorization: Bearer <api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::middleware::HttpCircuits;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<HttpCircuits>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(registry: Arc<HttpCircuits>, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            registry,
            api_key: api_key.into(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/circuits", get(list_circuits))
        .route("/admin/circuits/{key}", get(get_circuit))
        .route("/admin/circuits/{key}/reset", post(reset_circuit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}

/// Serve the admin API on `listener` until `shutdown` fires.
pub async fn serve_admin(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
