//! tripwire gateway
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request      ┌──────────────────────────────────────────────────┐
//!     ────────────────────┼─▶ route ─▶ circuit middleware ─▶ proxy handler ──┼──▶ Upstream
//!                         │                  │                               │
//!                         │                  ▼                               │
//!                         │          CircuitRegistry ──▶ listeners (metrics) │
//!                         │                  ▲                               │
//!     Admin / CLI ────────┼──────────── admin API                            │
//!                         └──────────────────────────────────────────────────┘
//! ```
//!
//! Open circuits answer 503 (or the route's fallback) without reaching the upstream.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use tripwire::admin::{serve_admin, AdminState};
use tripwire::config::{load_config, GatewayConfig};
use tripwire::http::middleware::{HttpCircuitOptions, HttpCircuits};
use tripwire::http::GatewayServer;
use tripwire::lifecycle::{wait_for_signal, Shutdown};
use tripwire::observability::{logging::init_logging, metrics::init_metrics, metrics::MetricsListener};

#[derive(Parser)]
#[command(name = "tripwire")]
#[command(about = "HTTP gateway guarding upstreams with circuit breakers", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level.
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(level) = args.log_level {
        config.observability.log_level = level;
    }

    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tripwire starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        circuits = config.circuits.len(),
        failure_threshold = config.defaults.failure_threshold,
        success_threshold = config.defaults.success_threshold,
        reset_timeout_ms = config.defaults.reset_timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(HttpCircuits::new(config.defaults.clone()));
    registry.subscribe(MetricsListener);

    let shutdown = Shutdown::default();
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = GatewayServer::new(config.clone(), registry.clone());

    // Circuits not attached to a route; route circuits are already registered with their fallbacks.
    for settings in &config.circuits {
        registry.register(settings.key.clone(), HttpCircuitOptions::from(settings));
    }

    let mut tasks = tokio::task::JoinSet::new();
    tasks.spawn(server.run(listener, shutdown.subscribe()));

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(registry.clone(), config.admin.api_key.as_str());
        tasks.spawn(serve_admin(admin_listener, state, shutdown.subscribe()));
    }

    tokio::select! {
        _ = wait_for_signal() => {}
        Some(result) = tasks.join_next() => {
            // A server exited on its own; bring the rest down.
            if let Ok(Err(e)) = result {
                tracing::error!(error = %e, "Server exited with error");
            }
        }
    }

    shutdown.trigger();
    let drained = tokio::time::timeout(shutdown.grace(), async {
        while let Some(result) = tasks.join_next().await {
            if let Ok(Err(e)) = result {
                tracing::error!(error = %e, "Server exited with error");
            }
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!(grace = ?shutdown.grace(), "Shutdown deadline reached, aborting remaining tasks");
        tasks.abort_all();
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
