//! Gateway HTTP server.
//!
//! # Responsibilities
//! - Build one Axum sub-router per configured route
//! - Register each route's circuit with its merged options and fallback
//! - Guard every route with the circuit breaker middleware
//! - Forward requests to the upstream with a per-request deadline
//! - Serve until the shutdown signal fires

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::{GatewayConfig, RouteConfig};
use crate::http::middleware::{
    circuit_breaker_middleware, with_static_fallback, CircuitGuard, HttpCircuitOptions,
    HttpCircuits,
};

/// Upstream target injected into the proxy handler.
#[derive(Clone)]
struct Upstream {
    base: Arc<str>,
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

/// HTTP gateway protecting upstream routes with circuit breakers.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
    registry: Arc<HttpCircuits>,
}

impl GatewayServer {
    /// Create a gateway and register a circuit for every route.
    pub fn new(config: GatewayConfig, registry: Arc<HttpCircuits>) -> Self {
        let router = Self::build_router(&config, &registry);
        Self {
            router,
            config,
            registry,
        }
    }

    fn build_router(config: &GatewayConfig, registry: &Arc<HttpCircuits>) -> Router {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        let timeout = Duration::from_secs(config.timeouts.request_secs);

        let mut router = Router::new();
        for route in &config.routes {
            let options = route_options(config, route);
            registry.register(route.circuit_key(), options.clone());

            let upstream = Upstream {
                base: route.upstream.trim_end_matches('/').into(),
                client: client.clone(),
                timeout,
            };
            let (exact, wildcard) = route_paths(&route.path_prefix);
            let protected = Router::new()
                .route(&exact, any(proxy_handler))
                .route(&wildcard, any(proxy_handler))
                .route_layer(middleware::from_fn_with_state(
                    CircuitGuard::new(registry.clone(), options),
                    circuit_breaker_middleware,
                ))
                .with_state(upstream);
            router = router.merge(protected);

            tracing::info!(
                route = %route.name,
                prefix = %route.path_prefix,
                upstream = %route.upstream,
                circuit = %route.circuit_key(),
                "Route configured"
            );
        }

        router
            .fallback(|| async { (StatusCode::NOT_FOUND, "No matching route found") })
            .layer(TraceLayer::new_for_http())
    }

    /// The assembled router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn registry(&self) -> &Arc<HttpCircuits> {
        &self.registry
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.config.routes.len(),
            circuits = self.registry.len(),
            "Gateway listening"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Gateway received shutdown signal");
            })
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Options for a route's circuit: `[[circuits]]` overrides plus the route fallback.
pub fn route_options(config: &GatewayConfig, route: &RouteConfig) -> HttpCircuitOptions {
    let key = route.circuit_key();
    let options = config
        .circuit(key)
        .map(HttpCircuitOptions::from)
        .unwrap_or_default()
        .with_key(key);

    match &route.fallback {
        Some(fallback) => with_static_fallback(options, fallback),
        None => options,
    }
}

/// Axum paths for a prefix: the prefix itself and everything below it.
fn route_paths(prefix: &str) -> (String, String) {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        ("/".to_string(), "/{*rest}".to_string())
    } else {
        (trimmed.to_string(), format!("{trimmed}/{{*rest}}"))
    }
}

/// Forward the request to the route's upstream.
async fn proxy_handler(State(upstream): State<Upstream>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let uri: Uri = match format!("{}{}", upstream.base, path_and_query).parse() {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(upstream = %upstream.base, error = %e, "Failed to build upstream URI");
            return (StatusCode::BAD_GATEWAY, "Invalid upstream URI").into_response();
        }
    };

    let mut builder = Request::builder().method(parts.method.clone()).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            if name != header::HOST {
                headers.append(name.clone(), value.clone());
            }
        }
    }
    let request = match builder.body(body) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build upstream request");
            return (StatusCode::BAD_GATEWAY, "Invalid upstream request").into_response();
        }
    };

    match tokio::time::timeout(upstream.timeout, upstream.client.request(request)).await {
        Ok(Ok(response)) => {
            let (parts, body): (_, hyper::body::Incoming) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Ok(Err(e)) => {
            tracing::warn!(upstream = %upstream.base, error = %e, "Upstream request failed");
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
        Err(_) => {
            tracing::warn!(upstream = %upstream.base, timeout = ?upstream.timeout, "Upstream request timed out");
            (StatusCode::GATEWAY_TIMEOUT, "Upstream request timed out").into_response()
        }
    }
}
