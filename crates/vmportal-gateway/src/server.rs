// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use vmportal_config::model::{AuthConfig, ServerConfig};
use vmportal_console::ConsoleBroker;
use vmportal_core::{Clock, HypervisorClient, PortalError, PortalStore};
use vmportal_security::RateLimiter;

use crate::auth::auth_middleware;
use crate::handlers;
use crate::upstream::UpstreamConsole;
use crate::ws;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub broker: Arc<ConsoleBroker>,
    pub hypervisor: Arc<dyn HypervisorClient>,
    pub store: Arc<dyn PortalStore>,
    pub clock: Arc<dyn Clock>,
    /// Per-user limits on console session creation and power actions.
    pub limiter: Arc<RateLimiter>,
    pub upstream: Arc<UpstreamConsole>,
    pub auth: AuthConfig,
    pub health: HealthState,
    /// Cancelled on process shutdown; parent of every relay's token.
    pub shutdown: CancellationToken,
}

/// Build the application router.
///
/// - GET /health, GET /metrics (public)
/// - POST /api/console-session, GET /api/vms, POST /api/vms/{id}/power/{action}
/// - GET /ws/console/{session_id}
///
/// Everything but the public routes goes through [`auth_middleware`].
pub fn router(state: GatewayState, allowed_origins: &[String]) -> Router {
    // Unauthenticated public routes (health + metrics for systemd and Prometheus).
    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route("/metrics", get(handlers::get_public_metrics))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/api/console-session", post(handlers::create_console_session))
        .route("/api/vms", get(handlers::list_vms))
        .route("/api/vms/{id}/power/{action}", post(handlers::power_action))
        .route("/ws/console/{session_id}", get(ws::console_ws_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http());

    match cors_layer(allowed_origins) {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

/// CORS for the configured origins; `None` keeps the API same-origin.
fn cors_layer(allowed_origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    )
}

/// Serve the gateway until `state.shutdown` is cancelled.
pub async fn start_server(config: &ServerConfig, state: GatewayState) -> Result<(), PortalError> {
    let shutdown = state.shutdown.clone();
    let app = router(state, &config.allowed_origins);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PortalError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| PortalError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_state(
    h: &vmportal_test_utils::TestHarness,
    upstream_base: &str,
) -> GatewayState {
    use std::time::Duration;
    use vmportal_console::MemorySessionStore;

    GatewayState {
        broker: Arc::new(ConsoleBroker::new(
            h.hypervisor.clone(),
            Arc::new(MemorySessionStore::new()),
            h.clock.clone(),
            chrono::Duration::minutes(5),
        )),
        hypervisor: h.hypervisor.clone(),
        store: h.store.clone(),
        clock: h.clock.clone(),
        limiter: Arc::new(RateLimiter::new(
            3,
            chrono::Duration::minutes(1),
            h.clock.clone(),
        )),
        upstream: Arc::new(
            UpstreamConsole::new(upstream_base, false, Duration::from_secs(2)).unwrap(),
        ),
        auth: AuthConfig {
            proxy_secret: Some("test-secret".to_string()),
            ..AuthConfig::default()
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
            prometheus_render: None,
        },
        shutdown: CancellationToken::new(),
    }
}
