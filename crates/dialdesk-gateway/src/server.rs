//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use dialdesk_core::config::GatewayConfig;
use dialdesk_scheduler::{NotifyRouter, WorklistEngine};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub gateway_config: GatewayConfig,
    pub start_time: std::time::Instant,
    /// Worklist engine: ordering, countdowns and operator actions.
    pub engine: Arc<WorklistEngine>,
    /// Reminder history for the dashboard.
    pub notifications: Arc<NotifyRouter>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    Router::new()
        .route("/health", get(super::routes::health_check))
        .route("/api/v1/info", get(super::routes::system_info))
        .route("/api/v1/worklist", get(super::routes::worklist))
        .route("/api/v1/notifications", get(super::routes::notifications))
        .route("/api/v1/refresh", post(super::routes::refresh))
        .route(
            "/api/v1/leads/{id}/connected",
            post(super::routes::mark_connected),
        )
        .route(
            "/api/v1/leads/{id}/not-connected",
            post(super::routes::mark_not_connected),
        )
        .route(
            "/api/v1/leads/{id}/schedule",
            post(super::routes::schedule_call),
        )
        .route(
            "/api/v1/leads/{id}/complete",
            post(super::routes::complete_call),
        )
        .route("/api/v1/calls/{id}", delete(super::routes::delete_call))
        .layer(
            CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .allow_origin(Any)
                .max_age(std::time::Duration::from_secs(3600)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Bind and serve until `shutdown` resolves.
pub async fn start(
    config: &GatewayConfig,
    engine: Arc<WorklistEngine>,
    notifications: Arc<NotifyRouter>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let state = AppState {
        gateway_config: config.clone(),
        start_time: std::time::Instant::now(),
        engine,
        notifications,
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
