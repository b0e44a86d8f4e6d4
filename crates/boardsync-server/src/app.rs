//! Application builder — wires router + middleware + state into an Axum app.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use boardsync_core::config::AppConfig;
use boardsync_core::error::AppError;

use crate::hub::BroadcastHub;
use crate::sweeper::run_sweeper;
use crate::ws;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// The broadcast hub.
    pub hub: Arc<BroadcastHub>,
}

/// Builds the Axum application with all routes and middleware.
pub fn build_app(hub: Arc<BroadcastHub>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/health", get(health))
        .with_state(AppState { hub })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// GET /api/health — liveness probe
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Runs the broadcast server until an interrupt signal arrives.
///
/// Nothing in this subsystem persists; restarting the process drops all
/// presence and connection state.
pub async fn run_server(config: AppConfig) -> Result<(), AppError> {
    let hub = Arc::new(BroadcastHub::new(config.realtime.clone()));
    let app = build_app(hub.clone());

    tokio::spawn(run_sweeper(hub.clone()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Broadcast server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    Ok(())
}

async fn shutdown_signal(hub: Arc<BroadcastHub>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("Interrupt received, shutting down");
    hub.shutdown();
}
