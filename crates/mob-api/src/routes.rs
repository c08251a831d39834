//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use mob_core::error::MobError;
use mob_core::MobConfig;

use crate::handlers;
use crate::state::AppState;

/// Largest request body accepted on any route.
pub const BODY_LIMIT: usize = 1024 * 1024;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/order", post(handlers::order))
        .route("/chat", post(handlers::chat))
        .route("/actions", get(handlers::actions))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the configured host and port.
pub async fn start_server(config: &MobConfig, state: AppState) -> Result<(), MobError> {
    let addr = format!("{}:{}", config.general.host, config.general.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MobError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| MobError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
