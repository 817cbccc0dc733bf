//! Sketchroom HTTP API
//!
//! HTTP layer for Sketchroom, built with Axum.
//!
//! # Endpoints
//!
//! ## Analysis
//! - `POST /api/v1/analyze` - Submit a canvas snapshot (result is broadcast)
//! - `POST /analyze` - Same, at the path the whiteboard client posts to
//! - `GET /api/v1/analyze/:id` - Status of a submitted analysis
//!
//! ## Clients
//! - `GET /api/v1/clients` - Connected clients
//!
//! ## Health
//! - `GET /` - Greeting
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /ws` - Realtime drawing channel
//! - `GET /ws/:label` - Same, with a client-chosen display label
//!
//! # Example
//!
//! ```rust,ignore
//! use sketchroom::api::{serve, AppState};
//! use sketchroom::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let state = AppState::new(&config)?;
//!     serve(state, &config.server).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::websocket::{labeled_websocket_handler, websocket_handler};

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    let api_routes = Router::new()
        // Analysis routes - snapshots are large data URLs
        .route("/analyze", post(routes::analyze::submit_analysis))
        .route("/analyze/:id", get(routes::analyze::get_analysis))
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        // Client routes
        .route("/clients", get(routes::clients::list_clients));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .route("/", get(routes::health::root))
        .route(
            "/analyze",
            post(routes::analyze::submit_analysis)
                .layer(DefaultBodyLimit::max(server.max_body_bytes)),
        )
        .route("/ws", get(websocket_handler))
        .route("/ws/:label", get(labeled_websocket_handler))
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&server.cors_origins))
        .with_state(shared_state)
}

/// CORS for the configured origins; permissive when none are configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the API server
pub async fn serve(state: AppState, server: &ServerConfig) -> Result<(), ApiError> {
    let router = build_router(state, server);

    let addr = server.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Sketchroom listening on {}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Sketchroom shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
