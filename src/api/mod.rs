//! HTTP and WebSocket surface
//!
//! # Endpoints
//!
//! ## WebSocket
//! - `GET /ws` - Controller session (command protocol + status broadcasts)
//! - `GET /ingest` - Producer session (camera frames)
//!
//! ## Links
//! - `POST /api/v1/links` - Establish a managed link
//! - `GET /api/v1/links` - List links
//! - `GET /api/v1/links/:id` - Link status
//! - `DELETE /api/v1/links/:id` - Disconnect a link
//!
//! ## Sessions
//! - `GET /api/v1/sessions` - Connected controllers and producers
//!
//! ## Health
//! - `GET /health/live` - Liveness check
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use airlink::api::{serve, AppState};
//! use airlink::config::Config;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = Arc::new(AppState::new(Config::load_default()));
//!     serve(state).await?;
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
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::control::control_socket;
use crate::ingest::ingest_socket;
use crate::session::CloseReason;

/// Build the router with all routes and middleware
pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/links", post(routes::links::create_link).get(routes::links::list_links))
        .route(
            "/links/:id",
            get(routes::links::get_link).delete(routes::links::delete_link),
        )
        .route("/sessions", get(routes::sessions::list_sessions));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::full_health));

    Router::new()
        .route("/ws", get(control_socket))
        .route("/ingest", get(ingest_socket))
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the server until a shutdown signal arrives.
///
/// Shutdown stops accepting connections, lets the broadcast loop finish its
/// current tick, closes every session and waits up to
/// `server.shutdown_grace_secs` for session tasks to drain.
pub async fn serve(state: Arc<AppState>) -> Result<(), ApiError> {
    let addr = state.config.server.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        display_mode = state.config.camera.display_mode.as_str(),
        camera = state.config.camera.enabled,
        "airlink listening"
    );

    let scheduler = tokio::spawn(Arc::clone(&state.scheduler).run(state.shutdown.clone()));
    let purger = tokio::spawn(purge_admission(Arc::clone(&state)));
    tokio::spawn(cancel_on_signal(state.shutdown.clone()));

    let router = build_router(Arc::clone(&state));
    let served = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(state.shutdown.clone().cancelled_owned())
    .await;

    // Also reached when the server fails on its own
    state.shutdown.cancel();

    let controllers = state.controllers.close_all(CloseReason::GoingAway).await;
    let producers = state.producers.close_all(CloseReason::GoingAway).await;
    tracing::info!(controllers, producers, "Closing sessions");

    state.tasks.close();
    let grace = Duration::from_secs(state.config.server.shutdown_grace_secs);
    if tokio::time::timeout(grace, state.tasks.wait()).await.is_err() {
        tracing::warn!(
            remaining = state.tasks.len(),
            grace_secs = grace.as_secs(),
            "Sessions still open after grace period"
        );
    }
    if tokio::time::timeout(grace, scheduler).await.is_err() {
        tracing::warn!("Broadcast scheduler did not stop within grace period");
    }
    purger.abort();

    served.map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;
    tracing::info!("airlink shut down gracefully");
    Ok(())
}

/// Drop rate limiter entries for sources that went quiet
async fn purge_admission(state: Arc<AppState>) {
    let period = state.admission.window().max(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = tokio::time::sleep(period) => {
                let purged = state.admission.purge_idle();
                if purged > 0 {
                    tracing::debug!(purged, "Purged idle rate limit entries");
                }
            }
        }
    }
}

async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        _ = shutdown_signal() => token.cancel(),
        _ = token.cancelled() => {}
    }
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
