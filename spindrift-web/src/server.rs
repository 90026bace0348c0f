//! API server wiring for Spindrift
//!
//! Builds the axum router and selects the process spawner for the runtime
//! mode: real binaries in production, scripted stand-ins in development.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{delete, get, post};
use spindrift_core::config::SpindriftConfig;
use spindrift_core::mode::RuntimeMode;
use spindrift_core::orchestrator::StreamOrchestrator;
use spindrift_core::process::{ProcessSpawner, ScriptedSpawner, TokioProcessSpawner};
use tower_http::cors::CorsLayer;

use crate::handlers::{api_health, api_sessions, api_stop_session, api_stream};

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Orchestrator handling stream requests and owning the session registry
    pub orchestrator: Arc<StreamOrchestrator>,
    /// Server start time, for uptime reporting
    pub started_at: Instant,
}

/// Build the API router over the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/stream", post(api_stream))
        .route("/api/health", get(api_health))
        .route("/api/sessions", get(api_sessions))
        .route("/api/sessions/{port}", delete(api_stop_session))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the API server until interrupted.
///
/// On shutdown every live session's processes are terminated through the
/// registry, so nothing outlives the server untracked.
///
/// # Errors
/// Returns an error if the listen address cannot be bound or the server
/// fails while running.
pub async fn run_server(
    config: SpindriftConfig,
    mode: RuntimeMode,
) -> Result<(), Box<dyn std::error::Error>> {
    let spawner: Arc<dyn ProcessSpawner> = match mode {
        RuntimeMode::Production => Arc::new(TokioProcessSpawner),
        RuntimeMode::Development => Arc::new(ScriptedSpawner::development(&config)),
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let orchestrator = Arc::new(StreamOrchestrator::new(config, spawner));
    let state = AppState {
        orchestrator: orchestrator.clone(),
        started_at: Instant::now(),
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Spindrift API listening on http://{} ({})", addr, mode);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down; terminating active sessions");
    orchestrator.registry().shutdown_all().await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
