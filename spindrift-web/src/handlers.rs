//! API handlers for stream requests and session management

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::json;
use spindrift_core::orchestrator::{StreamError, StreamOutcome, StreamRequest};

use crate::server::AppState;

/// Request body for `POST /api/stream`.
#[derive(Debug, Deserialize)]
pub struct StreamBody {
    /// Magnet link to stream; required
    pub magnet: Option<String>,
}

/// Submit a streaming request.
///
/// Returns `{ "url": ... }` on success; `{ "error": ..., "details"?: ... }`
/// with 400 for input errors and 500 for allocation, launch, timeout, or
/// tunnel failures.
pub async fn api_stream(
    State(state): State<AppState>,
    Json(body): Json<StreamBody>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(magnet) = body.magnet.filter(|m| !m.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Magnet link required" })),
        );
    };

    let outcome = state.orchestrator.handle(&StreamRequest { magnet }).await;

    match outcome {
        StreamOutcome::Success { url } => (StatusCode::OK, Json(json!({ "url": url }))),
        StreamOutcome::Failure { error } => {
            let status = if error.is_user_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(failure_body(&error)))
        }
    }
}

/// Health and uptime snapshot.
pub async fn api_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "active_sessions": state.orchestrator.registry().active_count().await,
    }))
}

/// List active stream sessions.
pub async fn api_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.orchestrator.registry().active_sessions().await;
    Json(json!({
        "total": sessions.len(),
        "sessions": sessions,
    }))
}

/// Terminate the session on a port and free it.
pub async fn api_stop_session(
    State(state): State<AppState>,
    Path(port): Path<u16>,
) -> (StatusCode, Json<serde_json::Value>) {
    if state.orchestrator.registry().shutdown(port).await {
        (StatusCode::OK, Json(json!({ "stopped": port })))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no active session on port {port}") })),
        )
    }
}

fn failure_body(error: &StreamError) -> serde_json::Value {
    match error.diagnostic() {
        Some(details) => json!({ "error": error.to_string(), "details": details }),
        None => json!({ "error": error.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use axum::body::Body;
    use axum::http::Request;
    use spindrift_core::config::SpindriftConfig;
    use spindrift_core::orchestrator::StreamOrchestrator;
    use spindrift_core::process::{ProcessScript, ScriptedSpawner};
    use tower::ServiceExt;

    use super::*;
    use crate::server::build_router;

    const VALID_MAGNET: &str = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567";

    fn test_state(spawner: ScriptedSpawner) -> AppState {
        let mut config = SpindriftConfig::for_testing();
        config.streamer.executable = "fake-streamer".to_string();
        config.tunnel.executable = "fake-tunnel".to_string();

        AppState {
            orchestrator: Arc::new(StreamOrchestrator::new(config, Arc::new(spawner))),
            started_at: Instant::now(),
        }
    }

    fn announcing_spawner() -> ScriptedSpawner {
        ScriptedSpawner::new().with_script(
            "fake-tunnel",
            ProcessScript::new().stdout_chunk(
                Duration::from_millis(10),
                "your url is: https://abc123.loca.lt\n",
            ),
        )
    }

    async fn post_stream(state: AppState, body: &str) -> (StatusCode, serde_json::Value) {
        let app = build_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/stream")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_stream_success_returns_url() {
        let state = test_state(announcing_spawner());
        let body = format!(r#"{{"magnet":"{VALID_MAGNET}"}}"#);

        let (status, json) = post_stream(state, &body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["url"], "https://abc123.loca.lt");
    }

    #[tokio::test]
    async fn test_missing_magnet_is_client_error() {
        let state = test_state(ScriptedSpawner::new());

        let (status, json) = post_stream(state, "{}").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Magnet link required");
    }

    #[tokio::test]
    async fn test_malformed_magnet_is_client_error() {
        let state = test_state(ScriptedSpawner::new());

        let (status, json) = post_stream(state, r#"{"magnet":"not-a-magnet"}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("invalid input"));
    }

    #[tokio::test]
    async fn test_tunnel_timeout_is_server_error() {
        // No script: the tunnel stays silent and the request times out
        let state = test_state(ScriptedSpawner::new());
        let body = format!(r#"{{"magnet":"{VALID_MAGNET}"}}"#);

        let (status, json) = post_stream(state, &body).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            json["error"]
                .as_str()
                .unwrap()
                .contains("did not report a URL")
        );
    }

    #[tokio::test]
    async fn test_health_reports_sessions() {
        let state = test_state(announcing_spawner());
        let response = api_health(State(state)).await;

        assert_eq!(response.0["status"], "ok");
        assert_eq!(response.0["active_sessions"], 0);
    }

    #[tokio::test]
    async fn test_stop_unknown_session_is_not_found() {
        let state = test_state(ScriptedSpawner::new());
        let (status, _) = api_stop_session(State(state), Path(19999)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
