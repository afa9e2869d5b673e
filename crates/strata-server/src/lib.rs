//! # strata-server
//!
//! HTTP API for the Strata agent. Every handler hands its work to the
//! [`AgentBridge`] with the configured request timeout, so a slow model
//! never holds a server worker past the deadline.
//!
//! - `GET /health`
//! - `POST /chat`, `POST /chat/simple`
//! - `PUT /users/{user_id}/memory/{key}`, `DELETE /users/{user_id}/memory`
//! - `DELETE /sessions/{session_id}`

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use strata_config::ServerConfig;
use strata_core::{MemoryType, StrataError};
use strata_runtime::{Agent, AgentBridge, AgentRequest, BridgeError, ReasoningMode};

/// Shared server state.
pub struct AppState {
    pub bridge: Arc<AgentBridge>,
    /// Deadline for every bridged request.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(bridge: Arc<AgentBridge>, request_timeout: Duration) -> Self {
        Self {
            bridge,
            request_timeout,
        }
    }
}

// ── Wire types ─────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
    user_id: Option<String>,
    mode: Option<String>,
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct SimpleChatParams {
    query: String,
    user_id: Option<String>,
    mode: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    query: String,
}

#[derive(Deserialize)]
struct MemoryUpdate {
    value: String,
    memory_type: Option<String>,
}

// ── Errors ─────────────────────────────────────────────────────

/// A failed request: status code plus a short message for the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        let (status, message) = match &err {
            BridgeError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "request timed out".to_string()),
            BridgeError::Overloaded => (StatusCode::SERVICE_UNAVAILABLE, "agent is busy".to_string()),
            BridgeError::Closed => (StatusCode::SERVICE_UNAVAILABLE, "agent is not running".to_string()),
            BridgeError::Job(StrataError::InvalidRequest(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            BridgeError::Init(_) | BridgeError::Job(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "agent request failed".to_string())
            }
        };
        if status.is_server_error() {
            warn!(error = %err, %status, "request failed");
        }
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

fn parse_mode(mode: Option<&str>) -> Result<Option<ReasoningMode>, ApiError> {
    mode.filter(|m| !m.trim().is_empty())
        .map(ReasoningMode::parse)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

// ── Router ─────────────────────────────────────────────────────

pub fn build_router(config: &ServerConfig, state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/chat/simple", post(chat_simple_handler))
        .route("/users/{user_id}/memory/{key}", put(update_memory_handler))
        .route("/users/{user_id}/memory", delete(clear_user_memory_handler))
        .route("/sessions/{session_id}", delete(clear_session_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.cors {
        router = router.layer(CorsLayer::permissive());
    }
    router
}

/// Serve until `shutdown` is cancelled.
pub async fn start_server(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> strata_core::Result<()> {
    let router = build_router(config, state);
    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .map_err(|e| StrataError::Config(format!("failed to bind {}: {e}", config.listen)))?;
    info!(listen = %config.listen, "starting HTTP server");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

// ── Handlers ───────────────────────────────────────────────────

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "strata-agent",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn run_chat(state: &AppState, request: AgentRequest) -> Result<Json<ChatResponse>, ApiError> {
    let query = request.query.clone();
    let answer = state
        .bridge
        .submit_async(
            move |agent: Arc<Agent>| async move { agent.process_query(request).await },
            state.request_timeout,
        )
        .await?;
    Ok(Json(ChatResponse { answer, query }))
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let request = AgentRequest {
        query: req.query,
        user_id: req.user_id.unwrap_or_default(),
        session_id: req.session_id,
        mode: parse_mode(req.mode.as_deref())?,
    };
    run_chat(&state, request).await
}

async fn chat_simple_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SimpleChatParams>,
) -> Result<Json<ChatResponse>, ApiError> {
    let request = AgentRequest {
        query: params.query,
        user_id: params.user_id.unwrap_or_default(),
        session_id: None,
        mode: parse_mode(params.mode.as_deref())?,
    };
    run_chat(&state, request).await
}

async fn update_memory_handler(
    State(state): State<Arc<AppState>>,
    Path((user_id, key)): Path<(String, String)>,
    Json(update): Json<MemoryUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let memory_type = match update.memory_type.as_deref() {
        Some(t) => t
            .parse::<MemoryType>()
            .map_err(|e| ApiError::bad_request(e.to_string()))?,
        None => MemoryType::default(),
    };
    let (job_user, job_key) = (user_id.clone(), key.clone());
    state
        .bridge
        .submit_async(
            move |agent: Arc<Agent>| async move {
                agent
                    .upsert_long_term(&job_user, &job_key, &update.value, memory_type)
                    .await
            },
            state.request_timeout,
        )
        .await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "user_id": user_id,
        "key": key,
        "memory_type": memory_type,
    })))
}

async fn clear_user_memory_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job_user = user_id.clone();
    let removed = state
        .bridge
        .submit_async(
            move |agent: Arc<Agent>| async move { agent.clear_long_term(&job_user).await },
            state.request_timeout,
        )
        .await?;
    Ok(Json(serde_json::json!({ "status": "ok", "user_id": user_id, "removed": removed })))
}

async fn clear_session_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job_session = session_id.clone();
    state
        .bridge
        .submit_async(
            move |agent: Arc<Agent>| async move {
                agent.clear_short_term(&job_session);
                Ok(())
            },
            state.request_timeout,
        )
        .await?;
    Ok(Json(serde_json::json!({ "status": "ok", "session_id": session_id })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_errors_map_to_status_codes() {
        let status = |e: BridgeError| ApiError::from(e).status();
        assert_eq!(status(BridgeError::Timeout(Duration::from_secs(1))), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status(BridgeError::Overloaded), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(BridgeError::Closed), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status(BridgeError::Job(StrataError::InvalidRequest("bad".into()))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(BridgeError::Job(StrataError::LlmProvider("quota".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn empty_mode_means_default() {
        assert_eq!(parse_mode(None).unwrap(), None);
        assert_eq!(parse_mode(Some("")).unwrap(), None);
        assert_eq!(parse_mode(Some("cot react")).unwrap(), Some(ReasoningMode::CotReact));
        assert_eq!(parse_mode(Some("guess")).unwrap_err().status(), StatusCode::BAD_REQUEST);
    }
}
