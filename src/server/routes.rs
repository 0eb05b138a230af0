//! Axum route handlers for the talk2api HTTP server.
//!
//! # Routes
//!
//! - `GET  /health`   - Returns `{"status": "ok", "version": ..., "service": "talk2api"}`
//! - `GET  /state`    - Router state and current tools
//! - `POST /discover` - `{"query": ...}` → `discover_and_create_agent`
//! - `POST /execute`  - `{"request": ...}` → `call_execution_agent`
//! - `POST /reset`    - `reset_execution_agent`
//! - `POST /chat`     - `{"message": ...}` → assistant loop

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::assistant::{Assistant, AssistantReply};
use crate::router::{DiscoverResponse, ExecuteResponse, RequestRouter, ResetResponse};

/// Shared application state for the HTTP server.
#[derive(Clone, Debug)]
pub struct AppState {
    pub router: Arc<RequestRouter>,
    /// Absent when no model is configured; `/chat` then answers 503.
    pub assistant: Option<Arc<Assistant>>,
}

impl AppState {
    pub fn new(router: Arc<RequestRouter>) -> Self {
        Self {
            router,
            assistant: None,
        }
    }

    pub fn with_assistant(mut self, assistant: Arc<Assistant>) -> Self {
        self.assistant = Some(assistant);
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub request: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub state: crate::router::RouterState,
    pub tools: Vec<String>,
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/state", get(state_handler))
        .route("/discover", post(discover_handler))
        .route("/execute", post(execute_handler))
        .route("/reset", post(reset_handler))
        .route("/chat", post(chat_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health - liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "talk2api",
    }))
}

async fn state_handler(State(state): State<AppState>) -> Json<StateResponse> {
    Json(StateResponse {
        state: state.router.state(),
        tools: state.router.current_tools(),
    })
}

async fn discover_handler(
    State(state): State<AppState>,
    Json(body): Json<DiscoverRequest>,
) -> Json<DiscoverResponse> {
    Json(state.router.discover_and_create_agent(&body.query).await)
}

/// POST /execute - always 200; failures are carried in the body shape.
async fn execute_handler(
    State(state): State<AppState>,
    Json(body): Json<ExecuteRequest>,
) -> Json<ExecuteResponse> {
    Json(state.router.call_execution_agent(&body.request).await)
}

async fn reset_handler(State(state): State<AppState>) -> Json<ResetResponse> {
    Json(state.router.reset_execution_agent().await)
}

/// POST /chat - run the assistant loop for one user message.
async fn chat_handler(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<AssistantReply>, (StatusCode, Json<Value>)> {
    let assistant = state.assistant.as_ref().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "No assistant model configured"})),
        )
    })?;

    assistant.respond(&body.message).await.map(Json).map_err(|e| {
        tracing::error!(error = %e, "Assistant failed");
        (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({"error": format!("Assistant failed: {}", e)})),
        )
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
