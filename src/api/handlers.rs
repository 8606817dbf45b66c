//! API request handlers

use crate::conversation::{ConversationError, ConversationManager, ErrorKind};
use crate::graph::RelatedQuery;
use crate::llm::{LanguageModel, LlmError};
use crate::neo4j::GraphStore;
use crate::UiConfig;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

/// Shared server state
pub struct ServerState {
    pub graph: Arc<dyn GraphStore>,
    pub conversations: Arc<ConversationManager>,
    /// Answers `/ai/*` requests; conversations hold their own handle
    pub model: Arc<dyn LanguageModel>,
    /// Client-facing UI settings
    pub ui: UiConfig,
    /// Traversal defaults for `/notes/{id}/related`
    pub related_defaults: RelatedQuery,
    /// Decay constant used when a request asks for recency
    pub recency_decay_days: f64,
}

/// Shared API state
pub type ApiState = Arc<ServerState>;

// ============================================================================
// Health check
// ============================================================================

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub neo4j: String,
    pub model: String,
    pub active_conversations: usize,
}

/// Health check handler, verifies actual connectivity to Neo4j.
///
/// Returns:
/// - 200 + `"ok"` if Neo4j is connected
/// - 503 + `"unhealthy"` if Neo4j is disconnected
pub async fn health(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let neo4j_ok = state.graph.health_check().await.unwrap_or(false);

    let http_status = if neo4j_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        http_status,
        Json(HealthResponse {
            status: if neo4j_ok { "ok" } else { "unhealthy" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            neo4j: if neo4j_ok {
                "connected".to_string()
            } else {
                "disconnected".to_string()
            },
            model: state.model.model_name().to_string(),
            active_conversations: state.conversations.active_count(),
        }),
    )
}

// ============================================================================
// Settings
// ============================================================================

/// UI settings for desktop and terminal clients
pub async fn get_ui_settings(State(state): State<ApiState>) -> Json<UiConfig> {
    Json(state.ui.clone())
}

// ============================================================================
// Request bodies
// ============================================================================

/// Unwrap a JSON body, reporting malformed bodies as 400
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Unwrap a path parameter, reporting malformed ids as 400
pub fn path_param<T>(param: Result<Path<T>, PathRejection>) -> Result<T, AppError> {
    param
        .map(|Path(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

// ============================================================================
// Error handling
// ============================================================================

/// API error type
#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Conversation(ConversationError),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, bool) {
        match self {
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", false),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", false),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", false),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict", false),
            AppError::Conversation(e) => {
                let (status, kind) = match e.kind() {
                    ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
                    ErrorKind::InvalidState => (StatusCode::CONFLICT, "invalid_state"),
                    ErrorKind::BadRequest => (StatusCode::BAD_REQUEST, "bad_request"),
                    ErrorKind::Upstream => (StatusCode::BAD_GATEWAY, "upstream"),
                    ErrorKind::UpstreamTimeout => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
                    ErrorKind::Schema => (StatusCode::UNPROCESSABLE_ENTITY, "schema"),
                    ErrorKind::Execution => (StatusCode::INTERNAL_SERVER_ERROR, "execution"),
                    ErrorKind::ExecutionTimeout => {
                        (StatusCode::GATEWAY_TIMEOUT, "execution_timeout")
                    }
                    ErrorKind::Abandoned => (StatusCode::CONFLICT, "abandoned"),
                    ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
                };
                (status, kind, e.is_retryable())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, kind, retryable) = self.parts();
        let message = match self {
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                e.to_string()
            }
            AppError::NotFound(msg) | AppError::BadRequest(msg) | AppError::Conflict(msg) => msg,
            AppError::Conversation(e) => e.to_string(),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "kind": kind,
            "retryable": retryable,
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<ConversationError> for AppError {
    fn from(err: ConversationError) -> Self {
        AppError::Conversation(err)
    }
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        AppError::Conversation(err.into())
    }
}
