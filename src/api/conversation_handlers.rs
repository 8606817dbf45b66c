//! Conversation lifecycle handlers

use super::handlers::{json_body, path_param, ApiState, AppError};
use crate::conversation::{
    ConfirmationResult, ConversationSnapshot, ConversationState, EndOutcome, InputResult,
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/response bodies
// ============================================================================

fn default_true() -> bool {
    true
}

/// Body of `POST /conversation/input/{id}`
#[derive(Debug, Deserialize)]
pub struct InputRequest {
    pub text: String,
    #[serde(default = "default_true")]
    pub include_graph_context: bool,
}

/// Body of `POST /conversation/confirm/{id}`
#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub confirmed: bool,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub conversation_id: Uuid,
    pub status: &'static str,
    pub conversation_state: ConversationState,
}

#[derive(Debug, Serialize)]
pub struct EndResponse {
    pub conversation_id: Uuid,
    pub status: EndOutcome,
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a new conversation
pub async fn start_conversation(State(state): State<ApiState>) -> Json<StartResponse> {
    let snapshot = state.conversations.start().await;
    Json(StartResponse {
        conversation_id: snapshot.conversation_id,
        status: "started",
        conversation_state: snapshot.state,
    })
}

/// Submit user input for analysis
pub async fn submit_input(
    State(state): State<ApiState>,
    conversation_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<InputRequest>, JsonRejection>,
) -> Result<Json<InputResult>, AppError> {
    let conversation_id = path_param(conversation_id)?;
    let req = json_body(payload)?;
    let result = state
        .conversations
        .submit_input(conversation_id, &req.text, req.include_graph_context)
        .await?;
    Ok(Json(result))
}

/// Accept or reject the pending proposal
pub async fn confirm(
    State(state): State<ApiState>,
    conversation_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Result<Json<ConfirmationResult>, AppError> {
    let conversation_id = path_param(conversation_id)?;
    let req = json_body(payload)?;
    let result = state
        .conversations
        .confirm(conversation_id, req.confirmed)
        .await?;
    Ok(Json(result))
}

/// Get a conversation snapshot
pub async fn get_conversation(
    State(state): State<ApiState>,
    conversation_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ConversationSnapshot>, AppError> {
    let conversation_id = path_param(conversation_id)?;
    Ok(Json(state.conversations.get(conversation_id).await?))
}

/// End a conversation
pub async fn end_conversation(
    State(state): State<ApiState>,
    conversation_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<EndResponse>, AppError> {
    let conversation_id = path_param(conversation_id)?;
    let status = state.conversations.end(conversation_id).await?;
    Ok(Json(EndResponse {
        conversation_id,
        status,
    }))
}
