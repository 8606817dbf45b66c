//! API route definitions

use super::ai_handlers;
use super::conversation_handlers;
use super::graph_handlers;
use super::handlers::{self, ApiState};
use super::note_handlers;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // ====================================================================
        // Conversations
        // ====================================================================
        .route(
            "/conversation/start",
            post(conversation_handlers::start_conversation),
        )
        .route(
            "/conversation/input/{conversation_id}",
            post(conversation_handlers::submit_input),
        )
        .route(
            "/conversation/confirm/{conversation_id}",
            post(conversation_handlers::confirm),
        )
        .route(
            "/conversation/{conversation_id}",
            get(conversation_handlers::get_conversation)
                .delete(conversation_handlers::end_conversation),
        )
        // ====================================================================
        // Notes, concepts, categories
        // ====================================================================
        .route(
            "/notes",
            get(note_handlers::list_notes).post(note_handlers::create_note),
        )
        .route(
            "/notes/{note_id}",
            get(note_handlers::get_note)
                .put(note_handlers::update_note)
                .delete(note_handlers::delete_note),
        )
        .route("/notes/{note_id}/related", get(note_handlers::get_related))
        .route(
            "/concepts",
            get(note_handlers::list_concepts).post(note_handlers::create_concept),
        )
        .route(
            "/concepts/{name}",
            get(note_handlers::get_concept)
                .put(note_handlers::update_concept)
                .delete(note_handlers::delete_concept),
        )
        .route("/categories", get(note_handlers::list_categories))
        // ====================================================================
        // Relationships & traversal
        // ====================================================================
        .route(
            "/relationships/{id}",
            get(graph_handlers::get_relationships).delete(graph_handlers::delete_relationship),
        )
        .route("/traverse/{id}", get(graph_handlers::traverse))
        // ====================================================================
        // One-shot model calls
        // ====================================================================
        .route("/ai/query", post(ai_handlers::query))
        .route("/ai/process-note", post(ai_handlers::process_note))
        // Settings
        .route("/settings/ui", get(handlers::get_ui_settings))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
