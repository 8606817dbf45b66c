//! One-shot model endpoints: questions over the notes and concept extraction.
//!
//! Neither endpoint writes to the graph.

use super::handlers::{json_body, ApiState, AppError};
use crate::conversation::types::{excerpt, ContextNote};
use crate::graph::RelatedQuery;
use crate::llm::{LlmError, NoteExtraction, QueryAnswer, QueryRequest};
use crate::neo4j::models::{NodeKind, NoteNode};
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;
use std::future::Future;
use uuid::Uuid;

/// Notes given to the model when the request names none
const DEFAULT_QUERY_NOTES: usize = 5;

/// Related concepts gathered per context note
const RELATED_CONCEPTS_PER_NOTE: usize = 5;

/// Characters of each note passed to the model
const NOTE_EXCERPT_CHARS: usize = 400;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    pub prompt: String,
    /// Notes to answer from; the most recent notes when absent
    #[serde(default)]
    pub context_ids: Option<Vec<Uuid>>,
    /// Also pass the concepts around the notes
    #[serde(default = "default_true")]
    pub include_graph_context: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProcessNoteBody {
    pub content: String,
}

/// Run a model call under the conversation analysis timeout
async fn bounded<T>(
    state: &ApiState,
    call: impl Future<Output = Result<T, LlmError>>,
) -> Result<T, AppError> {
    let timeout = state.conversations.config().analysis_timeout;
    let result = tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| LlmError::Timeout(timeout))?;
    Ok(result?)
}

/// Answer a question from notes in the graph
pub async fn query(
    State(state): State<ApiState>,
    payload: Result<Json<QueryBody>, JsonRejection>,
) -> Result<Json<QueryAnswer>, AppError> {
    let body = json_body(payload)?;
    let prompt = body.prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::BadRequest("prompt must not be empty".to_string()));
    }

    let notes: Vec<NoteNode> = match body.context_ids {
        Some(ids) => {
            let mut notes = Vec::with_capacity(ids.len());
            for id in ids {
                let note = state
                    .graph
                    .get_note(id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Note {} not found", id)))?;
                if !notes.iter().any(|n: &NoteNode| n.id == id) {
                    notes.push(note);
                }
            }
            notes
        }
        None => state.graph.list_notes(DEFAULT_QUERY_NOTES, 0).await?,
    };

    let mut concepts: Vec<String> = Vec::new();
    if body.include_graph_context {
        let related_query = RelatedQuery {
            kinds: vec![NodeKind::Concept],
            limit: RELATED_CONCEPTS_PER_NOTE,
            ..state.related_defaults.clone()
        };
        for note in &notes {
            let own = state.graph.get_note_concepts(note.id).await?;
            let related = state.graph.query_related(note.id, &related_query).await?;
            let names = own
                .into_iter()
                .map(|c| c.name)
                .chain(related.into_iter().map(|r| r.node.key));
            for name in names {
                if !concepts.contains(&name) {
                    concepts.push(name);
                }
            }
        }
    }

    let request = QueryRequest {
        prompt: prompt.to_string(),
        notes: notes
            .iter()
            .map(|n| ContextNote {
                id: n.id,
                excerpt: excerpt(&n.content, NOTE_EXCERPT_CHARS),
            })
            .collect(),
        concepts,
    };
    tracing::debug!(
        notes = request.notes.len(),
        concepts = request.concepts.len(),
        "Answering query"
    );

    let answer = bounded(&state, state.model.answer(&request)).await?;
    Ok(Json(answer))
}

/// Extract concepts, categories and relationships from note text.
///
/// Suggestions only: nothing is written to the graph.
pub async fn process_note(
    State(state): State<ApiState>,
    payload: Result<Json<ProcessNoteBody>, JsonRejection>,
) -> Result<Json<NoteExtraction>, AppError> {
    let body = json_body(payload)?;
    let content = body.content.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("content must not be empty".to_string()));
    }
    let extraction = bounded(&state, state.model.extract(content)).await?;
    Ok(Json(extraction))
}
