//! Direct note, concept and category handlers

use super::handlers::{json_body, path_param, ApiState, AppError};
use super::query::{PaginationParams, RelatedParams};
use crate::graph::{RecencyDecay, RelatedQuery};
use crate::neo4j::models::{
    canonical_category, CategoryNode, ConceptNode, ConceptUpdate, EdgeKind, NodeKind, NoteNode,
    RelatedNode,
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/response bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateNoteBody {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNoteBody {
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// A note with the concepts it is about
#[derive(Debug, Serialize)]
pub struct NoteDetails {
    #[serde(flatten)]
    pub note: NoteNode,
    pub concepts: Vec<ConceptNode>,
}

#[derive(Debug, Serialize)]
pub struct NoteList {
    pub items: Vec<NoteNode>,
    pub limit: usize,
    pub skip: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateConceptBody {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// A concept with the categories it belongs to
#[derive(Debug, Serialize)]
pub struct ConceptDetails {
    #[serde(flatten)]
    pub concept: ConceptNode,
    pub categories: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ConceptList {
    pub items: Vec<ConceptNode>,
    pub limit: usize,
    pub skip: usize,
}

#[derive(Debug, Serialize)]
pub struct RelatedResponse {
    pub note_id: Uuid,
    pub max_hops: usize,
    pub items: Vec<RelatedNode>,
}

// ============================================================================
// Notes
// ============================================================================

/// Create a note without going through a conversation
pub async fn create_note(
    State(state): State<ApiState>,
    payload: Result<Json<CreateNoteBody>, JsonRejection>,
) -> Result<(StatusCode, Json<NoteNode>), AppError> {
    let body = json_body(payload)?;
    if body.content.trim().is_empty() {
        return Err(AppError::BadRequest("content must not be empty".to_string()));
    }
    let note = NoteNode::new(body.content, body.tags);
    state.graph.create_note(&note).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

/// List notes, newest first
pub async fn list_notes(
    State(state): State<ApiState>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<NoteList>, AppError> {
    params.validate().map_err(AppError::BadRequest)?;
    let items = state.graph.list_notes(params.limit, params.skip).await?;
    Ok(Json(NoteList {
        items,
        limit: params.limit,
        skip: params.skip,
    }))
}

/// Get a note with its concepts
pub async fn get_note(
    State(state): State<ApiState>,
    note_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<NoteDetails>, AppError> {
    let note_id = path_param(note_id)?;
    let note = state
        .graph
        .get_note(note_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Note {} not found", note_id)))?;
    let concepts = state.graph.get_note_concepts(note_id).await?;

    Ok(Json(NoteDetails { note, concepts }))
}

/// Update a note's content and/or tags
pub async fn update_note(
    State(state): State<ApiState>,
    note_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateNoteBody>, JsonRejection>,
) -> Result<Json<NoteNode>, AppError> {
    let note_id = path_param(note_id)?;
    let body = json_body(payload)?;
    if body.content.is_none() && body.tags.is_none() {
        return Err(AppError::BadRequest(
            "provide content and/or tags".to_string(),
        ));
    }
    if body.content.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(AppError::BadRequest("content must not be empty".to_string()));
    }

    let note = state
        .graph
        .update_note(note_id, body.content, body.tags)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Note {} not found", note_id)))?;
    Ok(Json(note))
}

/// Delete a note and its relationships
pub async fn delete_note(
    State(state): State<ApiState>,
    note_id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let note_id = path_param(note_id)?;
    if state.graph.delete_note(note_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Note {} not found", note_id)))
    }
}

/// Nodes related to a note, ranked by aggregate path weight
pub async fn get_related(
    State(state): State<ApiState>,
    note_id: Result<Path<Uuid>, PathRejection>,
    Query(params): Query<RelatedParams>,
) -> Result<Json<RelatedResponse>, AppError> {
    let note_id = path_param(note_id)?;
    params.validate().map_err(AppError::BadRequest)?;
    if state.graph.get_note(note_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Note {} not found", note_id)));
    }

    let mut query: RelatedQuery = state.related_defaults.clone();
    if let Some(max_hops) = params.max_hops {
        query.max_hops = max_hops;
    }
    if let Some(limit) = params.limit {
        query.limit = limit;
    }
    match params.recency {
        Some(true) => {
            query.recency = Some(RecencyDecay {
                decay_days: state.recency_decay_days,
            })
        }
        Some(false) => query.recency = None,
        None => {}
    }
    if let Some(kinds) = params.kinds.as_deref() {
        query.kinds = kinds
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| k.parse::<NodeKind>().map_err(AppError::BadRequest))
            .collect::<Result<_, _>>()?;
    }

    let items = state.graph.query_related(note_id, &query).await?;
    Ok(Json(RelatedResponse {
        note_id,
        max_hops: query.max_hops,
        items,
    }))
}

// ============================================================================
// Concepts & categories
// ============================================================================

fn concept_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

/// Canonical spellings, each once
fn category_names(names: &[String]) -> Result<Vec<String>, AppError> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let canonical = canonical_category(name)
            .ok_or_else(|| AppError::BadRequest(format!("unknown category '{}'", name.trim())))?;
        if !out.iter().any(|n| n == canonical) {
            out.push(canonical.to_string());
        }
    }
    Ok(out)
}

async fn concept_details(state: &ApiState, concept: ConceptNode) -> Result<ConceptDetails, AppError> {
    let categories = state
        .graph
        .get_relationships(&concept.name, Some(EdgeKind::BelongsTo))
        .await?
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.source.kind == NodeKind::Concept && r.source.key == concept.name)
        .map(|r| r.target.key)
        .collect();
    Ok(ConceptDetails {
        concept,
        categories,
    })
}

/// List concepts by name
pub async fn list_concepts(
    State(state): State<ApiState>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ConceptList>, AppError> {
    params.validate().map_err(AppError::BadRequest)?;
    let items = state.graph.list_concepts(params.limit, params.skip).await?;
    Ok(Json(ConceptList {
        items,
        limit: params.limit,
        skip: params.skip,
    }))
}

/// Get a concept by name, with its categories
pub async fn get_concept(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<ConceptDetails>, AppError> {
    let concept = state
        .graph
        .get_concept(&name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Concept '{}' not found", name)))?;
    Ok(Json(concept_details(&state, concept).await?))
}

/// Create a concept outside a conversation
pub async fn create_concept(
    State(state): State<ApiState>,
    payload: Result<Json<CreateConceptBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ConceptDetails>), AppError> {
    let body = json_body(payload)?;
    let name = concept_name(&body.name)?;
    let categories = category_names(&body.categories)?;
    let description = body.description.filter(|d| !d.trim().is_empty());

    let concept = state
        .graph
        .create_concept(&name, description, &categories)
        .await?
        .ok_or_else(|| AppError::Conflict(format!("Concept '{}' already exists", name)))?;
    tracing::info!(concept = %concept.name, "Concept created");
    Ok((
        StatusCode::CREATED,
        Json(ConceptDetails {
            concept,
            categories,
        }),
    ))
}

/// Rename, describe or recategorise a concept
pub async fn update_concept(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    payload: Result<Json<ConceptUpdate>, JsonRejection>,
) -> Result<Json<ConceptDetails>, AppError> {
    let body = json_body(payload)?;
    if body.name.is_none() && body.description.is_none() && body.categories.is_none() {
        return Err(AppError::BadRequest(
            "provide name, description and/or categories".to_string(),
        ));
    }
    let update = ConceptUpdate {
        name: body.name.as_deref().map(concept_name).transpose()?,
        description: body.description,
        categories: body.categories.as_deref().map(category_names).transpose()?,
    };

    if let Some(new_name) = update.name.as_deref().filter(|n| *n != name) {
        if state.graph.get_concept(new_name).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Concept '{}' already exists",
                new_name
            )));
        }
    }

    let concept = state
        .graph
        .update_concept(&name, &update)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Concept '{}' not found", name)))?;
    Ok(Json(concept_details(&state, concept).await?))
}

/// Delete a concept and its relationships
pub async fn delete_concept(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.graph.delete_concept(&name).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Concept '{}' not found", name)))
    }
}

/// List seeded categories
pub async fn list_categories(
    State(state): State<ApiState>,
) -> Result<Json<Vec<CategoryNode>>, AppError> {
    Ok(Json(state.graph.list_categories().await?))
}
