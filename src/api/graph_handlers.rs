//! Relationship and traversal handlers

use super::handlers::{ApiState, AppError};
use super::query::{RelationshipParams, TraverseParams};
use crate::neo4j::models::{Relationship, Subgraph};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RelationshipList {
    pub source_id: String,
    pub relationships: Vec<Relationship>,
}

/// Relationships of a note, concept or category, in both directions
pub async fn get_relationships(
    State(state): State<ApiState>,
    Path(source_id): Path<String>,
    Query(params): Query<RelationshipParams>,
) -> Result<Json<RelationshipList>, AppError> {
    let kind = params.kind().map_err(AppError::BadRequest)?;
    let relationships = state
        .graph
        .get_relationships(&source_id, kind)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Node '{}' not found", source_id)))?;
    Ok(Json(RelationshipList {
        source_id,
        relationships,
    }))
}

/// Delete one relationship by the id `get_relationships` reports
pub async fn delete_relationship(
    State(state): State<ApiState>,
    Path(relationship_id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.graph.delete_relationship(&relationship_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!(
            "Relationship {} not found",
            relationship_id
        )))
    }
}

/// Subgraph within `max_depth` hops of a node
pub async fn traverse(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
    Query(params): Query<TraverseParams>,
) -> Result<Json<Subgraph>, AppError> {
    let depth = params.depth().map_err(AppError::BadRequest)?;
    let subgraph = state
        .graph
        .traverse(&node_id, depth)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Node '{}' not found", node_id)))?;
    Ok(Json(subgraph))
}
