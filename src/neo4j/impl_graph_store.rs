//! `GraphStore` implementation for `Neo4jClient`.
//!
//! Every method simply delegates to the corresponding inherent method on `Neo4jClient`.

use async_trait::async_trait;
use uuid::Uuid;

use super::client::Neo4jClient;
use super::models::*;
use super::traits::GraphStore;
use crate::graph::mutation::MutationBatch;
use crate::graph::related::EdgeWeights;

#[async_trait]
impl GraphStore for Neo4jClient {
    // ========================================================================
    // Setup
    // ========================================================================

    async fn seed_categories(&self) -> anyhow::Result<usize> {
        self.seed_categories().await
    }

    async fn health_check(&self) -> anyhow::Result<bool> {
        self.health_check().await
    }

    // ========================================================================
    // Transactional writes
    // ========================================================================

    async fn apply_mutations(&self, batch: &MutationBatch) -> anyhow::Result<()> {
        self.apply_mutations(batch).await
    }

    // ========================================================================
    // Note operations
    // ========================================================================

    async fn get_note(&self, id: Uuid) -> anyhow::Result<Option<NoteNode>> {
        self.get_note(id).await
    }

    async fn list_notes(&self, limit: usize, skip: usize) -> anyhow::Result<Vec<NoteNode>> {
        self.list_notes(limit, skip).await
    }

    async fn update_note(
        &self,
        id: Uuid,
        content: Option<String>,
        tags: Option<Vec<String>>,
    ) -> anyhow::Result<Option<NoteNode>> {
        self.update_note(id, content, tags).await
    }

    async fn delete_note(&self, id: Uuid) -> anyhow::Result<bool> {
        self.delete_note(id).await
    }

    async fn get_note_concepts(&self, note_id: Uuid) -> anyhow::Result<Vec<ConceptNode>> {
        self.get_note_concepts(note_id).await
    }

    // ========================================================================
    // Concept & category operations
    // ========================================================================

    async fn get_concept(&self, name: &str) -> anyhow::Result<Option<ConceptNode>> {
        self.get_concept(name).await
    }

    async fn list_concepts(&self, limit: usize, skip: usize) -> anyhow::Result<Vec<ConceptNode>> {
        self.list_concepts(limit, skip).await
    }

    async fn delete_concept(&self, name: &str) -> anyhow::Result<bool> {
        self.delete_concept(name).await
    }

    async fn list_categories(&self) -> anyhow::Result<Vec<CategoryNode>> {
        self.list_categories().await
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    async fn get_relationships(
        &self,
        key: &str,
        kind: Option<EdgeKind>,
    ) -> anyhow::Result<Option<Vec<Relationship>>> {
        self.get_relationships(key, kind).await
    }

    async fn delete_relationship(&self, id: &str) -> anyhow::Result<bool> {
        self.delete_relationship(id).await
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    async fn traverse(&self, key: &str, max_depth: usize) -> anyhow::Result<Option<Subgraph>> {
        self.traverse(key, max_depth).await
    }

    async fn get_neighborhood(
        &self,
        note_id: Uuid,
        max_hops: usize,
        weights: &EdgeWeights,
    ) -> anyhow::Result<Vec<GraphPath>> {
        self.get_neighborhood(note_id, max_hops, weights).await
    }
}
