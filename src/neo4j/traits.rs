//! GraphStore trait definition
//!
//! Defines the abstract interface for all knowledge graph operations.
//! `Neo4jClient` implements it against a live database; the in-memory
//! `MockGraphStore` implements it for tests.

use crate::graph::mutation::{sample_batch, GraphMutation, MutationBatch, SAMPLE_NOTE_ID};
use crate::graph::related::{rank_paths, EdgeWeights, RelatedQuery};
use crate::neo4j::models::*;
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Abstract interface for all graph database operations.
///
/// Writes go through [`GraphStore::apply_mutations`], which is atomic: either
/// every mutation of the batch is visible afterwards or none is. The single-write
/// helpers are one-mutation batches.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ========================================================================
    // Setup
    // ========================================================================

    /// Merge the default philosophical categories. Returns how many exist afterwards.
    async fn seed_categories(&self) -> Result<usize>;

    /// Write the sample note and its concepts. Returns false if already present.
    async fn seed_samples(&self) -> Result<bool> {
        if self.get_note(SAMPLE_NOTE_ID).await?.is_some() {
            return Ok(false);
        }
        self.apply_mutations(&sample_batch()).await?;
        Ok(true)
    }

    /// Check connectivity
    async fn health_check(&self) -> Result<bool>;

    // ========================================================================
    // Transactional writes
    // ========================================================================

    /// Apply an ordered batch of mutations in a single transaction
    async fn apply_mutations(&self, batch: &MutationBatch) -> Result<()>;

    /// Create a note
    async fn create_note(&self, note: &NoteNode) -> Result<()> {
        self.apply_one(GraphMutation::CreateNote(note.clone())).await
    }

    /// Upsert a concept keyed by its unique name
    async fn create_or_merge_concept(&self, name: &str, description: Option<String>) -> Result<()> {
        self.apply_one(GraphMutation::MergeConcept {
            name: name.to_string(),
            description,
        })
        .await
    }

    /// Note -[ABOUT]-> Concept
    async fn link_note_to_concept(&self, note_id: Uuid, concept: &str) -> Result<()> {
        self.apply_one(GraphMutation::LinkNoteToConcept {
            note_id,
            concept: concept.to_string(),
        })
        .await
    }

    /// Note -[RELATES_TO {relation, weight}]-> Note
    async fn link_note_to_note(
        &self,
        source: Uuid,
        target: Uuid,
        relation: &str,
        weight: f64,
    ) -> Result<()> {
        self.apply_one(GraphMutation::LinkNoteToNote {
            source,
            target,
            relation: relation.to_string(),
            weight,
        })
        .await
    }

    /// Concept -[BELONGS_TO {weight}]-> Category
    async fn link_concept_to_category(&self, concept: &str, category: &str, weight: f64) -> Result<()> {
        self.apply_one(GraphMutation::LinkConceptToCategory {
            concept: concept.to_string(),
            category: category.to_string(),
            weight,
        })
        .await
    }

    /// Note -[EMBODIES {weight}]-> Category
    async fn link_note_to_category(&self, note_id: Uuid, category: &str, weight: f64) -> Result<()> {
        self.apply_one(GraphMutation::LinkNoteToCategory {
            note_id,
            category: category.to_string(),
            weight,
        })
        .await
    }

    /// Apply a single mutation as its own transaction
    async fn apply_one(&self, mutation: GraphMutation) -> Result<()> {
        let batch = MutationBatch {
            mutations: vec![mutation],
            ..Default::default()
        };
        self.apply_mutations(&batch).await
    }

    // ========================================================================
    // Note operations
    // ========================================================================

    /// Get a note by ID
    async fn get_note(&self, id: Uuid) -> Result<Option<NoteNode>>;

    /// List notes, newest first
    async fn list_notes(&self, limit: usize, skip: usize) -> Result<Vec<NoteNode>>;

    /// Update content and/or tags. Returns the updated note, or None if it does not exist.
    async fn update_note(
        &self,
        id: Uuid,
        content: Option<String>,
        tags: Option<Vec<String>>,
    ) -> Result<Option<NoteNode>>;

    /// Detach-delete a note. Returns false if it did not exist.
    async fn delete_note(&self, id: Uuid) -> Result<bool>;

    /// Concepts a note is ABOUT
    async fn get_note_concepts(&self, note_id: Uuid) -> Result<Vec<ConceptNode>>;

    // ========================================================================
    // Concept & category operations
    // ========================================================================

    /// Get a concept by its unique name
    async fn get_concept(&self, name: &str) -> Result<Option<ConceptNode>>;

    /// List concepts ordered by name
    async fn list_concepts(&self, limit: usize, skip: usize) -> Result<Vec<ConceptNode>>;

    /// Create a concept that belongs to `categories` (canonical names, weight 1.0).
    /// Returns None when a concept of that name already exists.
    async fn create_concept(
        &self,
        name: &str,
        description: Option<String>,
        categories: &[String],
    ) -> Result<Option<ConceptNode>> {
        if self.get_concept(name).await?.is_some() {
            return Ok(None);
        }
        let mut mutations = vec![GraphMutation::MergeConcept {
            name: name.to_string(),
            description,
        }];
        mutations.extend(categories.iter().map(|category| {
            GraphMutation::LinkConceptToCategory {
                concept: name.to_string(),
                category: category.clone(),
                weight: 1.0,
            }
        }));
        self.apply_mutations(&MutationBatch {
            mutations,
            ..Default::default()
        })
        .await?;
        self.get_concept(name).await
    }

    /// Rename, describe and recategorise a concept in one transaction.
    /// Returns None if it does not exist.
    async fn update_concept(&self, name: &str, update: &ConceptUpdate) -> Result<Option<ConceptNode>> {
        if self.get_concept(name).await?.is_none() {
            return Ok(None);
        }
        let new_name = update.name.clone().filter(|n| n != name);
        let current = new_name.clone().unwrap_or_else(|| name.to_string());

        let mut mutations = Vec::new();
        if new_name.is_some() || update.description.is_some() {
            mutations.push(GraphMutation::UpdateConcept {
                name: name.to_string(),
                new_name,
                description: update.description.clone(),
            });
        }
        if let Some(categories) = &update.categories {
            mutations.push(GraphMutation::ClearConceptCategories {
                name: current.clone(),
            });
            mutations.extend(categories.iter().map(|category| {
                GraphMutation::LinkConceptToCategory {
                    concept: current.clone(),
                    category: category.clone(),
                    weight: 1.0,
                }
            }));
        }
        if !mutations.is_empty() {
            self.apply_mutations(&MutationBatch {
                mutations,
                ..Default::default()
            })
            .await?;
        }
        self.get_concept(&current).await
    }

    /// Detach-delete a concept. Returns false if it did not exist.
    async fn delete_concept(&self, name: &str) -> Result<bool>;

    /// List categories ordered by name
    async fn list_categories(&self) -> Result<Vec<CategoryNode>>;

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Relationships touching the node with this key, in either direction.
    ///
    /// The key is a note id or a concept/category name; notes win over
    /// concepts, concepts over categories. Returns None if no node matches.
    async fn get_relationships(
        &self,
        key: &str,
        kind: Option<EdgeKind>,
    ) -> Result<Option<Vec<Relationship>>>;

    /// Delete one relationship by id. Returns false if it did not exist.
    async fn delete_relationship(&self, id: &str) -> Result<bool>;

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Everything within `max_depth` hops of the node with this key.
    /// Returns None if no node matches.
    async fn traverse(&self, key: &str, max_depth: usize) -> Result<Option<Subgraph>>;

    /// Simple undirected paths of length 1..=max_hops starting at a note.
    ///
    /// At most `MAX_NEIGHBORHOOD_PATHS` are returned, keeping the highest
    /// scoring under `weights` and the shortest among equal scores.
    async fn get_neighborhood(
        &self,
        note_id: Uuid,
        max_hops: usize,
        weights: &EdgeWeights,
    ) -> Result<Vec<GraphPath>>;

    /// Nodes reachable from a note, ranked by aggregate path weight
    async fn query_related(&self, note_id: Uuid, query: &RelatedQuery) -> Result<Vec<RelatedNode>> {
        let paths = self
            .get_neighborhood(note_id, query.max_hops, &query.weights)
            .await?;
        tracing::debug!(
            note_id = %note_id,
            paths = paths.len(),
            max_hops = query.max_hops,
            "Ranking neighbourhood paths"
        );
        Ok(rank_paths(
            &note_id.to_string(),
            &paths,
            query,
            chrono::Utc::now(),
        ))
    }
}
