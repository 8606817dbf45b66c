//! Compile proposed actions into an ordered batch of graph mutations
//!
//! Compilation resolves `ref` aliases to fresh note ids, canonicalises
//! category names and validates weights, so every failure a proposal can
//! produce surfaces before anything touches the database.

use crate::conversation::types::{CategoryScore, ProposedAction};
use crate::neo4j::models::{canonical_category, EdgeKind, NodeKind, NoteNode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use uuid::Uuid;

/// Default RELATES_TO sub-type when the proposal omits one
pub const DEFAULT_RELATION: &str = "related";

/// A single write against the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GraphMutation {
    CreateNote(NoteNode),
    UpdateNote {
        id: Uuid,
        content: Option<String>,
        tags: Option<Vec<String>>,
    },
    /// Create the concept if missing; fill in its description if it had none
    MergeConcept {
        name: String,
        description: Option<String>,
    },
    /// Rename a concept and/or replace its description
    UpdateConcept {
        name: String,
        new_name: Option<String>,
        description: Option<String>,
    },
    /// Drop every BELONGS_TO edge of a concept
    ClearConceptCategories { name: String },
    LinkNoteToConcept { note_id: Uuid, concept: String },
    LinkNoteToNote {
        source: Uuid,
        target: Uuid,
        relation: String,
        weight: f64,
    },
    LinkConceptToCategory {
        concept: String,
        category: String,
        weight: f64,
    },
    LinkNoteToCategory {
        note_id: Uuid,
        category: String,
        weight: f64,
    },
}

/// Mutations in execution order, with bookkeeping back to the source actions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationBatch {
    pub mutations: Vec<GraphMutation>,
    /// Note created by the action at the same index, if any
    pub created_notes: Vec<Option<Uuid>>,
    /// Notes created or updated by the batch
    pub touched_notes: Vec<Uuid>,
    /// Concepts created or linked by the batch
    pub touched_concepts: BTreeSet<String>,
}

impl MutationBatch {
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }
}

/// Why a set of proposed actions cannot be executed
#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("action {index}: {message}")]
    Invalid { index: usize, message: String },
}

fn invalid(index: usize, message: impl Into<String>) -> CompileError {
    CompileError::Invalid {
        index,
        message: message.into(),
    }
}

fn check_weight(index: usize, weight: Option<f64>) -> Result<f64, CompileError> {
    let w = weight.unwrap_or(1.0);
    if !w.is_finite() || !(0.0..=1.0).contains(&w) {
        return Err(invalid(index, format!("weight {} is outside [0, 1]", w)));
    }
    Ok(w)
}

fn check_concept(index: usize, name: &str) -> Result<String, CompileError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(invalid(index, "concept name is empty"));
    }
    Ok(trimmed.to_string())
}

fn check_category(index: usize, name: &str) -> Result<String, CompileError> {
    canonical_category(name)
        .map(str::to_string)
        .ok_or_else(|| invalid(index, format!("unknown category '{}'", name.trim())))
}

struct Compiler {
    batch: MutationBatch,
    aliases: HashMap<String, Uuid>,
}

impl Compiler {
    fn push(&mut self, mutation: GraphMutation) {
        self.batch.mutations.push(mutation);
    }

    fn touch_note(&mut self, id: Uuid) {
        if !self.batch.touched_notes.contains(&id) {
            self.batch.touched_notes.push(id);
        }
    }

    fn merge_concept(&mut self, name: String, description: Option<String>) {
        self.batch.touched_concepts.insert(name.clone());
        self.push(GraphMutation::MergeConcept { name, description });
    }

    /// A note endpoint is either an alias from this proposal or an existing note's UUID
    fn resolve_note(&self, index: usize, reference: &str) -> Result<Uuid, CompileError> {
        let reference = reference.trim();
        if let Some(id) = self.aliases.get(reference) {
            return Ok(*id);
        }
        reference.parse::<Uuid>().map_err(|_| {
            invalid(
                index,
                format!("'{}' is neither a note id nor an earlier ref", reference),
            )
        })
    }

    fn link_categories(
        &mut self,
        index: usize,
        categories: &[CategoryScore],
        link: impl Fn(String, f64) -> GraphMutation,
    ) -> Result<(), CompileError> {
        for score in categories {
            let category = check_category(index, &score.name)?;
            let weight = check_weight(index, Some(score.confidence))?;
            self.push(link(category, weight));
        }
        Ok(())
    }

    fn action(&mut self, index: usize, action: &ProposedAction) -> Result<Option<Uuid>, CompileError> {
        match action {
            ProposedAction::CreateNote {
                alias,
                content,
                tags,
                concepts,
                categories,
            } => {
                if content.trim().is_empty() {
                    return Err(invalid(index, "note content is empty"));
                }
                let note = NoteNode::new(content.clone(), tags.clone());
                let note_id = note.id;
                if let Some(alias) = alias.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
                    if self.aliases.insert(alias.to_string(), note_id).is_some() {
                        return Err(invalid(index, format!("duplicate ref '{}'", alias)));
                    }
                }
                self.push(GraphMutation::CreateNote(note));
                self.touch_note(note_id);

                for concept in concepts {
                    let concept = check_concept(index, concept)?;
                    self.merge_concept(concept.clone(), None);
                    self.push(GraphMutation::LinkNoteToConcept { note_id, concept });
                }
                self.link_categories(index, categories, |category, weight| {
                    GraphMutation::LinkNoteToCategory {
                        note_id,
                        category,
                        weight,
                    }
                })?;
                Ok(Some(note_id))
            }
            ProposedAction::UpdateNote {
                note_id,
                alias,
                content,
                tags,
            } => {
                let id = match (note_id, alias) {
                    (Some(id), _) => *id,
                    (None, Some(alias)) => self.resolve_note(index, alias)?,
                    (None, None) => return Err(invalid(index, "update_note needs note_id or ref")),
                };
                if content.is_none() && tags.is_none() {
                    return Err(invalid(index, "update_note changes nothing"));
                }
                if content.as_deref().is_some_and(|c| c.trim().is_empty()) {
                    return Err(invalid(index, "note content is empty"));
                }
                self.push(GraphMutation::UpdateNote {
                    id,
                    content: content.clone(),
                    tags: tags.clone(),
                });
                self.touch_note(id);
                Ok(None)
            }
            ProposedAction::CreateConcept {
                name,
                description,
                categories,
            } => {
                let concept = check_concept(index, name)?;
                self.merge_concept(concept.clone(), description.clone());
                self.link_categories(index, categories, |category, weight| {
                    GraphMutation::LinkConceptToCategory {
                        concept: concept.clone(),
                        category,
                        weight,
                    }
                })?;
                Ok(None)
            }
            ProposedAction::CreateRelationship {
                relationship_type,
                source,
                target,
                properties,
            } => {
                let weight = check_weight(index, properties.weight)?;
                match relationship_type.endpoints() {
                    (NodeKind::Note, NodeKind::Note) => {
                        let source = self.resolve_note(index, source)?;
                        let target = self.resolve_note(index, target)?;
                        if source == target {
                            return Err(invalid(index, "a note cannot relate to itself"));
                        }
                        let relation = properties
                            .relation
                            .as_deref()
                            .map(str::trim)
                            .filter(|r| !r.is_empty())
                            .unwrap_or(DEFAULT_RELATION)
                            .to_string();
                        self.push(GraphMutation::LinkNoteToNote {
                            source,
                            target,
                            relation,
                            weight,
                        });
                    }
                    (NodeKind::Note, NodeKind::Concept) => {
                        let note_id = self.resolve_note(index, source)?;
                        let concept = check_concept(index, target)?;
                        self.merge_concept(concept.clone(), None);
                        self.push(GraphMutation::LinkNoteToConcept { note_id, concept });
                    }
                    (NodeKind::Concept, NodeKind::Category) => {
                        let concept = check_concept(index, source)?;
                        let category = check_category(index, target)?;
                        self.merge_concept(concept.clone(), None);
                        self.push(GraphMutation::LinkConceptToCategory {
                            concept,
                            category,
                            weight,
                        });
                    }
                    (NodeKind::Note, NodeKind::Category) => {
                        let note_id = self.resolve_note(index, source)?;
                        let category = check_category(index, target)?;
                        self.push(GraphMutation::LinkNoteToCategory {
                            note_id,
                            category,
                            weight,
                        });
                    }
                    (from, to) => {
                        return Err(invalid(
                            index,
                            format!(
                                "{} cannot connect {} to {}",
                                relationship_type,
                                from.label(),
                                to.label()
                            ),
                        ))
                    }
                }
                Ok(None)
            }
        }
    }
}

/// Compile proposed actions, in order, into a mutation batch
pub fn compile(actions: &[ProposedAction]) -> Result<MutationBatch, CompileError> {
    let mut compiler = Compiler {
        batch: MutationBatch::default(),
        aliases: HashMap::new(),
    };
    for (index, action) in actions.iter().enumerate() {
        let created = compiler.action(index, action)?;
        compiler.batch.created_notes.push(created);
    }
    Ok(compiler.batch)
}

/// Fixed id of the sample note, so seeding samples twice is a no-op
pub const SAMPLE_NOTE_ID: Uuid = Uuid::from_u128(0x5a3b_1e00_0000_4000_8000_0000_0000_0001);

/// Sample philosophy content used by `setup-db --with-samples`
pub fn sample_batch() -> MutationBatch {
    let now = chrono::Utc::now();
    let note = NoteNode {
        id: SAMPLE_NOTE_ID,
        content: "Philosophy begins in wonder: before we can know anything, we ask \
                  what it means for something to exist and how we could come to know it."
            .to_string(),
        tags: vec!["sample".to_string()],
        created_at: now,
        updated_at: now,
    };
    let mut batch = MutationBatch {
        created_notes: vec![Some(note.id)],
        touched_notes: vec![note.id],
        ..Default::default()
    };
    batch.mutations.push(GraphMutation::CreateNote(note));
    for concept in ["Philosophy", "Knowledge", "Existence"] {
        batch.touched_concepts.insert(concept.to_string());
        batch.mutations.push(GraphMutation::MergeConcept {
            name: concept.to_string(),
            description: None,
        });
        batch.mutations.push(GraphMutation::LinkNoteToConcept {
            note_id: SAMPLE_NOTE_ID,
            concept: concept.to_string(),
        });
    }
    for (concept, category, weight) in [("Knowledge", "Epistemology", 0.9), ("Existence", "Ontology", 0.8)] {
        batch.mutations.push(GraphMutation::LinkConceptToCategory {
            concept: concept.to_string(),
            category: category.to_string(),
            weight,
        });
    }
    batch
}

/// The edge kind a mutation writes, if it writes one
pub fn edge_of(mutation: &GraphMutation) -> Option<EdgeKind> {
    match mutation {
        GraphMutation::LinkNoteToConcept { .. } => Some(EdgeKind::About),
        GraphMutation::LinkNoteToNote { .. } => Some(EdgeKind::RelatesTo),
        GraphMutation::LinkConceptToCategory { .. } => Some(EdgeKind::BelongsTo),
        GraphMutation::LinkNoteToCategory { .. } => Some(EdgeKind::Embodies),
        _ => None,
    }
}
