//! In-memory mock implementation of GraphStore for testing.
//!
//! The whole graph lives behind one `tokio::sync::RwLock`; `apply_mutations`
//! works on a copy and swaps it in only when every mutation succeeded, which
//! gives the same all-or-nothing visibility as a Neo4j transaction.
//! Conditionally compiled with `#[cfg(test)]`.

use crate::graph::mutation::{GraphMutation, MutationBatch};
use crate::graph::related::{strongest_paths, EdgeWeights, MAX_NEIGHBORHOOD_PATHS};
use crate::neo4j::models::*;
use crate::neo4j::traits::GraphStore;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A stored relationship
#[derive(Debug, Clone, PartialEq)]
pub struct MockEdge {
    /// Assigned when the edge is first stored
    pub id: String,
    pub kind: EdgeKind,
    pub from: (NodeKind, String),
    pub to: (NodeKind, String),
    pub weight: Option<f64>,
    pub relation: Option<String>,
}

/// Graph contents
#[derive(Debug, Clone, Default)]
pub struct MockGraph {
    pub notes: HashMap<Uuid, NoteNode>,
    pub concepts: BTreeMap<String, ConceptNode>,
    pub categories: BTreeMap<String, CategoryNode>,
    pub edges: Vec<MockEdge>,
    next_edge: u64,
}

impl MockGraph {
    fn merge_edge(&mut self, mut edge: MockEdge) {
        let existing = self.edges.iter_mut().find(|e| {
            e.kind == edge.kind && e.from == edge.from && e.to == edge.to && e.relation == edge.relation
        });
        match existing {
            Some(e) => {
                if let Some(w) = edge.weight {
                    e.weight = Some(e.weight.map_or(w, |old| old.max(w)));
                }
            }
            None => {
                self.next_edge += 1;
                edge.id = format!("rel-{}", self.next_edge);
                self.edges.push(edge);
            }
        }
    }

    fn has_concept(&self, name: &str) -> bool {
        self.concepts.contains_key(name)
    }

    /// Notes win over concepts, concepts over categories
    fn resolve(&self, key: &str) -> Option<(NodeKind, String)> {
        if let Ok(id) = key.parse::<Uuid>() {
            if self.notes.contains_key(&id) {
                return Some((NodeKind::Note, id.to_string()));
            }
        }
        if self.concepts.contains_key(key) {
            return Some((NodeKind::Concept, key.to_string()));
        }
        if self.categories.contains_key(key) {
            return Some((NodeKind::Category, key.to_string()));
        }
        None
    }

    fn relationship(&self, edge: &MockEdge) -> Relationship {
        Relationship {
            id: edge.id.clone(),
            kind: edge.kind,
            source: self.node_ref(&edge.from),
            target: self.node_ref(&edge.to),
            weight: edge.weight,
            relation: edge.relation.clone(),
        }
    }

    /// Breadth-first: an edge is at depth d when one end is d - 1 hops away
    fn relationships_within(&self, start: &(NodeKind, String), max_depth: usize) -> Vec<Relationship> {
        let mut reached = vec![start.clone()];
        let mut frontier = vec![start.clone()];
        let mut taken: Vec<&str> = Vec::new();
        let mut out = Vec::new();

        for _ in 0..max_depth {
            let mut layer: Vec<&MockEdge> = Vec::new();
            let mut next = Vec::new();
            for edge in &self.edges {
                if taken.contains(&edge.id.as_str())
                    || !(frontier.contains(&edge.from) || frontier.contains(&edge.to))
                {
                    continue;
                }
                taken.push(&edge.id);
                layer.push(edge);
                for end in [&edge.from, &edge.to] {
                    if !reached.contains(end) {
                        reached.push(end.clone());
                        next.push(end.clone());
                    }
                }
            }
            layer.sort_by(|a, b| a.id.cmp(&b.id));
            out.extend(layer.into_iter().map(|e| self.relationship(e)));
            frontier = next;
        }
        out
    }

    fn apply(&mut self, mutation: &GraphMutation) -> Result<()> {
        match mutation {
            GraphMutation::CreateNote(note) => {
                if self.notes.contains_key(&note.id) {
                    bail!("note {} already exists", note.id);
                }
                self.notes.insert(note.id, note.clone());
            }
            GraphMutation::UpdateNote { id, content, tags } => {
                let Some(note) = self.notes.get_mut(id) else {
                    bail!("note {} does not exist", id);
                };
                if let Some(content) = content {
                    note.content = content.clone();
                }
                if let Some(tags) = tags {
                    note.tags = tags.clone();
                }
                note.updated_at = Utc::now();
            }
            GraphMutation::MergeConcept { name, description } => {
                let concept = self
                    .concepts
                    .entry(name.clone())
                    .or_insert_with(|| ConceptNode {
                        id: Uuid::new_v4(),
                        name: name.clone(),
                        description: None,
                    });
                if concept.description.is_none() {
                    concept.description = description.clone();
                }
            }
            GraphMutation::UpdateConcept {
                name,
                new_name,
                description,
            } => {
                let Some(mut concept) = self.concepts.remove(name) else {
                    bail!("concept '{}' does not exist", name);
                };
                if let Some(description) = description {
                    concept.description = Some(description.clone());
                }
                if let Some(new_name) = new_name {
                    if self.has_concept(new_name) {
                        bail!("concept '{}' already exists", new_name);
                    }
                    let old = (NodeKind::Concept, name.clone());
                    for edge in &mut self.edges {
                        for end in [&mut edge.from, &mut edge.to] {
                            if *end == old {
                                end.1 = new_name.clone();
                            }
                        }
                    }
                    concept.name = new_name.clone();
                }
                self.concepts.insert(concept.name.clone(), concept);
            }
            GraphMutation::ClearConceptCategories { name } => {
                if !self.has_concept(name) {
                    bail!("concept '{}' does not exist", name);
                }
                let key = (NodeKind::Concept, name.clone());
                self.edges
                    .retain(|e| !(e.kind == EdgeKind::BelongsTo && e.from == key));
            }
            GraphMutation::LinkNoteToConcept { note_id, concept } => {
                if !self.notes.contains_key(note_id) || !self.concepts.contains_key(concept) {
                    bail!("note {} or concept '{}' does not exist", note_id, concept);
                }
                self.merge_edge(MockEdge {
                    id: String::new(),
                    kind: EdgeKind::About,
                    from: (NodeKind::Note, note_id.to_string()),
                    to: (NodeKind::Concept, concept.clone()),
                    weight: None,
                    relation: None,
                });
            }
            GraphMutation::LinkNoteToNote {
                source,
                target,
                relation,
                weight,
            } => {
                if !self.notes.contains_key(source) || !self.notes.contains_key(target) {
                    bail!("note {} or note {} does not exist", source, target);
                }
                self.merge_edge(MockEdge {
                    id: String::new(),
                    kind: EdgeKind::RelatesTo,
                    from: (NodeKind::Note, source.to_string()),
                    to: (NodeKind::Note, target.to_string()),
                    weight: Some(*weight),
                    relation: Some(relation.clone()),
                });
            }
            GraphMutation::LinkConceptToCategory {
                concept,
                category,
                weight,
            } => {
                if !self.concepts.contains_key(concept) || !self.categories.contains_key(category) {
                    bail!("concept '{}' or category '{}' does not exist", concept, category);
                }
                self.merge_edge(MockEdge {
                    id: String::new(),
                    kind: EdgeKind::BelongsTo,
                    from: (NodeKind::Concept, concept.clone()),
                    to: (NodeKind::Category, category.clone()),
                    weight: Some(*weight),
                    relation: None,
                });
            }
            GraphMutation::LinkNoteToCategory {
                note_id,
                category,
                weight,
            } => {
                if !self.notes.contains_key(note_id) || !self.categories.contains_key(category) {
                    bail!("note {} or category '{}' does not exist", note_id, category);
                }
                self.merge_edge(MockEdge {
                    id: String::new(),
                    kind: EdgeKind::Embodies,
                    from: (NodeKind::Note, note_id.to_string()),
                    to: (NodeKind::Category, category.clone()),
                    weight: Some(*weight),
                    relation: None,
                });
            }
        }
        Ok(())
    }

    fn node_ref(&self, (kind, key): &(NodeKind, String)) -> GraphNodeRef {
        let (label, created_at) = match kind {
            NodeKind::Note => match key.parse::<Uuid>().ok().and_then(|id| self.notes.get(&id)) {
                Some(note) => (
                    crate::conversation::types::excerpt(&note.content, 80),
                    Some(note.created_at),
                ),
                None => (key.clone(), None),
            },
            _ => (key.clone(), None),
        };
        GraphNodeRef {
            kind: *kind,
            key: key.clone(),
            label,
            created_at,
        }
    }

    /// Depth-first enumeration of simple undirected paths
    fn paths_from(&self, start: (NodeKind, String), max_hops: usize) -> Vec<GraphPath> {
        let mut out = Vec::new();
        let mut visited = vec![start.clone()];
        let mut hops = Vec::new();
        self.walk(&start, max_hops, &mut visited, &mut hops, &mut out);
        out
    }

    fn walk(
        &self,
        at: &(NodeKind, String),
        remaining: usize,
        visited: &mut Vec<(NodeKind, String)>,
        hops: &mut Vec<PathHop>,
        out: &mut Vec<GraphPath>,
    ) {
        if remaining == 0 {
            return;
        }
        for edge in &self.edges {
            let next = if &edge.from == at {
                &edge.to
            } else if &edge.to == at {
                &edge.from
            } else {
                continue;
            };
            if visited.contains(next) {
                continue;
            }
            hops.push(PathHop {
                edge: edge.kind,
                weight: edge.weight,
                node: self.node_ref(next),
            });
            out.push(GraphPath { hops: hops.clone() });
            visited.push(next.clone());
            self.walk(next, remaining - 1, visited, hops, out);
            visited.pop();
            hops.pop();
        }
    }
}

/// In-memory mock implementation of GraphStore for testing.
pub struct MockGraphStore {
    pub graph: RwLock<MockGraph>,
    /// Fail the batch when this many mutations (0-based index) have been applied
    fail_at_mutation: Mutex<Option<usize>>,
    /// Sleep before applying each batch
    apply_delay: Mutex<Option<Duration>>,
    healthy: AtomicBool,
    /// Most paths `get_neighborhood` returns
    path_cap: AtomicUsize,
    pub batches_applied: AtomicUsize,
}

impl Default for MockGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGraphStore {
    /// Create a new empty MockGraphStore.
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(MockGraph::default()),
            fail_at_mutation: Mutex::new(None),
            apply_delay: Mutex::new(None),
            healthy: AtomicBool::new(true),
            path_cap: AtomicUsize::new(MAX_NEIGHBORHOOD_PATHS),
            batches_applied: AtomicUsize::new(0),
        }
    }

    /// Create a store with the default categories already present.
    pub fn seeded() -> Self {
        let store = Self::new();
        {
            let mut graph = store.graph.try_write().expect("fresh lock");
            for category in default_categories() {
                graph.categories.insert(category.name.clone(), category);
            }
        }
        store
    }

    /// Make the next batches fail at the given mutation index.
    pub fn fail_at(&self, index: Option<usize>) {
        *self.fail_at_mutation.lock().unwrap() = index;
    }

    pub fn set_apply_delay(&self, delay: Option<Duration>) {
        *self.apply_delay.lock().unwrap() = delay;
    }

    pub fn set_path_cap(&self, cap: usize) {
        self.path_cap.store(cap, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub async fn note_count(&self) -> usize {
        self.graph.read().await.notes.len()
    }

    pub async fn edges_of(&self, kind: EdgeKind) -> Vec<MockEdge> {
        self.graph
            .read()
            .await
            .edges
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl GraphStore for MockGraphStore {
    async fn seed_categories(&self) -> Result<usize> {
        let mut graph = self.graph.write().await;
        for category in default_categories() {
            graph
                .categories
                .entry(category.name.clone())
                .or_insert(category);
        }
        Ok(graph.categories.len())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.healthy.load(Ordering::SeqCst))
    }

    async fn apply_mutations(&self, batch: &MutationBatch) -> Result<()> {
        let delay = *self.apply_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let fail_at = *self.fail_at_mutation.lock().unwrap();

        let mut graph = self.graph.write().await;
        let mut working = graph.clone();
        for (i, mutation) in batch.mutations.iter().enumerate() {
            if fail_at == Some(i) {
                bail!("injected failure at mutation {}", i);
            }
            working.apply(mutation)?;
        }
        *graph = working;
        self.batches_applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_note(&self, id: Uuid) -> Result<Option<NoteNode>> {
        Ok(self.graph.read().await.notes.get(&id).cloned())
    }

    async fn list_notes(&self, limit: usize, skip: usize) -> Result<Vec<NoteNode>> {
        let graph = self.graph.read().await;
        let mut notes: Vec<NoteNode> = graph.notes.values().cloned().collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes.into_iter().skip(skip).take(limit).collect())
    }

    async fn update_note(
        &self,
        id: Uuid,
        content: Option<String>,
        tags: Option<Vec<String>>,
    ) -> Result<Option<NoteNode>> {
        let mut graph = self.graph.write().await;
        if !graph.notes.contains_key(&id) {
            return Ok(None);
        }
        graph.apply(&GraphMutation::UpdateNote { id, content, tags })?;
        Ok(graph.notes.get(&id).cloned())
    }

    async fn delete_note(&self, id: Uuid) -> Result<bool> {
        let mut graph = self.graph.write().await;
        if graph.notes.remove(&id).is_none() {
            return Ok(false);
        }
        let key = (NodeKind::Note, id.to_string());
        graph.edges.retain(|e| e.from != key && e.to != key);
        Ok(true)
    }

    async fn get_note_concepts(&self, note_id: Uuid) -> Result<Vec<ConceptNode>> {
        let graph = self.graph.read().await;
        let key = (NodeKind::Note, note_id.to_string());
        Ok(graph
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::About && e.from == key)
            .filter_map(|e| graph.concepts.get(&e.to.1).cloned())
            .collect())
    }

    async fn get_concept(&self, name: &str) -> Result<Option<ConceptNode>> {
        Ok(self.graph.read().await.concepts.get(name).cloned())
    }

    async fn list_concepts(&self, limit: usize, skip: usize) -> Result<Vec<ConceptNode>> {
        let graph = self.graph.read().await;
        Ok(graph.concepts.values().skip(skip).take(limit).cloned().collect())
    }

    async fn delete_concept(&self, name: &str) -> Result<bool> {
        let mut graph = self.graph.write().await;
        if graph.concepts.remove(name).is_none() {
            return Ok(false);
        }
        let key = (NodeKind::Concept, name.to_string());
        graph.edges.retain(|e| e.from != key && e.to != key);
        Ok(true)
    }

    async fn list_categories(&self) -> Result<Vec<CategoryNode>> {
        Ok(self.graph.read().await.categories.values().cloned().collect())
    }

    async fn get_relationships(
        &self,
        key: &str,
        kind: Option<EdgeKind>,
    ) -> Result<Option<Vec<Relationship>>> {
        let graph = self.graph.read().await;
        let Some(node) = graph.resolve(key) else {
            return Ok(None);
        };
        let mut edges: Vec<&MockEdge> = graph
            .edges
            .iter()
            .filter(|e| e.from == node || e.to == node)
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .collect();
        edges.sort_by(|a, b| {
            a.kind
                .as_cypher()
                .cmp(b.kind.as_cypher())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(Some(edges.into_iter().map(|e| graph.relationship(e)).collect()))
    }

    async fn delete_relationship(&self, id: &str) -> Result<bool> {
        let mut graph = self.graph.write().await;
        let before = graph.edges.len();
        graph.edges.retain(|e| e.id != id);
        Ok(graph.edges.len() < before)
    }

    async fn traverse(&self, key: &str, max_depth: usize) -> Result<Option<Subgraph>> {
        let graph = self.graph.read().await;
        let Some(node) = graph.resolve(key) else {
            return Ok(None);
        };
        let relationships = graph.relationships_within(&node, max_depth);
        Ok(Some(Subgraph::assemble(
            graph.node_ref(&node),
            max_depth,
            relationships,
        )))
    }

    async fn get_neighborhood(
        &self,
        note_id: Uuid,
        max_hops: usize,
        weights: &EdgeWeights,
    ) -> Result<Vec<GraphPath>> {
        let graph = self.graph.read().await;
        if !graph.notes.contains_key(&note_id) {
            return Ok(Vec::new());
        }
        let paths = graph.paths_from((NodeKind::Note, note_id.to_string()), max_hops);
        Ok(strongest_paths(
            paths,
            weights,
            self.path_cap.load(Ordering::SeqCst),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::mutation::{compile, sample_batch, SAMPLE_NOTE_ID};
    use crate::graph::related::RelatedQuery;
    use crate::conversation::types::ProposedAction;

    fn create(content: &str, concepts: &[&str]) -> ProposedAction {
        ProposedAction::CreateNote {
            alias: None,
            content: content.into(),
            tags: vec![],
            concepts: concepts.iter().map(|c| c.to_string()).collect(),
            categories: vec![],
        }
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_graph_untouched() {
        let store = MockGraphStore::seeded();
        let batch = compile(&[create("a", &["x"]), create("b", &["y"])]).unwrap();
        store.fail_at(Some(batch.len() - 1));

        assert!(store.apply_mutations(&batch).await.is_err());
        assert_eq!(store.note_count().await, 0);
        assert!(store.list_concepts(100, 0).await.unwrap().is_empty());

        store.fail_at(None);
        store.apply_mutations(&batch).await.unwrap();
        assert_eq!(store.note_count().await, 2);
    }

    #[tokio::test]
    async fn test_link_to_missing_note_fails_whole_batch() {
        let store = MockGraphStore::seeded();
        let mut batch = compile(&[create("a", &[])]).unwrap();
        batch.mutations.push(GraphMutation::LinkNoteToConcept {
            note_id: Uuid::new_v4(),
            concept: "ghost".into(),
        });
        assert!(store.apply_mutations(&batch).await.is_err());
        assert_eq!(store.note_count().await, 0);
    }

    #[tokio::test]
    async fn test_repeated_edge_keeps_max_weight() {
        let store = MockGraphStore::seeded();
        store.create_or_merge_concept("time", None).await.unwrap();
        store
            .link_concept_to_category("time", "Temporality", 0.4)
            .await
            .unwrap();
        store
            .link_concept_to_category("time", "Temporality", 0.9)
            .await
            .unwrap();
        store
            .link_concept_to_category("time", "Temporality", 0.2)
            .await
            .unwrap();

        let edges = store.edges_of(EdgeKind::BelongsTo).await;
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].weight, Some(0.9));
    }

    #[tokio::test]
    async fn test_seed_samples_is_idempotent() {
        let store = MockGraphStore::new();
        store.seed_categories().await.unwrap();
        assert!(store.seed_samples().await.unwrap());
        assert!(!store.seed_samples().await.unwrap());
        assert_eq!(store.note_count().await, 1);
        assert!(store.get_note(SAMPLE_NOTE_ID).await.unwrap().is_some());
        assert_eq!(sample_batch().created_notes.len(), 1);
    }

    #[tokio::test]
    async fn test_query_related_is_sorted_and_bounded() {
        let store = MockGraphStore::seeded();
        let batch = compile(&[
            ProposedAction::CreateNote {
                alias: Some("a".into()),
                content: "free will".into(),
                tags: vec![],
                concepts: vec!["determinism".into()],
                categories: vec![],
            },
            ProposedAction::CreateNote {
                alias: Some("b".into()),
                content: "compatibilism".into(),
                tags: vec![],
                concepts: vec!["determinism".into()],
                categories: vec![],
            },
            ProposedAction::CreateRelationship {
                relationship_type: EdgeKind::BelongsTo,
                source: "determinism".into(),
                target: "Causality".into(),
                properties: Default::default(),
            },
        ])
        .unwrap();
        let start = batch.created_notes[0].unwrap();
        store.apply_mutations(&batch).await.unwrap();

        let related = store
            .query_related(start, &RelatedQuery::default())
            .await
            .unwrap();
        assert!(!related.is_empty());
        assert!(related.windows(2).all(|w| w[0].weight >= w[1].weight));
        assert!(related.iter().all(|r| r.hops <= 2));
        assert!(related.iter().all(|r| r.node.key != start.to_string()));
        assert_eq!(related[0].node.key, "determinism");
    }

    #[tokio::test]
    async fn test_capped_neighborhood_keeps_strongest_paths() {
        let store = MockGraphStore::seeded();
        let start = NoteNode::new("Time is the measure of change".into(), vec![]);
        let close = NoteNode::new("Change presupposes persistence".into(), vec![]);
        store.create_note(&start).await.unwrap();
        store.create_note(&close).await.unwrap();
        store.create_or_merge_concept("time", None).await.unwrap();
        store.link_note_to_concept(start.id, "time").await.unwrap();
        store
            .link_note_to_note(start.id, close.id, "elaborates", 0.9)
            .await
            .unwrap();
        store
            .link_note_to_category(start.id, "Temporality", 0.2)
            .await
            .unwrap();
        store
            .link_concept_to_category("time", "Temporality", 0.1)
            .await
            .unwrap();

        store.set_path_cap(2);
        let weights = EdgeWeights::default();
        let paths = store.get_neighborhood(start.id, 2, &weights).await.unwrap();
        assert_eq!(paths.len(), 2);
        let ends: Vec<&str> = paths
            .iter()
            .filter_map(|p| p.end())
            .map(|n| n.key.as_str())
            .collect();
        let close_key = close.id.to_string();
        assert_eq!(ends, vec![close_key.as_str(), "time"]);
    }

    #[tokio::test]
    async fn test_concept_crud_carries_edges_through_rename() {
        let store = MockGraphStore::seeded();
        let note = NoteNode::new("Everything aims at some good".into(), vec![]);
        store.create_note(&note).await.unwrap();

        let created = store
            .create_concept("telos", Some("end".into()), &["Teleology".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.name, "telos");
        assert!(store
            .create_concept("telos", None, &[])
            .await
            .unwrap()
            .is_none());
        store.link_note_to_concept(note.id, "telos").await.unwrap();

        let update = ConceptUpdate {
            name: Some("final cause".into()),
            description: Some("that for the sake of which".into()),
            categories: Some(vec!["Causality".into()]),
        };
        let updated = store
            .update_concept("telos", &update)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "final cause");
        assert_eq!(updated.id, created.id);
        assert!(store.get_concept("telos").await.unwrap().is_none());

        let about = store.edges_of(EdgeKind::About).await;
        assert_eq!(about[0].to.1, "final cause");
        let belongs = store.edges_of(EdgeKind::BelongsTo).await;
        assert_eq!(belongs.len(), 1);
        assert_eq!(belongs[0].to.1, "Causality");

        assert!(store
            .update_concept("telos", &ConceptUpdate::default())
            .await
            .unwrap()
            .is_none());

        assert!(store.delete_concept("final cause").await.unwrap());
        assert!(!store.delete_concept("final cause").await.unwrap());
        assert!(store.edges_of(EdgeKind::About).await.is_empty());
        assert!(store.edges_of(EdgeKind::BelongsTo).await.is_empty());
    }

    #[tokio::test]
    async fn test_rename_onto_existing_concept_fails() {
        let store = MockGraphStore::seeded();
        store.create_or_merge_concept("time", None).await.unwrap();
        store.create_or_merge_concept("duration", None).await.unwrap();
        let update = ConceptUpdate {
            name: Some("duration".into()),
            ..Default::default()
        };
        assert!(store.update_concept("time", &update).await.is_err());
        assert!(store.get_concept("time").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_concepts_pages_by_name() {
        let store = MockGraphStore::seeded();
        for name in ["gamma", "alpha", "beta"] {
            store.create_or_merge_concept(name, None).await.unwrap();
        }
        let page: Vec<String> = store
            .list_concepts(2, 1)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(page, vec!["beta", "gamma"]);
    }

    #[tokio::test]
    async fn test_relationships_filter_by_type_and_delete_by_id() {
        let store = MockGraphStore::seeded();
        let a = NoteNode::new("Knowledge is justified true belief".into(), vec![]);
        let b = NoteNode::new("Gettier cases".into(), vec![]);
        store.create_note(&a).await.unwrap();
        store.create_note(&b).await.unwrap();
        store.create_or_merge_concept("knowledge", None).await.unwrap();
        store.link_note_to_concept(a.id, "knowledge").await.unwrap();
        store
            .link_note_to_note(b.id, a.id, "refutes", 0.8)
            .await
            .unwrap();

        let key = a.id.to_string();
        let all = store.get_relationships(&key, None).await.unwrap().unwrap();
        assert_eq!(all.len(), 2);
        // Incoming edges are listed too
        let relates: Vec<_> = all.iter().filter(|r| r.kind == EdgeKind::RelatesTo).collect();
        assert_eq!(relates[0].target.key, key);
        assert_eq!(relates[0].relation.as_deref(), Some("refutes"));

        let about = store
            .get_relationships(&key, Some(EdgeKind::About))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(about.len(), 1);
        assert_eq!(about[0].target.key, "knowledge");

        assert!(store.get_relationships("nothing", None).await.unwrap().is_none());

        assert!(store.delete_relationship(&about[0].id).await.unwrap());
        assert!(!store.delete_relationship(&about[0].id).await.unwrap());
        assert_eq!(
            store.get_relationships(&key, None).await.unwrap().unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_traverse_respects_depth_and_key_priority() {
        let store = MockGraphStore::seeded();
        let a = NoteNode::new("Purpose in nature".into(), vec![]);
        let b = NoteNode::new("Function without design".into(), vec![]);
        store.create_note(&a).await.unwrap();
        store.create_note(&b).await.unwrap();
        // Shares its name with a category
        store.create_or_merge_concept("Teleology", None).await.unwrap();
        store
            .link_note_to_note(a.id, b.id, "elaborates", 0.6)
            .await
            .unwrap();
        store.link_note_to_concept(b.id, "Teleology").await.unwrap();
        store
            .link_concept_to_category("Teleology", "Teleology", 0.9)
            .await
            .unwrap();

        let key = a.id.to_string();
        let depths: Vec<usize> = {
            let mut out = Vec::new();
            for depth in 1..=4 {
                let sub = store.traverse(&key, depth).await.unwrap().unwrap();
                out.push(sub.relationships.len());
            }
            out
        };
        assert_eq!(depths, vec![1, 2, 3, 3]);

        let sub = store.traverse(&key, 2).await.unwrap().unwrap();
        assert_eq!(sub.nodes[0].key, key);
        assert_eq!(sub.nodes.len(), 3);
        assert_eq!(sub.relationships[0].kind, EdgeKind::RelatesTo);
        assert!(!sub.truncated);

        let sub = store.traverse("Teleology", 1).await.unwrap().unwrap();
        assert_eq!(sub.start.kind, NodeKind::Concept);
        assert!(store.traverse("Nowhere", 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_note_removes_edges() {
        let store = MockGraphStore::seeded();
        let batch = compile(&[create("a", &["x"])]).unwrap();
        let id = batch.created_notes[0].unwrap();
        store.apply_mutations(&batch).await.unwrap();

        assert!(store.delete_note(id).await.unwrap());
        assert!(!store.delete_note(id).await.unwrap());
        assert!(store.edges_of(EdgeKind::About).await.is_empty());
        assert!(store.get_concept("x").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_single_link_helpers() {
        let store = MockGraphStore::seeded();
        let a = NoteNode::new("Causes precede effects".into(), vec![]);
        let b = NoteNode::new("Effects can be overdetermined".into(), vec![]);
        store.create_note(&a).await.unwrap();
        store.create_note(&b).await.unwrap();
        store.create_or_merge_concept("causation", None).await.unwrap();

        store.link_note_to_concept(a.id, "causation").await.unwrap();
        store
            .link_note_to_note(a.id, b.id, "elaborates", 0.7)
            .await
            .unwrap();
        store
            .link_note_to_category(b.id, "Causality", 0.6)
            .await
            .unwrap();

        assert_eq!(store.edges_of(EdgeKind::About).await.len(), 1);
        let relates = store.edges_of(EdgeKind::RelatesTo).await;
        assert_eq!(relates[0].relation.as_deref(), Some("elaborates"));
        assert_eq!(store.edges_of(EdgeKind::Embodies).await[0].weight, Some(0.6));

        // Linking to a missing note leaves the graph untouched
        assert!(store
            .link_note_to_concept(Uuid::new_v4(), "causation")
            .await
            .is_err());
        assert_eq!(store.edges_of(EdgeKind::About).await.len(), 1);
    }
}
