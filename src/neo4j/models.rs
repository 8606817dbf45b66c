//! Neo4j graph models for notes, concepts and philosophical categories

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Nodes
// ============================================================================

/// A unit of user- or AI-authored content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoteNode {
    pub id: Uuid,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NoteNode {
    /// Create a new note with a fresh id
    pub fn new(content: String, tags: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content,
            tags,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An abstract topic extracted from notes. Unique by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConceptNode {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Changes to a concept; unset fields are left as they are
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConceptUpdate {
    /// New unique name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Replaces every BELONGS_TO edge of the concept
    #[serde(default)]
    pub categories: Option<Vec<String>>,
}

/// A fixed philosophical classification bucket. Unique by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryNode {
    pub name: String,
    pub description: String,
}

/// The seeded philosophical categories
pub const DEFAULT_CATEGORIES: [(&str, &str); 7] = [
    ("Teleology", "Purpose, goals and ends that things are directed toward"),
    ("Causality", "Cause and effect, determinism and explanation"),
    ("Epistemology", "Knowledge, belief, justification and evidence"),
    ("Ontology", "Being, existence and what kinds of things there are"),
    ("Axiology", "Value, ethics and aesthetics"),
    ("Phenomenology", "Conscious experience and how things appear"),
    ("Temporality", "Time, change and persistence"),
];

/// All default categories as nodes
pub fn default_categories() -> Vec<CategoryNode> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|(name, description)| CategoryNode {
            name: (*name).to_string(),
            description: (*description).to_string(),
        })
        .collect()
}

/// Resolve a category name case-insensitively to its canonical spelling
pub fn canonical_category(name: &str) -> Option<&'static str> {
    let wanted = name.trim();
    DEFAULT_CATEGORIES
        .iter()
        .map(|(n, _)| *n)
        .find(|n| n.eq_ignore_ascii_case(wanted))
}

// ============================================================================
// Edges
// ============================================================================

/// Relationship types of the knowledge graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Note → Concept
    About,
    /// Note → Note, typed and weighted
    RelatesTo,
    /// Concept → Category, weighted
    BelongsTo,
    /// Note → Category, weighted
    Embodies,
}

impl EdgeKind {
    /// The Cypher relationship type
    pub fn as_cypher(&self) -> &'static str {
        match self {
            Self::About => "ABOUT",
            Self::RelatesTo => "RELATES_TO",
            Self::BelongsTo => "BELONGS_TO",
            Self::Embodies => "EMBODIES",
        }
    }

    /// Node kinds at the (source, target) ends of this edge
    pub fn endpoints(&self) -> (NodeKind, NodeKind) {
        match self {
            Self::About => (NodeKind::Note, NodeKind::Concept),
            Self::RelatesTo => (NodeKind::Note, NodeKind::Note),
            Self::BelongsTo => (NodeKind::Concept, NodeKind::Category),
            Self::Embodies => (NodeKind::Note, NodeKind::Category),
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_cypher())
    }
}

impl FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ABOUT" => Ok(Self::About),
            "RELATES_TO" => Ok(Self::RelatesTo),
            "BELONGS_TO" => Ok(Self::BelongsTo),
            "EMBODIES" => Ok(Self::Embodies),
            _ => Err(format!("Unknown relationship type: {}", s)),
        }
    }
}

/// Node labels of the knowledge graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Note,
    Concept,
    Category,
}

impl NodeKind {
    /// The Cypher label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Note => "Note",
            Self::Concept => "Concept",
            Self::Category => "Category",
        }
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Note" | "note" => Ok(Self::Note),
            "Concept" | "concept" => Ok(Self::Concept),
            "Category" | "category" => Ok(Self::Category),
            _ => Err(format!("Unknown node label: {}", s)),
        }
    }
}

// ============================================================================
// Traversal results
// ============================================================================

/// A node reached during traversal.
///
/// `key` is the note id for notes and the unique name for concepts and categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNodeRef {
    pub kind: NodeKind,
    pub key: String,
    /// Human-readable label: note content excerpt or concept/category name
    pub label: String,
    /// Only notes carry a creation timestamp
    pub created_at: Option<DateTime<Utc>>,
}

/// One edge step along a path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathHop {
    pub edge: EdgeKind,
    /// The `weight` property stored on the relationship, if any
    pub weight: Option<f64>,
    /// The node at the far end of this hop
    pub node: GraphNodeRef,
}

/// A path starting at the query note
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GraphPath {
    pub hops: Vec<PathHop>,
}

impl GraphPath {
    /// The node the path ends on
    pub fn end(&self) -> Option<&GraphNodeRef> {
        self.hops.last().map(|h| &h.node)
    }
}

/// Most relationships a traversal returns
pub const MAX_SUBGRAPH_RELATIONSHIPS: usize = 500;

/// A stored relationship, reported in its stored direction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    /// Store-assigned id, accepted by `DELETE /relationships/{id}`
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    pub source: GraphNodeRef,
    pub target: GraphNodeRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Sub-type of a RELATES_TO edge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

/// Nodes and relationships within reach of a start node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subgraph {
    pub start: GraphNodeRef,
    pub max_depth: usize,
    /// The start node first, then every endpoint of `relationships`
    pub nodes: Vec<GraphNodeRef>,
    /// Closest relationships first
    pub relationships: Vec<Relationship>,
    /// More than `MAX_SUBGRAPH_RELATIONSHIPS` were in reach
    pub truncated: bool,
}

impl Subgraph {
    /// Build from relationships ordered closest first, capping them
    pub fn assemble(
        start: GraphNodeRef,
        max_depth: usize,
        mut relationships: Vec<Relationship>,
    ) -> Self {
        let truncated = relationships.len() > MAX_SUBGRAPH_RELATIONSHIPS;
        relationships.truncate(MAX_SUBGRAPH_RELATIONSHIPS);

        let mut nodes = vec![start.clone()];
        for rel in &relationships {
            for node in [&rel.source, &rel.target] {
                if !nodes.iter().any(|n| n.kind == node.kind && n.key == node.key) {
                    nodes.push(node.clone());
                }
            }
        }
        Self {
            start,
            max_depth,
            nodes,
            relationships,
            truncated,
        }
    }
}

/// A node ranked by `query_related`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelatedNode {
    pub node: GraphNodeRef,
    /// Product of per-edge weights along the best path, times the recency factor
    pub weight: f64,
    /// Length of the best path
    pub hops: usize,
}
