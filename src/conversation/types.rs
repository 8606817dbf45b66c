//! Conversation data types: states, messages, proposed actions and API views

use crate::neo4j::models::{EdgeKind, RelatedNode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// State machine
// ============================================================================

/// Lifecycle state of a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    AwaitingInput,
    Analyzing,
    AwaitingConfirmation,
    Executing,
    Ended,
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AwaitingInput => write!(f, "awaiting_input"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::AwaitingConfirmation => write!(f, "awaiting_confirmation"),
            Self::Executing => write!(f, "executing"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

// ============================================================================
// History
// ============================================================================

/// Who authored a history entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    /// Role name in the OpenAI chat format
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One role-tagged turn of the conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Proposed actions
// ============================================================================

fn default_confidence() -> f64 {
    1.0
}

/// A category assignment with the model's confidence in it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryScore {
    pub name: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

/// Properties attached to a proposed relationship
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RelationshipProperties {
    /// Confidence/relevance in [0, 1]; 1.0 when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Sub-type of a RELATES_TO edge (e.g. "contradicts", "elaborates")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

/// A graph mutation proposed by the language model, awaiting confirmation.
///
/// Note endpoints are UUIDs of existing notes or the `ref` alias of a note
/// created earlier in the same proposal. Concept endpoints are concept names,
/// category endpoints category names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProposedAction {
    CreateNote {
        #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
        content: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        concepts: Vec<String>,
        #[serde(default)]
        categories: Vec<CategoryScore>,
    },
    UpdateNote {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note_id: Option<Uuid>,
        #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tags: Option<Vec<String>>,
    },
    CreateConcept {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default)]
        categories: Vec<CategoryScore>,
    },
    CreateRelationship {
        relationship_type: EdgeKind,
        source: String,
        target: String,
        #[serde(default)]
        properties: RelationshipProperties,
    },
}

impl ProposedAction {
    /// One-line human-readable description
    pub fn describe(&self) -> String {
        match self {
            Self::CreateNote {
                content, concepts, ..
            } => {
                let excerpt = excerpt(content, 60);
                if concepts.is_empty() {
                    format!("Create note \"{}\"", excerpt)
                } else {
                    format!(
                        "Create note \"{}\" about {}",
                        excerpt,
                        concepts.join(", ")
                    )
                }
            }
            Self::UpdateNote {
                note_id, alias, ..
            } => match (note_id, alias) {
                (Some(id), _) => format!("Update note {}", id),
                (None, Some(alias)) => format!("Update note '{}'", alias),
                (None, None) => "Update note".to_string(),
            },
            Self::CreateConcept { name, .. } => format!("Create or reuse concept \"{}\"", name),
            Self::CreateRelationship {
                relationship_type,
                source,
                target,
                ..
            } => format!("Link {} -[{}]-> {}", source, relationship_type, target),
        }
    }
}

/// Shorten text to at most `max` characters on a char boundary
pub fn excerpt(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max).collect();
        format!("{}…", cut.trim_end())
    }
}

/// A set of actions awaiting user confirmation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    pub id: Uuid,
    pub summary: String,
    pub actions: Vec<ProposedAction>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Graph context
// ============================================================================

/// A note referenced in the conversation context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextNote {
    pub id: Uuid,
    pub excerpt: String,
}

/// Graph entities touched by this conversation's executed actions
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphContext {
    pub notes: Vec<ContextNote>,
    pub concepts: Vec<String>,
}

/// Entries kept per context list
const MAX_CONTEXT_ITEMS: usize = 20;

impl GraphContext {
    /// Record a note, moving it to the most-recent position
    pub fn remember_note(&mut self, id: Uuid, excerpt: String) {
        self.notes.retain(|n| n.id != id);
        self.notes.push(ContextNote { id, excerpt });
        if self.notes.len() > MAX_CONTEXT_ITEMS {
            self.notes.remove(0);
        }
    }

    /// Record a concept name, moving it to the most-recent position
    pub fn remember_concept(&mut self, name: &str) {
        self.concepts.retain(|c| c != name);
        self.concepts.push(name.to_string());
        if self.concepts.len() > MAX_CONTEXT_ITEMS {
            self.concepts.remove(0);
        }
    }

    /// The note touched most recently
    pub fn latest_note(&self) -> Option<Uuid> {
        self.notes.last().map(|n| n.id)
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.concepts.is_empty()
    }
}

// ============================================================================
// Operation results
// ============================================================================

/// Result of `submit_input`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputResult {
    pub conversation_id: Uuid,
    pub response: String,
    pub proposed_actions: Vec<ProposedAction>,
    pub requires_confirmation: bool,
    pub conversation_state: ConversationState,
}

/// An action that was applied to the graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutedAction {
    pub action: ProposedAction,
    pub description: String,
    /// Id of the note this action created, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_note_id: Option<Uuid>,
}

/// Result of `confirm`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationResult {
    pub conversation_id: Uuid,
    pub confirmed: bool,
    pub response: String,
    pub executed_actions: Vec<ExecutedAction>,
    pub conversation_state: ConversationState,
}

/// Result of `end`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndOutcome {
    Ended,
    AlreadyEnded,
}

/// Point-in-time view of a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub conversation_id: Uuid,
    pub state: ConversationState,
    pub history: Vec<ConversationMessage>,
    pub pending_proposal: Option<Proposal>,
    pub context: GraphContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConversationSnapshot {
    /// Snapshot of a conversation whose state has already been released
    pub fn ended(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            state: ConversationState::Ended,
            history: Vec::new(),
            pending_proposal: None,
            context: GraphContext::default(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// What the language model sees for one analysis
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisRequest {
    /// Windowed history preceding the current input
    pub history: Vec<ConversationMessage>,
    pub context: GraphContext,
    /// Graph neighbours of the most recent context note
    pub related: Vec<RelatedNode>,
    pub input: String,
}

/// Parsed language model answer
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub summary: String,
    pub actions: Vec<ProposedAction>,
}
