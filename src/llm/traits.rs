//! LanguageModel trait and error type

use crate::conversation::types::{Analysis, AnalysisRequest, CategoryScore, ContextNote};
use crate::neo4j::models::EdgeKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors from a language model call
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Language model did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Could not reach the language model: {0}")]
    Transport(String),

    #[error("Language model API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Language model is not configured: {0}")]
    NotConfigured(String),

    #[error("{0}")]
    Schema(String),
}

impl LlmError {
    /// Whether another attempt within the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::NotConfigured(_) | Self::Schema(_) => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// A free-form question answered against a set of notes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    pub prompt: String,
    pub notes: Vec<ContextNote>,
    pub concepts: Vec<String>,
}

/// Answer to a [`QueryRequest`]
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct QueryAnswer {
    pub response: String,
    /// Context notes the answer draws on
    pub source_notes: Vec<Uuid>,
    pub concepts_referenced: Vec<String>,
}

/// A relationship the model sees in a piece of text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestedRelationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

/// Concepts, categories and relationships found in note text
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct NoteExtraction {
    pub extracted_concepts: Vec<String>,
    /// Canonical category names
    pub categories: Vec<CategoryScore>,
    pub suggested_relationships: Vec<SuggestedRelationship>,
}

/// Trait for turning a conversation turn into a summary and proposed actions.
///
/// Implementations must be thread-safe (`Send + Sync`) for use in async contexts.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Analyse the input in the light of history and graph context.
    ///
    /// Returns a reply that conforms to the action schema or fails with
    /// [`LlmError::Schema`].
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, LlmError>;

    /// Answer a question from the given notes. Never proposes graph changes.
    async fn answer(&self, request: &QueryRequest) -> Result<QueryAnswer, LlmError>;

    /// Extract concepts and categories from note text without touching the graph
    async fn extract(&self, content: &str) -> Result<NoteExtraction, LlmError>;

    /// Model identifier, for logs and health output
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(LlmError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(LlmError::Transport("reset".into()).is_retryable());
        assert!(LlmError::Api {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(LlmError::Api {
            status: 503,
            message: "overloaded".into()
        }
        .is_retryable());
        assert!(!LlmError::Api {
            status: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(!LlmError::Schema("no block".into()).is_retryable());
        assert!(!LlmError::NotConfigured("key".into()).is_retryable());
    }
}
