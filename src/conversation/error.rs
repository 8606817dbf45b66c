//! Conversation error taxonomy

use super::types::ConversationState;
use crate::llm::LlmError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by `ConversationManager` operations
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Conversation {0} not found")]
    NotFound(Uuid),

    #[error("Cannot {operation} while conversation is {state}")]
    InvalidState {
        operation: &'static str,
        state: ConversationState,
    },

    #[error("Input text must not be empty")]
    EmptyInput,

    #[error("Language model request failed: {0}")]
    Upstream(LlmError),

    #[error("Language model reply did not match the action schema: {0}")]
    Schema(String),

    #[error("Executing confirmed actions failed: {0}")]
    Execution(String),

    #[error("Executing confirmed actions timed out after {0:?}")]
    ExecutionTimeout(Duration),

    #[error("Conversation {0} was ended while an operation was in flight")]
    Abandoned(Uuid),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error class reported to API clients
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    BadRequest,
    Upstream,
    UpstreamTimeout,
    Schema,
    Execution,
    ExecutionTimeout,
    Abandoned,
    Internal,
}

impl ConversationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::EmptyInput => ErrorKind::BadRequest,
            Self::Upstream(e) if e.is_timeout() => ErrorKind::UpstreamTimeout,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Schema(_) => ErrorKind::Schema,
            Self::Execution(_) => ErrorKind::Execution,
            Self::ExecutionTimeout(_) => ErrorKind::ExecutionTimeout,
            Self::Abandoned(_) => ErrorKind::Abandoned,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether repeating the same call could succeed.
    ///
    /// Failed analyses and executions leave the conversation where it was,
    /// so the user can resend the input or confirm again. Upstream failures
    /// are retryable only when the model call itself is.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream(e) => e.is_retryable(),
            Self::Schema(_) | Self::Execution(_) | Self::ExecutionTimeout(_) => true,
            _ => false,
        }
    }
}

impl From<LlmError> for ConversationError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Schema(msg) => Self::Schema(msg),
            other => Self::Upstream(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_schema_error_maps_to_schema() {
        let err: ConversationError = LlmError::Schema("no json block".into()).into();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_llm_timeout_maps_to_upstream_timeout() {
        let err: ConversationError = LlmError::Timeout(Duration::from_secs(30)).into();
        assert_eq!(err.kind(), ErrorKind::UpstreamTimeout);
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_upstream_retryability_follows_model_error() {
        let err: ConversationError = LlmError::NotConfigured("api key missing".into()).into();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(!err.is_retryable());

        let err: ConversationError = LlmError::Api {
            status: 400,
            message: "bad request".into(),
        }
        .into();
        assert!(!err.is_retryable());

        let err: ConversationError = LlmError::Api {
            status: 503,
            message: "overloaded".into(),
        }
        .into();
        assert!(err.is_retryable());

        let err: ConversationError = LlmError::Timeout(Duration::from_secs(30)).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_state_message_names_state() {
        let err = ConversationError::InvalidState {
            operation: "confirm",
            state: ConversationState::AwaitingInput,
        };
        assert_eq!(
            err.to_string(),
            "Cannot confirm while conversation is awaiting_input"
        );
        assert!(!err.is_retryable());
    }
}
