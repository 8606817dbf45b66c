//! Conversation controller
//!
//! - [`manager`]: `ConversationManager`: per-conversation state machine and workflow
//! - [`types`]: states, history, proposed actions and operation results
//! - [`error`]: `ConversationError` taxonomy
//! - [`config`]: `ConversationConfig`

pub mod config;
pub mod error;
pub mod manager;
pub mod types;

pub use config::ConversationConfig;
pub use error::{ConversationError, ErrorKind};
pub use manager::ConversationManager;
pub use types::*;
