//! HTTP API for conversations, the note graph and one-shot model calls

pub mod ai_handlers;
pub mod conversation_handlers;
pub mod graph_handlers;
pub mod handlers;
pub mod note_handlers;
pub mod query;
pub mod routes;

pub use query::*;
pub use routes::create_router;
