//! Language model client
//!
//! Architecture follows the project pattern (trait + impl + mock):
//! - `LanguageModel` trait: async interface for analysing a conversation turn,
//!   answering questions over notes and extracting concepts from text
//! - `HttpLanguageModel`: OpenAI-compatible `/chat/completions` client with retry
//! - `MockLanguageModel`: scripted replies for tests

#[cfg(test)]
pub mod mock;
pub mod openai;
pub mod parse;
pub mod prompt;
pub mod traits;

#[cfg(test)]
pub use mock::MockLanguageModel;
pub use openai::{HttpLanguageModel, HttpLanguageModelConfig};
pub use parse::{parse_analysis, parse_answer, parse_extraction};
pub use traits::{
    LanguageModel, LlmError, NoteExtraction, QueryAnswer, QueryRequest, SuggestedRelationship,
};
