//! Scripted language model for tests.
//!
//! Replies are queued raw strings run through the real parser, so tests
//! exercise the same extraction path as production.

use super::parse::{parse_analysis, parse_answer, parse_extraction};
use super::traits::{LanguageModel, LlmError, NoteExtraction, QueryAnswer, QueryRequest};
use crate::conversation::types::{Analysis, AnalysisRequest};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Scripted `LanguageModel`
#[derive(Default)]
pub struct MockLanguageModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<AnalysisRequest>>,
    queries: Mutex<Vec<QueryRequest>>,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw reply text
    pub fn push_reply(&self, raw: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(raw.into()));
    }

    /// Queue an error
    pub fn push_error(&self, err: LlmError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    /// Sleep this long before answering
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<AnalysisRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn last_query(&self) -> Option<QueryRequest> {
        self.queries.lock().unwrap().last().cloned()
    }

    async fn next_reply(&self) -> Result<String, LlmError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Transport("no scripted reply".into())))
    }
}

/// A reply proposing one note about `concept`
pub fn note_reply(content: &str, concept: &str) -> String {
    format!(
        "I'll record this as a note about {concept}.\n\n```json\n{}\n```",
        serde_json::json!({
            "proposed_actions": [{
                "type": "create_note",
                "ref": "n1",
                "content": content,
                "concepts": [concept],
                "categories": [{"name": "Causality", "confidence": 0.8}]
            }]
        })
    )
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        parse_analysis(&self.next_reply().await?)
    }

    async fn answer(&self, request: &QueryRequest) -> Result<QueryAnswer, LlmError> {
        self.queries.lock().unwrap().push(request.clone());
        parse_answer(&self.next_reply().await?, request)
    }

    async fn extract(&self, _content: &str) -> Result<NoteExtraction, LlmError> {
        parse_extraction(&self.next_reply().await?)
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
