//! HTTP language model implementation
//!
//! Implements `LanguageModel` against any OpenAI-compatible `/chat/completions`
//! endpoint (OpenAI, Azure-style proxies, LiteLLM, vLLM, Ollama).
//!
//! Each attempt is bounded by `timeout`; timeouts, transport errors, HTTP 429
//! and 5xx are retried up to `max_retries` times with a fixed pause.

use super::parse::{parse_analysis, parse_answer, parse_extraction};
use super::prompt::{build_extraction_messages, build_messages, build_query_messages, ChatMessage};
use super::traits::{LanguageModel, LlmError, NoteExtraction, QueryAnswer, QueryRequest};
use crate::conversation::types::{Analysis, AnalysisRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Settings for [`HttpLanguageModel`]
#[derive(Debug, Clone)]
pub struct HttpLanguageModelConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Per-attempt timeout
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for HttpLanguageModelConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// OpenAI-compatible chat completion client.
///
/// Thread-safe and cheaply cloneable (shares the reqwest client internally).
#[derive(Clone)]
pub struct HttpLanguageModel {
    client: reqwest::Client,
    endpoint: String,
    config: HttpLanguageModelConfig,
}

/// OpenAI-compatible chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

/// OpenAI-compatible chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible error response
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpLanguageModel {
    /// Create a new client.
    ///
    /// Fails only if the TLS backend cannot be initialised.
    pub fn new(config: HttpLanguageModelConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        let endpoint = format!("{}/chat/completions", config.api_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    /// One completion round-trip, returning the assistant message content
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Err(LlmError::NotConfigured(
                "no API key (set OPENAI_API_KEY or llm.api_key)".into(),
            ));
        };

        let mut attempt = 0;
        loop {
            let result =
                tokio::time::timeout(self.config.timeout, self.send_once(api_key, messages))
                    .await
                    .unwrap_or(Err(LlmError::Timeout(self.config.timeout)));

            match result {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        "Language model call failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, api_key: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.timeout)
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error)
                .map(|d| d.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("unreadable completion response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::Schema("completion contained no message content".into()))
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, LlmError> {
        let messages = build_messages(request);
        debug!(
            model = %self.config.model,
            messages = messages.len(),
            prompt_chars = messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "Sending analysis request"
        );
        let raw = self.complete(&messages).await?;
        parse_analysis(&raw)
    }

    async fn answer(&self, request: &QueryRequest) -> Result<QueryAnswer, LlmError> {
        let messages = build_query_messages(request);
        debug!(
            model = %self.config.model,
            notes = request.notes.len(),
            "Sending query request"
        );
        let raw = self.complete(&messages).await?;
        parse_answer(&raw, request)
    }

    async fn extract(&self, content: &str) -> Result<NoteExtraction, LlmError> {
        let raw = self.complete(&build_extraction_messages(content)).await?;
        parse_extraction(&raw)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
