//! Noterer
//!
//! Conversational note taking over a knowledge graph:
//! - Neo4j graph of notes, concepts and philosophical categories
//! - LLM analysis of each turn into proposed graph edits
//! - Explicit user confirmation before any edit is applied, in one transaction
//! - HTTP API and terminal client

pub mod api;
pub mod conversation;
pub mod graph;
pub mod llm;
pub mod neo4j;

use anyhow::{Context, Result};
use graph::{EdgeWeights, RecencyDecay, RelatedQuery};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub neo4j: Neo4jYamlConfig,
    pub llm: LlmYamlConfig,
    pub conversation: ConversationYamlConfig,
    pub graph: GraphYamlConfig,
    pub ui: UiConfig,
    pub logging: LoggingYamlConfig,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
        }
    }
}

/// Neo4j configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jYamlConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub timeout_secs: u64,
}

impl Default for Neo4jYamlConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "password".into(),
            timeout_secs: 10,
        }
    }
}

/// Language model configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmYamlConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for LlmYamlConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".into(),
            api_key: None,
            model: "gpt-4o".into(),
            max_tokens: 2048,
            temperature: 0.3,
            timeout_secs: 30,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

/// Conversation configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConversationYamlConfig {
    /// Most recent history messages sent to the model
    pub history_window: usize,
    pub context_related_limit: usize,
    pub session_timeout_secs: u64,
    pub ended_retention_secs: u64,
}

impl Default for ConversationYamlConfig {
    fn default() -> Self {
        Self {
            history_window: 5,
            context_related_limit: 5,
            session_timeout_secs: 3600,
            ended_retention_secs: 3600,
        }
    }
}

/// Traversal configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphYamlConfig {
    pub max_hops: usize,
    pub limit: usize,
    pub recency_decay_days: f64,
    pub recency_enabled: bool,
    pub weights: EdgeWeights,
}

impl Default for GraphYamlConfig {
    fn default() -> Self {
        Self {
            max_hops: 2,
            limit: 10,
            recency_decay_days: 30.0,
            recency_enabled: false,
            weights: EdgeWeights::default(),
        }
    }
}

/// UI settings handed to clients by `GET /settings/ui`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    pub theme: String,
    pub autosave_interval_secs: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: "system".into(),
            autosave_interval_secs: 30,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Where log lines go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    Stdout,
    Stderr,
    File(PathBuf),
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingYamlConfig {
    pub level: String,
    pub format: LogFormat,
    /// `stdout`, `stderr` or a file path
    pub destination: String,
}

impl Default for LoggingYamlConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
            destination: "stdout".into(),
        }
    }
}

impl LoggingYamlConfig {
    pub fn destination(&self) -> LogDestination {
        match self.destination.trim() {
            "" | "stdout" => LogDestination::Stdout,
            "stderr" => LogDestination::Stderr,
            path => LogDestination::File(PathBuf::from(path)),
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub neo4j_timeout: Duration,
    pub llm: LlmYamlConfig,
    pub conversation: ConversationYamlConfig,
    pub graph: GraphYamlConfig,
    pub ui: UiConfig,
    pub logging: LoggingYamlConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_yaml(YamlConfig::default())
    }
}

impl Config {
    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        // 1. Load YAML config (or defaults if file not found)
        let yaml = Self::load_yaml(yaml_path);

        // 2. Apply env var overrides
        let mut config = Self::from_yaml(yaml);
        if let Ok(uri) = std::env::var("NEO4J_URI") {
            config.neo4j_uri = uri;
        }
        if let Ok(user) = std::env::var("NEO4J_USER") {
            config.neo4j_user = user;
        }
        if let Ok(password) = std::env::var("NEO4J_PASSWORD") {
            config.neo4j_password = password;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                config.llm.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("LLM_API_URL") {
            config.llm.api_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Some(port) = std::env::var("SERVER_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.server_port = port;
        }
        if let Ok(host) = std::env::var("SERVER_HOST") {
            config.server_host = host;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }
        Ok(config)
    }

    fn from_yaml(yaml: YamlConfig) -> Self {
        Self {
            server_host: yaml.server.host,
            server_port: yaml.server.port,
            neo4j_uri: yaml.neo4j.uri,
            neo4j_user: yaml.neo4j.user,
            neo4j_password: yaml.neo4j.password,
            neo4j_timeout: Duration::from_secs(yaml.neo4j.timeout_secs),
            llm: yaml.llm,
            conversation: yaml.conversation,
            graph: yaml.graph,
            ui: yaml.ui,
            logging: yaml.logging,
        }
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }

    /// Settings of the HTTP language model client
    pub fn llm_config(&self) -> llm::HttpLanguageModelConfig {
        llm::HttpLanguageModelConfig {
            api_url: self.llm.api_url.clone(),
            api_key: self.llm.api_key.clone(),
            model: self.llm.model.clone(),
            max_tokens: self.llm.max_tokens,
            temperature: self.llm.temperature,
            timeout: Duration::from_secs(self.llm.timeout_secs),
            max_retries: self.llm.max_retries,
            retry_backoff: Duration::from_millis(self.llm.retry_backoff_ms),
        }
    }

    /// Default traversal settings for `queryRelated`
    pub fn related_query(&self) -> RelatedQuery {
        RelatedQuery {
            max_hops: self.graph.max_hops.max(1),
            limit: self.graph.limit.max(1),
            weights: self.graph.weights,
            recency: self.graph.recency_enabled.then_some(RecencyDecay {
                decay_days: self.graph.recency_decay_days,
            }),
            kinds: Vec::new(),
        }
    }

    /// Conversation controller settings.
    ///
    /// The analysis bound covers every model attempt plus the pauses between them.
    pub fn conversation_config(&self) -> conversation::ConversationConfig {
        let attempt = Duration::from_secs(self.llm.timeout_secs);
        let backoff = Duration::from_millis(self.llm.retry_backoff_ms);
        let analysis_timeout = attempt * (self.llm.max_retries + 1)
            + backoff * self.llm.max_retries
            + Duration::from_secs(5);

        conversation::ConversationConfig {
            history_window: self.conversation.history_window,
            context_related_limit: self.conversation.context_related_limit,
            session_timeout: Duration::from_secs(self.conversation.session_timeout_secs),
            ended_retention: Duration::from_secs(self.conversation.ended_retention_secs),
            analysis_timeout,
            execution_timeout: self.neo4j_timeout,
            related: self.related_query(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<dyn neo4j::GraphStore>,
    pub model: Arc<dyn llm::LanguageModel>,
    pub conversations: Arc<conversation::ConversationManager>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state with all services initialized
    pub async fn new(config: Config) -> Result<Self> {
        let graph: Arc<dyn neo4j::GraphStore> = Arc::new(
            neo4j::Neo4jClient::new(
                &config.neo4j_uri,
                &config.neo4j_user,
                &config.neo4j_password,
                config.neo4j_timeout,
            )
            .await?,
        );

        let model: Arc<dyn llm::LanguageModel> =
            Arc::new(llm::HttpLanguageModel::new(config.llm_config())?);
        if config.llm.api_key.is_none() {
            tracing::warn!(
                "No LLM API key configured; conversation input fails until OPENAI_API_KEY is set"
            );
        }

        let conversations = Arc::new(conversation::ConversationManager::new(
            graph.clone(),
            model.clone(),
            config.conversation_config(),
        ));

        Ok(Self {
            graph,
            model,
            conversations,
            config: Arc::new(config),
        })
    }
}

/// Connect, seed categories, and serve the HTTP API until shutdown
pub async fn start_server(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState::new(config).await?;
    tracing::info!("Connected to Neo4j at {}", state.config.neo4j_uri);

    state.graph.seed_categories().await?;
    let _sweeper = state.conversations.spawn_sweeper();

    let server_state = Arc::new(api::handlers::ServerState {
        graph: state.graph.clone(),
        conversations: state.conversations.clone(),
        model: state.model.clone(),
        ui: state.config.ui.clone(),
        related_defaults: state.config.related_query(),
        recency_decay_days: state.config.graph.recency_decay_days,
    });
    let app = api::create_router(server_state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Noterer listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

// ============================================================================
// Tests
// ============================================================================
