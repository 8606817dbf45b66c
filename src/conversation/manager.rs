//! Conversation controller
//!
//! Owns every live conversation and drives the confirmation workflow:
//!
//! ```text
//! start ─► AwaitingInput ─submit─► Analyzing ─► AwaitingConfirmation ─confirm─► Executing ─┐
//!              ▲   ▲                   │ error            │ reject                          │
//!              │   └───────────────────┘                  │                                 │
//!              └──────────────────────────────────────────┴─────────────────────────────────┘
//! end: any state ─► Ended
//! ```
//!
//! Operations on one conversation are serialised by a per-conversation lock;
//! different conversations proceed independently. `end()` never waits for that
//! lock: it cancels an in-flight analysis and marks an in-flight execution as
//! abandoned.
//!
//! `submit_input` and `confirm` run on their own task. Dropping the caller's
//! future does not interrupt the turn, so a conversation never stays behind in
//! `Analyzing` or `Executing`.

use super::config::ConversationConfig;
use super::error::ConversationError;
use super::types::*;
use crate::graph::mutation::{compile, GraphMutation, MutationBatch};
use crate::graph::related::RelatedQuery;
use crate::llm::{LanguageModel, LlmError};
use crate::neo4j::models::{NodeKind, RelatedNode};
use crate::neo4j::GraphStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use moka::future::Cache;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const REJECTION_MESSAGE: &str = "Actions cancelled as requested.";
pub const SUCCESS_MESSAGE: &str = "All actions were completed successfully.";
pub const NOTHING_TO_DO_MESSAGE: &str = "Nothing was changed in the knowledge graph.";

/// Messages retained per conversation; older ones are dropped first
pub const MAX_HISTORY_MESSAGES: usize = 200;

type Result<T> = std::result::Result<T, ConversationError>;

// ============================================================================
// Conversation record
// ============================================================================

/// State of one conversation
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: Uuid,
    pub state: ConversationState,
    pub history: Vec<ConversationMessage>,
    pub pending: Option<Proposal>,
    pub context: GraphContext,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: ConversationState::Idle,
            history: Vec::new(),
            pending: None,
            context: GraphContext::default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn require(&self, operation: &'static str, expected: ConversationState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ConversationError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn push(&mut self, role: MessageRole, content: impl Into<String>) {
        self.history.push(ConversationMessage::new(role, content));
        if self.history.len() > MAX_HISTORY_MESSAGES {
            let excess = self.history.len() - MAX_HISTORY_MESSAGES;
            self.history.drain(..excess);
        }
        self.touch();
    }

    /// Last `window` messages
    pub fn history_window(&self, window: usize) -> Vec<ConversationMessage> {
        let start = self.history.len().saturating_sub(window);
        self.history[start..].to_vec()
    }

    /// AwaitingInput → Analyzing. Returns the windowed history that precedes
    /// the input.
    fn begin_analysis(&mut self, text: &str, window: usize) -> Result<Vec<ConversationMessage>> {
        self.require("submit input", ConversationState::AwaitingInput)?;
        let prior = self.history_window(window);
        self.push(MessageRole::User, text);
        self.state = ConversationState::Analyzing;
        Ok(prior)
    }

    /// Analyzing → AwaitingConfirmation
    fn finish_analysis(&mut self, analysis: &Analysis) -> Proposal {
        let proposal = Proposal {
            id: Uuid::new_v4(),
            summary: analysis.summary.clone(),
            actions: analysis.actions.clone(),
            created_at: Utc::now(),
        };
        self.push(MessageRole::Assistant, analysis.summary.clone());
        self.pending = Some(proposal.clone());
        self.state = ConversationState::AwaitingConfirmation;
        proposal
    }

    /// Analyzing → AwaitingInput, dropping the turn's user message
    fn abort_analysis(&mut self) {
        if self.state == ConversationState::Analyzing
            && matches!(self.history.last(), Some(m) if m.role == MessageRole::User)
        {
            self.history.pop();
        }
        self.state = ConversationState::AwaitingInput;
        self.touch();
    }

    /// AwaitingConfirmation → AwaitingInput, discarding the proposal
    fn reject(&mut self) -> Result<()> {
        self.require("confirm", ConversationState::AwaitingConfirmation)?;
        self.pending = None;
        self.push(MessageRole::System, REJECTION_MESSAGE);
        self.state = ConversationState::AwaitingInput;
        Ok(())
    }

    /// AwaitingConfirmation → Executing, taking the proposal
    fn begin_execution(&mut self) -> Result<Proposal> {
        self.require("confirm", ConversationState::AwaitingConfirmation)?;
        let Some(proposal) = self.pending.take() else {
            return Err(ConversationError::InvalidState {
                operation: "confirm",
                state: self.state,
            });
        };
        self.state = ConversationState::Executing;
        self.touch();
        Ok(proposal)
    }

    /// Executing → AwaitingInput, recording what was written
    fn finish_execution(&mut self, batch: &MutationBatch, response: &str) {
        for mutation in &batch.mutations {
            match mutation {
                GraphMutation::CreateNote(note) => {
                    self.context.remember_note(note.id, excerpt(&note.content, 80))
                }
                GraphMutation::UpdateNote { id, content, .. } => {
                    let label = content
                        .as_deref()
                        .map(|c| excerpt(c, 80))
                        .unwrap_or_else(|| "(updated note)".to_string());
                    self.context.remember_note(*id, label);
                }
                _ => {}
            }
        }
        for concept in &batch.touched_concepts {
            self.context.remember_concept(concept);
        }
        self.push(MessageRole::System, response);
        self.state = ConversationState::AwaitingInput;
    }

    /// Executing → AwaitingConfirmation, restoring the proposal
    fn abort_execution(&mut self, proposal: Proposal) {
        self.pending = Some(proposal);
        self.state = ConversationState::AwaitingConfirmation;
        self.touch();
    }

    fn end(&mut self) {
        self.state = ConversationState::Ended;
        self.pending = None;
        self.history.clear();
        self.context = GraphContext::default();
        self.touch();
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            conversation_id: self.id,
            state: self.state,
            history: self.history.clone(),
            pending_proposal: self.pending.clone(),
            context: self.context.clone(),
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

struct ConversationEntry {
    /// Held for the whole of an operation
    op_lock: Mutex<()>,
    /// Held only for short, non-suspending updates
    record: Mutex<Conversation>,
    cancel: CancellationToken,
}

impl ConversationEntry {
    /// Ended while we waited for a lock
    fn ensure_live(&self, operation: &'static str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ConversationError::InvalidState {
                operation,
                state: ConversationState::Ended,
            });
        }
        Ok(())
    }
}

/// Collaborators of one operation, owned so the operation can run detached
#[derive(Clone)]
struct Worker {
    graph: Arc<dyn GraphStore>,
    model: Arc<dyn LanguageModel>,
    config: Arc<ConversationConfig>,
}

/// Owns all live conversations
pub struct ConversationManager {
    worker: Worker,
    conversations: DashMap<Uuid, Arc<ConversationEntry>>,
    ended: Cache<Uuid, ()>,
}

impl ConversationManager {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        model: Arc<dyn LanguageModel>,
        config: ConversationConfig,
    ) -> Self {
        let ended = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(config.ended_retention)
            .build();
        Self {
            worker: Worker {
                graph,
                model,
                config: Arc::new(config),
            },
            conversations: DashMap::new(),
            ended,
        }
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.worker.config
    }

    /// Number of live conversations
    pub fn active_count(&self) -> usize {
        self.conversations.len()
    }

    fn lookup(&self, id: Uuid, operation: &'static str) -> Result<Arc<ConversationEntry>> {
        if let Some(entry) = self.conversations.get(&id) {
            return Ok(entry.value().clone());
        }
        if self.ended.contains_key(&id) {
            return Err(ConversationError::InvalidState {
                operation,
                state: ConversationState::Ended,
            });
        }
        Err(ConversationError::NotFound(id))
    }

    /// Create a conversation, ready for input
    pub async fn start(&self) -> ConversationSnapshot {
        let id = Uuid::new_v4();
        let mut record = Conversation::new(id);
        record.state = ConversationState::AwaitingInput;
        let snapshot = record.snapshot();
        self.conversations.insert(
            id,
            Arc::new(ConversationEntry {
                op_lock: Mutex::new(()),
                record: Mutex::new(record),
                cancel: CancellationToken::new(),
            }),
        );
        info!(conversation_id = %id, "Conversation started");
        snapshot
    }

    /// Analyse user input and hold the resulting proposal for confirmation
    pub async fn submit_input(
        &self,
        id: Uuid,
        text: &str,
        include_graph_context: bool,
    ) -> Result<InputResult> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConversationError::EmptyInput);
        }
        let entry = self.lookup(id, "submit input")?;
        let worker = self.worker.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            worker
                .analyze(id, &entry, &text, include_graph_context)
                .await
        })
        .await
        .map_err(|e| ConversationError::Internal(format!("analysis task failed: {}", e)))?
    }

    /// Accept or reject the pending proposal
    pub async fn confirm(&self, id: Uuid, accept: bool) -> Result<ConfirmationResult> {
        let entry = self.lookup(id, "confirm")?;
        let worker = self.worker.clone();
        tokio::spawn(async move { worker.execute(id, &entry, accept).await })
            .await
            .map_err(|e| ConversationError::Internal(format!("confirmation task failed: {}", e)))?
    }

    /// End a conversation. Idempotent within the retention window.
    pub async fn end(&self, id: Uuid) -> Result<EndOutcome> {
        if self.conversations.contains_key(&id) {
            self.ended.insert(id, ()).await;
        }
        match self.conversations.remove(&id) {
            Some((_, entry)) => {
                entry.cancel.cancel();
                entry.record.lock().await.end();
                info!(conversation_id = %id, "Conversation ended");
                Ok(EndOutcome::Ended)
            }
            None if self.ended.contains_key(&id) => Ok(EndOutcome::AlreadyEnded),
            None => Err(ConversationError::NotFound(id)),
        }
    }

    /// Current view of a conversation
    pub async fn get(&self, id: Uuid) -> Result<ConversationSnapshot> {
        match self.conversations.get(&id).map(|e| e.value().clone()) {
            Some(entry) => Ok(entry.record.lock().await.snapshot()),
            None if self.ended.contains_key(&id) => Ok(ConversationSnapshot::ended(id)),
            None => Err(ConversationError::NotFound(id)),
        }
    }

    /// End conversations idle for longer than the session timeout.
    /// Conversations with an operation in flight are skipped.
    pub async fn sweep_idle(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.worker.config.session_timeout)
                .unwrap_or_else(|_| chrono::Duration::days(1));
        let entries: Vec<(Uuid, Arc<ConversationEntry>)> = self
            .conversations
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();

        let mut expired = Vec::new();
        for (id, entry) in entries {
            if entry.op_lock.try_lock().is_err() {
                continue;
            }
            if entry.record.lock().await.updated_at < cutoff {
                expired.push(id);
            }
        }

        let mut swept = 0;
        for id in expired {
            info!(conversation_id = %id, "Ending idle conversation");
            if let Ok(EndOutcome::Ended) = self.end(id).await {
                swept += 1;
            }
        }
        swept
    }

    /// Periodically end idle conversations
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let interval = manager.config().sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let swept = manager.sweep_idle().await;
                if swept > 0 {
                    debug!("Swept {} idle conversations", swept);
                }
            }
        })
    }
}

impl Worker {
    async fn analyze(
        &self,
        id: Uuid,
        entry: &ConversationEntry,
        text: &str,
        include_graph_context: bool,
    ) -> Result<InputResult> {
        let _op = entry.op_lock.lock().await;
        entry.ensure_live("submit input")?;

        let mut request = {
            let mut record = entry.record.lock().await;
            let history = record.begin_analysis(text, self.config.history_window)?;
            AnalysisRequest {
                history,
                context: record.context.clone(),
                related: Vec::new(),
                input: text.to_string(),
            }
        };
        info!(conversation_id = %id, "Analyzing input ({} chars)", text.len());

        if include_graph_context {
            request.related = self.related_context(&request.context).await;
        }

        let outcome = tokio::select! {
            biased;
            _ = entry.cancel.cancelled() => Err(ConversationError::Abandoned(id)),
            result = tokio::time::timeout(self.config.analysis_timeout, self.model.analyze(&request)) => {
                match result {
                    Ok(Ok(analysis)) => Ok(analysis),
                    Ok(Err(e)) => Err(ConversationError::from(e)),
                    Err(_) => Err(ConversationError::Upstream(LlmError::Timeout(
                        self.config.analysis_timeout,
                    ))),
                }
            }
        };

        // end() cancels before it takes the record lock
        let mut record = entry.record.lock().await;
        if entry.cancel.is_cancelled() {
            debug!(conversation_id = %id, "Discarding analysis for ended conversation");
            return Err(ConversationError::Abandoned(id));
        }
        match outcome {
            Ok(analysis) => {
                let proposal = record.finish_analysis(&analysis);
                info!(
                    conversation_id = %id,
                    actions = proposal.actions.len(),
                    "Proposal awaiting confirmation"
                );
                Ok(InputResult {
                    conversation_id: id,
                    response: proposal.summary,
                    requires_confirmation: !proposal.actions.is_empty(),
                    proposed_actions: proposal.actions,
                    conversation_state: record.state,
                })
            }
            Err(e) => {
                record.abort_analysis();
                warn!(conversation_id = %id, "Analysis failed: {}", e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        id: Uuid,
        entry: &ConversationEntry,
        accept: bool,
    ) -> Result<ConfirmationResult> {
        let _op = entry.op_lock.lock().await;
        entry.ensure_live("confirm")?;

        if !accept {
            let mut record = entry.record.lock().await;
            record.reject()?;
            info!(conversation_id = %id, "Proposal rejected");
            return Ok(ConfirmationResult {
                conversation_id: id,
                confirmed: false,
                response: REJECTION_MESSAGE.to_string(),
                executed_actions: Vec::new(),
                conversation_state: record.state,
            });
        }

        let proposal = entry.record.lock().await.begin_execution()?;
        let batch = match compile(&proposal.actions) {
            Ok(batch) => batch,
            Err(e) => {
                entry.record.lock().await.abort_execution(proposal);
                return Err(ConversationError::Schema(e.to_string()));
            }
        };
        info!(
            conversation_id = %id,
            mutations = batch.len(),
            "Executing confirmed proposal"
        );

        let outcome =
            match tokio::time::timeout(self.config.execution_timeout, self.graph.apply_mutations(&batch))
                .await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ConversationError::Execution(format!("{:#}", e))),
                Err(_) => Err(ConversationError::ExecutionTimeout(
                    self.config.execution_timeout,
                )),
            };

        let mut record = entry.record.lock().await;
        if entry.cancel.is_cancelled() {
            warn!(
                conversation_id = %id,
                committed = outcome.is_ok(),
                "Conversation ended during execution; outcome discarded"
            );
            return Err(ConversationError::Abandoned(id));
        }
        if let Err(e) = outcome {
            warn!(conversation_id = %id, "Execution failed, proposal restored: {}", e);
            record.abort_execution(proposal);
            return Err(e);
        }

        let executed_actions = executed_actions(&proposal, &batch);
        let response = if executed_actions.is_empty() {
            NOTHING_TO_DO_MESSAGE.to_string()
        } else {
            let mut response = SUCCESS_MESSAGE.to_string();
            for action in &executed_actions {
                response.push_str("\n- ");
                response.push_str(&action.description);
            }
            response
        };
        record.finish_execution(&batch, &response);
        info!(
            conversation_id = %id,
            actions = executed_actions.len(),
            "Proposal executed"
        );

        Ok(ConfirmationResult {
            conversation_id: id,
            confirmed: true,
            response,
            executed_actions,
            conversation_state: record.state,
        })
    }

    /// Graph neighbours of the most recently touched note
    async fn related_context(&self, context: &GraphContext) -> Vec<RelatedNode> {
        if self.config.context_related_limit == 0 {
            return Vec::new();
        }
        let Some(note_id) = context.latest_note() else {
            return Vec::new();
        };
        let query = RelatedQuery {
            limit: self.config.context_related_limit,
            ..self.config.related.clone()
        };
        match self.graph.query_related(note_id, &query).await {
            Ok(related) => related
                .into_iter()
                .filter(|r| {
                    !(r.node.kind == NodeKind::Note
                        && context.notes.iter().any(|n| n.id.to_string() == r.node.key))
                })
                .collect(),
            Err(e) => {
                warn!(note_id = %note_id, "Context enrichment failed: {:#}", e);
                Vec::new()
            }
        }
    }
}

fn executed_actions(proposal: &Proposal, batch: &MutationBatch) -> Vec<ExecutedAction> {
    proposal
        .actions
        .iter()
        .enumerate()
        .map(|(i, action)| ExecutedAction {
            action: action.clone(),
            description: action.describe(),
            created_note_id: batch.created_notes.get(i).copied().flatten(),
        })
        .collect()
}
