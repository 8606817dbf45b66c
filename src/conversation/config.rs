//! Conversation controller configuration

use crate::graph::related::RelatedQuery;
use std::time::Duration;

/// Configuration for the conversation controller
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Number of most recent history messages sent to the model
    pub history_window: usize,
    /// Related nodes added to the model context (0 disables enrichment)
    pub context_related_limit: usize,
    /// Conversations without activity for this long are ended by the sweeper
    pub session_timeout: Duration,
    /// How long ended conversation ids are remembered
    pub ended_retention: Duration,
    /// Bound on one whole analysis, retries included
    pub analysis_timeout: Duration,
    /// Bound on one graph transaction
    pub execution_timeout: Duration,
    /// Traversal settings used for context enrichment
    pub related: RelatedQuery,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_window: 5,
            context_related_limit: 5,
            session_timeout: Duration::from_secs(3600),
            ended_retention: Duration::from_secs(3600),
            analysis_timeout: Duration::from_secs(95),
            execution_timeout: Duration::from_secs(10),
            related: RelatedQuery::default(),
        }
    }
}

impl ConversationConfig {
    /// Interval between idle sweeps
    pub fn sweep_interval(&self) -> Duration {
        (self.session_timeout / 2).max(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConversationConfig::default();
        assert_eq!(config.history_window, 5);
        assert_eq!(config.sweep_interval(), Duration::from_secs(1800));
        assert_eq!(config.related.max_hops, 2);
    }

    #[test]
    fn test_sweep_interval_has_floor() {
        let config = ConversationConfig {
            session_timeout: Duration::from_millis(10),
            ..Default::default()
        };
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }
}
