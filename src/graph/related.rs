//! Related-node ranking over weighted paths
//!
//! The store enumerates simple paths (up to `max_hops`) starting at a note;
//! this module turns them into a ranked list:
//! 1. **Path score**: product over hops of `edge_weight(kind) × stored_weight`
//! 2. **Recency**: optionally multiplied by `exp(-age_days / decay_days)` of the end node
//! 3. **Ranking**: best path per node, sorted by score then hop count

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::neo4j::models::{EdgeKind, GraphPath, NodeKind, RelatedNode};

/// Base weight per relationship type.
///
/// Multiplied with the `weight` property stored on each edge (1.0 if absent).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EdgeWeights {
    pub about: f64,
    pub relates_to: f64,
    pub belongs_to: f64,
    pub embodies: f64,
}

impl Default for EdgeWeights {
    fn default() -> Self {
        Self {
            about: 0.8,
            relates_to: 1.0,
            belongs_to: 0.6,
            embodies: 0.7,
        }
    }
}

impl EdgeWeights {
    pub fn for_kind(&self, kind: EdgeKind) -> f64 {
        match kind {
            EdgeKind::About => self.about,
            EdgeKind::RelatesTo => self.relates_to,
            EdgeKind::BelongsTo => self.belongs_to,
            EdgeKind::Embodies => self.embodies,
        }
    }
}

/// Exponential recency decay for nodes that carry a creation time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RecencyDecay {
    /// e-folding time in days
    pub decay_days: f64,
}

impl RecencyDecay {
    pub fn factor(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        if self.decay_days <= 0.0 {
            return 1.0;
        }
        let age_days = (now - created_at).num_seconds().max(0) as f64 / 86_400.0;
        (-age_days / self.decay_days).exp()
    }
}

/// Parameters of a related-node query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelatedQuery {
    /// Maximum path length. Values above 3 fan out quickly.
    pub max_hops: usize,
    pub limit: usize,
    pub weights: EdgeWeights,
    pub recency: Option<RecencyDecay>,
    /// Only return nodes of these kinds (all kinds when empty)
    #[serde(default)]
    pub kinds: Vec<NodeKind>,
}

impl Default for RelatedQuery {
    fn default() -> Self {
        Self {
            max_hops: 2,
            limit: 10,
            weights: EdgeWeights::default(),
            recency: None,
            kinds: Vec::new(),
        }
    }
}

/// Most paths a neighbourhood query hands to ranking
pub const MAX_NEIGHBORHOOD_PATHS: usize = 1000;

/// Keep the `max` highest-scoring paths, shorter paths first on equal scores
pub fn strongest_paths(mut paths: Vec<GraphPath>, weights: &EdgeWeights, max: usize) -> Vec<GraphPath> {
    if paths.len() <= max {
        return paths;
    }
    paths.sort_by(|a, b| {
        path_score(b, weights)
            .total_cmp(&path_score(a, weights))
            .then(a.hops.len().cmp(&b.hops.len()))
    });
    paths.truncate(max);
    paths
}

/// Score of a single path, before recency
pub fn path_score(path: &GraphPath, weights: &EdgeWeights) -> f64 {
    path.hops
        .iter()
        .map(|hop| weights.for_kind(hop.edge) * hop.weight.unwrap_or(1.0).clamp(0.0, 1.0))
        .product()
}

/// Rank the end nodes of `paths`.
///
/// `start_key` is excluded from the result; paths longer than `max_hops`
/// are ignored. Each node keeps its best-scoring path.
pub fn rank_paths(
    start_key: &str,
    paths: &[GraphPath],
    query: &RelatedQuery,
    now: DateTime<Utc>,
) -> Vec<RelatedNode> {
    let mut best: HashMap<(NodeKind, String), RelatedNode> = HashMap::new();

    for path in paths {
        if path.hops.is_empty() || path.hops.len() > query.max_hops {
            continue;
        }
        let Some(end) = path.end() else { continue };
        if end.kind == NodeKind::Note && end.key == start_key {
            continue;
        }
        if !query.kinds.is_empty() && !query.kinds.contains(&end.kind) {
            continue;
        }

        let mut score = path_score(path, &query.weights);
        if let (Some(decay), Some(created_at)) = (query.recency, end.created_at) {
            score *= decay.factor(created_at, now);
        }

        let candidate = RelatedNode {
            node: end.clone(),
            weight: score,
            hops: path.hops.len(),
        };
        best.entry((end.kind, end.key.clone()))
            .and_modify(|current| {
                if candidate.weight > current.weight
                    || (candidate.weight == current.weight && candidate.hops < current.hops)
                {
                    *current = candidate.clone();
                }
            })
            .or_insert(candidate);
    }

    let mut ranked: Vec<RelatedNode> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then(a.hops.cmp(&b.hops))
            .then_with(|| a.node.key.cmp(&b.node.key))
    });
    ranked.truncate(query.limit);
    ranked
}
