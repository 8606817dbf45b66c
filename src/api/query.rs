//! Query parameter structs for list and traversal endpoints

use crate::neo4j::models::EdgeKind;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

/// Helper to deserialize numbers from query string (which are always strings)
fn deserialize_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
    T::Err: std::fmt::Display,
{
    use serde::de::Error;
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if !s.is_empty() => s.parse().map_err(D::Error::custom),
        _ => Ok(T::default()),
    }
}

/// Helper to deserialize optional values from query string
fn deserialize_option_from_str<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    use serde::de::Error;
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if !s.is_empty() => s.parse().map(Some).map_err(D::Error::custom),
        _ => Ok(None),
    }
}

/// Pagination parameters for list endpoints
#[derive(Debug, Deserialize, Clone)]
pub struct PaginationParams {
    /// Max items to return (default: 50, max: 100)
    #[serde(default = "default_limit", deserialize_with = "deserialize_from_str")]
    pub limit: usize,
    /// Items to skip (default: 0)
    #[serde(default, deserialize_with = "deserialize_from_str")]
    pub skip: usize,
}

fn default_limit() -> usize {
    50
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            skip: 0,
        }
    }
}

impl PaginationParams {
    /// Validate pagination parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.limit == 0 || self.limit > 100 {
            return Err("limit must be between 1 and 100".to_string());
        }
        Ok(())
    }
}

/// Parameters of `GET /notes/{id}/related`; unset values fall back to the `graph` config
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RelatedParams {
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub max_hops: Option<usize>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub limit: Option<usize>,
    /// Apply recency decay
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub recency: Option<bool>,
    /// Comma-separated node kinds to keep (note, concept, category)
    pub kinds: Option<String>,
}

impl RelatedParams {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(hops) = self.max_hops {
            if hops == 0 || hops > 4 {
                return Err("max_hops must be between 1 and 4".to_string());
            }
        }
        if let Some(limit) = self.limit {
            if limit == 0 || limit > 100 {
                return Err("limit must be between 1 and 100".to_string());
            }
        }
        Ok(())
    }
}

/// Parameters of `GET /relationships/{source_id}`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RelationshipParams {
    /// Keep one relationship type only
    #[serde(default, alias = "type")]
    pub relationship_type: Option<String>,
}

impl RelationshipParams {
    pub fn kind(&self) -> Result<Option<EdgeKind>, String> {
        self.relationship_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::parse)
            .transpose()
    }
}

/// Parameters of `GET /traverse/{id}`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TraverseParams {
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub max_depth: Option<usize>,
}

impl TraverseParams {
    /// The requested depth, 2 when unset
    pub fn depth(&self) -> Result<usize, String> {
        let depth = self.max_depth.unwrap_or(2);
        if depth == 0 || depth > 4 {
            return Err("max_depth must be between 1 and 4".to_string());
        }
        Ok(depth)
    }
}
