//! Extract the summary and proposed actions from a model reply
//!
//! The reply is free text with one fenced ```json block holding
//! `{"proposed_actions": [...]}`, or the JSON object alone. Everything outside
//! the block is the summary shown to the user. Query answers and extractions
//! use the same layout with their own payloads.

use super::traits::{LlmError, NoteExtraction, QueryAnswer, QueryRequest, SuggestedRelationship};
use crate::conversation::types::{Analysis, CategoryScore, ProposedAction};
use crate::graph::mutation::compile;
use crate::neo4j::models::canonical_category;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use uuid::Uuid;

static JSON_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(\{.*?\})\s*```").expect("valid regex")
});

#[derive(Debug, Deserialize)]
struct ActionEnvelope {
    #[serde(default)]
    summary: Option<String>,
    proposed_actions: Vec<ProposedAction>,
}

#[derive(Debug, Deserialize)]
struct AnswerEnvelope {
    #[serde(default)]
    source_notes: Vec<String>,
    #[serde(default)]
    concepts_referenced: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractionEnvelope {
    #[serde(default)]
    concepts: Vec<String>,
    #[serde(default)]
    categories: Vec<CategoryScore>,
    #[serde(default)]
    relationships: Vec<SuggestedRelationship>,
}

/// Split a reply into its JSON payload and the prose around it
fn split_reply(trimmed: &str) -> Option<(&str, String)> {
    if let Some(caps) = JSON_BLOCK.captures(trimmed) {
        let (block, body) = (caps.get(0)?, caps.get(1)?);
        let prose = format!("{}{}", &trimmed[..block.start()], &trimmed[block.end()..]);
        Some((body.as_str(), prose))
    } else if trimmed.starts_with('{') && trimmed.ends_with('}') {
        Some((trimmed, String::new()))
    } else {
        None
    }
}

/// Trimmed, non-empty, first occurrence only
fn distinct_names(names: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// Parse and validate a raw model reply
pub fn parse_analysis(raw: &str) -> Result<Analysis, LlmError> {
    let trimmed = raw.trim();

    let Some((json, prose)) = split_reply(trimmed) else {
        return Err(LlmError::Schema(
            "reply contains no ```json block with proposed_actions".into(),
        ));
    };

    let envelope: ActionEnvelope = serde_json::from_str(json)
        .map_err(|e| LlmError::Schema(format!("invalid proposed_actions payload: {}", e)))?;

    compile(&envelope.proposed_actions).map_err(|e| LlmError::Schema(e.to_string()))?;

    let summary = Some(prose.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| envelope.summary.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| fallback_summary(&envelope.proposed_actions));

    Ok(Analysis {
        summary,
        actions: envelope.proposed_actions,
    })
}

/// Parse a query answer. A reply without a JSON block is all prose.
///
/// Source notes outside the request's context are dropped.
pub fn parse_answer(raw: &str, request: &QueryRequest) -> Result<QueryAnswer, LlmError> {
    let trimmed = raw.trim();
    let (envelope, prose) = match split_reply(trimmed) {
        Some((json, prose)) => {
            let envelope: AnswerEnvelope = serde_json::from_str(json)
                .map_err(|e| LlmError::Schema(format!("invalid answer payload: {}", e)))?;
            (envelope, prose)
        }
        None => (
            AnswerEnvelope {
                source_notes: Vec::new(),
                concepts_referenced: Vec::new(),
            },
            trimmed.to_string(),
        ),
    };

    let response = prose.trim().to_string();
    if response.is_empty() {
        return Err(LlmError::Schema("answer contains no text".into()));
    }

    let mut source_notes: Vec<Uuid> = Vec::new();
    for id in envelope.source_notes {
        let Ok(id) = id.trim().parse::<Uuid>() else {
            continue;
        };
        if request.notes.iter().any(|n| n.id == id) && !source_notes.contains(&id) {
            source_notes.push(id);
        }
    }

    Ok(QueryAnswer {
        response,
        source_notes,
        concepts_referenced: distinct_names(envelope.concepts_referenced),
    })
}

/// Parse a note extraction, canonicalising category names
pub fn parse_extraction(raw: &str) -> Result<NoteExtraction, LlmError> {
    let Some((json, _)) = split_reply(raw.trim()) else {
        return Err(LlmError::Schema(
            "reply contains no ```json block with concepts".into(),
        ));
    };
    let envelope: ExtractionEnvelope = serde_json::from_str(json)
        .map_err(|e| LlmError::Schema(format!("invalid extraction payload: {}", e)))?;

    let mut categories: Vec<CategoryScore> = Vec::with_capacity(envelope.categories.len());
    for score in envelope.categories {
        let Some(name) = canonical_category(&score.name) else {
            return Err(LlmError::Schema(format!(
                "unknown category '{}'",
                score.name.trim()
            )));
        };
        if !score.confidence.is_finite() || !(0.0..=1.0).contains(&score.confidence) {
            return Err(LlmError::Schema(format!(
                "confidence {} for '{}' is outside [0, 1]",
                score.confidence, name
            )));
        }
        if !categories.iter().any(|c| c.name == name) {
            categories.push(CategoryScore {
                name: name.to_string(),
                confidence: score.confidence,
            });
        }
    }

    Ok(NoteExtraction {
        extracted_concepts: distinct_names(envelope.concepts),
        categories,
        suggested_relationships: envelope
            .relationships
            .into_iter()
            .filter(|r| !r.source.trim().is_empty() && !r.target.trim().is_empty())
            .collect(),
    })
}

fn fallback_summary(actions: &[ProposedAction]) -> String {
    if actions.is_empty() {
        return "No changes to the knowledge graph are needed.".to_string();
    }
    let mut summary = String::from("I propose the following changes:");
    for action in actions {
        summary.push_str("\n- ");
        summary.push_str(&action.describe());
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_block_is_extracted_and_removed_from_summary() {
        let raw = "I'll capture that as a note.\n\n```json\n{\"proposed_actions\": [\
            {\"type\": \"create_note\", \"content\": \"Determinism\", \"concepts\": [\"determinism\"]}\
            ]}\n```\n\nConfirm to save it.";
        let analysis = parse_analysis(raw).unwrap();
        assert_eq!(analysis.actions.len(), 1);
        assert!(analysis.summary.starts_with("I'll capture that as a note."));
        assert!(analysis.summary.ends_with("Confirm to save it."));
        assert!(!analysis.summary.contains("proposed_actions"));
    }

    #[test]
    fn test_bare_json_body_is_accepted() {
        let raw = r#"{"summary": "Nothing to add.", "proposed_actions": []}"#;
        let analysis = parse_analysis(raw).unwrap();
        assert!(analysis.actions.is_empty());
        assert_eq!(analysis.summary, "Nothing to add.");
    }

    #[test]
    fn test_missing_block_is_schema_error() {
        let err = parse_analysis("Sure, I made a note for you.").unwrap_err();
        assert!(matches!(err, LlmError::Schema(_)));
    }

    #[test]
    fn test_unknown_action_type_is_schema_error() {
        let raw = "```json\n{\"proposed_actions\": [{\"type\": \"delete_everything\"}]}\n```";
        assert!(matches!(parse_analysis(raw), Err(LlmError::Schema(_))));
    }

    #[test]
    fn test_unknown_category_is_schema_error() {
        let raw = "```json\n{\"proposed_actions\": [{\"type\": \"create_concept\", \"name\": \"stars\", \
                   \"categories\": [{\"name\": \"Astrology\", \"confidence\": 0.9}]}]}\n```";
        let err = parse_analysis(raw).unwrap_err();
        assert!(err.to_string().contains("Astrology"));
    }

    #[test]
    fn test_out_of_range_weight_is_schema_error() {
        let raw = "```json\n{\"proposed_actions\": [\
            {\"type\": \"create_note\", \"ref\": \"a\", \"content\": \"x\"},\
            {\"type\": \"create_note\", \"ref\": \"b\", \"content\": \"y\"},\
            {\"type\": \"create_relationship\", \"relationship_type\": \"RELATES_TO\", \
             \"source\": \"a\", \"target\": \"b\", \"properties\": {\"weight\": 3.0}}]}\n```";
        assert!(matches!(parse_analysis(raw), Err(LlmError::Schema(_))));
    }

    #[test]
    fn test_dangling_ref_is_schema_error() {
        let raw = "```json\n{\"proposed_actions\": [{\"type\": \"create_relationship\", \
                   \"relationship_type\": \"ABOUT\", \"source\": \"n9\", \"target\": \"time\"}]}\n```";
        let err = parse_analysis(raw).unwrap_err();
        assert!(err.to_string().contains("n9"));
    }

    fn query_with(id: Uuid) -> QueryRequest {
        QueryRequest {
            prompt: "What is time?".into(),
            notes: vec![crate::conversation::types::ContextNote {
                id,
                excerpt: "Time is the measure of change".into(),
            }],
            concepts: vec!["time".into()],
        }
    }

    #[test]
    fn test_answer_keeps_only_context_sources() {
        let id = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let raw = format!(
            r#"Aristotle ties time to change.
```json
{{"source_notes": ["{}", "{}", "junk"],              "concepts_referenced": ["time", " time ", "change"]}}
```"#,
            id, stranger
        );
        let answer = parse_answer(&raw, &query_with(id)).unwrap();
        assert_eq!(answer.response, "Aristotle ties time to change.");
        assert_eq!(answer.source_notes, vec![id]);
        assert_eq!(answer.concepts_referenced, vec!["time", "change"]);
    }

    #[test]
    fn test_plain_prose_answer_has_no_sources() {
        let answer = parse_answer("Nobody knows.", &query_with(Uuid::new_v4())).unwrap();
        assert_eq!(answer.response, "Nobody knows.");
        assert!(answer.source_notes.is_empty());
        assert!(matches!(
            parse_answer("   ", &QueryRequest::default()),
            Err(LlmError::Schema(_))
        ));
    }

    #[test]
    fn test_extraction_canonicalises_categories() {
        let raw = r#"```json
{"concepts": ["free will", "determinism"],                    "categories": [{"name": "causality", "confidence": 0.7}],                    "relationships": [{"source": "free will", "target": "Causality", "type": "BELONGS_TO"}]}
```"#;
        let extraction = parse_extraction(raw).unwrap();
        assert_eq!(extraction.extracted_concepts, vec!["free will", "determinism"]);
        assert_eq!(extraction.categories[0].name, "Causality");
        assert_eq!(
            extraction.suggested_relationships[0].kind,
            crate::neo4j::models::EdgeKind::BelongsTo
        );
    }

    #[test]
    fn test_extraction_rejects_unknown_category_and_bad_confidence() {
        let raw = r#"```json
{"categories": [{"name": "Astrology", "confidence": 0.5}]}
```"#;
        assert!(parse_extraction(raw).unwrap_err().to_string().contains("Astrology"));
        let raw = r#"{"categories": [{"name": "Ontology", "confidence": 1.5}]}"#;
        assert!(matches!(parse_extraction(raw), Err(LlmError::Schema(_))));
        assert!(matches!(
            parse_extraction("free will and determinism"),
            Err(LlmError::Schema(_))
        ));
    }

    #[test]
    fn test_empty_prose_falls_back_to_action_list() {
        let raw = "```json\n{\"proposed_actions\": [{\"type\": \"create_concept\", \"name\": \"time\"}]}\n```";
        let analysis = parse_analysis(raw).unwrap();
        assert!(analysis.summary.contains("Create or reuse concept \"time\""));
    }
}
