//! Prompt construction for note analysis, questions and extraction

use super::traits::QueryRequest;
use crate::conversation::types::{AnalysisRequest, MessageRole};
use crate::neo4j::models::DEFAULT_CATEGORIES;
use serde::Serialize;
use std::fmt::Write;

/// A chat message in the OpenAI wire format
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

pub const SYSTEM_PROMPT: &str = "You are Noterer, a note-taking assistant for philosophical \
thinking. You help the user capture notes, extract the concepts they are about, relate them to \
earlier notes and classify them under philosophical categories. You never change the knowledge \
graph yourself: you propose actions, and the user confirms or rejects them. Keep your \
explanations short and precise.";

const ACTION_SCHEMA: &str = r#"Reply with a short explanation for the user, followed by exactly one fenced block:

```json
{"proposed_actions": [ ... ]}
```

Each action is an object with a "type":
- {"type": "create_note", "ref": "n1", "content": "...", "tags": ["..."], "concepts": ["..."], "categories": [{"name": "...", "confidence": 0.8}]}
- {"type": "update_note", "note_id": "<uuid>", "content": "...", "tags": ["..."]}
- {"type": "create_concept", "name": "...", "description": "...", "categories": [{"name": "...", "confidence": 0.8}]}
- {"type": "create_relationship", "relationship_type": "RELATES_TO", "source": "n1", "target": "<uuid>", "properties": {"weight": 0.7, "relation": "elaborates"}}

relationship_type is one of ABOUT (note -> concept), RELATES_TO (note -> note), BELONGS_TO (concept -> category), EMBODIES (note -> category).
Notes are referenced by their UUID, or by the "ref" of a note created earlier in the same list. Concepts and categories are referenced by name.
Weights and confidences are between 0 and 1.
If nothing should change in the graph, return an empty list."#;

/// Render the user prompt: graph context, schema and the new input
pub fn user_prompt(request: &AnalysisRequest) -> String {
    let mut prompt = String::new();

    if !request.context.is_empty() || !request.related.is_empty() {
        prompt.push_str("Knowledge graph context:\n");
        for note in &request.context.notes {
            let _ = writeln!(prompt, "- note {}: {}", note.id, note.excerpt);
        }
        if !request.context.concepts.is_empty() {
            let _ = writeln!(
                prompt,
                "- concepts discussed: {}",
                request.context.concepts.join(", ")
            );
        }
        for related in &request.related {
            let _ = writeln!(
                prompt,
                "- related {} {} \"{}\" (weight {:.2}, {} hop{})",
                related.node.kind.label().to_lowercase(),
                related.node.key,
                related.node.label,
                related.weight,
                related.hops,
                if related.hops == 1 { "" } else { "s" }
            );
        }
        prompt.push('\n');
    }

    let categories: Vec<&str> = DEFAULT_CATEGORIES.iter().map(|(name, _)| *name).collect();
    let _ = writeln!(prompt, "Available categories: {}.\n", categories.join(", "));
    prompt.push_str(ACTION_SCHEMA);
    let _ = write!(prompt, "\n\nUser input:\n{}", request.input);
    prompt
}

/// Full message list for one analysis call
pub fn build_messages(request: &AnalysisRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(ChatMessage::new("system", SYSTEM_PROMPT));
    for turn in &request.history {
        // Controller notes (rejections, execution results) reach the model as assistant turns
        let role = match turn.role {
            MessageRole::System => MessageRole::Assistant,
            other => other,
        };
        messages.push(ChatMessage::new(role.as_str(), turn.content.clone()));
    }
    messages.push(ChatMessage::new("user", user_prompt(request)));
    messages
}

const ANSWER_SCHEMA: &str = r#"Answer the question from the notes above. After your answer, add one fenced block:

```json
{"source_notes": ["<uuid>", ...], "concepts_referenced": ["...", ...]}
```

List only notes from the context that your answer relies on."#;

const EXTRACTION_SCHEMA: &str = r#"Identify the philosophical concepts in the text below, the categories it falls under and the relationships between them. Reply with exactly one fenced block:

```json
{"concepts": ["..."], "categories": [{"name": "...", "confidence": 0.8}], "relationships": [{"source": "...", "target": "...", "type": "BELONGS_TO"}]}
```

type is one of ABOUT, RELATES_TO, BELONGS_TO, EMBODIES. Confidences are between 0 and 1."#;

/// Messages for a question over the knowledge graph
pub fn build_query_messages(request: &QueryRequest) -> Vec<ChatMessage> {
    let mut prompt = String::new();
    if request.notes.is_empty() {
        prompt.push_str("There are no notes to draw on.\n");
    } else {
        prompt.push_str("Notes:\n");
        for note in &request.notes {
            let _ = writeln!(prompt, "- note {}: {}", note.id, note.excerpt);
        }
    }
    if !request.concepts.is_empty() {
        let _ = writeln!(prompt, "Related concepts: {}", request.concepts.join(", "));
    }
    prompt.push('\n');
    prompt.push_str(ANSWER_SCHEMA);
    let _ = write!(prompt, "\n\nQuestion:\n{}", request.prompt);

    vec![
        ChatMessage::new("system", SYSTEM_PROMPT),
        ChatMessage::new("user", prompt),
    ]
}

/// Messages for extracting concepts from note text
pub fn build_extraction_messages(content: &str) -> Vec<ChatMessage> {
    let categories: Vec<&str> = DEFAULT_CATEGORIES.iter().map(|(name, _)| *name).collect();
    let prompt = format!(
        "Available categories: {}.\n\n{}\n\nText:\n{}",
        categories.join(", "),
        EXTRACTION_SCHEMA,
        content
    );
    vec![
        ChatMessage::new("system", SYSTEM_PROMPT),
        ChatMessage::new("user", prompt),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::types::{ConversationMessage, GraphContext};
    use uuid::Uuid;

    #[test]
    fn test_messages_wrap_history_between_system_and_input() {
        let request = AnalysisRequest {
            history: vec![
                ConversationMessage::new(MessageRole::User, "hello"),
                ConversationMessage::new(MessageRole::System, "Actions cancelled as requested."),
            ],
            input: "Create a note about determinism".into(),
            ..Default::default()
        };
        let messages = build_messages(&request);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].role, "user");
        assert!(messages[3].content.ends_with("Create a note about determinism"));
    }

    #[test]
    fn test_user_prompt_includes_context_and_categories() {
        let id = Uuid::new_v4();
        let mut context = GraphContext::default();
        context.remember_note(id, "Free will".into());
        context.remember_concept("determinism");
        let request = AnalysisRequest {
            context,
            input: "more".into(),
            ..Default::default()
        };
        let prompt = user_prompt(&request);
        assert!(prompt.contains(&id.to_string()));
        assert!(prompt.contains("concepts discussed: determinism"));
        assert!(prompt.contains("Teleology"));
        assert!(prompt.contains("proposed_actions"));
    }

    #[test]
    fn test_query_messages_list_notes_before_question() {
        let id = Uuid::new_v4();
        let request = QueryRequest {
            prompt: "How do purpose and cause differ?".into(),
            notes: vec![crate::conversation::types::ContextNote {
                id,
                excerpt: "Final causes".into(),
            }],
            concepts: vec!["telos".into()],
        };
        let messages = build_query_messages(&request);
        assert_eq!(messages.len(), 2);
        let prompt = &messages[1].content;
        let note = prompt.find(&id.to_string()).unwrap();
        let question = prompt.find("How do purpose and cause differ?").unwrap();
        assert!(note < question);
        assert!(prompt.contains("Related concepts: telos"));
        assert!(prompt.contains("source_notes"));
    }

    #[test]
    fn test_user_prompt_without_context_skips_header() {
        let request = AnalysisRequest {
            input: "hi".into(),
            ..Default::default()
        };
        assert!(!user_prompt(&request).contains("Knowledge graph context"));
    }
}
