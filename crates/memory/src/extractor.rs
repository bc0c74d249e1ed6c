//! LLM-based extraction of long-term memories from a completed
//! conversation turn (one user message + one assistant reply).

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use sa_domain::error::Result;
use sa_domain::tool::Message;
use sa_providers::{ChatRequest, LlmProvider};

use crate::types::{Memory, MemoryExtractionResult, MemoryType};

const SYSTEM_PROMPT: &str = r#"You are a memory extraction system. Your job is to identify and extract important information from conversations that should be remembered long-term.

Extract the following types of information:
- Facts: new information learned about the user, their projects, or the world
- Preferences: user's likes, dislikes, working style, preferences
- Decisions: choices made, approaches selected, directions taken
- Questions: open questions or topics to follow up on
- Project: project-specific context, goals, requirements

For each memory extracted, rate importance 1-10 (10 = critical, 1 = trivial). Only extract truly important information, not casual chat or temporary details.

Return a JSON object: {"memories": [{"type": "fact|preference|decision|question|project", "content": "...", "context": "...", "importance": 8, "tags": ["..."], "supersedes": "optional_memory_id"}]}"#;

#[derive(Deserialize)]
struct ExtractionPayload {
    #[serde(default)]
    memories: Vec<ExtractedMemory>,
}

#[derive(Deserialize)]
struct ExtractedMemory {
    #[serde(rename = "type", default = "default_type")]
    memory_type: MemoryType,
    content: String,
    #[serde(default)]
    context: String,
    #[serde(default = "default_importance")]
    importance: u8,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    supersedes: Option<String>,
}

fn default_type() -> MemoryType {
    MemoryType::Fact
}
fn default_importance() -> u8 {
    5
}

pub struct MemoryExtractor {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
    min_importance: u8,
}

impl MemoryExtractor {
    pub fn new(provider: Arc<dyn LlmProvider>, model: Option<String>, min_importance: u8) -> Self {
        Self {
            provider,
            model,
            min_importance,
        }
    }

    /// Quick heuristic to skip trivial exchanges before spending an LLM
    /// call on extraction.
    pub fn should_extract(user_msg: &str, assistant_msg: &str) -> bool {
        if user_msg.len() < 10 || assistant_msg.len() < 20 {
            return false;
        }
        const TRIVIAL: &[&str] = &["hello", "hi", "thanks", "ok", "yes", "no", "sure"];
        !TRIVIAL.contains(&user_msg.trim().to_lowercase().as_str())
    }

    pub async fn extract_from_turn(
        &self,
        user_msg: &str,
        assistant_msg: &str,
        session_id: &str,
        user_message_id: &str,
        assistant_message_id: &str,
    ) -> Result<MemoryExtractionResult> {
        let prompt = format!(
            "Extract important information from this conversation turn:\n\n\
             User: {user_msg}\n\n\
             Assistant: {assistant_msg}\n\n\
             Analyze this exchange and extract memories worth remembering long-term. Return the extraction as JSON."
        );

        let response = self
            .provider
            .chat(ChatRequest {
                messages: vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
                temperature: Some(0.3),
                json_mode: true,
                model: self.model.clone(),
                ..Default::default()
            })
            .await?;

        let tokens_used = response.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0);
        let payload: ExtractionPayload = match serde_json::from_str(&response.content) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "memory extraction returned non-JSON content, skipping");
                return Ok(MemoryExtractionResult {
                    memories: Vec::new(),
                    tokens_used,
                });
            }
        };

        let timestamp = chrono::Utc::now().to_rfc3339();
        let memories = payload
            .memories
            .into_iter()
            .filter(|m| m.importance >= self.min_importance)
            .map(|m| Memory {
                id: format!("mem_{}", Uuid::new_v4()),
                timestamp: timestamp.clone(),
                session_id: session_id.to_string(),
                memory_type: m.memory_type,
                content: m.content,
                context: m.context,
                importance: m.importance,
                tags: m.tags,
                source_messages: vec![user_message_id.to_string(), assistant_message_id.to_string()],
                embedding: None,
                supersedes: m.supersedes,
            })
            .collect();

        Ok(MemoryExtractionResult { memories, tokens_used })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_extract_rejects_short_exchanges() {
        assert!(!MemoryExtractor::should_extract("hi", "hello there, how can I help you today?"));
    }

    #[test]
    fn should_extract_rejects_trivial_acknowledgement() {
        assert!(!MemoryExtractor::should_extract("thanks", "You're welcome, let me know if you need anything else!"));
    }

    #[test]
    fn should_extract_accepts_substantive_exchange() {
        assert!(MemoryExtractor::should_extract(
            "I've decided to use JSONL for the event log instead of SQLite",
            "Good call — JSONL is easy to inspect and append-only writes are simple to make durable."
        ));
    }
}
