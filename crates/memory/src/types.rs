//! Data model for long-term memory: a single extracted [`Memory`] and the
//! result of running extraction over one conversation turn.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Fact,
    Preference,
    Decision,
    Question,
    Project,
}

/// A single piece of long-term memory, extracted from a conversation turn
/// or ingested directly during compaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub timestamp: String,
    pub session_id: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub content: String,
    pub context: String,
    /// 1-10, only memories at or above `MemoryConfig::min_importance` are
    /// ingested.
    pub importance: u8,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source_messages: Vec<String>,
    /// Omitted from the JSONL record — vectors live in the separate index.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// ID of a memory this one replaces, if the extractor flagged an update.
    #[serde(default)]
    pub supersedes: Option<String>,
}

impl Memory {
    /// Text used for both the lexical and vector index — content, context,
    /// and tags concatenated so a search over any of them can hit.
    pub fn to_search_text(&self) -> String {
        format!("{} {} {}", self.content, self.context, self.tags.join(" "))
    }
}

#[derive(Debug, Clone)]
pub struct MemoryExtractionResult {
    pub memories: Vec<Memory>,
    pub tokens_used: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_text_joins_content_context_tags() {
        let mem = Memory {
            id: "mem_1".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            session_id: "sess_1".into(),
            memory_type: MemoryType::Fact,
            content: "prefers Rust".into(),
            context: "discussing language choice".into(),
            importance: 7,
            tags: vec!["language".into(), "preference".into()],
            source_messages: vec![],
            embedding: None,
            supersedes: None,
        };
        assert_eq!(
            mem.to_search_text(),
            "prefers Rust discussing language choice language preference"
        );
    }

    #[test]
    fn memory_type_serializes_snake_case() {
        let json = serde_json::to_string(&MemoryType::Preference).unwrap();
        assert_eq!(json, "\"preference\"");
    }
}
