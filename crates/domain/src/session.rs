//! The session state cache: rolling summary, recent turns, and the
//! counters that drive the compaction trigger. This is the *derived*,
//! fast-path view of a session — the event log remains authoritative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

/// Structured summary of everything older than `recent_turns`. Kept in a
/// fixed shape so successive compactions merge into it rather than
/// free-form rewriting it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollingSummary {
    #[serde(default)]
    pub user_profile: String,
    #[serde(default)]
    pub active_topics: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
    #[serde(default)]
    pub tool_context: String,
}

impl RollingSummary {
    pub const MAX_ACTIVE_TOPICS: usize = 5;
    pub const MAX_DECISIONS: usize = 10;
    pub const MAX_OPEN_QUESTIONS: usize = 5;

    /// Render as a block suitable for prompt injection.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();
        if !self.user_profile.is_empty() {
            lines.push(format!("User profile: {}", self.user_profile));
        }
        if !self.active_topics.is_empty() {
            lines.push(format!("Active topics: {}", self.active_topics.join(", ")));
        }
        if !self.decisions.is_empty() {
            lines.push("Key decisions:".to_string());
            for decision in &self.decisions {
                lines.push(format!("  * {decision}"));
            }
        }
        if !self.open_questions.is_empty() {
            lines.push(format!("Open questions: {}", self.open_questions.join(", ")));
        }
        if !self.tool_context.is_empty() {
            lines.push(format!("Tool context: {}", self.tool_context));
        }
        lines.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.user_profile.is_empty()
            && self.active_topics.is_empty()
            && self.decisions.is_empty()
            && self.open_questions.is_empty()
            && self.tool_context.is_empty()
    }
}

/// One complete user/assistant exchange, assembled by the agent loop and
/// only committed to state after the assistant half is produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTurn {
    pub user_message: String,
    pub assistant_message: String,
    pub timestamp: DateTime<Utc>,
    pub user_msg_id: String,
    pub assistant_msg_id: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub tool_results: Vec<serde_json::Value>,
}

/// Cached per-session state: the derived fast path the agent loop reads
/// and writes every turn. Rebuildable from the event log by replay, but
/// the cache is the authoritative hot path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    #[serde(default)]
    pub rolling_summary: RollingSummary,
    /// Last N complete turns; everything older lives only in
    /// `rolling_summary` and/or long-term memory.
    #[serde(default)]
    pub recent_turns: Vec<MessageTurn>,
    #[serde(default)]
    pub token_count_estimate: u64,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub last_compaction_ts: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// The last N complete turns kept verbatim before older turns are
    /// folded into the rolling summary.
    pub const RECENT_TURNS_LIMIT: usize = 30;

    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            rolling_summary: RollingSummary::default(),
            recent_turns: Vec::new(),
            token_count_estimate: 0,
            message_count: 0,
            last_compaction_ts: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Cheap token estimate: words * 1.3, applied across the rolling
    /// summary text and the recent turns.
    pub fn estimate_tokens(&self) -> u64 {
        let mut words = self.rolling_summary.to_text().split_whitespace().count();
        for turn in &self.recent_turns {
            words += turn.user_message.split_whitespace().count();
            words += turn.assistant_message.split_whitespace().count();
        }
        (words as f64 * 1.3) as u64
    }

    /// Append a completed turn, trimming to `RECENT_TURNS_LIMIT` and
    /// refreshing the derived counters. Does not trigger compaction —
    /// the caller checks `should_compact()` separately.
    pub fn commit_turn(&mut self, turn: MessageTurn) {
        self.recent_turns.push(turn);
        if self.recent_turns.len() > Self::RECENT_TURNS_LIMIT {
            let overflow = self.recent_turns.len() - Self::RECENT_TURNS_LIMIT;
            self.recent_turns.drain(0..overflow);
        }
        self.message_count += 1;
        self.token_count_estimate = self.estimate_tokens();
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_summary_to_text_omits_empty_fields() {
        let summary = RollingSummary {
            user_profile: "prefers Rust".into(),
            ..Default::default()
        };
        assert_eq!(summary.to_text(), "User profile: prefers Rust");
    }

    #[test]
    fn commit_turn_trims_to_recent_turns_limit() {
        let mut state = SessionState::new("sess_1");
        for i in 0..(SessionState::RECENT_TURNS_LIMIT + 5) {
            state.commit_turn(MessageTurn {
                user_message: format!("msg {i}"),
                assistant_message: "reply".into(),
                timestamp: Utc::now(),
                user_msg_id: format!("u{i}"),
                assistant_msg_id: format!("a{i}"),
                tool_calls: vec![],
                tool_results: vec![],
            });
        }
        assert_eq!(state.recent_turns.len(), SessionState::RECENT_TURNS_LIMIT);
        assert_eq!(state.message_count, (SessionState::RECENT_TURNS_LIMIT + 5) as u64);
        // oldest turns were dropped; the first surviving one is msg 5
        assert_eq!(state.recent_turns[0].user_message, "msg 5");
    }
}
