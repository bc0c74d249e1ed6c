//! The durable event log record. Append-only: once written, an event is
//! never mutated or removed by the core (log rotation moves whole files,
//! it never rewrites individual events).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
    System,
}

/// One line of a session's event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SessionInit {
        timestamp: DateTime<Utc>,
        session_id: String,
    },
    Message {
        timestamp: DateTime<Utc>,
        message_id: String,
        role: MessageRole,
        content: String,
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
    },
    ToolCall {
        timestamp: DateTime<Utc>,
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        timestamp: DateTime<Utc>,
        call_id: String,
        result: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    Compaction {
        timestamp: DateTime<Utc>,
        summary: crate::session::RollingSummary,
        facts_extracted: usize,
    },
    RunError {
        timestamp: DateTime<Utc>,
        run_id: String,
        error: String,
    },
}

impl Event {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::SessionInit { timestamp, .. }
            | Event::Message { timestamp, .. }
            | Event::ToolCall { timestamp, .. }
            | Event::ToolResult { timestamp, .. }
            | Event::Compaction { timestamp, .. }
            | Event::RunError { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_init_round_trips_through_json() {
        let event = Event::SessionInit {
            timestamp: Utc::now(),
            session_id: "sess_1".into(),
        };
        let line = serde_json::to_string(&event).unwrap();
        assert!(line.contains("\"type\":\"session_init\""));
        let parsed: Event = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.timestamp(), event.timestamp());
    }

    #[test]
    fn message_event_tags_role_snake_case() {
        let event = Event::Message {
            timestamp: Utc::now(),
            message_id: "m1".into(),
            role: MessageRole::Assistant,
            content: "hi".into(),
            tool_calls: vec![],
        };
        let line = serde_json::to_string(&event).unwrap();
        assert!(line.contains("\"role\":\"assistant\""));
    }
}
