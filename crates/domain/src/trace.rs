use serde::Serialize;

/// Structured trace events emitted across all gateway crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ClientConnected {
        client_id: String,
        client_type: String,
    },
    ClientDisconnected {
        client_id: String,
        reason: String,
    },
    SessionResolved {
        session_key: String,
        session_id: String,
        is_new: bool,
    },
    SessionReset {
        session_key: String,
        old_session_id: String,
        new_session_id: String,
        reason: String,
    },
    RunStarted {
        run_id: String,
        session_id: String,
        agent_id: String,
        queue_depth: usize,
    },
    RunCompleted {
        run_id: String,
        session_id: String,
        duration_ms: u64,
        input_tokens: u32,
        output_tokens: u32,
        loop_count: u32,
    },
    RunFailed {
        run_id: String,
        session_id: String,
        error: String,
    },
    LlmRequest {
        run_id: String,
        provider: String,
        model: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    ToolCallDispatched {
        run_id: String,
        call_id: String,
        tool_name: String,
    },
    ToolCallCompleted {
        run_id: String,
        call_id: String,
        tool_name: String,
        duration_ms: u64,
        is_error: bool,
    },
    PolicyDecisionMade {
        capability: String,
        decision: String,
        matched_pattern: Option<String>,
    },
    PermissionRequested {
        request_id: String,
        capability: String,
    },
    PermissionResolved {
        request_id: String,
        approved: bool,
        reason: String,
    },
    CompactionTriggered {
        session_id: String,
        token_count_estimate: f64,
        message_count: usize,
    },
    CompactionCompleted {
        session_id: String,
        turns_summarized: usize,
        summary_chars: usize,
    },
    MemorySearchPerformed {
        session_id: String,
        query_variants: usize,
        candidates_scanned: usize,
        results_returned: usize,
        duration_ms: u64,
    },
    MemoryExtracted {
        session_id: String,
        facts_extracted: usize,
        facts_ingested: usize,
    },
    EventLogRotated {
        session_id: String,
        archived_as: String,
        bytes: u64,
    },
    EventLogPruned {
        session_id: String,
        files_removed: usize,
    },
    TranscriptAppend {
        session_id: String,
        lines: usize,
    },
    IdentityResolved {
        raw_peer_id: String,
        canonical: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sa_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_started_serializes_with_tag() {
        let event = TraceEvent::RunStarted {
            run_id: "run_1".into(),
            session_id: "sess_1".into(),
            agent_id: "default".into(),
            queue_depth: 0,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"RunStarted\""));
    }
}
