//! Structured-method handlers for everything besides `agent`/`agent.cancel`
//! and `permission.respond` (those live in `frontend.rs` alongside the run
//! admission logic they're entangled with).

use serde_json::Value;

use sa_domain::error::{Error, Result};
use sa_domain::event::{Event as LogEvent, MessageRole as LogMessageRole};
use sa_protocol::{SessionsHistoryParams, SessionsListParams, SessionsNewParams, SessionsSwitchParams, StatusParams};
use sa_sessions::store::SessionOrigin;

use crate::state::AppState;

fn bad_params(method: &str, e: impl std::fmt::Display) -> Error {
    Error::Protocol(format!("invalid {method} params: {e}"))
}

pub fn sessions_list(state: &AppState, params: Value) -> Result<Value> {
    let params: SessionsListParams = serde_json::from_value(params).map_err(|e| bad_params("sessions.list", e))?;

    let mut entries = state.session_store.list();
    entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    let page: Vec<Value> = entries
        .into_iter()
        .skip(params.offset)
        .take(params.limit)
        .map(|e| {
            serde_json::json!({
                "session_id": e.session_id,
                "title": e.title,
                "model": e.model,
                "created_at": e.created_at.to_rfc3339(),
                "updated_at": e.updated_at.to_rfc3339(),
                "total_tokens": e.total_tokens,
                "client_count": state.connections.stats(&e.session_id).client_count,
            })
        })
        .collect();

    Ok(serde_json::json!({ "sessions": page }))
}

/// Start a fresh session and switch the requesting client onto it. Unlike
/// `connect`'s `sessionPreference` (which resolves an existing session key
/// if one matches), `sessions.new` always mints a brand new session key so
/// two `sessions.new` calls from the same client never collide.
pub fn sessions_new(state: &AppState, client_id: &str, params: Value) -> Result<Value> {
    let params: SessionsNewParams = serde_json::from_value(params).map_err(|e| bad_params("sessions.new", e))?;

    let session_key = format!("client:{client_id}:{}", uuid::Uuid::new_v4());
    let (entry, _) = state.session_store.resolve_or_create(&session_key, SessionOrigin::default());
    state.session_store.set_title(&session_key, params.title.clone());
    state.connections.switch_session(client_id, &entry.session_id);

    Ok(serde_json::json!({ "session_id": entry.session_id, "title": params.title }))
}

pub fn sessions_switch(state: &AppState, client_id: &str, params: Value) -> Result<Value> {
    let params: SessionsSwitchParams = serde_json::from_value(params).map_err(|e| bad_params("sessions.switch", e))?;

    let entry = state
        .session_store
        .get_by_session_id(&params.session_id)
        .ok_or_else(|| Error::SessionNotFound(params.session_id.clone()))?;

    state.connections.switch_session(client_id, &entry.session_id);
    Ok(serde_json::json!({ "session_id": entry.session_id, "title": entry.title }))
}

/// Replay a session's durable event log into the wire shapes a client
/// history pane expects: one entry per `Message`/`ToolCall`/`ToolResult`
/// record, newest `limit` entries, optionally only those before a given
/// message id.
pub fn sessions_history(state: &AppState, current_session_id: &str, params: Value) -> Result<Value> {
    let params: SessionsHistoryParams = serde_json::from_value(params).map_err(|e| bad_params("sessions.history", e))?;
    let session_id = params.session_id.as_deref().unwrap_or(current_session_id);

    let events = state.event_log.replay(session_id)?;
    let mut entries: Vec<(String, Value)> = Vec::with_capacity(events.len());

    for event in &events {
        let (id, payload) = match event {
            LogEvent::Message { message_id, role, content, timestamp, .. } => (
                message_id.clone(),
                serde_json::json!({
                    "kind": "message",
                    "id": message_id,
                    "role": role_str(*role),
                    "content": content,
                    "timestamp": timestamp.to_rfc3339(),
                }),
            ),
            LogEvent::ToolCall { call_id, tool_name, arguments, timestamp } => (
                call_id.clone(),
                serde_json::json!({
                    "kind": "tool_call",
                    "id": call_id,
                    "tool_name": tool_name,
                    "arguments": arguments,
                    "timestamp": timestamp.to_rfc3339(),
                }),
            ),
            LogEvent::ToolResult { call_id, result, is_error, timestamp } => (
                call_id.clone(),
                serde_json::json!({
                    "kind": "tool_result",
                    "id": call_id,
                    "result": result,
                    "is_error": is_error,
                    "timestamp": timestamp.to_rfc3339(),
                }),
            ),
            LogEvent::SessionInit { .. } | LogEvent::Compaction { .. } | LogEvent::RunError { .. } => continue,
        };
        entries.push((id, payload));
    }

    // `before` pages backward: keep only what precedes the cursor, then
    // take the `limit` entries closest to it (still oldest-first on return).
    if let Some(cursor) = params.before.as_deref() {
        if let Some(idx) = entries.iter().position(|(id, _)| id == cursor) {
            entries.truncate(idx);
        }
    }
    if entries.len() > params.limit {
        let start = entries.len() - params.limit;
        entries.drain(0..start);
    }

    let out: Vec<Value> = entries.into_iter().map(|(_, payload)| payload).collect();
    Ok(serde_json::json!({ "session_id": session_id, "entries": out }))
}

fn role_str(role: LogMessageRole) -> &'static str {
    match role {
        LogMessageRole::User => "user",
        LogMessageRole::Assistant => "assistant",
        LogMessageRole::Tool => "tool",
        LogMessageRole::System => "system",
    }
}

pub fn status(state: &AppState, current_session_id: &str, params: Value) -> Result<Value> {
    let params: StatusParams = serde_json::from_value(params).map_err(|e| bad_params("status", e))?;
    let session_id = params.session_id.as_deref().unwrap_or(current_session_id);

    let session_state = state.state_cache.load(session_id);
    let stats = state.connections.stats(session_id);
    let queue_depth = state.queue.queue_depth(session_id);

    Ok(serde_json::json!({
        "session_id": session_id,
        "client_count": stats.client_count,
        "queue_depth": queue_depth,
        "message_count": session_state.as_ref().map(|s| s.message_count).unwrap_or(0),
        "token_count_estimate": session_state.as_ref().map(|s| s.token_count_estimate).unwrap_or(0),
        "last_compaction_ts": session_state.and_then(|s| s.last_compaction_ts).map(|t| t.to_rfc3339()),
    }))
}
