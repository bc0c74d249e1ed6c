//! The agent loop: one full turn from a user message to a final response,
//! including any tool rounds in between.
//!
//! Mirrors the shape of the teacher's own turn-execution loop (stream the
//! model's tokens, accumulate tool-call argument deltas since not every
//! provider emits a single finished call, dispatch tools, loop until the
//! model stops calling them) but replaces every sink: events go out through
//! [`ConnectionManager::broadcast`] instead of an `mpsc::Sender<TurnEvent>`,
//! state is committed to [`StateCache`]/[`EventLog`] instead of a flat
//! transcript file, and every tool call passes through the permission
//! bridge and policy before it runs.
//!
//! This module owns exactly one turn. Queue admission (deciding whether to
//! start immediately or wait) and queue advancement after the turn ends
//! are the caller's job — see `frontend.rs`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use similar::TextDiff;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use sa_domain::config::Config;
use sa_domain::error::{Error, Result};
use sa_domain::event::{Event as LogEvent, MessageRole as LogMessageRole};
use sa_domain::session::MessageTurn;
use sa_domain::stream::StreamEvent;
use sa_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall};
use sa_providers::{ChatRequest, LlmProvider};
use sa_protocol::{
    AgentStatus, CancelledEventPayload, ErrorEventPayload, Event as WireEvent, EventType,
    FinalEventPayload, MessageEventPayload, MessageRole as WireMessageRole,
    PermissionRequestEventPayload, RunLogEventPayload, StatusEventPayload, TokenEventPayload,
    ToolCallEventPayload, ToolResultEventPayload,
};
use sa_tools::file_ops;
use sa_tools::PolicyDecision;

use crate::permission::PermissionOutcome;
use crate::state::AppState;

/// A turn never loops more than this many tool rounds before the agent is
/// forced to answer with whatever it has.
const MAX_TOOL_ROUNDS: usize = 10;
/// How many of a session's most recent turns get replayed into the prompt
/// verbatim; anything older only survives in the rolling summary.
const PROMPT_TURNS: usize = 20;
/// Ceiling on a non-`file_write` tool call's argument preview.
const PREVIEW_BYTES: usize = 8192;

const SYSTEM_PROMPT: &str = "You are a capable assistant with tools to read, write, and run \
    commands in the user's workspace. Use them when they help answer the request, and say \
    what you're about to do before a consequential one runs.";

/// Everything the frontend gathers before calling [`run`].
pub struct RunRequest {
    pub session_id: String,
    pub run_id: String,
    pub message: String,
    /// Client that sent the triggering `agent` request, if any — passed
    /// through to `broadcast` so that client's own echo is marked
    /// `from_self` rather than looking like another client's message.
    pub origin_client_id: Option<String>,
}

/// Run one full turn. Returns once the turn has reached a terminal state
/// (finished, cancelled, or failed) having emitted exactly one of
/// `final` / `cancelled` / `error` as its last event.
pub async fn run(state: Arc<AppState>, req: RunRequest, cancel: CancellationToken) -> Result<()> {
    let span = tracing::info_span!("agent_loop.run", run_id = %req.run_id, session_id = %req.session_id);
    let session_id = req.session_id.clone();
    let run_id = req.run_id.clone();
    let origin_client_id = req.origin_client_id.clone();

    let result = run_inner(state.clone(), req, cancel).instrument(span).await;

    if let Err(e) = &result {
        tracing::warn!(error = %e, run_id, session_id, "agent run failed");
        log_event(
            &state,
            &session_id,
            LogEvent::RunError { timestamp: chrono::Utc::now(), run_id: run_id.clone(), error: e.to_string() },
        );
        emit_error(&state, &session_id, &run_id, origin_client_id.as_deref(), e);
    }
    result
}

async fn run_inner(state: Arc<AppState>, req: RunRequest, cancel: CancellationToken) -> Result<()> {
    let RunRequest { session_id, run_id, message, origin_client_id } = req;
    let origin = origin_client_id.as_deref();

    emit_status(&state, &session_id, &run_id, origin, AgentStatus::RetrievingMemory);

    let mut session_state = state.state_cache.get_or_create(&session_id)?;
    let memories = retrieve_memory(&state, &message).await;

    if cancel.is_cancelled() {
        return emit_cancelled(&state, &session_id, &run_id, origin, "cancelled before model call");
    }

    let (provider, model) = state.providers.resolve(
        state
            .config
            .llm
            .model_name
            .as_deref()
            .ok_or_else(|| Error::Config("llm.model_name is not configured".into()))?,
    )?;

    let context_window = provider
        .capabilities()
        .context_window_tokens
        .map(|w| w as usize)
        .unwrap_or(state.config.compaction.default_context_window);

    if state.compactor.should_compact(&session_state, context_window) {
        emit_status(&state, &session_id, &run_id, origin, AgentStatus::Compacting);
        if let Some(compacted) = state
            .compactor
            .compact(&session_id, session_state.clone(), &state.state_cache, &state.event_log)
            .await?
        {
            session_state = compacted;
        }
    }

    if cancel.is_cancelled() {
        return emit_cancelled(&state, &session_id, &run_id, origin, "cancelled during compaction");
    }

    let user_msg_id = uuid::Uuid::new_v4().to_string();
    log_event(
        &state,
        &session_id,
        LogEvent::Message {
            timestamp: chrono::Utc::now(),
            message_id: user_msg_id.clone(),
            role: LogMessageRole::User,
            content: message.clone(),
            tool_calls: vec![],
        },
    );

    let mut messages = assemble_messages(&state.config, &session_state, &memories, &message);

    let mut round_tool_calls: Vec<ToolCall> = Vec::new();
    let mut round_tool_results: Vec<Value> = Vec::new();
    let mut final_text = String::new();
    let mut total_tokens: u32 = 0;

    'rounds: for round in 0..MAX_TOOL_ROUNDS {
        if cancel.is_cancelled() {
            return emit_cancelled(&state, &session_id, &run_id, origin, "cancelled before round");
        }

        emit_status(&state, &session_id, &run_id, origin, AgentStatus::Thinking);

        let request = ChatRequest {
            messages: messages.clone(),
            tools: state.tools.manifest(),
            temperature: None,
            max_tokens: None,
            json_mode: false,
            model: model.clone(),
        };

        let llm_span = tracing::info_span!(
            "agent_loop.llm_call",
            round = round as u64,
            provider = %provider.provider_id(),
            prompt_tokens = tracing::field::Empty,
            completion_tokens = tracing::field::Empty,
        );

        let round_outcome = stream_one_round(&state, &session_id, &run_id, origin, &provider, request, &cancel)
            .instrument(llm_span)
            .await?;

        let RoundResult { text, tool_calls, usage, cancelled } = round_outcome;
        if cancelled {
            return emit_cancelled(&state, &session_id, &run_id, origin, "cancelled mid-stream");
        }
        if let Some(usage) = usage {
            total_tokens += usage.total_tokens;
        }
        if !text.is_empty() {
            final_text.push_str(&text);
        }

        if tool_calls.is_empty() {
            break 'rounds;
        }

        emit_status(&state, &session_id, &run_id, origin, AgentStatus::ExecutingTools);

        let mut assistant_parts = Vec::new();
        if !text.is_empty() {
            assistant_parts.push(ContentPart::Text { text: text.clone() });
        }
        for tc in &tool_calls {
            assistant_parts.push(ContentPart::ToolUse {
                id: tc.call_id.clone(),
                name: tc.tool_name.clone(),
                input: tc.arguments.clone(),
            });
        }
        messages.push(Message { role: Role::Assistant, content: MessageContent::Parts(assistant_parts) });

        for tc in &tool_calls {
            if cancel.is_cancelled() {
                return emit_cancelled(&state, &session_id, &run_id, origin, "cancelled during tool dispatch");
            }

            let (result, is_error) = dispatch_tool_call(&state, &session_id, &run_id, origin, tc, &cancel).await;

            log_event(
                &state,
                &session_id,
                LogEvent::ToolResult {
                    timestamp: chrono::Utc::now(),
                    call_id: tc.call_id.clone(),
                    result: result.clone(),
                    is_error,
                },
            );
            emit_event(
                &state,
                &session_id,
                origin,
                EventType::ToolResult,
                ToolResultEventPayload { run_id: run_id.clone(), tool_name: tc.tool_name.clone(), result: result.clone() },
            );

            messages.push(Message::tool_result(&tc.call_id, result.to_string()));
            round_tool_results.push(result);
        }
        round_tool_calls.extend(tool_calls);

        if round == MAX_TOOL_ROUNDS - 1 {
            emit_event(
                &state,
                &session_id,
                origin,
                EventType::RunLog,
                RunLogEventPayload {
                    run_id: run_id.clone(),
                    message: format!("tool round limit reached ({MAX_TOOL_ROUNDS}); answering with what's available"),
                },
            );
        }
    }

    let assistant_msg_id = uuid::Uuid::new_v4().to_string();
    log_event(
        &state,
        &session_id,
        LogEvent::Message {
            timestamp: chrono::Utc::now(),
            message_id: assistant_msg_id.clone(),
            role: LogMessageRole::Assistant,
            content: final_text.clone(),
            tool_calls: round_tool_calls.clone(),
        },
    );
    emit_event(
        &state,
        &session_id,
        origin,
        EventType::Message,
        MessageEventPayload {
            role: WireMessageRole::Assistant,
            content: final_text.clone(),
            message_id: assistant_msg_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            from_self: None,
        },
    );

    let turn = MessageTurn {
        user_message: message,
        assistant_message: final_text,
        timestamp: chrono::Utc::now(),
        user_msg_id,
        assistant_msg_id: assistant_msg_id.clone(),
        tool_calls: round_tool_calls,
        tool_results: round_tool_results,
    };
    session_state.commit_turn(turn.clone());
    state.state_cache.save(&session_state)?;

    if state.config.memory_lifecycle.auto_capture {
        let compactor = state.compactor.clone();
        let session_id_bg = session_id.clone();
        tokio::spawn(async move {
            compactor.extract_turn(&session_id_bg, &turn).await;
        });
    }

    emit_status(&state, &session_id, &run_id, origin, AgentStatus::Done);
    emit_event(
        &state,
        &session_id,
        origin,
        EventType::Final,
        FinalEventPayload { run_id: run_id.clone(), message_id: assistant_msg_id, total_tokens },
    );

    Ok(())
}

struct RoundResult {
    text: String,
    tool_calls: Vec<ToolCall>,
    usage: Option<sa_domain::stream::Usage>,
    cancelled: bool,
}

/// Consume one streaming model response, accumulating text and tool-call
/// arguments. Not every provider emits `ToolCallFinished` — the
/// OpenAI-compatible adapter only emits `ToolCallStarted`/`ToolCallDelta`
/// fragments, so any call still open once the stream ends is finalized
/// here from its accumulated delta buffer.
async fn stream_one_round(
    state: &AppState,
    session_id: &str,
    run_id: &str,
    origin: Option<&str>,
    provider: &Arc<dyn LlmProvider>,
    request: ChatRequest,
    cancel: &CancellationToken,
) -> Result<RoundResult> {
    use futures_util::StreamExt;

    let mut stream = provider.chat_stream(request).await?;

    let mut text_buf = String::new();
    let mut streaming_announced = false;
    let mut order: Vec<String> = Vec::new();
    let mut tc_bufs: HashMap<String, (String, String)> = HashMap::new();
    let mut finished_calls: HashMap<String, (String, Value)> = HashMap::new();
    let mut usage = None;

    while let Some(event_result) = stream.next().await {
        if cancel.is_cancelled() {
            return Ok(RoundResult { text: text_buf, tool_calls: vec![], usage, cancelled: true });
        }

        let event = event_result?;
        match event {
            StreamEvent::Token { text } => {
                if !streaming_announced {
                    emit_status(state, session_id, run_id, origin, AgentStatus::Streaming);
                    streaming_announced = true;
                }
                text_buf.push_str(&text);
                emit_event(
                    state,
                    session_id,
                    origin,
                    EventType::Token,
                    TokenEventPayload { run_id: run_id.to_string(), content: text, delta: true },
                );
            }
            StreamEvent::ToolCallStarted { call_id, tool_name } => {
                if !tc_bufs.contains_key(&call_id) {
                    order.push(call_id.clone());
                }
                tc_bufs.insert(call_id, (tool_name, String::new()));
            }
            StreamEvent::ToolCallDelta { call_id, delta } => {
                let entry = tc_bufs.entry(call_id.clone()).or_insert_with(|| {
                    order.push(call_id.clone());
                    (String::new(), String::new())
                });
                entry.1.push_str(&delta);
            }
            StreamEvent::ToolCallFinished { call_id, tool_name, arguments } => {
                if !finished_calls.contains_key(&call_id) && !tc_bufs.contains_key(&call_id) {
                    order.push(call_id.clone());
                }
                tc_bufs.remove(&call_id);
                finished_calls.insert(call_id, (tool_name, arguments));
            }
            StreamEvent::Done { usage: u, .. } => {
                usage = u;
            }
            StreamEvent::Error { message } => {
                return Err(Error::Provider { provider: provider.provider_id().to_string(), message });
            }
        }
    }

    let mut tool_calls = Vec::with_capacity(order.len());
    for call_id in order {
        if let Some((tool_name, arguments)) = finished_calls.remove(&call_id) {
            tool_calls.push(ToolCall { call_id, tool_name, arguments });
            continue;
        }
        if let Some((tool_name, args_json)) = tc_bufs.remove(&call_id) {
            let arguments = if args_json.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&args_json).unwrap_or_else(|e| {
                    tracing::warn!(call_id = %call_id, error = %e, "tool call arguments were not valid JSON, defaulting to {{}}");
                    Value::Object(Default::default())
                })
            };
            tool_calls.push(ToolCall { call_id, tool_name, arguments });
        }
    }

    if let Some(usage) = &usage {
        tracing::Span::current().record("prompt_tokens", usage.prompt_tokens as u64);
        tracing::Span::current().record("completion_tokens", usage.completion_tokens as u64);
    }

    Ok(RoundResult { text: text_buf, tool_calls, usage, cancelled: false })
}

/// Run the full permission/policy/execute sequence for one tool call,
/// synthesizing a failing result instead of calling the tool whenever the
/// call can't or shouldn't proceed.
async fn dispatch_tool_call(
    state: &AppState,
    session_id: &str,
    run_id: &str,
    origin: Option<&str>,
    tc: &ToolCall,
    cancel: &CancellationToken,
) -> (Value, bool) {
    log_event(
        state,
        session_id,
        LogEvent::ToolCall {
            timestamp: chrono::Utc::now(),
            call_id: tc.call_id.clone(),
            tool_name: tc.tool_name.clone(),
            arguments: tc.arguments.clone(),
        },
    );
    emit_event(
        state,
        session_id,
        origin,
        EventType::ToolCall,
        ToolCallEventPayload { run_id: run_id.to_string(), tool_name: tc.tool_name.clone(), arguments: tc.arguments.clone() },
    );

    if state.tools.get(&tc.tool_name).is_err() {
        return (tool_error_value(Error::UnknownTool(tc.tool_name.clone())), true);
    }
    let missing = state.tools.missing_args(&tc.tool_name, &tc.arguments);
    if !missing.is_empty() {
        return (
            tool_error_value(Error::MissingArgs { tool: tc.tool_name.clone(), missing }),
            true,
        );
    }

    let capability = match state.tools.capability_for(&tc.tool_name, &tc.arguments) {
        Some(c) => c,
        None => return (tool_error_value(Error::UnknownTool(tc.tool_name.clone())), true),
    };
    let (decision, matched) = state.policy.check(&capability);

    match decision {
        PolicyDecision::Deny => {
            let reason = format!("capability \"{capability}\" is denied by policy ({matched:?})");
            (tool_error_value(Error::Policy(reason)), true)
        }
        PolicyDecision::Ask => {
            let request_id = uuid::Uuid::new_v4().to_string();
            let preview = build_preview(&state.tools, &tc.tool_name, &tc.arguments).await;
            emit_event(
                state,
                session_id,
                origin,
                EventType::PermissionRequest,
                PermissionRequestEventPayload {
                    request_id: request_id.clone(),
                    run_id: run_id.to_string(),
                    capability: capability.clone(),
                    preview,
                    reason: format!("tool \"{}\" requires \"{capability}\" permission", tc.tool_name),
                },
            );

            let timeout = std::time::Duration::from_secs(state.config.policy.ask_timeout_secs);
            let outcome = tokio::select! {
                outcome = state.permissions.ask(&request_id, session_id, &capability, timeout) => outcome,
                _ = cancel.cancelled() => PermissionOutcome::Cancelled,
            };

            if !outcome.is_approved() {
                let reason = format!("permission {} for \"{capability}\"", outcome.deny_reason());
                return (tool_error_value(Error::Policy(reason)), true);
            }
            execute_tool(state, tc).await
        }
        PolicyDecision::Allow => execute_tool(state, tc).await,
    }
}

async fn execute_tool(state: &AppState, tc: &ToolCall) -> (Value, bool) {
    match state.tools.execute(&tc.tool_name, tc.arguments.clone()).await {
        Ok(value) => (value, false),
        Err(e) => (tool_error_value(e), true),
    }
}

fn tool_error_value(e: Error) -> Value {
    serde_json::json!({ "error": e.to_string(), "error_code": e.as_wire_code() })
}

/// A `file_write` call previews as a unified diff against the file's
/// current content (empty if the file doesn't exist yet); every other
/// tool previews as its truncated JSON arguments.
async fn build_preview(tools: &sa_tools::ToolRegistry, tool_name: &str, args: &Value) -> String {
    if tool_name == "file_write" {
        if let (Some(path), Some(content)) = (
            args.get("path").and_then(Value::as_str),
            args.get("content").and_then(Value::as_str),
        ) {
            if let Ok(abs_path) = file_ops::validate_path(tools.workspace_root(), path) {
                let old = tokio::fs::read_to_string(&abs_path).await.unwrap_or_default();
                let diff = TextDiff::from_lines(&old, content);
                return diff.unified_diff().context_radius(3).header(path, path).to_string();
            }
        }
    }
    let json = serde_json::to_string(args).unwrap_or_default();
    truncate_str(&json, PREVIEW_BYTES)
}

fn truncate_str(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}… ({} bytes truncated)", &s[..end], s.len() - end)
}

async fn retrieve_memory(state: &AppState, query: &str) -> Vec<sa_memory::Memory> {
    let Some(memory) = &state.memory else {
        return Vec::new();
    };
    let cfg = &state.config.memory;
    match memory
        .search
        .search(query, cfg.vector_top_k, cfg.vector_scan_limit, cfg.lexical_weight, cfg.vector_weight)
        .await
    {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!(error = %e, "memory retrieval failed, continuing without it");
            Vec::new()
        }
    }
}

fn assemble_messages(
    config: &Config,
    state: &sa_domain::session::SessionState,
    memories: &[sa_memory::Memory],
    user_message: &str,
) -> Vec<Message> {
    let _ = config;
    let mut system = SYSTEM_PROMPT.to_string();

    if !state.rolling_summary.is_empty() {
        system.push_str("\n\n## Conversation so far\n");
        system.push_str(&state.rolling_summary.to_text());
    }
    if !memories.is_empty() {
        system.push_str("\n\n## Relevant long-term memory\n");
        for m in memories {
            system.push_str(&format!("- ({:?}, importance {}) {}\n", m.memory_type, m.importance, m.content));
        }
    }

    let mut messages = vec![Message::system(system)];
    let start = state.recent_turns.len().saturating_sub(PROMPT_TURNS);
    for turn in &state.recent_turns[start..] {
        messages.push(Message::user(&turn.user_message));
        messages.push(Message::assistant(&turn.assistant_message));
    }
    messages.push(Message::user(user_message));
    messages
}

fn log_event(state: &AppState, session_id: &str, event: LogEvent) {
    if let Err(e) = state.event_log.append(session_id, &event) {
        tracing::warn!(error = %e, session_id, "failed to append event to event log");
    }
}

fn emit_event(state: &AppState, session_id: &str, origin: Option<&str>, event_type: EventType, payload: impl serde::Serialize) {
    let seq = state.connections.next_seq(session_id);
    let value = serde_json::to_value(payload).unwrap_or(Value::Null);
    state.connections.broadcast(session_id, origin, WireEvent::new(event_type, value, Some(seq)));
}

fn emit_status(state: &AppState, session_id: &str, run_id: &str, origin: Option<&str>, status: AgentStatus) {
    emit_event(
        state,
        session_id,
        origin,
        EventType::Status,
        StatusEventPayload { run_id: run_id.to_string(), status },
    );
}

fn emit_cancelled(state: &AppState, session_id: &str, run_id: &str, origin: Option<&str>, message: &str) -> Result<()> {
    emit_event(
        state,
        session_id,
        origin,
        EventType::Cancelled,
        CancelledEventPayload { run_id: run_id.to_string(), message: message.to_string() },
    );
    Ok(())
}

fn emit_error(state: &AppState, session_id: &str, run_id: &str, origin: Option<&str>, e: &Error) {
    emit_event(
        state,
        session_id,
        origin,
        EventType::Error,
        ErrorEventPayload {
            run_id: Some(run_id.to_string()),
            message: e.to_string(),
            retryable: matches!(e, Error::Timeout(_) | Error::Http(_)),
            error_code: Some(e.as_wire_code().to_string()),
        },
    );
}
