//! Wire protocol between clients and the gateway: request/response/event
//! frames exchanged over the persistent duplex connection, and their
//! per-method and per-event payloads.
//!
//! Three frame kinds share one envelope, discriminated by `type`: a
//! client-issued `req`, a gateway `res` answering a specific request by
//! `id`, and an unsolicited `event` the gateway broadcasts to every client
//! attached to a session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Methods a client may invoke over `req`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Connect,
    Agent,
    #[serde(rename = "agent.cancel")]
    AgentCancel,
    #[serde(rename = "sessions.list")]
    SessionsList,
    #[serde(rename = "sessions.new")]
    SessionsNew,
    #[serde(rename = "sessions.switch")]
    SessionsSwitch,
    #[serde(rename = "sessions.history")]
    SessionsHistory,
    Status,
    #[serde(rename = "permission.respond")]
    PermissionRespond,
}

/// Event kinds a gateway may push over `event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Message,
    Queued,
    Token,
    ToolCall,
    ToolResult,
    Status,
    Final,
    Cancelled,
    Error,
    /// The gateway switched the client's currently-viewed session (e.g.
    /// another client attached to the same account created a new one).
    SessionChanged,
    /// The agent loop needs user consent before proceeding; carries a
    /// `request_id` a matching `permission.respond` request must echo back.
    #[serde(rename = "permission.request")]
    PermissionRequest,
    /// A diagnostic line surfaced by the supervisor or agent loop, not part
    /// of the conversation transcript.
    #[serde(rename = "run.log")]
    RunLog,
}

/// Agent processing status, carried in a `status` event's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    RetrievingMemory,
    Compacting,
    Thinking,
    Streaming,
    ExecutingTools,
    Done,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client → gateway request frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "type")]
    pub frame_type: RequestTag,
    pub id: String,
    pub method: Method,
    #[serde(default)]
    pub params: Value,
}

/// Gateway → client response frame, answering a specific `Request::id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub frame_type: ResponseTag,
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(id: impl Into<String>, payload: Value) -> Self {
        Self {
            frame_type: ResponseTag::Res,
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            frame_type: ResponseTag::Res,
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(message.into()),
        }
    }
}

/// Gateway → client(s) event frame, unsolicited and fanned out to every
/// client attached to the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub frame_type: EventTag,
    pub event: EventType,
    pub payload: Value,
    /// Monotonically increasing per-session sequence number, used by
    /// clients to detect gaps after a reconnect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl Event {
    pub fn new(event: EventType, payload: Value, seq: Option<u64>) -> Self {
        Self {
            frame_type: EventTag::Event,
            event,
            payload,
            seq,
        }
    }
}

// `type` discriminator literals — newtype enums so serde enforces the
// exact string at (de)serialization time without hand-rolled validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestTag {
    #[serde(rename = "req")]
    Req,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseTag {
    #[serde(rename = "res")]
    Res,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTag {
    #[serde(rename = "event")]
    Event,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Method params
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectParams {
    pub version: String,
    pub client_type: String,
    #[serde(default)]
    pub session_preference: Option<String>,
    #[serde(default)]
    pub history_limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentParams {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCancelParams {
    pub run_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsListParams {
    #[serde(default = "d_10")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsNewParams {
    #[serde(default = "d_new_conversation")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsSwitchParams {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsHistoryParams {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "d_20")]
    pub limit: usize,
    #[serde(default)]
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusParams {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDecision {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRespondParams {
    pub request_id: String,
    pub decision: PermissionDecision,
}

fn d_10() -> usize {
    10
}
fn d_20() -> usize {
    20
}
fn d_new_conversation() -> Option<String> {
    Some("New conversation".into())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEventPayload {
    pub role: MessageRole,
    pub content: String,
    pub message_id: String,
    pub timestamp: String,
    /// Set when the originating client is also the one receiving the echo
    /// (web/CLI clients suppress re-rendering their own sent message).
    #[serde(default)]
    pub from_self: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEventPayload {
    pub request_id: String,
    pub position: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEventPayload {
    pub run_id: String,
    pub content: String,
    #[serde(default = "d_true")]
    pub delta: bool,
}

fn d_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallEventPayload {
    pub run_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultEventPayload {
    pub run_id: String,
    pub tool_name: String,
    pub result: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEventPayload {
    pub run_id: String,
    pub status: AgentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalEventPayload {
    pub run_id: String,
    pub message_id: String,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelledEventPayload {
    pub run_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEventPayload {
    #[serde(default)]
    pub run_id: Option<String>,
    pub message: String,
    pub retryable: bool,
    #[serde(default)]
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRequestEventPayload {
    pub request_id: String,
    pub run_id: String,
    pub capability: String,
    pub preview: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEventPayload {
    pub run_id: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let raw = r#"{"type":"req","id":"r1","method":"agent","params":{"message":"hi"}}"#;
        let req: Request = serde_json::from_str(raw).unwrap();
        assert_eq!(req.method, Method::Agent);
        assert_eq!(req.id, "r1");
        let back = serde_json::to_string(&req).unwrap();
        let req2: Request = serde_json::from_str(&back).unwrap();
        assert_eq!(req2.id, req.id);
    }

    #[test]
    fn agent_cancel_method_serializes_with_dot() {
        let req = Request {
            frame_type: RequestTag::Req,
            id: "r2".into(),
            method: Method::AgentCancel,
            params: serde_json::json!({"runId": "run_1"}),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"agent.cancel\""));
    }

    #[test]
    fn response_err_omits_payload() {
        let resp = Response::err("r1", "session not found");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("\"payload\""));
        assert!(json.contains("\"error\":\"session not found\""));
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let payload = serde_json::to_value(TokenEventPayload {
            run_id: "run_1".into(),
            content: "hel".into(),
            delta: true,
        })
        .unwrap();
        let event = Event::new(EventType::Token, payload, Some(1));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"event\""));
        assert!(json.contains("\"event\":\"token\""));
    }

    #[test]
    fn sessions_new_params_defaults_title() {
        let params: SessionsNewParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.title.as_deref(), Some("New conversation"));
    }

    #[test]
    fn error_event_payload_run_id_optional() {
        let raw = r#"{"message":"boom","retryable":true}"#;
        let payload: ErrorEventPayload = serde_json::from_str(raw).unwrap();
        assert!(payload.run_id.is_none());
        assert!(payload.retryable);
    }
}
