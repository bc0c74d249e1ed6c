//! Gateway frontend — the single websocket endpoint every client (web,
//! CLI, bridge process) connects through.
//!
//! Mirrors the shape of the teacher's node websocket handler: accept the
//! upgrade, require a handshake frame before anything else runs, split the
//! socket into a reader loop and a channel-fed writer task, then dispatch
//! every subsequent frame by method until the socket closes. Unlike the
//! node handler, two kinds of outbound traffic share one socket — request
//! responses and broadcast events — so the writer task selects over two
//! channels instead of draining one.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use sa_domain::error::Error;
use sa_domain::trace::TraceEvent;
use sa_protocol::{
    AgentCancelParams, AgentParams, ConnectParams, Event, EventType, Method, PermissionDecision,
    PermissionRespondParams, QueuedEventPayload, Request, Response,
};
use sa_sessions::store::SessionOrigin;

use crate::agent_loop::{self, RunRequest};
use crate::commands;
use crate::permission::PermissionOutcome;
use crate::state::{AppState, PendingRun};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let client_id = uuid::Uuid::new_v4().to_string();

    let Some((session_id, client_type)) = perform_handshake(&client_id, &mut sink, &mut stream, &state).await else {
        return;
    };

    TraceEvent::ClientConnected { client_id: client_id.clone(), client_type: client_type.clone() }.emit();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
    let (resp_tx, mut resp_rx) = mpsc::unbounded_channel::<Response>();
    state.connections.add_client(&client_id, &session_id, &client_type, event_tx);

    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(event) => {
                            if send_json(&mut sink, &event).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                resp = resp_rx.recv() => {
                    match resp {
                        Some(resp) => {
                            if send_json(&mut sink, &resp).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            WsMessage::Text(text) => {
                let current_session = state.connections.session_of(&client_id).unwrap_or(session_id.clone());
                if let Some(response) = dispatch_frame(&state, &client_id, &current_session, &text).await {
                    if resp_tx.send(response).is_err() {
                        break;
                    }
                }
            }
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            _ => {}
        }
    }

    writer.abort();
    state.connections.remove_client(&client_id);
    state.permissions.cancel_for_session(&session_id, PermissionOutcome::ClientGone);
    TraceEvent::ClientDisconnected { client_id: client_id.clone(), reason: "socket closed".into() }.emit();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handshake
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wait (up to 10s) for the first frame, require it to be `connect` with a
/// matching protocol version, resolve/create the requested session, and
/// answer with the success response plus a `session_changed` and a welcome
/// `message` event. Returns `None` (and leaves the socket to be dropped) on
/// any handshake failure.
async fn perform_handshake(
    client_id: &str,
    sink: &mut (impl SinkExt<WsMessage> + Unpin),
    stream: &mut (impl StreamExt<Item = Result<WsMessage, axum::Error>> + Unpin),
    state: &AppState,
) -> Option<(String, String)> {
    let raw = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(msg)) = stream.next().await {
            if let WsMessage::Text(text) = msg {
                return Some(text);
            }
        }
        None
    })
    .await
    .ok()??;

    let req: Request = serde_json::from_str(&raw).ok()?;
    if req.method != Method::Connect {
        let _ = send_json(sink, &Response::err(req.id, "first frame must be \"connect\"")).await;
        return None;
    }

    let params: ConnectParams = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            let _ = send_json(sink, &Response::err(req.id, format!("invalid connect params: {e}"))).await;
            return None;
        }
    };

    if params.version != state.config.gateway.protocol_version {
        let _ = send_json(
            sink,
            &Response::err(
                req.id,
                format!(
                    "protocol version mismatch: client={} gateway={}",
                    params.version, state.config.gateway.protocol_version
                ),
            ),
        )
        .await;
        return None;
    }

    let session_key = params
        .session_preference
        .clone()
        .unwrap_or_else(|| format!("client:{client_id}"));
    let (entry, _is_new) = state.session_store.resolve_or_create(
        &session_key,
        SessionOrigin { channel: Some(params.client_type.clone()), ..Default::default() },
    );
    let session_id = entry.session_id.clone();

    let payload = serde_json::json!({
        "session_id": session_id,
        "title": entry.title,
        "history_limit": params.history_limit.unwrap_or(state.config.gateway.default_history_limit),
    });
    if send_json(sink, &Response::ok(req.id, payload)).await.is_err() {
        return None;
    }

    let seq = state.connections.next_seq(&session_id);
    let changed = Event::new(
        EventType::SessionChanged,
        serde_json::json!({ "session_id": session_id, "title": entry.title }),
        Some(seq),
    );
    let _ = send_json(sink, &changed).await;

    let seq = state.connections.next_seq(&session_id);
    let welcome = Event::new(
        EventType::Message,
        serde_json::json!({
            "role": "assistant",
            "content": "Connected. Send a message to start.",
            "message_id": uuid::Uuid::new_v4().to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
        Some(seq),
    );
    let _ = send_json(sink, &welcome).await;

    Some((session_id, params.client_type))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Frame dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse one inbound text frame and dispatch it. A bare line with no `/`
/// prefix that fails to parse as a structured `req` frame is treated as a
/// shorthand `agent` message (so a plain chat client never has to speak
/// the envelope); a `/`-prefixed line is treated as a shorthand for the
/// matching `sessions.*`/`status` method. Anything else that fails to
/// parse gets a synthetic error response with no request id to echo.
async fn dispatch_frame(state: &AppState, client_id: &str, session_id: &str, text: &str) -> Option<Response> {
    let req = match serde_json::from_str::<Request>(text) {
        Ok(req) => req,
        Err(_) => match shorthand_request(text) {
            Some(req) => req,
            None => return Some(Response::err("", "could not parse frame")),
        },
    };

    let result = handle_request(state, client_id, session_id, &req).await;
    Some(match result {
        Ok(payload) => Response::ok(req.id, payload),
        Err(e) => Response::err(req.id, e.to_string()),
    })
}

/// Translate a plain-text line into the structured request it's shorthand
/// for. `/switch <id>`, `/sessions`, `/new [title...]`, `/status`; anything
/// else (including an empty `/`-less line) becomes an `agent` message.
fn shorthand_request(text: &str) -> Option<Request> {
    let id = uuid::Uuid::new_v4().to_string();
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix('/') {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or("");
        let arg = parts.next().unwrap_or("").trim();
        let (method, params) = match command {
            "sessions" => (Method::SessionsList, serde_json::json!({})),
            "new" => (
                Method::SessionsNew,
                serde_json::json!({ "title": if arg.is_empty() { None } else { Some(arg) } }),
            ),
            "switch" if !arg.is_empty() => (Method::SessionsSwitch, serde_json::json!({ "session_id": arg })),
            "status" => (Method::Status, serde_json::json!({})),
            "history" => (Method::SessionsHistory, serde_json::json!({})),
            _ => return None,
        };
        return Some(Request { frame_type: sa_protocol::RequestTag::Req, id, method, params });
    }
    if trimmed.is_empty() {
        return None;
    }
    Some(Request {
        frame_type: sa_protocol::RequestTag::Req,
        id,
        method: Method::Agent,
        params: serde_json::json!({ "message": text }),
    })
}

async fn handle_request(
    state: &AppState,
    client_id: &str,
    session_id: &str,
    req: &Request,
) -> Result<serde_json::Value, Error> {
    match req.method {
        Method::Connect => Err(Error::Protocol("already connected".into())),
        Method::Agent => {
            let params: AgentParams = serde_json::from_value(req.params.clone())
                .map_err(|e| Error::Protocol(format!("invalid agent params: {e}")))?;
            handle_agent(state, client_id, session_id, params).await
        }
        Method::AgentCancel => {
            let params: AgentCancelParams = serde_json::from_value(req.params.clone())
                .map_err(|e| Error::Protocol(format!("invalid agent.cancel params: {e}")))?;
            let cancelled = state.cancel_run(&params.run_id) || state.queue.cancel(session_id, &params.run_id);
            state.pending_runs.lock().remove(&params.run_id);
            Ok(serde_json::json!({ "run_id": params.run_id, "cancelled": cancelled }))
        }
        Method::SessionsList => commands::sessions_list(state, req.params.clone()),
        Method::SessionsNew => commands::sessions_new(state, client_id, req.params.clone()),
        Method::SessionsSwitch => commands::sessions_switch(state, client_id, req.params.clone()),
        Method::SessionsHistory => commands::sessions_history(state, session_id, req.params.clone()),
        Method::Status => commands::status(state, session_id, req.params.clone()),
        Method::PermissionRespond => {
            let params: PermissionRespondParams = serde_json::from_value(req.params.clone())
                .map_err(|e| Error::Protocol(format!("invalid permission.respond params: {e}")))?;
            let approved = matches!(params.decision, PermissionDecision::Allow);
            let resolved = state.permissions.resolve(&params.request_id, approved);
            Ok(serde_json::json!({ "request_id": params.request_id, "resolved": resolved }))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent run admission
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_agent(
    state: &AppState,
    client_id: &str,
    session_id: &str,
    params: AgentParams,
) -> Result<serde_json::Value, Error> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let run_id = uuid::Uuid::new_v4().to_string();

    let (position, cancel) = state.queue.enqueue(session_id, request_id.clone(), run_id.clone());

    if position == 1 {
        spawn_run(
            state.clone(),
            session_id.to_string(),
            run_id.clone(),
            params.message,
            Some(client_id.to_string()),
            cancel,
        );
    } else {
        state.pending_runs.lock().insert(
            run_id.clone(),
            PendingRun { message: params.message.clone(), origin_client_id: Some(client_id.to_string()) },
        );
        let seq = state.connections.next_seq(session_id);
        state.connections.broadcast(
            session_id,
            Some(client_id),
            Event::new(
                EventType::Queued,
                serde_json::to_value(QueuedEventPayload {
                    request_id: request_id.clone(),
                    position,
                    message: params.message,
                })
                .unwrap_or(serde_json::Value::Null),
                Some(seq),
            ),
        );
    }

    Ok(serde_json::json!({ "run_id": run_id, "request_id": request_id, "position": position }))
}

/// Spawn the agent loop for one admitted run, tracking its cancellation
/// token in `active_runs` for the duration, and advancing the session's
/// queue once it finishes regardless of how it finished.
fn spawn_run(
    state: AppState,
    session_id: String,
    run_id: String,
    message: String,
    origin_client_id: Option<String>,
    cancel: tokio_util::sync::CancellationToken,
) {
    state.active_runs.lock().insert(run_id.clone(), cancel.clone());

    tokio::spawn(async move {
        let req = RunRequest { session_id: session_id.clone(), run_id: run_id.clone(), message, origin_client_id };
        if let Err(e) = agent_loop::run(Arc::new(state.clone()), req, cancel).await {
            tracing::warn!(error = %e, run_id, session_id, "agent run returned an error after its own error event");
        }

        state.active_runs.lock().remove(&run_id);
        if let Some(next) = state.queue.finish_and_advance(&session_id) {
            let pending = state.pending_runs.lock().remove(&next.run_id);
            let PendingRun { message, origin_client_id } = pending.unwrap_or(PendingRun {
                message: String::new(),
                origin_client_id: None,
            });
            spawn_run(state.clone(), session_id.clone(), next.run_id, message, origin_client_id, next.cancel);
        }
    });
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn send_json(sink: &mut (impl SinkExt<WsMessage> + Unpin), value: &impl serde::Serialize) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    sink.send(WsMessage::Text(json)).await.map_err(|_| ())
}
