//! Connection manager — tracks which clients are attached to which session
//! and rewrites outbound events per-recipient before fan-out.
//!
//! Mirrors the shape of `sa_sessions::store::SessionStore`: a single
//! `RwLock`-guarded map, cheap reads, short-held writes. Unlike the node
//! registry (which speaks raw `WsMessage` over one wire format), this map
//! is transport-agnostic — it holds `sa_protocol::Event`s and leaves
//! serialization to each client's own writer task.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use sa_protocol::{Event, EventType, MessageEventPayload, MessageRole};

/// One attached client.
struct ClientEntry {
    session_id: String,
    client_type: String,
    sender: mpsc::UnboundedSender<Event>,
}

struct Inner {
    by_client: HashMap<String, ClientEntry>,
    by_session: HashMap<String, Vec<String>>,
    seq: HashMap<String, u64>,
}

/// Snapshot of how many clients are attached, for `status`/`sessions.list`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    pub client_count: usize,
}

pub struct ConnectionManager {
    inner: RwLock<Inner>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                by_client: HashMap::new(),
                by_session: HashMap::new(),
                seq: HashMap::new(),
            }),
        }
    }

    /// Next monotonically increasing sequence number for `session_id`,
    /// stamped onto every event before broadcast so a reconnecting client
    /// can detect gaps.
    pub fn next_seq(&self, session_id: &str) -> u64 {
        let mut inner = self.inner.write();
        let counter = inner.seq.entry(session_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn add_client(
        &self,
        client_id: &str,
        session_id: &str,
        client_type: &str,
        sender: mpsc::UnboundedSender<Event>,
    ) {
        let mut inner = self.inner.write();
        inner.by_client.insert(
            client_id.to_string(),
            ClientEntry {
                session_id: session_id.to_string(),
                client_type: client_type.to_string(),
                sender,
            },
        );
        inner
            .by_session
            .entry(session_id.to_string())
            .or_default()
            .push(client_id.to_string());
    }

    pub fn remove_client(&self, client_id: &str) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.by_client.remove(client_id) {
            if let Some(members) = inner.by_session.get_mut(&entry.session_id) {
                members.retain(|c| c != client_id);
                if members.is_empty() {
                    inner.by_session.remove(&entry.session_id);
                }
            }
        }
    }

    /// Move `client_id` from its current session to `new_session_id`,
    /// atomically with respect to concurrent broadcasts.
    pub fn switch_session(&self, client_id: &str, new_session_id: &str) {
        let mut inner = self.inner.write();
        let Some(old_session_id) = inner.by_client.get(client_id).map(|e| e.session_id.clone())
        else {
            return;
        };
        if old_session_id == new_session_id {
            return;
        }
        if let Some(members) = inner.by_session.get_mut(&old_session_id) {
            members.retain(|c| c != client_id);
            if members.is_empty() {
                inner.by_session.remove(&old_session_id);
            }
        }
        inner
            .by_session
            .entry(new_session_id.to_string())
            .or_default()
            .push(client_id.to_string());
        if let Some(entry) = inner.by_client.get_mut(client_id) {
            entry.session_id = new_session_id.to_string();
        }
    }

    pub fn session_of(&self, client_id: &str) -> Option<String> {
        self.inner
            .read()
            .by_client
            .get(client_id)
            .map(|e| e.session_id.clone())
    }

    pub fn clients_for_session(&self, session_id: &str) -> Vec<String> {
        self.inner
            .read()
            .by_session
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stats(&self, session_id: &str) -> SessionStats {
        SessionStats {
            client_count: self.clients_for_session(session_id).len(),
        }
    }

    /// Send one event directly to a single client, ignoring the per-client
    /// rewrite rules `broadcast` applies — used for responses and events
    /// that are inherently single-recipient (e.g. `session_changed`).
    pub fn send_to_client(&self, client_id: &str, event: Event) {
        let sender = self.inner.read().by_client.get(client_id).map(|e| e.sender.clone());
        if let Some(sender) = sender {
            let _ = sender.send(event);
        }
    }

    /// Broadcast `event` to every client attached to `session_id`, applying
    /// the per-recipient transform described in the connection-manager spec:
    /// `message` events with `role=user` get a `fromSelf`-style distinction
    /// (and, for `telegram`-type clients, a prefix) so a client never
    /// mistakes another client's echo for its own message. Every other
    /// event kind passes through unchanged. A send failure marks that
    /// client for removal after the fan-out completes; it never aborts
    /// delivery to the others.
    pub fn broadcast(&self, session_id: &str, origin_client_id: Option<&str>, event: Event) {
        let recipients: Vec<(String, String, mpsc::UnboundedSender<Event>)> = {
            let inner = self.inner.read();
            inner
                .by_session
                .get(session_id)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| {
                            inner
                                .by_client
                                .get(id)
                                .map(|e| (id.clone(), e.client_type.clone(), e.sender.clone()))
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut dead = Vec::new();
        for (client_id, client_type, sender) in recipients {
            let is_sender = origin_client_id == Some(client_id.as_str());
            let outgoing = Self::rewrite_for(&event, &client_type, is_sender);
            if sender.send(outgoing).is_err() {
                dead.push(client_id);
            }
        }
        for client_id in dead {
            self.remove_client(&client_id);
        }
    }

    fn rewrite_for(event: &Event, client_type: &str, is_sender: bool) -> Event {
        if event.event != EventType::Message {
            return event.clone();
        }
        let Ok(mut payload) = serde_json::from_value::<MessageEventPayload>(event.payload.clone())
        else {
            return event.clone();
        };
        if payload.role != MessageRole::User {
            return event.clone();
        }

        if client_type == "telegram" && !is_sender {
            payload.content = format!("\u{1f4ac} [from another client] {}", payload.content);
        } else {
            payload.from_self = Some(is_sender);
        }

        Event::new(
            event.event.clone(),
            serde_json::to_value(payload).unwrap_or(event.payload.clone()),
            event.seq,
        )
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_message_event(content: &str) -> Event {
        Event::new(
            EventType::Message,
            serde_json::to_value(MessageEventPayload {
                role: MessageRole::User,
                content: content.to_string(),
                message_id: "msg_1".into(),
                timestamp: "2026-01-01T00:00:00Z".into(),
                from_self: None,
            })
            .unwrap(),
            Some(1),
        )
    }

    #[test]
    fn broadcast_marks_sender_with_from_self() {
        let mgr = ConnectionManager::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        mgr.add_client("a", "sess_1", "web", tx_a);
        mgr.add_client("b", "sess_1", "web", tx_b);

        mgr.broadcast("sess_1", Some("a"), user_message_event("hi"));

        let a_event = rx_a.try_recv().unwrap();
        let a_payload: MessageEventPayload = serde_json::from_value(a_event.payload).unwrap();
        assert_eq!(a_payload.from_self, Some(true));

        let b_event = rx_b.try_recv().unwrap();
        let b_payload: MessageEventPayload = serde_json::from_value(b_event.payload).unwrap();
        assert_eq!(b_payload.from_self, Some(false));
    }

    #[test]
    fn telegram_client_gets_prefixed_content_when_not_sender() {
        let mgr = ConnectionManager::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        mgr.add_client("a", "sess_1", "web", tx_a);
        mgr.add_client("b", "sess_1", "telegram", tx_b);

        mgr.broadcast("sess_1", Some("a"), user_message_event("hi"));

        let b_event = rx_b.try_recv().unwrap();
        let b_payload: MessageEventPayload = serde_json::from_value(b_event.payload).unwrap();
        assert!(b_payload.content.contains("hi"));
        assert!(b_payload.content != "hi");

        let a_event = rx_a.try_recv().unwrap();
        let a_payload: MessageEventPayload = serde_json::from_value(a_event.payload).unwrap();
        assert_eq!(a_payload.content, "hi");
    }

    #[test]
    fn switch_session_moves_client_atomically() {
        let mgr = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        mgr.add_client("a", "sess_1", "web", tx);
        mgr.switch_session("a", "sess_2");
        assert_eq!(mgr.session_of("a"), Some("sess_2".to_string()));
        assert!(mgr.clients_for_session("sess_1").is_empty());
        assert_eq!(mgr.clients_for_session("sess_2"), vec!["a".to_string()]);
    }

    #[test]
    fn remove_client_cleans_up_empty_session_bucket() {
        let mgr = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        mgr.add_client("a", "sess_1", "web", tx);
        mgr.remove_client("a");
        assert!(mgr.clients_for_session("sess_1").is_empty());
        assert_eq!(mgr.session_of("a"), None);
    }
}
