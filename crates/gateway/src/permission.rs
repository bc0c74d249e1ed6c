//! Permission bridge — turns a synchronous-looking "ask the client, wait
//! for an answer" step into a request id keyed against a decision promise.
//!
//! The agent loop calls [`PermissionBridge::ask`] and awaits it; the
//! gateway frontend resolves the matching promise when a
//! `permission.respond` frame arrives for that `request_id`. Three other
//! paths can also resolve it: a timeout, the asking client disconnecting
//! (`client_gone`), and the run itself being cancelled.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use sa_domain::trace::TraceEvent;

/// How a pending permission ask was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    Approved,
    Denied,
    TimedOut,
    ClientGone,
    Cancelled,
}

impl PermissionOutcome {
    pub fn is_approved(self) -> bool {
        matches!(self, PermissionOutcome::Approved)
    }

    /// Reason string attached to the synthesized failing tool result when
    /// the outcome isn't an approval.
    pub fn deny_reason(self) -> &'static str {
        match self {
            PermissionOutcome::Approved => "",
            PermissionOutcome::Denied => "denied",
            PermissionOutcome::TimedOut => "timeout",
            PermissionOutcome::ClientGone => "client_gone",
            PermissionOutcome::Cancelled => "cancelled",
        }
    }
}

struct Waiter {
    sender: oneshot::Sender<PermissionOutcome>,
    session_id: String,
}

pub struct PermissionBridge {
    waiters: Mutex<HashMap<String, Waiter>>,
}

impl PermissionBridge {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Register `request_id` and wait up to `timeout` for a decision.
    /// Always removes the waiter before returning, so a decision that
    /// arrives late (after timeout) is simply dropped.
    pub async fn ask(&self, request_id: &str, session_id: &str, capability: &str, timeout: Duration) -> PermissionOutcome {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(
            request_id.to_string(),
            Waiter {
                sender: tx,
                session_id: session_id.to_string(),
            },
        );

        TraceEvent::PermissionRequested {
            request_id: request_id.to_string(),
            capability: capability.to_string(),
        }
        .emit();

        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => PermissionOutcome::ClientGone,
            Err(_) => PermissionOutcome::TimedOut,
        };

        self.waiters.lock().remove(request_id);

        TraceEvent::PermissionResolved {
            request_id: request_id.to_string(),
            approved: outcome.is_approved(),
            reason: outcome.deny_reason().to_string(),
        }
        .emit();

        outcome
    }

    /// Resolve a pending ask with an explicit client decision. Returns
    /// `false` if no waiter was registered for `request_id` (already timed
    /// out, already resolved, or unknown id).
    pub fn resolve(&self, request_id: &str, approved: bool) -> bool {
        let waiter = self.waiters.lock().remove(request_id);
        match waiter {
            Some(waiter) => {
                let outcome = if approved {
                    PermissionOutcome::Approved
                } else {
                    PermissionOutcome::Denied
                };
                let _ = waiter.sender.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Resolve every pending ask belonging to `session_id`. Since only one
    /// run executes per session at a time (serialized by the gateway's
    /// per-session run lock), at most one permission ask is ever
    /// outstanding for a session — this covers both a cancelled run
    /// (`outcome = Cancelled`) and a disconnected client (`ClientGone`).
    pub fn cancel_for_session(&self, session_id: &str, outcome: PermissionOutcome) {
        let mut waiters = self.waiters.lock();
        let stale: Vec<String> = waiters
            .iter()
            .filter(|(_, w)| w.session_id == session_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(waiter) = waiters.remove(&id) {
                let _ = waiter.sender.send(outcome);
            }
        }
    }
}

impl Default for PermissionBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn resolve_delivers_approval() {
        let bridge = Arc::new(PermissionBridge::new());
        let b2 = bridge.clone();
        let handle = tokio::spawn(async move {
            b2.ask("req_1", "sess_1", "shell.run", Duration::from_secs(5)).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(bridge.resolve("req_1", true));
        assert_eq!(handle.await.unwrap(), PermissionOutcome::Approved);
    }

    #[tokio::test]
    async fn ask_times_out_when_unanswered() {
        let bridge = PermissionBridge::new();
        let outcome = bridge.ask("req_1", "sess_1", "shell.run", Duration::from_millis(20)).await;
        assert_eq!(outcome, PermissionOutcome::TimedOut);
    }

    #[tokio::test]
    async fn resolve_unknown_request_id_returns_false() {
        let bridge = PermissionBridge::new();
        assert!(!bridge.resolve("missing", true));
    }

    #[tokio::test]
    async fn cancel_for_session_resolves_with_given_outcome() {
        let bridge = Arc::new(PermissionBridge::new());
        let b2 = bridge.clone();
        let handle = tokio::spawn(async move {
            b2.ask("req_1", "sess_1", "shell.run", Duration::from_secs(5)).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        bridge.cancel_for_session("sess_1", PermissionOutcome::ClientGone);
        assert_eq!(handle.await.unwrap(), PermissionOutcome::ClientGone);
    }
}
