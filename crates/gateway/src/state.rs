use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use sa_domain::config::Config;
use sa_memory::{MemoryExtractor, MemorySearch, MemoryStorage};
use sa_providers::registry::ProviderRegistry;
use sa_sessions::{EventLog, SessionCompactor, SessionQueue, SessionStore, StateCache};
use sa_tools::{ProcessManager, ToolPolicy, ToolRegistry};

use crate::connection::ConnectionManager;
use crate::permission::PermissionBridge;

/// An `agent` request that has been accepted into a session's queue but
/// hasn't started running yet. [`sa_sessions::SessionQueue`] tracks only
/// the cancellation token for a queued request (enough to cancel it before
/// it starts); the message text and originating client travel here instead,
/// keyed by `run_id`, until [`SessionQueue::finish_and_advance`] promotes it.
#[derive(Debug, Clone)]
pub struct PendingRun {
    pub message: String,
    pub origin_client_id: Option<String>,
}

/// Long-term memory subsystem, built together since all three pieces share
/// the same underlying provider and storage. Absent when no embedding
/// model is configured — the agent loop then skips memory retrieval and
/// extraction entirely rather than failing a turn over it.
pub struct MemorySystem {
    pub storage: Arc<MemoryStorage>,
    pub search: Arc<MemorySearch>,
    pub extractor: Arc<MemoryExtractor>,
}

/// Shared application state passed to every connection handler and the
/// agent loop.
///
/// Fields are grouped by concern:
/// - **Core services** — config, LLM providers, long-term memory
/// - **Session management** — session store, event log, state cache,
///   compactor, per-session queue
/// - **Tools** — tool registry, policy, process manager
/// - **Gateway runtime** — connection manager, permission bridge
///
/// Sessions here are keyed directly by session id: the gateway's wire
/// protocol (`connect` with `sessionPreference`) carries no channel/peer
/// metadata to route on, so there's no multi-channel identity resolution
/// or reset-lifecycle policy to apply — a session simply exists from the
/// moment a client asks for it until the client asks for another one.
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub providers: Arc<ProviderRegistry>,
    pub memory: Option<Arc<MemorySystem>>,

    // ── Session management ────────────────────────────────────────────
    pub session_store: Arc<SessionStore>,
    pub state_cache: Arc<StateCache>,
    pub event_log: Arc<EventLog>,
    pub compactor: Arc<SessionCompactor>,
    pub queue: Arc<SessionQueue>,
    /// `run_id -> cancellation token` for runs currently executing, so
    /// `agent.cancel` can reach a run that's past the queue (`SessionQueue`
    /// only tracks tokens for runs still waiting in its FIFO).
    pub active_runs: Arc<Mutex<HashMap<String, CancellationToken>>>,
    /// `run_id -> PendingRun` for requests still waiting in `queue`. See
    /// [`PendingRun`].
    pub pending_runs: Arc<Mutex<HashMap<String, PendingRun>>>,

    // ── Tools ─────────────────────────────────────────────────────────
    pub tools: Arc<ToolRegistry>,
    pub policy: Arc<ToolPolicy>,
    pub processes: Arc<ProcessManager>,

    // ── Gateway runtime ───────────────────────────────────────────────
    pub connections: Arc<ConnectionManager>,
    pub permissions: Arc<PermissionBridge>,
}

impl AppState {
    pub fn cancel_run(&self, run_id: &str) -> bool {
        match self.active_runs.lock().get(run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}
