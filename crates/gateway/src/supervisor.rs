//! Background maintenance: small independent interval-loop tasks, one per
//! concern, matching the shape already used for periodic upkeep elsewhere
//! in the gateway (session-store flush, stale-node pruning, schedule
//! ticking) — each just a `tokio::time::interval` loop spawned once at
//! startup and left to run for the process lifetime.

use std::sync::Arc;
use std::time::Duration;

use crate::state::AppState;

const DIAGNOSTIC_INTERVAL: Duration = Duration::from_secs(15);
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the supervisor's background tasks. Returns immediately; the tasks
/// run until the process exits.
pub fn spawn(state: Arc<AppState>) {
    tokio::spawn(run_diagnostics(state.clone()));
    tokio::spawn(run_maintenance(state));
}

/// Lightweight, frequent tick: log current load so an operator tailing
/// logs can see queue backpressure building before it becomes a maintenance
/// problem. Does no mutation.
async fn run_diagnostics(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(DIAGNOSTIC_INTERVAL);
    loop {
        interval.tick().await;

        let active = state.active_runs.lock().len();
        let pending = state.pending_runs.lock().len();
        if active > 0 || pending > 0 {
            tracing::info!(active_runs = active, pending_runs = pending, "gateway load");
        }
    }
}

/// Slower, heavier tick: rotate and prune each session's event log, and
/// flush the session store so restarts don't lose recent token counters.
async fn run_maintenance(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    loop {
        interval.tick().await;

        if let Err(e) = state.session_store.flush() {
            tracing::warn!(error = %e, "session store flush failed");
        }

        let session_ids = match state.event_log.list_session_ids() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "failed to enumerate session event logs");
                continue;
            }
        };

        for session_id in session_ids {
            let rotate_bytes = state.config.event_log.rotate_bytes;
            match state.event_log.rotate_if_needed(&session_id, rotate_bytes) {
                Ok(Some(record)) => {
                    tracing::info!(session_id, bytes = record.bytes, path = %record.path, "event log rotated");
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(session_id, error = %e, "event log rotation failed"),
            }

            let keep_days = state.config.event_log.keep_days;
            let keep_max_files = state.config.event_log.keep_max_files;
            match state.event_log.prune(&session_id, keep_days, keep_max_files) {
                Ok((removed, _kept)) if removed > 0 => {
                    tracing::info!(session_id, removed, "event log archives pruned");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(session_id, error = %e, "event log prune failed"),
            }
        }

    }
}
