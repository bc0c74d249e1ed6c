//! Per-session state cache: one JSON blob per session holding the derived
//! fast-path view (`SessionState`) so the agent loop never has to replay
//! the full event log to assemble a prompt.

use std::path::{Path, PathBuf};

use sa_domain::error::Result;
use sa_domain::session::SessionState;

fn sanitize(session_id: &str) -> String {
    session_id.replace(['/', '\\'], "-")
}

pub struct StateCache {
    data_dir: PathBuf,
}

impl StateCache {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    fn path(&self, session_id: &str) -> PathBuf {
        self.data_dir.join(format!("{}.state.json", sanitize(session_id)))
    }

    /// Load the cached state for a session, or `None` if no cache exists
    /// yet or the file is corrupt (treated the same as a cache miss).
    pub fn load(&self, session_id: &str) -> Option<SessionState> {
        let content = std::fs::read_to_string(self.path(session_id)).ok()?;
        match serde_json::from_str(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(session_id, error = %e, "state cache corrupt, treating as miss");
                None
            }
        }
    }

    /// Write state atomically (write-temp, then rename).
    pub fn save(&self, state: &SessionState) -> Result<()> {
        let path = self.path(&state.session_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Load the cached state, materializing a fresh empty one on miss.
    pub fn get_or_create(&self, session_id: &str) -> Result<SessionState> {
        if let Some(state) = self.load(session_id) {
            return Ok(state);
        }
        let state = SessionState::new(session_id);
        self.save(&state)?;
        Ok(state)
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.path(session_id).exists()
    }

    pub fn delete(&self, session_id: &str) -> Result<()> {
        let path = self.path(session_id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Rebuild state by replaying the event log from scratch. Used when the
    /// cache is corrupt, or deliberately after a compaction rewrite. Full
    /// event replay is deferred to the caller (who owns the `EventLog`);
    /// this just materializes the fresh starting point the caller folds
    /// events into.
    pub fn rebuild_initial(&self, session_id: &str) -> Result<SessionState> {
        let state = SessionState::new(session_id);
        self.save(&state)?;
        Ok(state)
    }
}

impl AsRef<Path> for StateCache {
    fn as_ref(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_materializes_fresh_state_on_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StateCache::new(dir.path()).unwrap();
        let state = cache.get_or_create("sess_1").unwrap();
        assert_eq!(state.session_id, "sess_1");
        assert_eq!(state.message_count, 0);
        assert!(cache.exists("sess_1"));
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StateCache::new(dir.path()).unwrap();
        let mut state = SessionState::new("sess_1");
        state.rolling_summary.user_profile = "likes Rust".into();
        cache.save(&state).unwrap();

        let loaded = cache.load("sess_1").unwrap();
        assert_eq!(loaded.rolling_summary.user_profile, "likes Rust");
    }

    #[test]
    fn corrupt_cache_file_is_treated_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StateCache::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("sess_1.state.json"), "not json").unwrap();
        assert!(cache.load("sess_1").is_none());
    }
}
