use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event log rotation / pruning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogConfig {
    /// Active file size (bytes) past which rotation runs on next append.
    #[serde(default = "d_rotate_bytes")]
    pub rotate_bytes: u64,
    /// Archived files older than this are pruned by the supervisor.
    #[serde(default = "d_keep_days")]
    pub keep_days: u32,
    /// At most this many archived files are kept per session, oldest first.
    #[serde(default = "d_keep_max_files")]
    pub keep_max_files: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            rotate_bytes: d_rotate_bytes(),
            keep_days: d_keep_days(),
            keep_max_files: d_keep_max_files(),
        }
    }
}

fn d_rotate_bytes() -> u64 {
    10 * 1024 * 1024
}
fn d_keep_days() -> u32 {
    30
}
fn d_keep_max_files() -> usize {
    20
}
