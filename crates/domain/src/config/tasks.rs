use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supervisor / run-lifecycle configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Thresholds the supervisor's maintenance cycle uses to reap stale runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// A `running` run whose `updated_at` is older than this is considered
    /// stale and is marked `done` by the supervisor.
    #[serde(default = "d_attach_window")]
    pub attach_window_s: u64,
    /// Completed run metadata older than this is reaped from the in-memory
    /// ring (the JSONL record on disk is untouched).
    #[serde(default = "d_auto_close")]
    pub auto_close_after_s: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            attach_window_s: d_attach_window(),
            auto_close_after_s: d_auto_close(),
        }
    }
}

fn d_attach_window() -> u64 {
    1800
}
fn d_auto_close() -> u64 {
    21_600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = TasksConfig::default();
        assert_eq!(cfg.attach_window_s, 1800);
        assert_eq!(cfg.auto_close_after_s, 21_600);
    }

    #[test]
    fn deserialize_missing_fields_uses_defaults() {
        let cfg: TasksConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.attach_window_s, 1800);
    }
}
