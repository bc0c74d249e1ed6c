use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compaction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compaction collapses old conversation history into a rolling summary so
/// the context window doesn't overflow after many turns.
///
/// Trigger: `token_count_estimate >= threshold * context_window` AND
/// `message_count >= min_turns`. Both conditions must hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Fraction of the model's context window at which `token_count_estimate`
    /// trips the trigger.
    #[serde(default = "d_threshold")]
    pub threshold: f64,
    /// Minimum `message_count` before compaction may fire at all.
    #[serde(default = "d_min_turns")]
    pub min_turns: usize,
    /// Number of most-recent turns kept verbatim after compaction.
    #[serde(default = "d_keep_recent_turns")]
    pub keep_recent_turns: usize,
    /// Context window (tokens) assumed when the active model doesn't report
    /// its own limit.
    #[serde(default = "d_context_window")]
    pub default_context_window: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold: d_threshold(),
            min_turns: d_min_turns(),
            keep_recent_turns: d_keep_recent_turns(),
            default_context_window: d_context_window(),
        }
    }
}

impl CompactionConfig {
    /// Absolute token-count threshold given a model's context window.
    pub fn token_threshold(&self, context_window: usize) -> f64 {
        self.threshold * context_window as f64
    }

    /// Whether compaction should trigger for the given state.
    pub fn should_trigger(&self, token_count_estimate: f64, message_count: usize, context_window: usize) -> bool {
        token_count_estimate >= self.token_threshold(context_window) && message_count >= self.min_turns
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Controls automatic memory capture — the always-on behaviour that
/// makes the agent feel alive across sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryLifecycleConfig {
    /// Automatically capture each turn to long-term memory.
    #[serde(default = "d_true")]
    pub auto_capture: bool,
    /// Ingest a session summary to memory when compaction runs.
    #[serde(default = "d_true")]
    pub capture_on_compaction: bool,
}

impl Default for MemoryLifecycleConfig {
    fn default() -> Self {
        Self {
            auto_capture: true,
            capture_on_compaction: true,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_threshold() -> f64 {
    0.6
}
fn d_min_turns() -> usize {
    40
}
fn d_keep_recent_turns() -> usize {
    30
}
fn d_context_window() -> usize {
    128_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_threshold_computed_from_window() {
        let cfg = CompactionConfig::default();
        assert!((cfg.token_threshold(100_000) - 60_000.0).abs() < 1e-9);
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = CompactionConfig::default();
        assert_eq!(cfg.keep_recent_turns, 30);
        assert_eq!(cfg.min_turns, 40);
    }

    #[test]
    fn should_trigger_requires_both_conditions() {
        let cfg = CompactionConfig::default();
        // token estimate high but not enough turns yet.
        assert!(!cfg.should_trigger(100_000.0, 10, 128_000));
        // enough turns but token estimate low.
        assert!(!cfg.should_trigger(1_000.0, 45, 128_000));
        // exactly at threshold on both axes fires.
        assert!(cfg.should_trigger(cfg.token_threshold(128_000), 40, 128_000));
    }
}
