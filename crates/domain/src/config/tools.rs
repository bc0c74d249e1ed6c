use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools (exec / process) + permission policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for the built-in exec/process tool executors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub exec_security: ExecSecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Hard timeout for a shell tool invocation (seconds).
    #[serde(default = "d_60")]
    pub timeout_sec: u64,
    /// Max output chars kept per invocation before truncation.
    #[serde(default = "d_200000")]
    pub max_output_chars: usize,
    /// Default foreground wait before auto-backgrounding, when the caller
    /// doesn't specify `yield_ms`.
    #[serde(default = "d_3000")]
    pub background_ms: u64,
    /// A finished background process is dropped from the registry once it
    /// has been idle this long.
    #[serde(default = "d_cleanup_ms")]
    pub cleanup_ms: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_sec: 60,
            max_output_chars: 200_000,
            background_ms: 3_000,
            cleanup_ms: d_cleanup_ms(),
        }
    }
}

/// Security configuration for the exec tool — audit logging and command denylist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecSecurityConfig {
    #[serde(default = "d_true")]
    pub audit_log: bool,
    /// Regex patterns that are denied outright, ahead of policy evaluation.
    #[serde(default = "d_denied_patterns")]
    pub denied_patterns: Vec<String>,
}

impl Default for ExecSecurityConfig {
    fn default() -> Self {
        Self {
            audit_log: true,
            denied_patterns: d_denied_patterns(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Permission policy — {allow, ask, deny} glob patterns over capabilities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "d_allow_patterns")]
    pub allow: Vec<String>,
    #[serde(default = "d_ask_patterns")]
    pub ask: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    /// How long a permission ask waits for a client decision before
    /// resolving to `deny` with reason `timeout`.
    #[serde(default = "d_300")]
    pub ask_timeout_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allow: d_allow_patterns(),
            ask: d_ask_patterns(),
            deny: Vec::new(),
            ask_timeout_secs: 300,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_60() -> u64 {
    60
}
fn d_3000() -> u64 {
    3_000
}
fn d_cleanup_ms() -> u64 {
    600_000
}
fn d_200000() -> usize {
    200_000
}
fn d_true() -> bool {
    true
}
fn d_300() -> u64 {
    300
}
fn d_denied_patterns() -> Vec<String> {
    vec![
        r"rm\s+-rf\s+/".into(),
        r"mkfs\.".into(),
        r"dd\s+if=.+of=/dev/".into(),
    ]
}
fn d_allow_patterns() -> Vec<String> {
    vec!["filesystem.read".into(), "filesystem.list".into()]
}
fn d_ask_patterns() -> Vec<String> {
    vec![
        "shell.run".into(),
        "filesystem.write".into(),
        "web.*".into(),
        "git.*".into(),
    ]
}
