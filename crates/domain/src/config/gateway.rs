use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gateway frontend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Protocol version the `connect` handshake must match.
    #[serde(default = "d_protocol_version")]
    pub protocol_version: String,
    /// Default `historyLimit` when a client omits it, keyed by client type
    /// falling back to `"default"`.
    #[serde(default = "d_history_limit")]
    pub default_history_limit: usize,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Collapses raw per-channel peer ids (e.g. `telegram:123`) onto one
    /// canonical identity so the same person's DMs across channels share
    /// a session when desired.
    #[serde(default)]
    pub identity_links: Vec<IdentityLink>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            protocol_version: d_protocol_version(),
            default_history_limit: d_history_limit(),
            cors: CorsConfig::default(),
            identity_links: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityLink {
    pub canonical: String,
    pub peer_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_port() -> u16 {
    3336
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_protocol_version() -> String {
    "1".into()
}
fn d_history_limit() -> usize {
    20
}
fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".into(), "http://127.0.0.1:*".into()]
}
