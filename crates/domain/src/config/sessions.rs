use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session routing + reset lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "d_agent_id")]
    pub agent_id: String,
    #[serde(default)]
    pub dm_scope: DmScope,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            agent_id: d_agent_id(),
            dm_scope: DmScope::default(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

fn d_agent_id() -> String {
    "default".into()
}

/// How direct-message session keys are scoped. See
/// `sa_sessions::session_key::compute_session_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmScope {
    /// One session per agent for all direct messages, regardless of peer.
    Main,
    /// One session per peer, shared across channels.
    PerPeer,
    /// One session per (channel, peer) pair.
    PerChannelPeer,
    /// One session per (channel, account, peer) triple.
    PerAccountChannelPeer,
}

impl Default for DmScope {
    fn default() -> Self {
        Self::PerChannelPeer
    }
}

/// Metadata carried by an inbound message, used to compute its session key
/// and to evaluate whether the session it resolves to should be reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundMetadata {
    pub channel: Option<String>,
    pub account_id: Option<String>,
    pub peer_id: Option<String>,
    #[serde(default)]
    pub is_direct: bool,
    pub group_id: Option<String>,
    pub channel_id: Option<String>,
    pub thread_id: Option<String>,
}

/// Per-type or per-channel override of the global reset thresholds. A `None`
/// field falls back to the next-broader scope rather than disabling the
/// threshold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetOverride {
    pub daily_reset_hour: Option<u8>,
    pub idle_minutes: Option<u32>,
}

/// Controls when `sa_sessions::lifecycle::LifecycleManager` mints a fresh
/// session id for an existing session key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// UTC hour (0-23) at which a session is reset once crossed. `None`
    /// disables daily reset.
    #[serde(default)]
    pub daily_reset_hour: Option<u8>,
    /// Reset after this many minutes of inactivity. `None` disables idle
    /// timeout.
    #[serde(default)]
    pub idle_minutes: Option<u32>,
    /// Overrides keyed by message type (`"direct"`, `"group"`, `"thread"`).
    #[serde(default)]
    pub reset_by_type: HashMap<String, ResetOverride>,
    /// Overrides keyed by channel name, applied after `reset_by_type`.
    #[serde(default)]
    pub reset_by_channel: HashMap<String, ResetOverride>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            daily_reset_hour: None,
            idle_minutes: Some(720),
            reset_by_type: HashMap::new(),
            reset_by_channel: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = SessionsConfig::default();
        assert_eq!(cfg.agent_id, "default");
        assert_eq!(cfg.dm_scope, DmScope::PerChannelPeer);
        assert_eq!(cfg.lifecycle.idle_minutes, Some(720));
    }

    #[test]
    fn deserialize_missing_fields_uses_defaults() {
        let cfg: SessionsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.agent_id, "default");
    }

    #[test]
    fn dm_scope_roundtrips_as_snake_case() {
        let s = serde_json::to_string(&DmScope::PerAccountChannelPeer).unwrap();
        assert_eq!(s, "\"per_account_channel_peer\"");
    }
}
