//! Permission policy: maps a tool capability string (e.g. `"shell.run"`,
//! `"web.fetch"`) to an allow/ask/deny decision via glob patterns, with
//! deny taking priority over ask taking priority over allow.

use regex::Regex;

use sa_domain::config::PolicyConfig;

/// The outcome of evaluating a capability against the configured patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Run without asking the client.
    Allow,
    /// Prompt the client for a one-time approval before running.
    Ask,
    /// Refuse outright; never sent to the client.
    Deny,
}

impl PolicyDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyDecision::Allow => "allow",
            PolicyDecision::Ask => "ask",
            PolicyDecision::Deny => "deny",
        }
    }
}

struct CompiledPattern {
    source: String,
    regex: Regex,
}

/// Evaluates tool capabilities against the configured allow/ask/deny glob
/// lists. Patterns are simple shell globs (`*` / `?`) compiled once up front.
pub struct ToolPolicy {
    allow: Vec<CompiledPattern>,
    ask: Vec<CompiledPattern>,
    deny: Vec<CompiledPattern>,
}

impl ToolPolicy {
    pub fn from_config(cfg: &PolicyConfig) -> Self {
        let compile = |patterns: &[String]| -> Vec<CompiledPattern> {
            patterns
                .iter()
                .filter_map(|p| glob_to_regex(p).map(|regex| CompiledPattern { source: p.clone(), regex }))
                .collect()
        };
        Self {
            allow: compile(&cfg.allow),
            ask: compile(&cfg.ask),
            deny: compile(&cfg.deny),
        }
    }

    /// Decide how `capability` should be handled. Unmatched capabilities
    /// default to `ask` — an unrecognized tool is never silently allowed.
    pub fn check(&self, capability: &str) -> (PolicyDecision, Option<&str>) {
        if let Some(m) = self.deny.iter().find(|p| p.regex.is_match(capability)) {
            return (PolicyDecision::Deny, Some(m.source.as_str()));
        }
        if let Some(m) = self.ask.iter().find(|p| p.regex.is_match(capability)) {
            return (PolicyDecision::Ask, Some(m.source.as_str()));
        }
        if let Some(m) = self.allow.iter().find(|p| p.regex.is_match(capability)) {
            return (PolicyDecision::Allow, Some(m.source.as_str()));
        }
        (PolicyDecision::Ask, None)
    }
}

/// Convert a simple shell glob pattern to a [`Regex`]. Only `*` (match
/// anything, including `.`) and `?` (match one char) are supported —
/// matches Python `fnmatch` semantics for the capability strings this
/// system uses (`"web.*"`, `"git.*"`, …).
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_with(allow: &[&str], ask: &[&str], deny: &[&str]) -> ToolPolicy {
        ToolPolicy::from_config(&PolicyConfig {
            allow: allow.iter().map(|s| s.to_string()).collect(),
            ask: ask.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
            ask_timeout_secs: 300,
        })
    }

    #[test]
    fn deny_beats_allow_for_same_pattern() {
        let p = policy_with(&["shell.run"], &[], &["shell.run"]);
        assert_eq!(p.check("shell.run").0, PolicyDecision::Deny);
    }

    #[test]
    fn deny_beats_ask() {
        let p = policy_with(&[], &["shell.*"], &["shell.run"]);
        assert_eq!(p.check("shell.run").0, PolicyDecision::Deny);
        assert_eq!(p.check("shell.inspect").0, PolicyDecision::Ask);
    }

    #[test]
    fn wildcard_prefix_matches_dotted_capability() {
        let p = policy_with(&[], &["web.*"], &[]);
        assert_eq!(p.check("web.fetch").0, PolicyDecision::Ask);
    }

    #[test]
    fn exact_allow_match() {
        let p = policy_with(&["filesystem.read"], &[], &[]);
        assert_eq!(p.check("filesystem.read").0, PolicyDecision::Allow);
    }

    #[test]
    fn unknown_capability_defaults_to_ask() {
        let p = policy_with(&["filesystem.read"], &[], &[]);
        let (decision, matched) = p.check("network.connect");
        assert_eq!(decision, PolicyDecision::Ask);
        assert!(matched.is_none());
    }

    #[test]
    fn default_config_matches_python_original_defaults() {
        let p = ToolPolicy::from_config(&PolicyConfig::default());
        assert_eq!(p.check("filesystem.read").0, PolicyDecision::Allow);
        assert_eq!(p.check("filesystem.list").0, PolicyDecision::Allow);
        assert_eq!(p.check("shell.run").0, PolicyDecision::Ask);
        assert_eq!(p.check("git.commit").0, PolicyDecision::Ask);
        assert_eq!(p.check("unrecognized.capability").0, PolicyDecision::Ask);
    }
}
