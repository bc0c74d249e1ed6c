/// Shared error type used across all gateway crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    /// A frame referenced a `session_id` the gateway has no record of.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A client sent a malformed or out-of-sequence protocol frame.
    #[error("protocol: {0}")]
    Protocol(String),

    /// A tool invocation was denied by the permission policy.
    #[error("policy denied: {0}")]
    Policy(String),

    /// A tool call named a tool absent from the registry.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// A tool call was missing required arguments.
    #[error("tool \"{tool}\" missing required arguments: {}", .missing.join(", "))]
    MissingArgs { tool: String, missing: Vec<String> },

    /// A registered tool's executor failed.
    #[error("tool \"{tool}\" failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Maps an error to the stable `code` string sent on the wire in an
    /// `error` event/response, independent of the `Display` message.
    pub fn as_wire_code(&self) -> &'static str {
        match self {
            Error::Io(_) => "io_error",
            Error::Json(_) => "invalid_json",
            Error::Http(_) => "upstream_error",
            Error::Timeout(_) => "timeout",
            Error::Provider { .. } => "provider_error",
            Error::Config(_) => "config_error",
            Error::Auth(_) => "auth_error",
            Error::SessionNotFound(_) => "session_not_found",
            Error::Protocol(_) => "protocol_error",
            Error::Policy(_) => "policy_denied",
            Error::UnknownTool(_) => "unknown_tool",
            Error::MissingArgs { .. } => "missing_args",
            Error::ToolExecution { .. } => "tool_error",
            Error::Other(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_code_stable_for_session_not_found() {
        let err = Error::SessionNotFound("sess_123".into());
        assert_eq!(err.as_wire_code(), "session_not_found");
    }

    #[test]
    fn wire_code_stable_for_policy_denied() {
        let err = Error::Policy("shell.run denied by policy".into());
        assert_eq!(err.as_wire_code(), "policy_denied");
    }
}
