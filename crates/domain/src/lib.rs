//! Shared domain types for the agent gateway: configuration, wire-adjacent
//! primitives (messages, tool calls, streaming events), and the structured
//! trace events every crate emits through `tracing`.

pub mod capability;
pub mod config;
pub mod error;
pub mod event;
pub mod session;
pub mod stream;
pub mod tool;
pub mod trace;

pub use capability::{LlmCapabilities, ToolSupport};
pub use config::Config;
pub use error::{Error, Result};
pub use event::{Event, MessageRole};
pub use session::{MessageTurn, RollingSummary, SessionState};
pub use stream::{BoxStream, StreamEvent, Usage};
pub use tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
pub use trace::TraceEvent;
