//! Session management for SerialAgent.
//!
//! Implements the OpenClaw `sessionKey` model: stable session routing from
//! inbound metadata, identity linking across channels, gateway-owned session
//! state with append-only transcripts, and configurable reset lifecycle.

pub mod compaction;
pub mod event_log;
pub mod identity;
pub mod lifecycle;
pub mod queue;
pub mod search;
pub mod session_key;
pub mod state_cache;
pub mod store;
pub mod transcript;

pub use compaction::{CompactionOutcome, SessionCompactor, Summarizer};
pub use event_log::{ArchiveRecord, EventLog};
pub use identity::IdentityResolver;
pub use lifecycle::LifecycleManager;
pub use queue::{QueuedRequest, SessionQueue};
pub use search::{SearchHit, TranscriptIndex};
pub use session_key::{compute_session_key, validate_metadata, SessionKeyValidation};
pub use state_cache::StateCache;
pub use store::{SessionEntry, SessionStore};
pub use transcript::TranscriptWriter;
