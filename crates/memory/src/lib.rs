//! `sa-memory` — long-term memory for the agent gateway.
//!
//! Extracted facts, preferences, decisions, and open questions are
//! persisted as local JSONL fact files plus a flat vector sidecar
//! ([`storage`]), retrieved through a hybrid lexical + vector search
//! with query transformation and reranking ([`search`]), and produced
//! by an LLM-driven extraction pass run at the end of each turn
//! ([`extractor`]).
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sa_memory::{MemorySearch, MemoryStorage};
//!
//! # async fn example(provider: Arc<dyn sa_providers::LlmProvider>) -> sa_domain::error::Result<()> {
//! let storage = Arc::new(MemoryStorage::open("./data/memory/facts", "./data/memory/index")?);
//! let search = MemorySearch::new(storage, provider, None, None, None);
//! let hits = search.search("what language does the user prefer", 5, 200, 0.4, 0.6).await?;
//! println!("found {} memories", hits.len());
//! # Ok(())
//! # }
//! ```

pub mod extractor;
pub mod query_transform;
pub mod reranker;
pub mod search;
pub mod storage;
pub mod types;

pub use extractor::MemoryExtractor;
pub use query_transform::QueryTransformer;
pub use reranker::MemoryReranker;
pub use search::MemorySearch;
pub use storage::{MemoryStorage, ScoredId};
pub use types::{Memory, MemoryExtractionResult, MemoryType};
