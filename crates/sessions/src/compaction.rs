//! Rolling compaction — collapses the older half of a session's
//! `recent_turns` into a structured summary once the context window fills
//! up, so the agent loop never has to replay unbounded history.
//!
//! Mirrors the trigger/algorithm split of the Python original's
//! `SessionCompactor` + `ConversationSummarizer`, generalized to write
//! through `StateCache`/`EventLog` instead of the original's single
//! session-store file.

use std::sync::Arc;

use serde::Deserialize;

use sa_domain::config::CompactionConfig;
use sa_domain::error::Result;
use sa_domain::event::Event;
use sa_domain::session::{MessageTurn, RollingSummary, SessionState};
use sa_domain::tool::Message;
use sa_memory::{Memory, MemoryExtractor, MemoryStorage};
use sa_providers::{ChatRequest, EmbeddingsRequest, LlmProvider};

use crate::event_log::EventLog;
use crate::state_cache::StateCache;

const SYSTEM_PROMPT: &str = r#"You are a conversation summarization system. Generate structured, mergeable summaries of conversations.

Your summaries should be:
1. Stable: use consistent format and categories
2. Cumulative: build on the previous summary, don't just summarize the new turns
3. Actionable: focus on information that will be useful in future conversations
4. Concise: each item should be clear and self-contained

Return a JSON object: {"user_profile": "...", "active_topics": ["..."], "decisions": ["..."], "open_questions": ["..."], "tool_context": "..."}"#;

#[derive(Deserialize, Default)]
struct SummaryPayload {
    #[serde(default)]
    user_profile: String,
    #[serde(default)]
    active_topics: Vec<String>,
    #[serde(default)]
    decisions: Vec<String>,
    #[serde(default)]
    open_questions: Vec<String>,
    #[serde(default)]
    tool_context: String,
}

impl From<SummaryPayload> for RollingSummary {
    fn from(p: SummaryPayload) -> Self {
        RollingSummary {
            user_profile: p.user_profile,
            active_topics: p.active_topics,
            decisions: p.decisions,
            open_questions: p.open_questions,
            tool_context: p.tool_context,
        }
    }
}

/// Result of a single compaction pass, carried into the `compaction` event.
pub struct CompactionOutcome {
    pub summary: RollingSummary,
    pub turns_summarized: usize,
    pub facts_extracted: usize,
}

/// Produces a structured `RollingSummary` for a block of turns via LLM,
/// folding it with the previous summary rather than replacing it wholesale.
pub struct Summarizer {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: Option<String>) -> Self {
        Self { provider, model }
    }

    /// Generate an updated summary from `turns`, building on `previous`.
    /// Falls back to returning `previous` unchanged if the LLM call fails
    /// or its response isn't valid JSON — compaction must never abort just
    /// because summarization failed.
    pub async fn generate_summary(&self, turns: &[MessageTurn], previous: &RollingSummary) -> RollingSummary {
        let prompt = self.build_prompt(turns, previous);

        let response = match self
            .provider
            .chat(ChatRequest {
                messages: vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
                temperature: Some(0.3),
                json_mode: true,
                model: self.model.clone(),
                ..Default::default()
            })
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "summary generation failed, keeping previous summary");
                return previous.clone();
            }
        };

        match serde_json::from_str::<SummaryPayload>(&response.content) {
            Ok(payload) => payload.into(),
            Err(e) => {
                tracing::warn!(error = %e, "summary response was not valid JSON, keeping previous summary");
                previous.clone()
            }
        }
    }

    fn build_prompt(&self, turns: &[MessageTurn], previous: &RollingSummary) -> String {
        let mut conversation = String::new();
        for turn in turns {
            conversation.push_str("User: ");
            conversation.push_str(&turn.user_message);
            conversation.push_str("\n\nAssistant: ");
            conversation.push_str(&turn.assistant_message);
            conversation.push_str("\n\n");
        }

        if previous.is_empty() {
            format!(
                "Create an initial summary of this conversation. Focus on lasting \
                 information worth remembering.\n\n## Conversation\n{conversation}\n\n\
                 Generate the summary as JSON."
            )
        } else {
            format!(
                "## Previous summary\n{}\n\n## Instructions\nUpdate the summary by \
                 integrating new information below. Keep what's still relevant, add \
                 new facts/topics/decisions, drop anything resolved or outdated.\n\n\
                 ## New conversation\n{conversation}\n\nGenerate the updated summary as JSON.",
                previous.to_text()
            )
        }
    }
}

/// Orchestrates the compaction algorithm end to end: trigger check, split,
/// summarize, best-effort memory extraction, state + event-log commit.
pub struct SessionCompactor {
    config: CompactionConfig,
    summarizer: Summarizer,
    extractor: Option<Arc<MemoryExtractor>>,
    memory: Option<Arc<MemoryStorage>>,
    embed_provider: Option<Arc<dyn LlmProvider>>,
    embedding_model: Option<String>,
}

impl SessionCompactor {
    pub fn new(
        config: CompactionConfig,
        summarizer: Summarizer,
        extractor: Option<Arc<MemoryExtractor>>,
        memory: Option<Arc<MemoryStorage>>,
        embed_provider: Option<Arc<dyn LlmProvider>>,
        embedding_model: Option<String>,
    ) -> Self {
        Self {
            config,
            summarizer,
            extractor,
            memory,
            embed_provider,
            embedding_model,
        }
    }

    pub fn should_compact(&self, state: &SessionState, context_window: usize) -> bool {
        self.config
            .should_trigger(state.token_count_estimate as f64, state.message_count as usize, context_window)
    }

    /// Best-effort extraction for a single freshly-committed turn, used by
    /// the agent loop's per-turn `auto_capture` path (outside compaction).
    /// Shares the extract-then-embed-then-save logic compaction uses for a
    /// whole block of turns at once.
    pub async fn extract_turn(&self, session_id: &str, turn: &MessageTurn) -> usize {
        self.extract_memories(session_id, std::slice::from_ref(turn)).await
    }

    /// Run compaction against `state`, persist the result to `state_cache`
    /// and append the `compaction` event to `event_log`. No-op (returns
    /// `None`) if there aren't enough turns to split.
    pub async fn compact(
        &self,
        session_id: &str,
        mut state: SessionState,
        state_cache: &StateCache,
        event_log: &EventLog,
    ) -> Result<Option<SessionState>> {
        let keep = self.config.keep_recent_turns;
        if state.recent_turns.len() <= keep {
            return Ok(None);
        }

        let split_at = state.recent_turns.len() - keep;
        let to_summarize: Vec<MessageTurn> = state.recent_turns.drain(..split_at).collect();

        let new_summary = self.summarizer.generate_summary(&to_summarize, &state.rolling_summary).await;

        let facts_extracted = self.extract_memories(session_id, &to_summarize).await;

        state.rolling_summary = new_summary.clone();
        state.last_compaction_ts = Some(chrono::Utc::now());
        state.token_count_estimate = state.estimate_tokens();
        state.updated_at = chrono::Utc::now();

        state_cache.save(&state)?;

        event_log.append(
            session_id,
            &Event::Compaction {
                timestamp: chrono::Utc::now(),
                summary: new_summary,
                facts_extracted,
            },
        )?;

        tracing::info!(
            session_id,
            turns_summarized = to_summarize.len(),
            facts_extracted,
            "session compacted"
        );

        Ok(Some(state))
    }

    async fn extract_memories(&self, session_id: &str, turns: &[MessageTurn]) -> usize {
        let (Some(extractor), Some(memory)) = (&self.extractor, &self.memory) else {
            return 0;
        };

        let mut extracted = 0;
        for turn in turns {
            if !MemoryExtractor::should_extract(&turn.user_message, &turn.assistant_message) {
                continue;
            }
            let result = match extractor
                .extract_from_turn(
                    &turn.user_message,
                    &turn.assistant_message,
                    session_id,
                    &turn.user_msg_id,
                    &turn.assistant_msg_id,
                )
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, session_id, "memory extraction failed during compaction, continuing");
                    continue;
                }
            };

            for mem in result.memories {
                if let Err(e) = self.save_with_embedding(memory, mem).await {
                    tracing::warn!(error = %e, session_id, "failed to persist extracted memory, continuing");
                    continue;
                }
                extracted += 1;
            }
        }
        extracted
    }

    async fn save_with_embedding(&self, storage: &Arc<MemoryStorage>, memory: Memory) -> Result<()> {
        let embedding = match &self.embed_provider {
            Some(provider) => {
                let resp = provider
                    .embeddings(EmbeddingsRequest {
                        input: vec![memory.content.clone()],
                        model: self.embedding_model.clone(),
                    })
                    .await?;
                resp.embeddings.into_iter().next().unwrap_or_default()
            }
            None => Vec::new(),
        };
        storage.save_memory(&memory, embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(i: usize) -> MessageTurn {
        MessageTurn {
            user_message: format!("msg {i}"),
            assistant_message: format!("reply {i}"),
            timestamp: chrono::Utc::now(),
            user_msg_id: format!("u{i}"),
            assistant_msg_id: format!("a{i}"),
            tool_calls: vec![],
            tool_results: vec![],
        }
    }

    #[test]
    fn should_compact_requires_both_threshold_and_turn_count() {
        let extractor: Option<Arc<MemoryExtractor>> = None;
        let memory: Option<Arc<MemoryStorage>> = None;
        let config = CompactionConfig::default();
        struct NoopProvider;
        #[async_trait::async_trait]
        impl LlmProvider for NoopProvider {
            async fn chat(&self, _req: ChatRequest) -> Result<sa_providers::ChatResponse> {
                unreachable!()
            }
            async fn chat_stream(
                &self,
                _req: ChatRequest,
            ) -> Result<sa_domain::stream::BoxStream<'static, Result<sa_domain::stream::StreamEvent>>> {
                unreachable!()
            }
            async fn embeddings(
                &self,
                _req: sa_providers::EmbeddingsRequest,
            ) -> Result<sa_providers::EmbeddingsResponse> {
                unreachable!()
            }
            fn capabilities(&self) -> &sa_domain::capability::LlmCapabilities {
                unreachable!()
            }
            fn provider_id(&self) -> &str {
                "noop"
            }
        }
        let summarizer = Summarizer::new(Arc::new(NoopProvider), None);
        let compactor = SessionCompactor::new(config, summarizer, extractor, memory, None, None);

        let mut state = SessionState::new("sess_1");
        for i in 0..45 {
            state.commit_turn(turn(i));
        }
        state.token_count_estimate = 1_000; // well below threshold
        assert!(!compactor.should_compact(&state, 128_000));

        state.token_count_estimate = 100_000; // above 0.6 * 128_000
        assert!(compactor.should_compact(&state, 128_000));
    }
}
