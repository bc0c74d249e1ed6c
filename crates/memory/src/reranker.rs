//! Reranks hybrid search candidates for relevance. Small candidate sets go
//! through an LLM pass; larger sets fall back to a fast heuristic so a
//! broad query doesn't spend a model call per search.

use std::sync::Arc;

use sa_domain::error::Result;
use sa_domain::tool::Message;
use sa_providers::{ChatRequest, LlmProvider};

use crate::types::Memory;

/// Above this candidate count, reranking uses the heuristic instead of an
/// LLM call — keeps tail-latency bounded on broad queries.
const LLM_RERANK_MAX_CANDIDATES: usize = 10;

pub struct MemoryReranker {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
}

impl MemoryReranker {
    pub fn new(provider: Arc<dyn LlmProvider>, model: Option<String>) -> Self {
        Self { provider, model }
    }

    pub async fn rerank(&self, query: &str, memories: Vec<Memory>, top_k: usize) -> Vec<Memory> {
        if memories.len() <= 1 {
            return memories;
        }

        let reranked = if memories.len() <= LLM_RERANK_MAX_CANDIDATES {
            match self.llm_rerank(query, &memories).await {
                Ok(order) => order,
                Err(e) => {
                    tracing::warn!(error = %e, "LLM rerank failed, keeping hybrid-search order");
                    memories
                }
            }
        } else {
            Self::heuristic_rerank(query, memories)
        };

        reranked.into_iter().take(top_k).collect()
    }

    async fn llm_rerank(&self, query: &str, memories: &[Memory]) -> Result<Vec<Memory>> {
        let listing: String = memories
            .iter()
            .enumerate()
            .map(|(i, m)| {
                format!(
                    "{}. [{:?}] {}\n   Context: {}\n   Tags: {}",
                    i + 1,
                    m.memory_type,
                    m.content,
                    m.context,
                    m.tags.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Given this query: \"{query}\"\n\n\
             Rank these memories by relevance to the query, most to least relevant.\n\n\
             Memories:\n{listing}\n\n\
             Return ONLY the numbers in order, comma-separated. Example: 3,1,5,2,4"
        );

        let response = self
            .provider
            .chat(ChatRequest {
                messages: vec![Message::user(prompt)],
                temperature: Some(0.1),
                max_tokens: Some(100),
                model: self.model.clone(),
                ..Default::default()
            })
            .await?;

        let mut order: Vec<usize> = response
            .content
            .trim()
            .split(',')
            .filter_map(|s| s.trim().parse::<usize>().ok())
            .filter_map(|n| n.checked_sub(1))
            .filter(|&i| i < memories.len())
            .collect();

        let mut seen = std::collections::HashSet::new();
        order.retain(|i| seen.insert(*i));

        let mut reranked: Vec<Memory> = order.iter().map(|&i| memories[i].clone()).collect();
        for (i, memory) in memories.iter().enumerate() {
            if !seen.contains(&i) {
                reranked.push(memory.clone());
            }
        }
        Ok(reranked)
    }

    fn heuristic_rerank(query: &str, memories: Vec<Memory>) -> Vec<Memory> {
        let query_terms: std::collections::HashSet<String> =
            query.split_whitespace().map(|w| w.to_lowercase()).collect();

        let mut scored: Vec<(f64, Memory)> = memories
            .into_iter()
            .map(|m| {
                let mut score = m.importance as f64 / 10.0;
                score += (m.content.len() as f64 / 250.0).min(0.2);
                let mem_tags: std::collections::HashSet<String> =
                    m.tags.iter().map(|t| t.to_lowercase()).collect();
                let overlap = query_terms.intersection(&mem_tags).count();
                score += overlap as f64 * 0.1;
                (score, m)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(_, m)| m).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryType;

    fn memory(id: &str, importance: u8, content_len: usize, tags: Vec<&str>) -> Memory {
        Memory {
            id: id.into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            session_id: "sess_1".into(),
            memory_type: MemoryType::Fact,
            content: "x".repeat(content_len),
            context: "".into(),
            importance,
            tags: tags.into_iter().map(String::from).collect(),
            source_messages: vec![],
            embedding: None,
            supersedes: None,
        }
    }

    #[test]
    fn heuristic_rerank_prefers_higher_importance() {
        let low = memory("mem_low", 2, 10, vec![]);
        let high = memory("mem_high", 9, 10, vec![]);
        let result = MemoryReranker::heuristic_rerank("anything", vec![low, high]);
        assert_eq!(result[0].id, "mem_high");
    }

    #[test]
    fn heuristic_rerank_boosts_tag_overlap() {
        let no_overlap = memory("mem_a", 5, 10, vec!["unrelated"]);
        let overlap = memory("mem_b", 5, 10, vec!["rust"]);
        let result = MemoryReranker::heuristic_rerank("rust question", vec![no_overlap, overlap]);
        assert_eq!(result[0].id, "mem_b");
    }
}
