//! Hybrid memory search: query transformation, parallel lexical + vector
//! search per query variant, weighted merge, and a final rerank pass.

use std::collections::HashMap;
use std::sync::Arc;

use sa_domain::error::Result;
use sa_providers::LlmProvider;

use crate::query_transform::QueryTransformer;
use crate::reranker::MemoryReranker;
use crate::storage::{MemoryStorage, ScoredId};
use crate::types::Memory;

pub struct MemorySearch {
    storage: Arc<MemoryStorage>,
    query_transformer: QueryTransformer,
    reranker: MemoryReranker,
    provider: Arc<dyn LlmProvider>,
    embedding_model: Option<String>,
}

impl MemorySearch {
    pub fn new(
        storage: Arc<MemoryStorage>,
        provider: Arc<dyn LlmProvider>,
        query_transform_model: Option<String>,
        rerank_model: Option<String>,
        embedding_model: Option<String>,
    ) -> Self {
        Self {
            storage,
            query_transformer: QueryTransformer::new(provider.clone(), query_transform_model),
            reranker: MemoryReranker::new(provider.clone(), rerank_model),
            provider,
            embedding_model,
        }
    }

    /// Hybrid search with query transformation, returning up to `top_k`
    /// memories ranked by relevance.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        scan_limit: usize,
        lexical_weight: f64,
        vector_weight: f64,
    ) -> Result<Vec<Memory>> {
        let queries = self.query_transformer.transform(query, 2).await.unwrap_or_else(|_| vec![query.to_string()]);

        let mut lexical_hits = Vec::new();
        let mut vector_hits = Vec::new();

        for variant in &queries {
            lexical_hits.extend(self.storage.search_keywords(variant, scan_limit));

            let embedding = self
                .provider
                .embeddings(sa_providers::EmbeddingsRequest {
                    input: vec![variant.clone()],
                    model: self.embedding_model.clone(),
                })
                .await;
            if let Ok(resp) = embedding {
                if let Some(vector) = resp.embeddings.into_iter().next() {
                    vector_hits.extend(self.storage.search_vectors(&vector, scan_limit));
                }
            }
        }

        let merged = Self::merge_results(&lexical_hits, &vector_hits, lexical_weight, vector_weight);
        let top_candidates: Vec<&ScoredId> = merged.iter().take(top_k * 2).collect();

        let memory_ids: Vec<String> = top_candidates.iter().map(|c| c.memory_id.clone()).collect();
        let mut memories = self.storage.load_memories_by_ids(&memory_ids)?;

        let score_by_id: HashMap<&str, f64> =
            top_candidates.iter().map(|c| (c.memory_id.as_str(), c.score)).collect();
        memories.sort_by(|a, b| {
            let sa = score_by_id.get(a.id.as_str()).copied().unwrap_or(0.0);
            let sb = score_by_id.get(b.id.as_str()).copied().unwrap_or(0.0);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(self.reranker.rerank(query, memories, top_k).await)
    }

    /// Weighted merge of lexical and vector hits: lexical scores are
    /// normalized by the run's max score (vector scores are already in
    /// 0-1 via cosine similarity), then aggregated per memory_id by
    /// taking the max across query variants.
    fn merge_results(
        lexical_hits: &[ScoredId],
        vector_hits: &[ScoredId],
        lexical_weight: f64,
        vector_weight: f64,
    ) -> Vec<ScoredId> {
        #[derive(Default)]
        struct Accum {
            lexical: f64,
            vector: f64,
        }
        let mut scores: HashMap<String, Accum> = HashMap::new();

        let max_lexical = lexical_hits.iter().map(|h| h.score).fold(0.0_f64, f64::max);
        for hit in lexical_hits {
            let normalized = if max_lexical > 0.0 { hit.score / max_lexical } else { 0.0 };
            let entry = scores.entry(hit.memory_id.clone()).or_default();
            entry.lexical = entry.lexical.max(normalized);
        }

        for hit in vector_hits {
            let entry = scores.entry(hit.memory_id.clone()).or_default();
            entry.vector = entry.vector.max(hit.score);
        }

        let mut ranked: Vec<ScoredId> = scores
            .into_iter()
            .map(|(memory_id, accum)| ScoredId {
                memory_id,
                score: lexical_weight * accum.lexical + vector_weight * accum.vector,
            })
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_normalizes_lexical_by_max_and_weights_both_sides() {
        let lexical = vec![
            ScoredId { memory_id: "a".into(), score: 4.0 },
            ScoredId { memory_id: "b".into(), score: 2.0 },
        ];
        let vector = vec![
            ScoredId { memory_id: "a".into(), score: 0.5 },
            ScoredId { memory_id: "c".into(), score: 0.9 },
        ];

        let merged = MemorySearch::merge_results(&lexical, &vector, 0.4, 0.6);
        let a = merged.iter().find(|r| r.memory_id == "a").unwrap();
        // lexical normalized: 4/4=1.0, vector 0.5 -> 0.4*1.0 + 0.6*0.5 = 0.7
        assert!((a.score - 0.7).abs() < 1e-9);

        let c = merged.iter().find(|r| r.memory_id == "c").unwrap();
        // only vector hit: 0.4*0 + 0.6*0.9 = 0.54
        assert!((c.score - 0.54).abs() < 1e-9);
    }

    #[test]
    fn merge_handles_empty_lexical_side() {
        let vector = vec![ScoredId { memory_id: "a".into(), score: 0.8 }];
        let merged = MemorySearch::merge_results(&[], &vector, 0.4, 0.6);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].score - 0.48).abs() < 1e-9);
    }
}
