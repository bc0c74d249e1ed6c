use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Long-term memory storage + retrieval
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Minimum `importance` an extracted memory must carry to be ingested.
    #[serde(default = "d_min_importance")]
    pub min_importance: u8,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    /// Cap on candidates scanned per vector search call.
    #[serde(default = "d_vector_scan_limit")]
    pub vector_scan_limit: usize,
    #[serde(default = "d_vector_top_k")]
    pub vector_top_k: usize,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Weight given to the lexical (BM25-style) score in the hybrid merge.
    #[serde(default = "d_lexical_weight")]
    pub lexical_weight: f64,
    /// Weight given to the vector (cosine) score in the hybrid merge.
    #[serde(default = "d_vector_weight")]
    pub vector_weight: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            min_importance: d_min_importance(),
            embeddings: EmbeddingsConfig::default(),
            vector_scan_limit: d_vector_scan_limit(),
            vector_top_k: d_vector_top_k(),
            retrieval: RetrievalConfig::default(),
            lexical_weight: d_lexical_weight(),
            vector_weight: d_vector_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_embedding_dim")]
    pub dim: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dim: d_embedding_dim(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "d_recent_turns_limit")]
    pub recent_turns_limit: usize,
    #[serde(default = "d_structured_limit")]
    pub structured_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            recent_turns_limit: d_recent_turns_limit(),
            structured_limit: d_structured_limit(),
        }
    }
}

fn d_min_importance() -> u8 {
    6
}
fn d_true() -> bool {
    true
}
fn d_embedding_dim() -> usize {
    1536
}
fn d_vector_scan_limit() -> usize {
    2000
}
fn d_vector_top_k() -> usize {
    50
}
fn d_recent_turns_limit() -> usize {
    8
}
fn d_structured_limit() -> usize {
    5
}
fn d_lexical_weight() -> f64 {
    0.4
}
fn d_vector_weight() -> f64 {
    0.6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = MemoryConfig::default();
        assert_eq!(cfg.min_importance, 6);
        assert_eq!(cfg.embeddings.dim, 1536);
        assert_eq!(cfg.vector_scan_limit, 2000);
        assert_eq!(cfg.vector_top_k, 50);
        assert_eq!(cfg.retrieval.recent_turns_limit, 8);
        assert_eq!(cfg.retrieval.structured_limit, 5);
        assert!((cfg.lexical_weight - 0.4).abs() < 1e-9);
        assert!((cfg.vector_weight - 0.6).abs() < 1e-9);
    }
}
