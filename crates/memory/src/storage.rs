//! Local memory storage: daily JSONL fact files plus a dual index —
//! an in-memory lexical (BM25-style) index and a flat vector index —
//! persisted as sidecar JSON files next to the facts.
//!
//! There is no embedded database here: everything is append-only JSONL
//! (source of truth) with two small derived indexes rebuilt from it at
//! startup, the same "plain files, derived caches" shape the session
//! store uses for transcripts.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use sa_domain::error::{Error, Result};

use crate::types::Memory;

/// A scored candidate produced by either side of the hybrid search —
/// mirrors the `{"memory_id": ..., "score": ...}` shape used to merge
/// lexical and vector hits before loading full records.
#[derive(Debug, Clone)]
pub struct ScoredId {
    pub memory_id: String,
    pub score: f64,
}

struct LexicalIndex {
    /// term -> { memory_id -> term frequency in that memory's search text }
    postings: HashMap<String, HashMap<String, usize>>,
    doc_lengths: HashMap<String, usize>,
    total_docs: usize,
    total_length: usize,
}

impl LexicalIndex {
    fn new() -> Self {
        Self {
            postings: HashMap::new(),
            doc_lengths: HashMap::new(),
            total_docs: 0,
            total_length: 0,
        }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect()
    }

    fn add(&mut self, memory_id: &str, text: &str) {
        let tokens = Self::tokenize(text);
        self.doc_lengths.insert(memory_id.to_string(), tokens.len());
        self.total_length += tokens.len();
        self.total_docs += 1;
        for token in tokens {
            *self
                .postings
                .entry(token)
                .or_default()
                .entry(memory_id.to_string())
                .or_insert(0) += 1;
        }
    }

    fn avg_doc_length(&self) -> f64 {
        if self.total_docs == 0 {
            0.0
        } else {
            self.total_length as f64 / self.total_docs as f64
        }
    }

    /// BM25 scoring (k1=1.2, b=0.75) over the query's terms.
    fn search(&self, query: &str, limit: usize) -> Vec<ScoredId> {
        const K1: f64 = 1.2;
        const B: f64 = 0.75;

        let terms = Self::tokenize(query);
        let avg_len = self.avg_doc_length();
        let mut scores: HashMap<String, f64> = HashMap::new();

        for term in &terms {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let doc_freq = postings.len() as f64;
            let idf = ((self.total_docs as f64 - doc_freq + 0.5) / (doc_freq + 0.5) + 1.0).ln();
            for (memory_id, &tf) in postings {
                let doc_len = *self.doc_lengths.get(memory_id).unwrap_or(&0) as f64;
                let tf = tf as f64;
                let denom = tf + K1 * (1.0 - B + B * doc_len / avg_len.max(1.0));
                let score = idf * (tf * (K1 + 1.0)) / denom.max(1e-9);
                *scores.entry(memory_id.clone()).or_insert(0.0) += score;
            }
        }

        let mut ranked: Vec<ScoredId> = scores
            .into_iter()
            .map(|(memory_id, score)| ScoredId { memory_id, score })
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        ranked
    }
}

#[derive(Default, serde::Serialize, serde::Deserialize)]
struct VectorMetadata {
    memory_ids: Vec<String>,
}

struct VectorIndex {
    vectors: Vec<Vec<f32>>,
    metadata: VectorMetadata,
}

impl VectorIndex {
    fn new() -> Self {
        Self {
            vectors: Vec::new(),
            metadata: VectorMetadata::default(),
        }
    }

    fn add(&mut self, memory_id: &str, embedding: Vec<f32>) {
        self.vectors.push(embedding);
        self.metadata.memory_ids.push(memory_id.to_string());
    }

    fn search(&self, query: &[f32], limit: usize) -> Vec<ScoredId> {
        fn cosine(a: &[f32], b: &[f32]) -> f64 {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a <= 1e-10 || norm_b <= 1e-10 {
                0.0
            } else {
                (dot / (norm_a * norm_b)) as f64
            }
        }

        let mut ranked: Vec<ScoredId> = self
            .vectors
            .iter()
            .zip(&self.metadata.memory_ids)
            .map(|(vector, memory_id)| ScoredId {
                memory_id: memory_id.clone(),
                score: cosine(query, vector),
            })
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        ranked
    }
}

/// Storage for one account/workspace's long-term memory.
pub struct MemoryStorage {
    facts_dir: PathBuf,
    index_dir: PathBuf,
    lexical: RwLock<LexicalIndex>,
    vectors: RwLock<VectorIndex>,
}

impl MemoryStorage {
    /// Open storage rooted at `facts_dir`/`index_dir`, rebuilding both
    /// indexes from the JSONL files and the vector sidecar on disk.
    pub fn open(facts_dir: impl Into<PathBuf>, index_dir: impl Into<PathBuf>) -> Result<Self> {
        let facts_dir = facts_dir.into();
        let index_dir = index_dir.into();
        std::fs::create_dir_all(&facts_dir)?;
        std::fs::create_dir_all(&index_dir)?;

        let mut lexical = LexicalIndex::new();
        let mut vectors = VectorIndex::new();

        for memory in Self::scan_all(&facts_dir)? {
            lexical.add(&memory.id, &memory.to_search_text());
        }

        let vectors_path = index_dir.join("vectors.json");
        if let Ok(content) = std::fs::read_to_string(&vectors_path) {
            if let Ok(stored) = serde_json::from_str::<StoredVectors>(&content) {
                vectors.metadata.memory_ids = stored.memory_ids;
                vectors.vectors = stored.vectors;
            }
        }

        Ok(Self {
            facts_dir,
            index_dir,
            lexical: RwLock::new(lexical),
            vectors: RwLock::new(vectors),
        })
    }

    fn daily_file(&self, today: &str) -> PathBuf {
        self.facts_dir.join(format!("{today}.jsonl"))
    }

    /// Append a memory to today's JSONL file and index it in both the
    /// lexical and vector indexes. `embedding` is generated by the caller
    /// (via an `LlmProvider`) before calling this — storage itself has no
    /// embedding dependency.
    pub fn save_memory(&self, memory: &Memory, embedding: Vec<f32>) -> Result<()> {
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let path = self.daily_file(&today);
        let line = serde_json::to_string(memory)?;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{line}")?;

        self.lexical.write().add(&memory.id, &memory.to_search_text());
        self.vectors.write().add(&memory.id, embedding);
        self.persist_vectors()?;
        Ok(())
    }

    fn persist_vectors(&self) -> Result<()> {
        let vectors = self.vectors.read();
        let stored = StoredVectors {
            memory_ids: vectors.metadata.memory_ids.clone(),
            vectors: vectors.vectors.clone(),
        };
        let path = self.index_dir.join("vectors.json");
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(&stored)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn search_keywords(&self, query: &str, limit: usize) -> Vec<ScoredId> {
        self.lexical.read().search(query, limit)
    }

    pub fn search_vectors(&self, query_embedding: &[f32], limit: usize) -> Vec<ScoredId> {
        self.vectors.read().search(query_embedding, limit)
    }

    /// Load a memory by ID, scanning the JSONL files. This is O(n) in the
    /// number of stored memories — fine at this scale since it only runs
    /// on the handful of candidates survivng the hybrid merge, never on
    /// every search.
    pub fn load_memory_by_id(&self, memory_id: &str) -> Result<Option<Memory>> {
        for memory in Self::scan_all(&self.facts_dir)? {
            if memory.id == memory_id {
                return Ok(Some(memory));
            }
        }
        Ok(None)
    }

    pub fn load_memories_by_ids(&self, memory_ids: &[String]) -> Result<Vec<Memory>> {
        let all: HashMap<String, Memory> = Self::scan_all(&self.facts_dir)?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();
        Ok(memory_ids.iter().filter_map(|id| all.get(id).cloned()).collect())
    }

    fn scan_all(facts_dir: &Path) -> Result<Vec<Memory>> {
        let mut memories = Vec::new();
        let entries = match std::fs::read_dir(facts_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(memories),
            Err(e) => return Err(Error::Io(e)),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            for line in content.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                if let Ok(memory) = serde_json::from_str::<Memory>(line) {
                    memories.push(memory);
                }
            }
        }
        Ok(memories)
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct StoredVectors {
    memory_ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryType;

    fn sample_memory(id: &str, content: &str) -> Memory {
        Memory {
            id: id.into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            session_id: "sess_1".into(),
            memory_type: MemoryType::Fact,
            content: content.into(),
            context: "".into(),
            importance: 7,
            tags: vec![],
            source_messages: vec![],
            embedding: None,
            supersedes: None,
        }
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MemoryStorage::open(dir.path().join("facts"), dir.path().join("index")).unwrap();
        let mem = sample_memory("mem_1", "user prefers Rust over Go");
        storage.save_memory(&mem, vec![1.0, 0.0, 0.0]).unwrap();

        let loaded = storage.load_memory_by_id("mem_1").unwrap().unwrap();
        assert_eq!(loaded.content, "user prefers Rust over Go");
    }

    #[test]
    fn keyword_search_finds_matching_term() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MemoryStorage::open(dir.path().join("facts"), dir.path().join("index")).unwrap();
        storage.save_memory(&sample_memory("mem_1", "user prefers Rust"), vec![1.0, 0.0]).unwrap();
        storage.save_memory(&sample_memory("mem_2", "user dislikes Java"), vec![0.0, 1.0]).unwrap();

        let hits = storage.search_keywords("rust", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory_id, "mem_1");
    }

    #[test]
    fn vector_search_ranks_closest_first() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MemoryStorage::open(dir.path().join("facts"), dir.path().join("index")).unwrap();
        storage.save_memory(&sample_memory("mem_1", "a"), vec![1.0, 0.0, 0.0]).unwrap();
        storage.save_memory(&sample_memory("mem_2", "b"), vec![0.0, 1.0, 0.0]).unwrap();

        let hits = storage.search_vectors(&[0.9, 0.1, 0.0], 10);
        assert_eq!(hits[0].memory_id, "mem_1");
    }

    #[test]
    fn reopening_storage_rebuilds_index_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = MemoryStorage::open(dir.path().join("facts"), dir.path().join("index")).unwrap();
            storage.save_memory(&sample_memory("mem_1", "persisted fact"), vec![1.0, 0.0]).unwrap();
        }
        let reopened = MemoryStorage::open(dir.path().join("facts"), dir.path().join("index")).unwrap();
        assert!(reopened.load_memory_by_id("mem_1").unwrap().is_some());
        assert_eq!(reopened.search_vectors(&[1.0, 0.0], 10)[0].memory_id, "mem_1");
    }
}
