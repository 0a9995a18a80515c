//! The vector-indexed long-term memory store — distinct from the companion
//! tiered `MemoryEntry` (`schema.rs`) used for the chat-prompt identity
//! layer. This is the extraction target described by the windowed-extraction
//! invariant: turns age out of the context window and are distilled here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::persisted_log::PersistedLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LongTermMemoryType {
    Episodic,
    Factual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongTermMemory {
    pub id: Uuid,
    pub content: String,
    pub memory_type: LongTermMemoryType,
    pub memory_category: String,
    /// [0, 1]
    pub importance: f32,
    pub created_at: DateTime<Utc>,
    /// Timestamp of the turn that produced this memory (not `created_at`,
    /// which is extraction time).
    pub source_timestamp: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub embedding: Vec<f32>,
    /// Count of retrievals in the current retrieval-warmth window; reset
    /// periodically by the caller. Not part of the public contract, just
    /// bookkeeping for the warmth boost.
    #[serde(default)]
    pub retrieval_count: u32,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub memory: LongTermMemory,
    pub semantic_score: f32,
    pub importance_score: f32,
    pub freshness_score: f32,
    pub combined_score: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub semantic: f32,
    pub importance: f32,
    pub freshness: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { semantic: 0.55, importance: 0.25, freshness: 0.20 }
    }
}

pub struct LongTermMemoryStore {
    log: PersistedLog<LongTermMemory>,
    memories: Vec<LongTermMemory>,
    pub weights: ScoreWeights,
}

impl LongTermMemoryStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { log: PersistedLog::new(path), memories: Vec::new(), weights: ScoreWeights::default() }
    }

    pub fn load(&mut self) -> anyhow::Result<()> {
        self.memories = self.log.load()?;
        Ok(())
    }

    pub async fn insert(&mut self, memory: LongTermMemory) -> anyhow::Result<()> {
        self.log.append(&memory).await?;
        self.memories.push(memory);
        Ok(())
    }

    pub fn all(&self) -> &[LongTermMemory] {
        &self.memories
    }

    pub fn get(&self, id: Uuid) -> Option<&LongTermMemory> {
        self.memories.iter().find(|m| m.id == id)
    }

    /// `search(query_text, k)` — combined score is
    /// `w_s·semantic + w_i·importance + w_f·freshness`, plus an additive
    /// warmth boost from recent-retrieval counts (`retrieval_count`) and an
    /// optional same-turn topic warmth supplied by the caller (e.g. active
    /// thoughts that mention the same category). Every returned memory's
    /// `last_accessed_at` is bumped, and on-disk state is flushed so the
    /// boost/timestamp survive a crash.
    pub async fn search(
        &mut self,
        query_embedding: Option<&[f32]>,
        k: usize,
        now: DateTime<Utc>,
        topic_warmth: impl Fn(&LongTermMemory) -> f32,
    ) -> Vec<SearchHit> {
        let weights = self.weights;
        let mut scored: Vec<(usize, SearchHit)> = self
            .memories
            .iter()
            .enumerate()
            .map(|(idx, m)| {
                let semantic_score = query_embedding
                    .map(|q| cosine_similarity(q, &m.embedding))
                    .unwrap_or(0.0);
                let importance_score = m.importance.clamp(0.0, 1.0);
                let freshness_score = freshness(now, m.last_accessed_at.unwrap_or(m.created_at));
                let retrieval_warmth = (m.retrieval_count as f32 / 10.0).min(0.15);
                let warmth = retrieval_warmth + topic_warmth(m).clamp(0.0, 0.15);
                let combined_score = weights.semantic * semantic_score
                    + weights.importance * importance_score
                    + weights.freshness * freshness_score
                    + warmth;
                (
                    idx,
                    SearchHit {
                        memory: m.clone(),
                        semantic_score,
                        importance_score,
                        freshness_score,
                        combined_score,
                    },
                )
            })
            .collect();

        scored.sort_by(|(_, a), (_, b)| b.combined_score.total_cmp(&a.combined_score));
        scored.truncate(k);

        for (idx, _) in &scored {
            self.memories[*idx].last_accessed_at = Some(now);
            self.memories[*idx].retrieval_count = self.memories[*idx].retrieval_count.saturating_add(1);
        }
        let _ = self.log.overwrite(&self.memories).await;

        scored.into_iter().map(|(_, hit)| hit).collect()
    }
}

/// Same-turn topic-warmth signal: fraction of the current turn's significant
/// tokens (alphanumeric words, 4+ chars) that also appear in a memory's
/// content. Callers pass this as `search`'s `topic_warmth` closure; `search`
/// clamps the result into the warmth boost's [0, 0.15] budget.
pub fn topic_warmth_score(turn_text: &str, memory_content: &str) -> f32 {
    let turn_tokens = significant_tokens(turn_text);
    if turn_tokens.is_empty() {
        return 0.0;
    }
    let content_tokens = significant_tokens(memory_content);
    let overlap = turn_tokens.intersection(&content_tokens).count();
    overlap as f32 / turn_tokens.len() as f32
}

fn significant_tokens(text: &str) -> std::collections::HashSet<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| word.len() >= 4)
        .map(|word| word.to_lowercase())
        .collect()
}

fn freshness(now: DateTime<Utc>, ts: DateTime<Utc>) -> f32 {
    let days = (now - ts).num_hours().max(0) as f32 / 24.0;
    (1.0 / (1.0 + days)).clamp(0.0, 1.0)
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mem(content: &str, importance: f32, embedding: Vec<f32>) -> LongTermMemory {
        LongTermMemory {
            id: Uuid::new_v4(),
            content: content.to_string(),
            memory_type: LongTermMemoryType::Episodic,
            memory_category: "general".to_string(),
            importance,
            created_at: Utc::now(),
            source_timestamp: Utc::now(),
            last_accessed_at: None,
            embedding,
            retrieval_count: 0,
        }
    }

    #[tokio::test]
    async fn exact_content_match_ranks_first() {
        let dir = tempdir().unwrap();
        let mut store = LongTermMemoryStore::new(dir.path().join("ltm.jsonl"));
        store.insert(mem("the user loves rust", 0.5, vec![1.0, 0.0, 0.0])).await.unwrap();
        store.insert(mem("unrelated content", 0.9, vec![0.0, 1.0, 0.0])).await.unwrap();

        let hits = store.search(Some(&[1.0, 0.0, 0.0]), 2, Utc::now(), |_| 0.0).await;
        assert_eq!(hits[0].memory.content, "the user loves rust");
    }

    #[tokio::test]
    async fn topic_warmth_boosts_on_same_turn_overlap() {
        let dir = tempdir().unwrap();
        let mut store = LongTermMemoryStore::new(dir.path().join("ltm.jsonl"));
        store.insert(mem("prefers dark roast coffee", 0.5, vec![])).await.unwrap();
        store.insert(mem("enjoys long hiking trips", 0.5, vec![])).await.unwrap();

        let hits = store
            .search(None, 2, Utc::now(), |m| topic_warmth_score("what coffee roast do I like", &m.content))
            .await;
        assert_eq!(hits[0].memory.content, "prefers dark roast coffee");
    }

    #[tokio::test]
    async fn search_bumps_last_accessed() {
        let dir = tempdir().unwrap();
        let mut store = LongTermMemoryStore::new(dir.path().join("ltm.jsonl"));
        let id = {
            let m = mem("x", 0.5, vec![1.0]);
            let id = m.id;
            store.insert(m).await.unwrap();
            id
        };
        assert!(store.get(id).unwrap().last_accessed_at.is_none());
        store.search(Some(&[1.0]), 1, Utc::now(), |_| 0.0).await;
        assert!(store.get(id).unwrap().last_accessed_at.is_some());
    }
}
