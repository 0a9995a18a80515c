//! Conversation turns, sessions, and the context-window manager.
//!
//! The subtle contract here: the *in-prompt history* and the *memory
//! extraction queue* are the same list of turns, viewed from two ends.
//! [`ContextWindowManager::window`] returns the newest `W` unprocessed turns;
//! [`ContextWindowManager::overflow_batch`] returns the oldest excess ones for
//! the extractor to consume. See the module-level contract in `sleep.rs` for
//! how those batches turn into `LongTermMemory` entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::persisted_log::PersistedLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Text,
    Pulse,
    ReminderPulse,
    Telegram,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: u64,
    pub role: TurnRole,
    pub content: String,
    pub input_type: InputType,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_flag: bool,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Session {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self { id: Uuid::new_v4(), start_time: now, end_time: None }
    }
}

/// Persisted, monotonically ordered list of conversation turns plus the
/// overflow-extraction bookkeeping. One JSONL file holds the full turn log;
/// `overwrite` is used on every mutation (processed_flag flips are rare
/// relative to appends but must be crash-safe together with appends, so we
/// keep the whole list in memory and serialize it wholesale — the log is
/// bounded by the overflow trigger, never unbounded).
pub struct ContextWindowManager {
    log: PersistedLog<ConversationTurn>,
    turns: Vec<ConversationTurn>,
    next_id: u64,
    /// W — turns retained in the context window.
    pub window_size: usize,
    /// T — unprocessed-turn count that triggers extraction (T >= window_size).
    pub overflow_trigger: usize,
}

impl ContextWindowManager {
    pub fn new(path: impl Into<std::path::PathBuf>, window_size: usize, overflow_trigger: usize) -> Self {
        Self {
            log: PersistedLog::new(path),
            turns: Vec::new(),
            next_id: 1,
            window_size,
            overflow_trigger: overflow_trigger.max(window_size),
        }
    }

    /// Load turns from disk, purging any role=assistant/content=empty turns
    /// left behind by a prior crash (downstream LLM APIs reject empty
    /// assistant content, so these must never resurface in the window).
    pub fn load(&mut self) -> anyhow::Result<usize> {
        let mut turns = self.log.load()?;
        let before = turns.len();
        turns.retain(|t| !(matches!(t.role, TurnRole::Assistant) && t.content.trim().is_empty()));
        let purged = before - turns.len();
        self.next_id = turns.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        self.turns = turns;
        Ok(purged)
    }

    async fn persist(&self) -> anyhow::Result<()> {
        self.log.overwrite(&self.turns).await
    }

    /// Persist an inbound or outbound turn. Returns the assigned id.
    /// An empty-content assistant turn is refused (see purge rule above) —
    /// callers must only write an assistant turn when the loop produced
    /// non-empty accumulated text.
    pub async fn append(
        &mut self,
        role: TurnRole,
        content: impl Into<String>,
        input_type: InputType,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let content = content.into();
        if matches!(role, TurnRole::Assistant) && content.trim().is_empty() {
            anyhow::bail!("refusing to persist empty assistant turn");
        }
        let id = self.next_id;
        self.next_id += 1;
        self.turns.push(ConversationTurn {
            id,
            role,
            content,
            input_type,
            created_at: now,
            processed_flag: false,
            session_id,
        });
        self.persist().await?;
        Ok(id)
    }

    pub fn unprocessed_count(&self) -> usize {
        self.turns.iter().filter(|t| !t.processed_flag).count()
    }

    /// `context_window_get(limit)` — the last `min(limit, unprocessed_count)`
    /// unprocessed turns, oldest first (as a reader would scroll through them).
    pub fn window(&self, limit: usize) -> Vec<ConversationTurn> {
        let unprocessed: Vec<&ConversationTurn> = self.turns.iter().filter(|t| !t.processed_flag).collect();
        let take = limit.min(unprocessed.len());
        unprocessed[unprocessed.len() - take..].iter().map(|t| (*t).clone()).collect()
    }

    /// Whether an overflow extraction should run right now.
    pub fn should_extract(&self) -> bool {
        self.unprocessed_count() > self.overflow_trigger
    }

    /// The oldest `unprocessed_count - window_size` unprocessed turns — the
    /// block handed to the extractor. Does not mutate state; callers must
    /// call [`mark_processed`] with the same ids in the same transaction as
    /// persisting the resulting memories (see `sleep.rs`), so a crash
    /// mid-extraction cannot produce duplicate memories on restart.
    pub fn overflow_batch(&self) -> Vec<ConversationTurn> {
        if !self.should_extract() {
            return Vec::new();
        }
        let unprocessed: Vec<&ConversationTurn> = self.turns.iter().filter(|t| !t.processed_flag).collect();
        let excess = unprocessed.len() - self.window_size;
        unprocessed[..excess].iter().map(|t| (*t).clone()).collect()
    }

    /// Flip `processed_flag` for exactly the given ids (each turn transitions
    /// unprocessed -> processed exactly once) and persist atomically.
    pub async fn mark_processed(&mut self, ids: &[u64]) -> anyhow::Result<()> {
        let id_set: std::collections::HashSet<u64> = ids.iter().copied().collect();
        for turn in &mut self.turns {
            if id_set.contains(&turn.id) {
                turn.processed_flag = true;
            }
        }
        self.persist().await
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn last_turn_at(&self) -> Option<DateTime<Utc>> {
        self.turns.last().map(|t| t.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mgr(dir: &std::path::Path, w: usize, t: usize) -> ContextWindowManager {
        ContextWindowManager::new(dir.join("turns.jsonl"), w, t)
    }

    #[tokio::test]
    async fn window_returns_min_of_limit_and_unprocessed() {
        let dir = tempdir().unwrap();
        let mut m = mgr(dir.path(), 30, 45);
        let session = Uuid::new_v4();
        for i in 0..5 {
            m.append(TurnRole::User, format!("msg {i}"), InputType::Text, session, Utc::now())
                .await
                .unwrap();
        }
        assert_eq!(m.window(30).len(), 5);
        assert!(!m.should_extract());
    }

    #[tokio::test]
    async fn overflow_batch_and_mark_processed_restores_window_size() {
        let dir = tempdir().unwrap();
        let mut m = mgr(dir.path(), 30, 45);
        let session = Uuid::new_v4();
        for i in 0..46 {
            let role = if i % 2 == 0 { TurnRole::User } else { TurnRole::Assistant };
            m.append(role, format!("turn {i}"), InputType::Text, session, Utc::now())
                .await
                .unwrap();
        }
        assert!(m.should_extract());
        let batch = m.overflow_batch();
        assert_eq!(batch.len(), 16);
        let ids: Vec<u64> = batch.iter().map(|t| t.id).collect();
        m.mark_processed(&ids).await.unwrap();
        assert_eq!(m.unprocessed_count(), 30);
        assert!(!m.should_extract());
    }

    #[tokio::test]
    async fn empty_assistant_turn_refused() {
        let dir = tempdir().unwrap();
        let mut m = mgr(dir.path(), 30, 45);
        let session = Uuid::new_v4();
        let err = m.append(TurnRole::Assistant, "   ", InputType::Text, session, Utc::now()).await;
        assert!(err.is_err());
    }
}
