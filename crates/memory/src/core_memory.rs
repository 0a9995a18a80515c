//! Core memory — unconditionally injected into every system prompt.
//!
//! Distinct from `schema::MemoryTier::Core`, which feeds the companion-style
//! identity prompt block used by the legacy `respond_and_remember` path.
//! This is the spec's narrower notion: a small, operator/agent-curated set
//! of durable facts, one of five categories, optionally tracing back to a
//! promoted long-term memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::persisted_log::PersistedLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreMemoryCategory {
    Narrative,
    Identity,
    Relationship,
    Preference,
    Fact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreMemory {
    pub id: Uuid,
    pub content: String,
    pub category: CoreMemoryCategory,
    pub created_at: DateTime<Utc>,
    pub promoted_from_memory_id: Option<Uuid>,
}

pub struct CoreMemoryStore {
    log: PersistedLog<CoreMemory>,
    entries: Vec<CoreMemory>,
}

impl CoreMemoryStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { log: PersistedLog::new(path), entries: Vec::new() }
    }

    pub fn load(&mut self) -> anyhow::Result<()> {
        self.entries = self.log.load()?;
        Ok(())
    }

    pub async fn store(
        &mut self,
        content: impl Into<String>,
        category: CoreMemoryCategory,
        promoted_from_memory_id: Option<Uuid>,
    ) -> anyhow::Result<Uuid> {
        let entry = CoreMemory {
            id: Uuid::new_v4(),
            content: content.into(),
            category,
            created_at: Utc::now(),
            promoted_from_memory_id,
        };
        let id = entry.id;
        self.log.append(&entry).await?;
        self.entries.push(entry);
        Ok(id)
    }

    pub fn all(&self) -> &[CoreMemory] {
        &self.entries
    }

    /// Render the prompt block: narrative entries first (oldest to newest,
    /// all of them — every core memory is unconditionally included), then
    /// typed bullets for the rest, grouped by category.
    pub fn render_block(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        for narrative in self.entries.iter().filter(|e| e.category == CoreMemoryCategory::Narrative) {
            out.push_str(&narrative.content);
            out.push_str("\n\n");
        }
        for cat in [
            CoreMemoryCategory::Identity,
            CoreMemoryCategory::Relationship,
            CoreMemoryCategory::Preference,
            CoreMemoryCategory::Fact,
        ] {
            let items: Vec<&CoreMemory> = self.entries.iter().filter(|e| e.category == cat).collect();
            if items.is_empty() {
                continue;
            }
            for item in items {
                out.push_str(&format!("- {}\n", item.content));
            }
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn render_block_includes_every_narrative_entry() {
        let dir = tempdir().unwrap();
        let mut store = CoreMemoryStore::new(dir.path().join("core.jsonl"));
        store.store("first chapter of the story", CoreMemoryCategory::Narrative, None).await.unwrap();
        store.store("second chapter of the story", CoreMemoryCategory::Narrative, None).await.unwrap();
        store.store("likes tea", CoreMemoryCategory::Preference, None).await.unwrap();

        let block = store.render_block();
        assert!(block.contains("first chapter of the story"));
        assert!(block.contains("second chapter of the story"));
        assert!(block.contains("likes tea"));
    }
}
