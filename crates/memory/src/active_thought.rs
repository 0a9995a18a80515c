//! Active thoughts — an agent-curated, rank-ordered working-memory set.
//!
//! The whole set is replaced atomically via `set_active_thoughts`; there is
//! no partial update. At most 10 items; normal prompts show the top 3,
//! pulse prompts show all of them.

use serde::{Deserialize, Serialize};

use crate::persisted_log::PersistedLog;

pub const MAX_ACTIVE_THOUGHTS: usize = 10;
pub const NORMAL_PROMPT_THOUGHTS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveThought {
    pub rank: u8,
    pub slug: String,
    pub topic: String,
    pub elaboration: String,
}

pub struct ActiveThoughtSet {
    log: PersistedLog<ActiveThought>,
    items: Vec<ActiveThought>,
}

impl ActiveThoughtSet {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { log: PersistedLog::new(path), items: Vec::new() }
    }

    pub fn load(&mut self) -> anyhow::Result<()> {
        self.items = self.log.load()?;
        self.items.sort_by_key(|t| t.rank);
        Ok(())
    }

    /// Replace the whole set atomically. Input order becomes rank 1..N,
    /// truncated to `MAX_ACTIVE_THOUGHTS`.
    pub async fn replace(&mut self, thoughts: Vec<(String, String, String)>) -> anyhow::Result<()> {
        let items: Vec<ActiveThought> = thoughts
            .into_iter()
            .take(MAX_ACTIVE_THOUGHTS)
            .enumerate()
            .map(|(idx, (slug, topic, elaboration))| ActiveThought {
                rank: (idx + 1) as u8,
                slug,
                topic,
                elaboration,
            })
            .collect();
        self.log.overwrite(&items).await?;
        self.items = items;
        Ok(())
    }

    pub fn all(&self) -> &[ActiveThought] {
        &self.items
    }

    pub fn top(&self, n: usize) -> &[ActiveThought] {
        &self.items[..n.min(self.items.len())]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn replace_assigns_sequential_ranks_preserving_order() {
        let dir = tempdir().unwrap();
        let mut set = ActiveThoughtSet::new(dir.path().join("thoughts.jsonl"));
        set.replace(vec![
            ("a".into(), "topic a".into(), "elaboration a".into()),
            ("b".into(), "topic b".into(), "elaboration b".into()),
        ])
        .await
        .unwrap();
        let items = set.all();
        assert_eq!(items[0].rank, 1);
        assert_eq!(items[0].slug, "a");
        assert_eq!(items[1].rank, 2);
        assert_eq!(items[1].slug, "b");
    }

    #[tokio::test]
    async fn replace_truncates_to_max() {
        let dir = tempdir().unwrap();
        let mut set = ActiveThoughtSet::new(dir.path().join("thoughts.jsonl"));
        let many: Vec<_> = (0..15).map(|i| (format!("s{i}"), format!("t{i}"), "e".into())).collect();
        set.replace(many).await.unwrap();
        assert_eq!(set.len(), MAX_ACTIVE_THOUGHTS);
    }
}
