//! Growth threads — long-lived developmental aspirations the agent tends
//! over many turns. Active (non-dormant) threads show in every normal
//! prompt; dormant threads are additionally surfaced during pulse turns so
//! the agent can decide whether to revive or retire them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persisted_log::PersistedLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStage {
    Seed,
    Growing,
    Integrating,
    Dormant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthThread {
    pub slug: String,
    /// Markdown content; must begin with a `FOCUS:` line.
    pub content: String,
    pub stage: GrowthStage,
    pub stage_changed_at: DateTime<Utc>,
}

impl GrowthThread {
    pub fn focus_line(&self) -> &str {
        self.content.lines().next().unwrap_or("")
    }
}

pub struct GrowthThreadStore {
    log: PersistedLog<GrowthThread>,
    threads: Vec<GrowthThread>,
}

impl GrowthThreadStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { log: PersistedLog::new(path), threads: Vec::new() }
    }

    pub fn load(&mut self) -> anyhow::Result<()> {
        self.threads = self.log.load()?;
        Ok(())
    }

    async fn persist(&self) -> anyhow::Result<()> {
        self.log.overwrite(&self.threads).await
    }

    pub async fn upsert(&mut self, slug: &str, content: impl Into<String>) -> anyhow::Result<()> {
        let content = content.into();
        if !content.trim_start().starts_with("FOCUS:") {
            anyhow::bail!("growth thread content must begin with a FOCUS: line");
        }
        let now = Utc::now();
        if let Some(existing) = self.threads.iter_mut().find(|t| t.slug == slug) {
            existing.content = content;
        } else {
            self.threads.push(GrowthThread {
                slug: slug.to_string(),
                content,
                stage: GrowthStage::Seed,
                stage_changed_at: now,
            });
        }
        self.persist().await
    }

    pub async fn advance(&mut self, slug: &str, stage: GrowthStage) -> anyhow::Result<bool> {
        let Some(thread) = self.threads.iter_mut().find(|t| t.slug == slug) else {
            return Ok(false);
        };
        thread.stage = stage;
        thread.stage_changed_at = Utc::now();
        self.persist().await?;
        Ok(true)
    }

    pub async fn remove(&mut self, slug: &str) -> anyhow::Result<bool> {
        let before = self.threads.len();
        self.threads.retain(|t| t.slug != slug);
        let removed = self.threads.len() < before;
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    pub fn active(&self) -> Vec<&GrowthThread> {
        self.threads.iter().filter(|t| t.stage != GrowthStage::Dormant).collect()
    }

    pub fn dormant(&self) -> Vec<&GrowthThread> {
        self.threads.iter().filter(|t| t.stage == GrowthStage::Dormant).collect()
    }

    pub fn all(&self) -> &[GrowthThread] {
        &self.threads
    }
}
