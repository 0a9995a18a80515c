//! Intention ledger — reminders and self-assigned goals with a trigger
//! condition, scanned by the reminder scheduler and surfaced in prompts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::persisted_log::PersistedLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentionType {
    Reminder,
    Goal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Time,
    NextSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentionStatus {
    Pending,
    Triggered,
    Completed,
    Dismissed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intention {
    pub id: Uuid,
    pub kind: IntentionType,
    pub content: String,
    pub context: String,
    pub trigger_type: TriggerType,
    pub trigger_at: Option<DateTime<Utc>>,
    pub status: IntentionStatus,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<String>,
}

pub struct IntentionLedger {
    log: PersistedLog<Intention>,
    intentions: Vec<Intention>,
}

impl IntentionLedger {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { log: PersistedLog::new(path), intentions: Vec::new() }
    }

    pub fn load(&mut self) -> anyhow::Result<()> {
        self.intentions = self.log.load()?;
        Ok(())
    }

    async fn persist(&self) -> anyhow::Result<()> {
        self.log.overwrite(&self.intentions).await
    }

    pub async fn create(
        &mut self,
        kind: IntentionType,
        content: impl Into<String>,
        context: impl Into<String>,
        trigger_type: TriggerType,
        trigger_at: Option<DateTime<Utc>>,
        priority: u8,
    ) -> anyhow::Result<Uuid> {
        let intention = Intention {
            id: Uuid::new_v4(),
            kind,
            content: content.into(),
            context: context.into(),
            trigger_type,
            trigger_at,
            status: IntentionStatus::Pending,
            priority: priority.clamp(1, 10),
            created_at: Utc::now(),
            triggered_at: None,
            completed_at: None,
            outcome: None,
        };
        let id = intention.id;
        self.intentions.push(intention);
        self.persist().await?;
        Ok(id)
    }

    /// Scan for due intentions: `pending AND (time trigger with trigger_at <=
    /// now, OR next_session trigger at a session-start event)`. Transitions
    /// the whole batch to `triggered` atomically and returns their ids —
    /// this is what the reminder scheduler posts as a reminder-pulse event.
    pub async fn scan_due(&mut self, now: DateTime<Utc>, is_session_start: bool) -> anyhow::Result<Vec<Uuid>> {
        let due_ids: Vec<Uuid> = self
            .intentions
            .iter()
            .filter(|i| {
                i.status == IntentionStatus::Pending
                    && match i.trigger_type {
                        TriggerType::Time => i.trigger_at.map(|t| t <= now).unwrap_or(false),
                        TriggerType::NextSession => is_session_start,
                    }
            })
            .map(|i| i.id)
            .collect();

        if due_ids.is_empty() {
            return Ok(due_ids);
        }

        for intention in &mut self.intentions {
            if due_ids.contains(&intention.id) {
                intention.status = IntentionStatus::Triggered;
                intention.triggered_at = Some(now);
            }
        }
        self.persist().await?;
        Ok(due_ids)
    }

    pub async fn complete(&mut self, id: Uuid, outcome: Option<String>) -> anyhow::Result<bool> {
        self.transition(id, IntentionStatus::Completed, outcome).await
    }

    pub async fn dismiss(&mut self, id: Uuid, outcome: Option<String>) -> anyhow::Result<bool> {
        self.transition(id, IntentionStatus::Dismissed, outcome).await
    }

    async fn transition(&mut self, id: Uuid, status: IntentionStatus, outcome: Option<String>) -> anyhow::Result<bool> {
        let Some(intention) = self.intentions.iter_mut().find(|i| i.id == id) else {
            return Ok(false);
        };
        intention.status = status;
        intention.outcome = outcome;
        if status == IntentionStatus::Completed {
            intention.completed_at = Some(Utc::now());
        }
        self.persist().await?;
        Ok(true)
    }

    pub fn list(&self, status: Option<IntentionStatus>) -> Vec<&Intention> {
        self.intentions
            .iter()
            .filter(|i| status.map(|s| i.status == s).unwrap_or(true))
            .collect()
    }

    pub fn pending_and_triggered(&self) -> Vec<&Intention> {
        self.intentions
            .iter()
            .filter(|i| matches!(i.status, IntentionStatus::Pending | IntentionStatus::Triggered))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn scan_due_transitions_batch_atomically() {
        let dir = tempdir().unwrap();
        let mut ledger = IntentionLedger::new(dir.path().join("intentions.jsonl"));
        let now = Utc::now();
        ledger
            .create(IntentionType::Reminder, "call mom", "", TriggerType::Time, Some(now - chrono::Duration::minutes(1)), 5)
            .await
            .unwrap();
        ledger
            .create(IntentionType::Reminder, "future thing", "", TriggerType::Time, Some(now + chrono::Duration::hours(1)), 5)
            .await
            .unwrap();

        let due = ledger.scan_due(now, false).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(ledger.list(Some(IntentionStatus::Triggered)).len(), 1);
        assert_eq!(ledger.list(Some(IntentionStatus::Pending)).len(), 1);
    }
}
