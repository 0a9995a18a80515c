//! Curiosity engine: analyzer (candidate discovery), selector (weighted
//! choice), and ledger (the exactly-one-active-goal invariant).
//!
//! The ledger is the only piece that persists state; the analyzer and
//! selector are pure functions over a snapshot of long-term memory so the
//! invariant (§8 property 3/4/5) lives in one place.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::long_term_memory::LongTermMemory;
use crate::persisted_log::PersistedLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CuriosityCategory {
    DormantRevival,
    FreshDiscovery,
    DepthSeeking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CuriosityStatus {
    Active,
    Explored,
    Deferred,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuriosityGoal {
    pub id: Uuid,
    pub content: String,
    /// `None` when the topic came from the agent itself rather than a memory.
    pub source_memory_id: Option<Uuid>,
    pub category: CuriosityCategory,
    pub context: String,
    pub status: CuriosityStatus,
    pub activated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuriosityCooldown {
    pub memory_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct CuriosityWeights {
    pub weight_dormancy: f32,
    pub weight_freshness: f32,
    pub importance: f32,
    pub factual_category_boost: f32,
}

impl Default for CuriosityWeights {
    fn default() -> Self {
        Self { weight_dormancy: 0.6, weight_freshness: 0.6, importance: 0.4, factual_category_boost: 1.2 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CuriosityThresholds {
    pub min_importance: f32,
    pub min_importance_fresh: f32,
    pub dormant_days: i64,
    /// Never-accessed memories must be at least this old to count as dormant.
    pub dormant_min_days_if_never_accessed: i64,
    pub fresh_hours: i64,
}

impl Default for CuriosityThresholds {
    fn default() -> Self {
        Self {
            min_importance: 0.5,
            min_importance_fresh: 0.6,
            dormant_days: 14,
            dormant_min_days_if_never_accessed: 3,
            fresh_hours: 24,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub memory_id: Uuid,
    pub content: String,
    pub category: CuriosityCategory,
    pub weight: f32,
}

/// Analyzer — pure function: memory snapshot + cooldowns -> weighted
/// candidate list, highest weight first.
pub fn analyze(
    memories: &[LongTermMemory],
    cooldowns: &[CuriosityCooldown],
    weights: CuriosityWeights,
    thresholds: CuriosityThresholds,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    let cooling_down: std::collections::HashSet<Uuid> =
        cooldowns.iter().filter(|c| c.expires_at > now).map(|c| c.memory_id).collect();

    let mut candidates = Vec::new();

    for memory in memories {
        if cooling_down.contains(&memory.id) {
            continue;
        }

        let category_boost = if matches!(memory.memory_type, crate::long_term_memory::LongTermMemoryType::Factual) {
            weights.factual_category_boost
        } else {
            1.0
        };

        let last_touch = memory.last_accessed_at.unwrap_or(memory.created_at);
        let days_since_touch = (now - last_touch).num_days();
        let never_accessed = memory.last_accessed_at.is_none();
        let is_dormant = if never_accessed {
            days_since_touch >= thresholds.dormant_min_days_if_never_accessed
        } else {
            days_since_touch >= thresholds.dormant_days
        };
        if is_dormant && memory.importance >= thresholds.min_importance {
            let dormancy_factor = (days_since_touch as f32 / thresholds.dormant_days as f32).min(2.0);
            let weight = (dormancy_factor * weights.weight_dormancy
                + memory.importance * weights.importance)
                * category_boost;
            candidates.push(Candidate {
                memory_id: memory.id,
                content: memory.content.clone(),
                category: CuriosityCategory::DormantRevival,
                weight,
            });
            continue;
        }

        let hours_since_created = (now - memory.created_at).num_hours();
        if hours_since_created <= thresholds.fresh_hours && memory.importance >= thresholds.min_importance_fresh {
            let freshness_factor = 1.0 - (hours_since_created as f32 / thresholds.fresh_hours as f32);
            let weight =
                (freshness_factor * weights.weight_freshness + memory.importance * weights.importance)
                    * category_boost;
            candidates.push(Candidate {
                memory_id: memory.id,
                content: memory.content.clone(),
                category: CuriosityCategory::FreshDiscovery,
                weight,
            });
        }
    }

    candidates.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    candidates
}

/// Selector — weighted-random pick over the analyzer's candidates. Always
/// returns something: when the candidate list is empty, falls back to a
/// generic depth-seeking topic so `get_current_goal` never returns null.
pub fn select(candidates: &[Candidate], rng: &mut impl Rng) -> (Option<Uuid>, String, CuriosityCategory) {
    if candidates.is_empty() {
        return (
            None,
            "What have I not thought to ask about lately?".to_string(),
            CuriosityCategory::DepthSeeking,
        );
    }

    let total_weight: f32 = candidates.iter().map(|c| c.weight.max(0.001)).sum();
    let mut pick = rng.gen_range(0.0..total_weight);
    for candidate in candidates {
        let w = candidate.weight.max(0.001);
        if pick < w {
            return (Some(candidate.memory_id), candidate.content.clone(), candidate.category);
        }
        pick -= w;
    }
    let last = candidates.last().unwrap();
    (Some(last.memory_id), last.content.clone(), last.category)
}

/// Ledger — enforces at most one active goal at a time, persists goals and
/// cooldowns. `get_current_goal` lazily selects a replacement when none is
/// active; the selection + activation happens inside this single call so
/// there is never a window where two goals are simultaneously active.
pub struct CuriosityLedger {
    goal_log: PersistedLog<CuriosityGoal>,
    cooldown_log: PersistedLog<CuriosityCooldown>,
    goals: Vec<CuriosityGoal>,
    cooldowns: Vec<CuriosityCooldown>,
    pub cooldown_duration: Duration,
}

impl CuriosityLedger {
    pub fn new(goal_path: impl Into<std::path::PathBuf>, cooldown_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            goal_log: PersistedLog::new(goal_path),
            cooldown_log: PersistedLog::new(cooldown_path),
            goals: Vec::new(),
            cooldowns: Vec::new(),
            cooldown_duration: Duration::days(7),
        }
    }

    pub fn load(&mut self) -> anyhow::Result<()> {
        self.goals = self.goal_log.load()?;
        self.cooldowns = self.cooldown_log.load()?;
        Ok(())
    }

    fn active_goal(&self) -> Option<&CuriosityGoal> {
        self.goals.iter().find(|g| g.status == CuriosityStatus::Active)
    }

    pub async fn get_current_goal(
        &mut self,
        memories: &[LongTermMemory],
        weights: CuriosityWeights,
        thresholds: CuriosityThresholds,
        rng: &mut impl Rng,
    ) -> anyhow::Result<CuriosityGoal> {
        if let Some(goal) = self.active_goal() {
            return Ok(goal.clone());
        }

        let now = Utc::now();
        let candidates = analyze(memories, &self.cooldowns, weights, thresholds, now);
        let (source_memory_id, content, category) = select(&candidates, rng);
        self.activate(content, source_memory_id, category, now).await
    }

    async fn activate(
        &mut self,
        content: String,
        source_memory_id: Option<Uuid>,
        category: CuriosityCategory,
        now: DateTime<Utc>,
    ) -> anyhow::Result<CuriosityGoal> {
        debug_assert!(self.active_goal().is_none(), "ledger invariant: at most one active goal");
        let goal = CuriosityGoal {
            id: Uuid::new_v4(),
            content,
            source_memory_id,
            category,
            context: String::new(),
            status: CuriosityStatus::Active,
            activated_at: now,
            resolved_at: None,
            notes: None,
        };
        self.goals.push(goal.clone());
        self.goal_log.overwrite(&self.goals).await?;
        Ok(goal)
    }

    /// Transition the active goal and cool down its source memory.
    pub async fn resolve(&mut self, status: CuriosityStatus, notes: Option<String>) -> anyhow::Result<Option<Uuid>> {
        debug_assert_ne!(status, CuriosityStatus::Active);
        let now = Utc::now();
        let Some(goal) = self.goals.iter_mut().find(|g| g.status == CuriosityStatus::Active) else {
            return Ok(None);
        };
        goal.status = status;
        goal.resolved_at = Some(now);
        goal.notes = notes;
        let source_memory_id = goal.source_memory_id;
        self.goal_log.overwrite(&self.goals).await?;

        if let Some(memory_id) = source_memory_id {
            self.cooldowns.push(CuriosityCooldown { memory_id, expires_at: now + self.cooldown_duration });
            self.cooldown_log.overwrite(&self.cooldowns).await?;
        }
        Ok(source_memory_id)
    }

    /// Short-circuits the selector and activates an agent-specified topic.
    pub async fn resolve_with_next(
        &mut self,
        status: CuriosityStatus,
        notes: Option<String>,
        next_topic: String,
    ) -> anyhow::Result<CuriosityGoal> {
        self.resolve(status, notes).await?;
        self.activate(next_topic, None, CuriosityCategory::DepthSeeking, Utc::now()).await
    }

    pub fn cooldowns(&self) -> &[CuriosityCooldown] {
        &self.cooldowns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::long_term_memory::LongTermMemoryType;
    use tempfile::tempdir;

    fn memory(importance: f32, last_accessed_days_ago: Option<i64>, created_days_ago: i64) -> LongTermMemory {
        let now = Utc::now();
        LongTermMemory {
            id: Uuid::new_v4(),
            content: "a topic".to_string(),
            memory_type: LongTermMemoryType::Episodic,
            memory_category: "general".to_string(),
            importance,
            created_at: now - Duration::days(created_days_ago),
            source_timestamp: now - Duration::days(created_days_ago),
            last_accessed_at: last_accessed_days_ago.map(|d| now - Duration::days(d)),
            embedding: vec![],
            retrieval_count: 0,
        }
    }

    #[tokio::test]
    async fn lifecycle_never_returns_null_and_cooldown_excludes() {
        let dir = tempdir().unwrap();
        let mut ledger = CuriosityLedger::new(dir.path().join("goals.jsonl"), dir.path().join("cooldowns.jsonl"));
        let m1 = memory(0.9, Some(10), 20);
        let m2 = memory(0.7, None, 0);
        let memories = vec![m1.clone(), m2.clone()];
        let weights = CuriosityWeights::default();
        let thresholds = CuriosityThresholds::default();
        let mut rng = rand::thread_rng();

        let goal = ledger.get_current_goal(&memories, weights, thresholds, &mut rng).await.unwrap();
        assert!(goal.source_memory_id == Some(m1.id) || goal.source_memory_id == Some(m2.id));

        let resolved_source = ledger.resolve(CuriosityStatus::Explored, Some("done".into())).await.unwrap();
        assert_eq!(resolved_source, goal.source_memory_id);

        let next = ledger.get_current_goal(&memories, weights, thresholds, &mut rng).await.unwrap();
        assert_ne!(next.id, goal.id);
        if let Some(src) = next.source_memory_id {
            assert!(!ledger.cooldowns().iter().any(|c| c.memory_id == src && c.expires_at > Utc::now() && src == resolved_source.unwrap()));
        }
    }

    #[tokio::test]
    async fn never_more_than_one_active_goal() {
        let dir = tempdir().unwrap();
        let mut ledger = CuriosityLedger::new(dir.path().join("goals.jsonl"), dir.path().join("cooldowns.jsonl"));
        let mut rng = rand::thread_rng();
        let memories = vec![memory(0.9, Some(20), 30)];
        ledger.get_current_goal(&memories, CuriosityWeights::default(), CuriosityThresholds::default(), &mut rng).await.unwrap();
        assert_eq!(ledger.goals.iter().filter(|g| g.status == CuriosityStatus::Active).count(), 1);
    }
}
