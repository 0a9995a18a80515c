//! The per-turn snapshot handed to every context source.
//!
//! Generalizes the source system's free-form `session_context` dict (§9
//! design note) into typed, named slots. Building this is the caller's
//! (the turn executor's) job — it reads whatever stores a given turn needs
//! once, up front, so individual sources stay pure functions over borrowed
//! data rather than each reaching into shared state themselves.

use chrono::{DateTime, Utc};

use aigent_memory::{ActiveThought, CuriosityGoal, GrowthThread, Intention};

/// Remaining daily budget for a server-side tool, if the tool is enabled.
#[derive(Debug, Clone, Copy)]
pub struct BudgetStatus {
    pub enabled: bool,
    pub daily_cap: u32,
    pub used_today: u32,
}

impl BudgetStatus {
    pub fn remaining(&self) -> u32 {
        self.daily_cap.saturating_sub(self.used_today)
    }

    pub fn exhausted(&self) -> bool {
        self.enabled && self.remaining() == 0
    }
}

#[derive(Debug, Clone)]
pub struct PromptSnapshot<'a> {
    pub debug_mode: bool,
    pub core_memory_block: String,
    pub active_thoughts: &'a [ActiveThought],
    pub growth_threads_active: Vec<&'a GrowthThread>,
    pub growth_threads_dormant: Vec<&'a GrowthThread>,
    pub intentions_pending: Vec<&'a Intention>,
    pub intentions_triggered: Vec<&'a Intention>,
    pub pulse_enabled: bool,
    pub pulse_interval_label: &'static str,
    pub web_search: BudgetStatus,
    pub web_fetch: BudgetStatus,
    pub session_start: DateTime<Utc>,
    pub turn_count: usize,
    pub last_interaction_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
    /// Pre-formatted semantic-memory text block (§4.4 retrieval already
    /// ran by the time the assembler runs); `None` when retrieval found
    /// nothing or was skipped for this turn.
    pub semantic_memory_block: Option<String>,
    pub curiosity_goal: Option<CuriosityGoal>,
    pub bot_name: String,
}
