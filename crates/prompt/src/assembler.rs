//! The `PromptAssembler` — priority-ordered context-source registry.

use aigent_thinker::TurnContext;

use crate::block::Block;
use crate::snapshot::PromptSnapshot;
use crate::source::ContextSource;

/// Marker inserted into the assembled string between the stable-priority
/// prefix and everything past it, so a provider that supports prompt
/// caching can split on it rather than re-encode the whole system prompt
/// every turn. Not itself meaningful to the model; stripped by providers
/// that don't understand it would just see it as inert text, which is why
/// it's phrased as a comment rather than an instruction.
pub const CACHE_BREAKPOINT: &str = "<!-- cache-breakpoint -->";

pub struct PromptAssembler {
    sources: Vec<Box<dyn ContextSource>>,
    /// Sources with priority strictly less than this emit before the cache
    /// breakpoint; the rest emit after. Defaults to 40: everything through
    /// `temporal` (30) is stable within a session, `semantic-memory` (50)
    /// onward varies every turn.
    cache_breakpoint_priority: i32,
}

impl PromptAssembler {
    pub fn new() -> Self {
        Self { sources: Vec::new(), cache_breakpoint_priority: 40 }
    }

    pub fn with_cache_breakpoint_priority(mut self, priority: i32) -> Self {
        self.cache_breakpoint_priority = priority;
        self
    }

    pub fn register(&mut self, source: Box<dyn ContextSource>) -> &mut Self {
        self.sources.push(source);
        self.sources.sort_by_key(|s| s.priority());
        self
    }

    /// The standard registry: every built-in source from the
    /// required-sources table, at its documented priority.
    pub fn with_default_sources(mut self, pattern_breaker_every_n_turns: u32) -> Self {
        use crate::sources::*;
        self.register(Box::new(DevModeNoticeSource));
        self.register(Box::new(CoreMemorySource));
        self.register(Box::new(ToolStanceSource));
        self.register(Box::new(ActiveThoughtsSource));
        self.register(Box::new(GrowthThreadsSource));
        self.register(Box::new(CuriositySource));
        self.register(Box::new(IntentionsSource));
        self.register(Box::new(PulseInfoSource));
        self.register(Box::new(CapabilitiesSource));
        self.register(Box::new(TemporalSource));
        self.register(Box::new(SemanticMemorySource));
        self.register(Box::new(PatternBreakerSource::new(pattern_breaker_every_n_turns)));
        self.register(Box::new(SelfCorrectionSource));
        self
    }

    /// Runs every registered source in priority order, drops empty blocks,
    /// and concatenates the rest with blank-line separators, inserting the
    /// cache breakpoint once at the configured priority boundary.
    pub fn assemble(&self, user_input: &str, ctx: &mut TurnContext, snapshot: &PromptSnapshot) -> String {
        let mut blocks: Vec<Block> = Vec::new();
        for source in &self.sources {
            if let Some(block) = source.get_block(user_input, ctx, snapshot) {
                if !block.is_empty() {
                    blocks.push(block);
                }
            }
        }

        let mut sections = Vec::new();
        let mut breakpoint_inserted = false;
        for block in &blocks {
            if !breakpoint_inserted && block.priority >= self.cache_breakpoint_priority {
                sections.push(CACHE_BREAKPOINT.to_string());
                breakpoint_inserted = true;
            }
            sections.push(block.content.clone());
        }

        sections.join("\n\n")
    }
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn empty_snapshot() -> PromptSnapshot<'static> {
        PromptSnapshot {
            debug_mode: false,
            core_memory_block: String::new(),
            active_thoughts: &[],
            growth_threads_active: Vec::new(),
            growth_threads_dormant: Vec::new(),
            intentions_pending: Vec::new(),
            intentions_triggered: Vec::new(),
            pulse_enabled: true,
            pulse_interval_label: "30 minutes",
            web_search: crate::snapshot::BudgetStatus { enabled: true, daily_cap: 50, used_today: 0 },
            web_fetch: crate::snapshot::BudgetStatus { enabled: true, daily_cap: 50, used_today: 0 },
            session_start: Utc::now(),
            turn_count: 1,
            last_interaction_at: None,
            now: Utc::now(),
            semantic_memory_block: None,
            curiosity_goal: None,
            bot_name: "agent".to_string(),
        }
    }

    #[test]
    fn empty_sources_produce_empty_non_panicking_output() {
        let assembler = PromptAssembler::new();
        let snapshot = empty_snapshot();
        let mut ctx = TurnContext::new(false, false);
        let out = assembler.assemble("hi", &mut ctx, &snapshot);
        assert!(out.is_empty());
    }

    #[test]
    fn cache_breakpoint_sits_between_stable_and_volatile_blocks() {
        let mut assembler = PromptAssembler::new();
        assembler.register(Box::new(crate::sources::ToolStanceSource));
        let snapshot = empty_snapshot();
        let mut ctx = TurnContext::new(false, false);
        let out = assembler.assemble("hi", &mut ctx, &snapshot);
        assert!(!out.contains(CACHE_BREAKPOINT), "priority 15 is below the 40 boundary");
    }
}
