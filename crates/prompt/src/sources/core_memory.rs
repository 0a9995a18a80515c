use aigent_thinker::TurnContext;

use crate::block::Block;
use crate::snapshot::PromptSnapshot;
use crate::source::ContextSource;

/// Priority 10 — all core memories, narrative first then typed bullets.
/// Unconditional: always included when any core memory exists.
pub struct CoreMemorySource;

impl ContextSource for CoreMemorySource {
    fn name(&self) -> &'static str {
        "core-memory"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn get_block(&self, _user_input: &str, _ctx: &mut TurnContext, snapshot: &PromptSnapshot) -> Option<Block> {
        if snapshot.core_memory_block.trim().is_empty() {
            return None;
        }
        Some(Block::new(self.name(), self.priority(), format!("CORE MEMORY:\n{}", snapshot.core_memory_block)).always())
    }
}
