use std::sync::atomic::{AtomicU32, Ordering};

use aigent_thinker::TurnContext;

use crate::block::Block;
use crate::snapshot::PromptSnapshot;
use crate::source::ContextSource;

const PROMPT: &str = "PATTERN CHECK: Before responding, notice if you're about to reach for a \
stock phrase or a familiar shape of reply out of habit rather than because it's actually the \
best fit here. It's fine to break from your usual rhythm if the moment calls for it.";

/// Priority 85 — fires every N non-pulse user turns. The counter lives in
/// the source instance itself rather than per-turn context, since it must
/// survive across turns; the assembler holds one long-lived instance per
/// session.
pub struct PatternBreakerSource {
    every_n_turns: u32,
    counter: AtomicU32,
}

impl PatternBreakerSource {
    pub fn new(every_n_turns: u32) -> Self {
        Self { every_n_turns: every_n_turns.max(1), counter: AtomicU32::new(0) }
    }
}

impl ContextSource for PatternBreakerSource {
    fn name(&self) -> &'static str {
        "pattern-breaker"
    }

    fn priority(&self) -> i32 {
        85
    }

    fn get_block(&self, _user_input: &str, ctx: &mut TurnContext, _snapshot: &PromptSnapshot) -> Option<Block> {
        if ctx.is_pulse {
            return None;
        }

        let count = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        if count % self.every_n_turns != 0 {
            return None;
        }

        Some(Block::new(self.name(), self.priority(), PROMPT))
    }
}
