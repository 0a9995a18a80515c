use aigent_thinker::TurnContext;

use crate::block::Block;
use crate::snapshot::PromptSnapshot;
use crate::source::ContextSource;

const PROMPT: &str = "SELF-CORRECTION: If anything you said earlier this session turns out to \
have been wrong, incomplete, or worth revising in light of what's come up since, say so plainly \
rather than quietly proceeding as if it hadn't happened.";

/// Priority 87 — fires every non-pulse turn, unconditionally. Unlike
/// `pattern-breaker` this has no counter: it's meant to be a constant,
/// low-grade nudge rather than an occasional one.
pub struct SelfCorrectionSource;

impl ContextSource for SelfCorrectionSource {
    fn name(&self) -> &'static str {
        "self-correction"
    }

    fn priority(&self) -> i32 {
        87
    }

    fn get_block(&self, _user_input: &str, ctx: &mut TurnContext, _snapshot: &PromptSnapshot) -> Option<Block> {
        if ctx.is_pulse {
            return None;
        }
        Some(Block::new(self.name(), self.priority(), PROMPT))
    }
}
