use aigent_thinker::TurnContext;

use crate::block::Block;
use crate::snapshot::PromptSnapshot;
use crate::source::ContextSource;

/// Priority 5 — emitted only when operator debug mode is on.
pub struct DevModeNoticeSource;

impl ContextSource for DevModeNoticeSource {
    fn name(&self) -> &'static str {
        "dev-mode-notice"
    }

    fn priority(&self) -> i32 {
        5
    }

    fn get_block(&self, _user_input: &str, _ctx: &mut TurnContext, snapshot: &PromptSnapshot) -> Option<Block> {
        if !snapshot.debug_mode {
            return None;
        }
        Some(
            Block::new(
                self.name(),
                self.priority(),
                "[DEV MODE] Verbose internals are enabled for this session; raw tool \
                 arguments and round-trip timing may be surfaced to the operator.",
            )
            .always(),
        )
    }
}
