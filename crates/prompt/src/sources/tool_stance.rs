use aigent_thinker::TurnContext;

use crate::block::Block;
use crate::snapshot::PromptSnapshot;
use crate::source::ContextSource;

const STANCE: &str = "TOOL STANCE: You have real tools — use them rather than guessing. Reach \
for `search_memories` before claiming not to remember something; reach for `web_search` or \
`web_fetch` before asserting a time-sensitive fact from training data; and write durable facts \
to core memory or an intention the moment they appear rather than hoping to recall them later.";

/// Priority 15 — static guidance nudging proactive tool use. Always present.
pub struct ToolStanceSource;

impl ContextSource for ToolStanceSource {
    fn name(&self) -> &'static str {
        "tool-stance"
    }

    fn priority(&self) -> i32 {
        15
    }

    fn get_block(&self, _user_input: &str, _ctx: &mut TurnContext, _snapshot: &PromptSnapshot) -> Option<Block> {
        Some(Block::new(self.name(), self.priority(), STANCE).always())
    }
}
