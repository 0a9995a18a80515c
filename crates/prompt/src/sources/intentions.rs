use aigent_thinker::TurnContext;

use crate::block::Block;
use crate::snapshot::PromptSnapshot;
use crate::source::ContextSource;

/// Priority 22 — per-turn snapshot of pending and triggered intentions;
/// pulse variant urges resolution.
pub struct IntentionsSource;

impl ContextSource for IntentionsSource {
    fn name(&self) -> &'static str {
        "intentions"
    }

    fn priority(&self) -> i32 {
        22
    }

    fn get_block(&self, _user_input: &str, ctx: &mut TurnContext, snapshot: &PromptSnapshot) -> Option<Block> {
        if snapshot.intentions_pending.is_empty() && snapshot.intentions_triggered.is_empty() {
            return None;
        }

        let mut out = String::from("INTENTIONS:\n");
        if !snapshot.intentions_triggered.is_empty() {
            out.push_str("Due now:\n");
            for i in &snapshot.intentions_triggered {
                out.push_str(&format!("- {} (priority {}): {}\n", i.id, i.priority, i.content));
            }
        }
        if !snapshot.intentions_pending.is_empty() {
            out.push_str("Pending:\n");
            for i in &snapshot.intentions_pending {
                out.push_str(&format!("- {} (priority {}): {}\n", i.id, i.priority, i.content));
            }
        }

        if ctx.is_pulse && !snapshot.intentions_triggered.is_empty() {
            out.push_str(
                "\n[These have fired. Act on them now with `complete_reminder` or \
                 `dismiss_reminder`, or leave them pending if more time is needed.]",
            );
        }

        Some(Block::new(self.name(), self.priority(), out.trim_end().to_string()))
    }
}
