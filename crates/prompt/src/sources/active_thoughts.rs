use aigent_memory::NORMAL_PROMPT_THOUGHTS;
use aigent_thinker::TurnContext;

use crate::block::Block;
use crate::snapshot::PromptSnapshot;
use crate::source::ContextSource;

/// Priority 18 — top 3 active thoughts normally, all (<=10) during pulse.
pub struct ActiveThoughtsSource;

impl ContextSource for ActiveThoughtsSource {
    fn name(&self) -> &'static str {
        "active-thoughts"
    }

    fn priority(&self) -> i32 {
        18
    }

    fn get_block(&self, _user_input: &str, ctx: &mut TurnContext, snapshot: &PromptSnapshot) -> Option<Block> {
        ctx.active_thoughts_count = snapshot.active_thoughts.len();
        if snapshot.active_thoughts.is_empty() {
            return None;
        }

        let shown = if ctx.is_pulse {
            snapshot.active_thoughts
        } else {
            &snapshot.active_thoughts[..NORMAL_PROMPT_THOUGHTS.min(snapshot.active_thoughts.len())]
        };

        let items = shown
            .iter()
            .map(|t| format!("{}. {} — {}", t.rank, t.topic, t.elaboration))
            .collect::<Vec<_>>()
            .join("\n");

        let hint = "[Replace this whole set at any time with `set_active_thoughts`; it's your \
                     own curated working memory, not a log.]";

        Some(Block::new(self.name(), self.priority(), format!("ACTIVE THOUGHTS:\n{items}\n{hint}")))
    }
}
