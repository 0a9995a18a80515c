use aigent_memory::CuriosityCategory;
use aigent_thinker::TurnContext;

use crate::block::Block;
use crate::snapshot::PromptSnapshot;
use crate::source::ContextSource;

/// Priority 20 (alt slot) — the current active curiosity goal, phrased as
/// background context normally or as a pulse directive during pulse turns.
pub struct CuriositySource;

impl ContextSource for CuriositySource {
    fn name(&self) -> &'static str {
        "curiosity"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn get_block(&self, _user_input: &str, ctx: &mut TurnContext, snapshot: &PromptSnapshot) -> Option<Block> {
        let goal = snapshot.curiosity_goal.as_ref()?;

        let label = match goal.category {
            CuriosityCategory::DormantRevival => "something you haven't thought about in a while",
            CuriosityCategory::FreshDiscovery => "something that came up recently",
            CuriosityCategory::DepthSeeking => "something worth going deeper on",
        };

        let content = if ctx.is_pulse {
            format!(
                "CURIOSITY: You're currently curious about {label}: \"{}\". Consider pursuing it \
                 this pulse — research it, reflect on it, or resolve it with `advance_curiosity` \
                 if it's run its course.",
                goal.content
            )
        } else {
            format!(
                "CURIOSITY (background, don't force it into the conversation): {label} — \"{}\".",
                goal.content
            )
        };

        Some(Block::new(self.name(), self.priority(), content))
    }
}
