use aigent_thinker::TurnContext;

use crate::block::Block;
use crate::snapshot::PromptSnapshot;
use crate::source::ContextSource;

/// Priority 20 — active threads normally; active+dormant with reflection
/// instructions during pulse.
pub struct GrowthThreadsSource;

impl ContextSource for GrowthThreadsSource {
    fn name(&self) -> &'static str {
        "growth-threads"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn get_block(&self, _user_input: &str, ctx: &mut TurnContext, snapshot: &PromptSnapshot) -> Option<Block> {
        if snapshot.growth_threads_active.is_empty() && (!ctx.is_pulse || snapshot.growth_threads_dormant.is_empty()) {
            return None;
        }

        let mut out = String::from("GROWTH THREADS:\n");
        for thread in &snapshot.growth_threads_active {
            out.push_str(&format!("- [{:?}] {}\n", thread.stage, thread.focus_line()));
        }

        if ctx.is_pulse && !snapshot.growth_threads_dormant.is_empty() {
            out.push_str("\nDORMANT (consider reviving or retiring one of these this pulse):\n");
            for thread in &snapshot.growth_threads_dormant {
                out.push_str(&format!("- {} (dormant since {})\n", thread.focus_line(), thread.stage_changed_at.format("%Y-%m-%d")));
            }
            out.push_str(
                "\n[Use `set_growth_thread` to advance or rewrite a thread, or \
                 `remove_growth_thread` to retire one that's run its course.]",
            );
        }

        Some(Block::new(self.name(), self.priority(), out.trim_end().to_string()))
    }
}
