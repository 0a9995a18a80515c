use aigent_thinker::TurnContext;

use crate::block::Block;
use crate::snapshot::PromptSnapshot;
use crate::source::ContextSource;

/// Priority 26 — web-search / web-fetch availability and remaining daily
/// budget, so the model doesn't reach for a tool it has already exhausted.
pub struct CapabilitiesSource;

impl ContextSource for CapabilitiesSource {
    fn name(&self) -> &'static str {
        "capabilities"
    }

    fn priority(&self) -> i32 {
        26
    }

    fn get_block(&self, _user_input: &str, _ctx: &mut TurnContext, snapshot: &PromptSnapshot) -> Option<Block> {
        let mut lines = Vec::new();

        if snapshot.web_search.enabled {
            if snapshot.web_search.exhausted() {
                lines.push("web_search: exhausted for today, do not call it.".to_string());
            } else {
                lines.push(format!(
                    "web_search: available, {} of {} calls left today.",
                    snapshot.web_search.remaining(),
                    snapshot.web_search.daily_cap
                ));
            }
        } else {
            lines.push("web_search: not available in this deployment.".to_string());
        }

        if snapshot.web_fetch.enabled {
            if snapshot.web_fetch.exhausted() {
                lines.push("web_fetch: exhausted for today, do not call it.".to_string());
            } else {
                lines.push(format!(
                    "web_fetch: available, {} of {} calls left today.",
                    snapshot.web_fetch.remaining(),
                    snapshot.web_fetch.daily_cap
                ));
            }
        } else {
            lines.push("web_fetch: not available in this deployment.".to_string());
        }

        Some(Block::new(self.name(), self.priority(), format!("CAPABILITIES:\n{}", lines.join("\n"))))
    }
}
