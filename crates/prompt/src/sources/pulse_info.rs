use aigent_thinker::TurnContext;

use crate::block::Block;
use crate::snapshot::PromptSnapshot;
use crate::source::ContextSource;

/// Priority 25 — current pulse interval label and tool hint. Always present
/// so the model knows whether, and how often, it will wake on its own.
pub struct PulseInfoSource;

impl ContextSource for PulseInfoSource {
    fn name(&self) -> &'static str {
        "pulse-info"
    }

    fn priority(&self) -> i32 {
        25
    }

    fn get_block(&self, _user_input: &str, _ctx: &mut TurnContext, snapshot: &PromptSnapshot) -> Option<Block> {
        let status = if snapshot.pulse_enabled {
            format!("PULSE: enabled, every {}.", snapshot.pulse_interval_label)
        } else {
            "PULSE: disabled. You will only run in response to incoming messages.".to_string()
        };

        Some(Block::new(
            self.name(),
            self.priority(),
            format!("{status}\n[Use `set_pulse_interval` to change how often you wake on your own.]"),
        ))
    }
}
