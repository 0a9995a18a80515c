use aigent_thinker::TurnContext;

use crate::block::Block;
use crate::snapshot::PromptSnapshot;
use crate::source::ContextSource;

/// Priority 30 — current time, session duration, turn count, time since
/// last interaction. The last stable-priority source before the cache
/// breakpoint: everything below here is identical for every turn in a
/// session, everything above may vary turn to turn.
pub struct TemporalSource;

impl ContextSource for TemporalSource {
    fn name(&self) -> &'static str {
        "temporal"
    }

    fn priority(&self) -> i32 {
        30
    }

    fn get_block(&self, _user_input: &str, _ctx: &mut TurnContext, snapshot: &PromptSnapshot) -> Option<Block> {
        let session_duration = snapshot.now.signed_duration_since(snapshot.session_start);
        let mut out = format!(
            "TIME: {} (session running {} min, {} turns this session)",
            snapshot.now.format("%Y-%m-%d %H:%M:%S UTC"),
            session_duration.num_minutes().max(0),
            snapshot.turn_count,
        );

        if let Some(last) = snapshot.last_interaction_at {
            let gap = snapshot.now.signed_duration_since(last);
            out.push_str(&format!("\nLast interaction: {} ago.", humanize_duration(gap)));
        }

        Some(Block::new(self.name(), self.priority(), out))
    }
}

fn humanize_duration(d: chrono::Duration) -> String {
    let minutes = d.num_minutes();
    if minutes < 1 {
        "less than a minute".to_string()
    } else if minutes < 60 {
        format!("{minutes} min")
    } else if minutes < 60 * 24 {
        format!("{} hr", d.num_hours())
    } else {
        format!("{} days", d.num_days())
    }
}
