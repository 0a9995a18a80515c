//! The `ContextSource` trait — one registry entry per prompt block.

use aigent_thinker::TurnContext;

use crate::block::Block;
use crate::snapshot::PromptSnapshot;

/// One contributor to the assembled system prompt.
///
/// `priority` is fixed per source (lower sorts earlier) and is looked up
/// once at registration time rather than per call, matching the source
/// system's "fixed integer priority" contract (§4.3). `get_block` may
/// mutate `ctx` (e.g. the semantic-memory source stashes its retrieval
/// into `ctx.relevant_memories` instead of returning prompt content).
pub trait ContextSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn priority(&self) -> i32;
    fn get_block(&self, user_input: &str, ctx: &mut TurnContext, snapshot: &PromptSnapshot) -> Option<Block>;
}
