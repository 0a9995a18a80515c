use aigent_thinker::TurnContext;

use crate::block::Block;
use crate::snapshot::PromptSnapshot;
use crate::source::ContextSource;

/// Priority 50 — top-K retrieved memories (§4.4 retrieval). This source
/// never contributes to the system prompt: retrieval is stashed into
/// `ctx.relevant_memories` so the executor can prepend it to the *last
/// user message* instead, which is where semantic recall belongs. It still
/// occupies a priority slot so its place in the registry's iteration order
/// (and therefore its position relative to the cache breakpoint) is
/// explicit rather than implicit.
pub struct SemanticMemorySource;

impl ContextSource for SemanticMemorySource {
    fn name(&self) -> &'static str {
        "semantic-memory"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn get_block(&self, _user_input: &str, ctx: &mut TurnContext, snapshot: &PromptSnapshot) -> Option<Block> {
        ctx.relevant_memories = snapshot.semantic_memory_block.clone();
        None
    }
}
