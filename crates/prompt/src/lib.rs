//! The prompt assembler (§4.3): a priority-ordered registry of context
//! sources, each contributing one labelled block of system-prompt text (or
//! nothing at all), concatenated into the final system prompt handed to the
//! model client.
//!
//! Generalizes the teacher's monolithic `build_chat_prompt` into
//! independently testable sources so a new prompt section is a new struct,
//! not a new branch in one big function.

pub mod assembler;
pub mod block;
pub mod snapshot;
pub mod source;
pub mod sources;

pub use assembler::{PromptAssembler, CACHE_BREAKPOINT};
pub use block::Block;
pub use snapshot::{BudgetStatus, PromptSnapshot};
pub use source::ContextSource;
