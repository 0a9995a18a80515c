//! The unit a [`crate::ContextSource`] contributes to the assembled prompt.

use std::collections::HashMap;

/// One contribution to the system prompt.
///
/// Sources that have nothing to say for this turn return `None` from
/// `get_block` rather than an empty `Block` — the assembler drops empty
/// content either way, but `None` makes "this source opted out" and "this
/// source produced an empty string" indistinguishable in a useful way for
/// tests (a source can assert it returned `None`, not just empty content).
#[derive(Debug, Clone)]
pub struct Block {
    pub source_name: &'static str,
    pub content: String,
    pub priority: i32,
    /// Whether this block is shown unconditionally (vs. only in certain
    /// turn kinds). Informational — the assembler includes whatever
    /// `get_block` returns regardless; this flag is surfaced to callers
    /// that want to distinguish "always-on" sources (core memory, tool
    /// stance) from conditional ones (dev-mode notice, capabilities) when
    /// rendering a debug view of the assembled prompt.
    pub include_always: bool,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Block {
    pub fn new(source_name: &'static str, priority: i32, content: impl Into<String>) -> Self {
        Self {
            source_name,
            content: content.into(),
            priority,
            include_always: false,
            metadata: HashMap::new(),
        }
    }

    pub fn always(mut self) -> Self {
        self.include_always = true;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}
