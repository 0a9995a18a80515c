//! Bundles the spec-precise memory entity stores (as opposed to the legacy
//! [`crate::manager::MemoryManager`] six-tier system) behind one struct so
//! the turn executor and the memory-subsystem tools can share a single
//! locked instance rather than each owning their own handle to each store.

use std::path::Path;

use crate::active_thought::ActiveThoughtSet;
use crate::core_memory::CoreMemoryStore;
use crate::curiosity::CuriosityLedger;
use crate::growth_thread::GrowthThreadStore;
use crate::intention::IntentionLedger;
use crate::long_term_memory::LongTermMemoryStore;
use crate::manager::EmbedFn;
use crate::turn::ContextWindowManager;

/// Every spec-precise store, loaded from one data directory. Intended to be
/// wrapped in `Arc<tokio::sync::Mutex<AgentMemory>>` by the caller so the
/// turn executor and the tool registry's memory tools operate on the same
/// state without duplicating it.
pub struct AgentMemory {
    pub turns: ContextWindowManager,
    pub long_term: LongTermMemoryStore,
    pub core: CoreMemoryStore,
    pub active_thoughts: ActiveThoughtSet,
    pub growth_threads: GrowthThreadStore,
    pub curiosity: CuriosityLedger,
    pub intentions: IntentionLedger,
    pub embed_fn: Option<EmbedFn>,
}

impl AgentMemory {
    /// Lays out one JSONL file per store under `data_dir`, matching the
    /// naming the rest of the crate already uses for its own logs.
    pub fn new(data_dir: impl AsRef<Path>, window_size: usize, overflow_trigger: usize) -> Self {
        let dir = data_dir.as_ref();
        Self {
            turns: ContextWindowManager::new(dir.join("turns.jsonl"), window_size, overflow_trigger),
            long_term: LongTermMemoryStore::new(dir.join("long_term_memory.jsonl")),
            core: CoreMemoryStore::new(dir.join("core_memory.jsonl")),
            active_thoughts: ActiveThoughtSet::new(dir.join("active_thoughts.jsonl")),
            growth_threads: GrowthThreadStore::new(dir.join("growth_threads.jsonl")),
            curiosity: CuriosityLedger::new(dir.join("curiosity_goals.jsonl"), dir.join("curiosity_cooldowns.jsonl")),
            intentions: IntentionLedger::new(dir.join("intentions.jsonl")),
            embed_fn: None,
        }
    }

    pub fn with_embed_fn(mut self, embed_fn: EmbedFn) -> Self {
        self.embed_fn = Some(embed_fn);
        self
    }

    /// Loads every store from disk. Returns the number of empty assistant
    /// turns purged from the turn log (see `ContextWindowManager::load`).
    pub fn load(&mut self) -> anyhow::Result<usize> {
        let purged = self.turns.load()?;
        self.long_term.load()?;
        self.core.load()?;
        self.active_thoughts.load()?;
        self.growth_threads.load()?;
        self.curiosity.load()?;
        self.intentions.load()?;
        Ok(purged)
    }

    pub fn embed(&self, text: &str) -> Option<Vec<f32>> {
        self.embed_fn.as_ref().and_then(|f| f(text))
    }
}
