pub mod active_thought;
pub mod consistency;
pub mod constitution;
pub mod core_memory;
pub mod curiosity;
pub mod event_log;
pub mod growth_thread;
pub mod identity;
pub mod index;
pub mod intention;
pub mod long_term_memory;
pub mod manager;
pub mod multi_sleep;
pub mod persisted_log;
pub mod profile;
pub mod retrieval;
pub mod schema;
pub mod scorer;
pub mod sentiment;
pub mod shared;
pub mod sleep;
pub mod store;
pub mod turn;
pub mod vault;

pub use active_thought::{ActiveThought, ActiveThoughtSet, MAX_ACTIVE_THOUGHTS, NORMAL_PROMPT_THOUGHTS};
pub use core_memory::{CoreMemory, CoreMemoryCategory, CoreMemoryStore};
pub use curiosity::{
    Candidate, CuriosityCategory, CuriosityCooldown, CuriosityGoal, CuriosityLedger, CuriosityStatus,
    CuriosityThresholds, CuriosityWeights,
};
pub use growth_thread::{GrowthStage, GrowthThread, GrowthThreadStore};
pub use identity::IdentityKernel;
pub use index::{IndexCacheStats, IndexedEntry, MemoryIndex};
pub use intention::{Intention, IntentionLedger, IntentionStatus, IntentionType, TriggerType};
pub use long_term_memory::{
    LongTermMemory, LongTermMemoryStore, LongTermMemoryType, ScoreWeights, SearchHit,
    topic_warmth_score,
};
pub use manager::{EmbedFn, MemoryManager, MemoryStats};
pub use multi_sleep::{SpecialistRole, batch_memories, merge_insights};
pub use persisted_log::PersistedLog;
pub use schema::{MemoryEntry, MemoryTier, truncate_str};
pub use shared::AgentMemory;
pub use sleep::{AgenticSleepInsights, SleepSummary, parse_agentic_insights};
pub use turn::{ContextWindowManager, ConversationTurn, InputType, Session, TurnRole};
pub use vault::{VaultExportSummary, VaultFileStatus, check_vault_checksums};
