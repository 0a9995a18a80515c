use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::BackendEvent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub bot_name: String,
    pub provider: String,
    pub model: String,
    pub thinking_level: String,
    /// Total conversation turns persisted in the context window log.
    pub memory_total: usize,
    /// Core memory entries (identity/narrative/relationship/preference/fact).
    pub memory_core: usize,
    /// Active thoughts currently held.
    pub memory_user_profile: usize,
    /// Active + dormant growth threads.
    pub memory_reflective: usize,
    /// Long-term factual memories.
    pub memory_semantic: usize,
    /// Long-term episodic memories.
    pub memory_episodic: usize,
    pub uptime_secs: u64,
    pub available_tools: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientCommand {
    SubmitTurn { user: String, source: String },
    GetStatus,
    /// Returns the most recent conversation turns (content only).
    GetMemoryPeek { limit: usize },
    ExecuteTool { name: String, args: HashMap<String, String> },
    ListTools,
    ReloadConfig,
    Shutdown,
    Ping,
    /// Open a persistent connection that receives broadcast events from all turns.
    Subscribe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerEvent {
    Backend(BackendEvent),
    Status(DaemonStatus),
    MemoryPeek(Vec<String>),
    ToolList(Vec<aigent_tools::ToolSpec>),
    ToolResult { success: bool, output: String },
    Ack(String),
}
