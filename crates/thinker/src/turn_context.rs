//! The per-turn builder context — a typed side-channel shared between the
//! prompt assembler's context sources and the tool-loop driver, replacing
//! the free-form `session_context` dict pattern from the source system.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// An option the UI should render as a clickable choice, requested by the
/// agent via `request_clarification`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clarification {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TurnContext {
    pub is_pulse: bool,
    pub is_session_start: bool,
    /// Stashed by the semantic-memory prompt source; consumed by the
    /// executor to prepend to the last message's content rather than the
    /// system prompt.
    pub relevant_memories: Option<String>,
    /// Set by `set_pulse_interval` mid-loop; applied by the executor only
    /// after the turn completes.
    pub pulse_interval_change: Option<u64>,
    pub clarification: Option<Clarification>,
    /// Count of active thoughts at prompt-assembly time, stashed for
    /// sources/telemetry that want it without re-querying the store.
    pub active_thoughts_count: usize,
    /// Cooperative cancellation flag polled inside the streaming loop.
    pub cancelled: Arc<AtomicBool>,
    /// Set when the initial pass failed with a web_fetch domain-blocked
    /// error and the single allowed retry has already been spent.
    pub web_fetch_retry_used: bool,
}

impl TurnContext {
    pub fn new(is_pulse: bool, is_session_start: bool) -> Self {
        Self {
            is_pulse,
            is_session_start,
            relevant_memories: None,
            pulse_interval_change: None,
            clarification: None,
            active_thoughts_count: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
            web_fetch_retry_used: false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}
