//! The model client and tool-loop driver (§4.5, §4.6): the part of the
//! runtime that actually talks to an LLM and drives it through zero or more
//! tool-execution passes to a terminal response.
//!
//! Kept as its own crate so `aigent-agent` (the turn executor) can stay
//! focused on event scheduling and persistence while this crate owns the
//! request/response state machine.

pub mod model_client;
pub mod tool_loop;
pub mod turn_context;

pub use model_client::{ErrorClass, ModelClient, ModelTask, RoutedCallResult, TaskModels, classify_error, is_transient};
pub use tool_loop::{ToolExecution, ToolLoopConfig, ToolLoopOutcome, run_tool_loop};
pub use turn_context::{Clarification, TurnContext};
