//! The turn executor and its three autonomous drivers (§4.1, §4.7, §4.8):
//! the part of the runtime that turns a memory store, a model client, and a
//! tool registry into a single serialized conversational loop.
//!
//! `aigent-runtime` owns process wiring (config load, daemon/CLI/TUI
//! surfaces); this crate owns the scheduler itself so it can be exercised
//! in isolation from any particular front end.

pub mod deferred_retry;
pub mod events;
pub mod executor;
pub mod extractor;
pub mod pulse;
pub mod reminders;

pub use deferred_retry::DeferredRetryController;
pub use events::{EventSender, EventSource, InboundEvent};
pub use executor::{ExecutorEvent, ModelRouting, TurnExecutor};
pub use pulse::PulseTimer;
pub use reminders::ReminderScheduler;
