//! The deferred-retry controller (§4.8): a single-slot one-shot timer armed
//! when a turn fails with `both_models_unavailable`. A new user event
//! cancels whatever is pending.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;

use crate::events::{EventSender, EventSource};

struct Armed {
    /// Bumped on every `arm`/`cancel` so a timer that fires after having
    /// been superseded can tell it's stale and no-op instead of replaying
    /// an old retry.
    generation: u64,
}

pub struct DeferredRetryController {
    slot: Arc<Mutex<Option<Armed>>>,
    generation: Arc<AtomicU64>,
    delay: Duration,
    events: EventSender,
}

impl DeferredRetryController {
    pub fn new(events: EventSender, delay: Duration) -> Self {
        Self { slot: Arc::new(Mutex::new(None)), generation: Arc::new(AtomicU64::new(0)), delay, events }
    }

    /// Arms the controller with `original_input`/`source`; any previously
    /// armed retry is superseded.
    pub async fn arm(&self, original_input: String, source: EventSource) {
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.slot.lock().await = Some(Armed { generation: my_generation });

        let slot = self.slot.clone();
        let generation = self.generation.clone();
        let events = self.events.clone();
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let mut guard = slot.lock().await;
            let still_current = matches!(&*guard, Some(armed) if armed.generation == my_generation)
                && generation.load(Ordering::SeqCst) == my_generation;
            if !still_current {
                return;
            }
            *guard = None;
            drop(guard);

            if events.is_busy() {
                info!("deferred retry timer fired while executor busy; discarding");
                return;
            }

            if !events.submit_deferred_retry(original_input, source) {
                info!("deferred retry could not be submitted (executor went busy between check and send)");
            }
        });
    }

    /// Cancels any pending retry. Any user-originated event calls this.
    pub async fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.slot.lock().await = None;
    }
}
