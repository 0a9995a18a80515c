//! The reminder scheduler (§4.7): periodically scans the intention ledger
//! for due reminders/goals and posts a reminder-pulse event. Cannot fire
//! while the executor is busy; the next scan just retries.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use aigent_memory::AgentMemory;

use crate::events::EventSender;

pub struct ReminderScheduler {
    memory: Arc<Mutex<AgentMemory>>,
    events: EventSender,
    poll_interval: Duration,
}

impl ReminderScheduler {
    pub fn new(memory: Arc<Mutex<AgentMemory>>, events: EventSender, poll_interval: Duration) -> Self {
        Self { memory, events, poll_interval }
    }

    /// Spawns the scan loop. `is_session_start` should be true for exactly
    /// the first scan of a process lifetime so `next_session`-triggered
    /// intentions fire once at startup.
    ///
    /// Unlike the pulse timer, a reminder batch the executor can't accept
    /// right now is *deferred*, not dropped: `scan_due` already flipped those
    /// intentions out of `pending` into `triggered`, so if the submission
    /// were simply discarded they'd never be re-scanned and the reminder
    /// would silently vanish. Instead the un-submitted batch is carried
    /// forward and retried — merged with any newly-due intentions — on the
    /// next tick, until the executor is free to accept it.
    pub fn spawn(self, mut is_session_start: bool) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut pending_batch: Vec<uuid::Uuid> = Vec::new();
            loop {
                let newly_due = {
                    let mut mem = self.memory.lock().await;
                    match mem.intentions.scan_due(Utc::now(), is_session_start).await {
                        Ok(ids) => ids,
                        Err(err) => {
                            warn!(error = %err, "reminder scan failed");
                            Vec::new()
                        }
                    }
                };
                is_session_start = false;
                pending_batch.extend(newly_due);

                if !pending_batch.is_empty() {
                    if self.events.submit_reminder(pending_batch.clone()) {
                        pending_batch.clear();
                    } else {
                        debug!(count = pending_batch.len(), "reminder batch deferred, executor busy; retrying next scan");
                    }
                }

                tokio::time::sleep(self.poll_interval).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aigent_memory::{AgentMemory, IntentionStatus, IntentionType, TriggerType};
    use tempfile::tempdir;

    #[tokio::test]
    async fn deferred_batch_is_retried_not_dropped_when_executor_busy() {
        let dir = tempdir().unwrap();
        let mut memory = AgentMemory::new(dir.path(), 30, 45);
        memory.load().unwrap();
        let now = Utc::now();
        memory
            .intentions
            .create(IntentionType::Reminder, "call mom", "", TriggerType::Time, Some(now - chrono::Duration::minutes(1)), 5)
            .await
            .unwrap();
        let memory = Arc::new(Mutex::new(memory));

        let (events, mut rx, busy) = crate::events::channel();
        busy.store(true, std::sync::atomic::Ordering::SeqCst);

        let scheduler = ReminderScheduler::new(memory.clone(), events, Duration::from_millis(5));
        let handle = scheduler.spawn(false);

        // First couple of ticks: executor stays busy, intention already
        // flipped to `triggered` but the reminder-pulse event never got in.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err(), "no reminder event should have been delivered while busy");
        {
            let mem = memory.lock().await;
            assert_eq!(mem.intentions.list(Some(IntentionStatus::Triggered)).len(), 1);
        }

        // Once the executor frees up, the next scan must still deliver the
        // deferred batch — it must not have been silently discarded.
        busy.store(false, std::sync::atomic::Ordering::SeqCst);
        let event = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await.expect("reminder eventually delivered").unwrap();
        match event {
            crate::events::InboundEvent::Reminder { intention_ids } => assert_eq!(intention_ids.len(), 1),
            other => panic!("expected a Reminder event, got {other:?}"),
        }

        handle.abort();
    }
}
