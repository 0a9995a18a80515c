//! Inbound events the turn executor services in FIFO order (§4.1, §5).

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Where a user-originated event came from, so the executor knows how (and
/// whether) to route the final text back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    Local,
    Telegram,
}

#[derive(Debug)]
pub enum InboundEvent {
    User { text: String, image: Option<String>, source: EventSource, reply: Option<oneshot::Sender<String>> },
    Pulse,
    Reminder { intention_ids: Vec<Uuid> },
    /// Posted by the deferred-retry controller (§4.8) once its timer fires
    /// and the executor is free.
    DeferredRetry { original_input: String, source: EventSource },
}

/// A cheap, cloneable front door onto the executor's event queue. Every
/// `submit_*` method matches the public contract in §4.1 one-for-one.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<InboundEvent>,
    busy: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

/// Creates a fresh event queue: a sender front door plus the receiver the
/// executor drains, sharing one busy flag between them so `submit_pulse`
/// and `submit_reminder` can see the executor's current state without a
/// round trip through the channel.
pub fn channel() -> (EventSender, mpsc::UnboundedReceiver<InboundEvent>, std::sync::Arc<std::sync::atomic::AtomicBool>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let busy = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    (EventSender::new(tx, busy.clone()), rx, busy)
}

impl EventSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<InboundEvent>, busy: std::sync::Arc<std::sync::atomic::AtomicBool>) -> Self {
        Self { tx, busy }
    }

    pub fn submit_user(&self, text: impl Into<String>, image: Option<String>) {
        let _ = self.tx.send(InboundEvent::User { text: text.into(), image, source: EventSource::Local, reply: None });
    }

    /// Like `submit_user` but returns a one-shot receiver for the assistant's
    /// final text, for callers (e.g. a CLI) that want the response inline
    /// rather than via a separate event stream.
    pub fn submit_user_awaiting_reply(&self, text: impl Into<String>, image: Option<String>) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(InboundEvent::User { text: text.into(), image, source: EventSource::Local, reply: Some(tx) });
        rx
    }

    pub fn submit_telegram_inbound(&self, text: impl Into<String>) {
        let _ = self.tx.send(InboundEvent::User { text: text.into(), image: None, source: EventSource::Telegram, reply: None });
    }

    /// Dropped if the executor is currently busy, per §4.1's event discipline.
    pub fn submit_pulse(&self) -> bool {
        if self.busy.load(std::sync::atomic::Ordering::SeqCst) {
            return false;
        }
        self.tx.send(InboundEvent::Pulse).is_ok()
    }

    pub fn submit_reminder(&self, triggered_intentions: Vec<Uuid>) -> bool {
        if self.busy.load(std::sync::atomic::Ordering::SeqCst) {
            return false;
        }
        self.tx.send(InboundEvent::Reminder { intention_ids: triggered_intentions }).is_ok()
    }

    pub(crate) fn submit_deferred_retry(&self, original_input: String, source: EventSource) -> bool {
        if self.busy.load(std::sync::atomic::Ordering::SeqCst) {
            return false;
        }
        self.tx.send(InboundEvent::DeferredRetry { original_input, source }).is_ok()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(std::sync::atomic::Ordering::SeqCst)
    }
}
