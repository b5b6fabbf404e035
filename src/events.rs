//! Lifecycle notifications
//!
//! Observers register with `EventBus::subscribe` and receive every event
//! emitted after that point, in emission order. Dropped receivers are pruned
//! on the next emit.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Persister paused; producers should stop sending
    Paused,
    /// Persister resumed; producers may send again
    Drain,
    /// No more writes will be accepted
    Ended,
    /// Emitted right after `Ended`
    Closed,
    /// `flush()` was called
    Flush,
    /// A store or index write failed on the writer task
    StoreFailed { key: String, error: String },
}

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<LifecycleEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<LifecycleEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: LifecycleEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Drain whatever events are already queued on a receiver
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
