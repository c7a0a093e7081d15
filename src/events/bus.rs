//! Broadcast event bus
//!
//! Emitting never blocks: with no subscribers an event is dropped, and a
//! subscriber that falls behind loses the oldest events.

use super::ExperimentEvent;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default capacity for the event bus channel
pub const DEFAULT_CAPACITY: usize = 1024;

/// Cloneable handle to a shared broadcast channel of [`ExperimentEvent`]s
///
/// # Example
///
/// ```rust,ignore
/// use introspection::events::{EventBus, ExperimentEvent};
///
/// let bus = EventBus::new(1024);
/// let mut rx = bus.subscribe();
/// bus.emit(ExperimentEvent::stage_started("study2", 12));
/// let event = rx.recv().await?;
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ExperimentEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Fire-and-forget
    pub fn emit(&self, event: ExperimentEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ExperimentEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
