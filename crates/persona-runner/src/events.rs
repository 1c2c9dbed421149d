//! In-process fan-out of run events.
//!
//! Publishing never blocks: a subscriber whose queue is full misses the
//! event, and closed subscribers are pruned on the next publish.

use std::sync::Mutex;

use persona_core::events::RunEvent;
use tokio::sync::mpsc;

pub const SUBSCRIBER_CAPACITY: usize = 500;

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::Sender<RunEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<RunEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map_or(0, |s| s.len())
    }

    pub fn publish(&self, event: RunEvent) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!(
                    event = event.event_type.as_str(),
                    "subscriber queue full, dropping event"
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}
