//! In-memory event bus with per-subscriber bounded queues.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::domain::{EventMessage, StoreError};
use crate::ports::{EventBus, EventStream};

/// Default per-subscriber queue capacity.
const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// Single-process publish/subscribe fan-out.
///
/// Each subscriber gets its own bounded queue. A full queue drops the
/// newest message instead of blocking the publisher — events are advisory
/// UI updates, and a slow consumer must not stall everyone else.
pub struct MemoryEventBus {
    channels: Mutex<HashMap<String, Vec<mpsc::Sender<EventMessage>>>>,
    queue_capacity: usize,
}

impl MemoryEventBus {
    /// Creates a bus with the given per-subscriber queue capacity.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Creates a bus with the default capacity (128 messages).
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }

    /// Number of live subscribers on a channel (for tests/monitoring).
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .await
            .get(channel)
            .map(|senders| senders.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, channel: &str, event: EventMessage) -> Result<(), StoreError> {
        let mut channels = self.channels.lock().await;

        let Some(senders) = channels.get_mut(channel) else {
            // No subscribers: fire-and-forget means this is a no-op.
            return Ok(());
        };

        senders.retain(|sender| !sender.is_closed());

        for sender in senders.iter() {
            match sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        channel,
                        event_type = %event.event_type,
                        "subscriber queue full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        if senders.is_empty() {
            channels.remove(channel);
        }

        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<EventStream, StoreError> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        self.channels
            .lock()
            .await
            .entry(channel.to_string())
            .or_default()
            .push(tx);

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), StoreError> {
        // Dropping the senders closes every subscriber stream on the channel.
        self.channels.lock().await.remove(channel);
        Ok(())
    }
}
