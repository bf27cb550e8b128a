//! Redis pub/sub event bus.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::domain::{EventMessage, StoreError};
use crate::ports::{EventBus, EventStream};

use super::keys::KeySpace;

/// Cross-worker event bus over Redis pub/sub.
///
/// Publishing goes through the shared multiplexed connection; each
/// subscription runs a dedicated pub/sub connection in a forwarding task
/// that decodes payloads into `EventMessage`s. Messages that fail to
/// decode are logged and skipped. A full subscriber queue drops the
/// newest message rather than blocking the forwarder.
///
/// `unsubscribe` aborts the forwarding tasks this instance opened for a
/// channel; it is best-effort — a stream already handed out may observe a
/// few more buffered messages before closing.
pub struct RedisEventBus {
    client: redis::Client,
    conn: MultiplexedConnection,
    keys: KeySpace,
    queue_capacity: usize,
    subscriptions: Mutex<HashMap<String, Vec<JoinHandle<()>>>>,
}

impl RedisEventBus {
    /// Creates a bus over an established connection.
    ///
    /// The client is kept to open one dedicated connection per
    /// subscription, since a connection in subscriber mode cannot issue
    /// regular commands.
    pub fn new(
        client: redis::Client,
        conn: MultiplexedConnection,
        keys: KeySpace,
        queue_capacity: usize,
    ) -> Self {
        Self {
            client,
            conn,
            keys,
            queue_capacity: queue_capacity.max(1),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, channel: &str, event: EventMessage) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&event)?;
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(self.keys.channel(channel), payload)
            .await
            .map_err(StoreError::backend)
    }

    async fn subscribe(&self, channel: &str) -> Result<EventStream, StoreError> {
        let full_channel = self.keys.channel(channel);

        let pubsub_conn = self
            .client
            .get_async_connection()
            .await
            .map_err(StoreError::backend)?;
        let mut pubsub = pubsub_conn.into_pubsub();
        pubsub
            .subscribe(&full_channel)
            .await
            .map_err(StoreError::backend)?;

        let (tx, rx) = mpsc::channel::<EventMessage>(self.queue_capacity);
        let channel_name = channel.to_string();

        let handle = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::warn!(channel = %channel_name, %err, "unreadable pub/sub payload");
                        continue;
                    }
                };
                let event: EventMessage = match serde_json::from_str(&payload) {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(channel = %channel_name, %err, "malformed event payload, skipping");
                        continue;
                    }
                };
                match tx.try_send(event) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(channel = %channel_name, "subscriber queue full, dropping event");
                    }
                    // Subscriber stream dropped; end the forwarding task,
                    // which also tears down the pub/sub connection.
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });

        self.subscriptions
            .lock()
            .await
            .entry(channel.to_string())
            .or_default()
            .push(handle);

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(Box::pin(stream))
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), StoreError> {
        if let Some(handles) = self.subscriptions.lock().await.remove(channel) {
            for handle in handles {
                handle.abort();
            }
        }
        Ok(())
    }
}

impl Drop for RedisEventBus {
    fn drop(&mut self) {
        // Forwarding tasks hold no references back to the bus; abort them
        // so dropped buses do not leak subscriber connections.
        if let Ok(subscriptions) = self.subscriptions.try_lock() {
            for handles in subscriptions.values() {
                for handle in handles {
                    handle.abort();
                }
            }
        }
    }
}

impl std::fmt::Debug for RedisEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisEventBus")
            .field("keys", &self.keys)
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    // Pub/sub behavior requires a running Redis instance; see the
    // #[ignore] tests in tests/redis_backend.rs.
}
