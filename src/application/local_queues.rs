//! Per-widget local delivery queues.
//!
//! When a widget's live connection terminates on this worker, its duplex
//! handler attaches here and receives events without a round trip through
//! the backend. The composition root tries these queues first and falls
//! back to the event bus for widgets owned elsewhere.

use std::collections::HashMap;

use tokio::sync::{broadcast, RwLock};

use crate::domain::{EventMessage, WidgetId};

/// Manages per-widget broadcast queues for locally connected widgets.
///
/// # Thread Safety
///
/// Uses `RwLock` for the queue registry since deliveries (reads) vastly
/// outnumber attach/detach (writes).
pub struct LocalDelivery {
    /// Map of widget_id → broadcast sender for that widget's events.
    queues: RwLock<HashMap<WidgetId, broadcast::Sender<EventMessage>>>,

    /// Channel capacity for each widget's broadcast channel.
    channel_capacity: usize,
}

impl LocalDelivery {
    /// Creates a delivery map with the given per-widget channel capacity.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Attaches a local consumer for a widget's events.
    ///
    /// The queue is created on first attach; multiple attachments (e.g. a
    /// reconnecting browser racing its predecessor) each get the full
    /// fan-out.
    pub async fn attach(&self, widget_id: &WidgetId) -> broadcast::Receiver<EventMessage> {
        let mut queues = self.queues.write().await;
        let sender = queues.entry(widget_id.clone()).or_insert_with(|| {
            let (tx, _) = broadcast::channel(self.channel_capacity);
            tx
        });
        sender.subscribe()
    }

    /// Drops a widget's queue once no receivers remain.
    pub async fn detach(&self, widget_id: &WidgetId) {
        let mut queues = self.queues.write().await;
        if let Some(sender) = queues.get(widget_id) {
            if sender.receiver_count() == 0 {
                queues.remove(widget_id);
            }
        }
    }

    /// Delivers an event to the widget's local queue, if anyone listens.
    ///
    /// Returns `true` when at least one local consumer received it.
    pub async fn try_deliver(&self, event: &EventMessage) -> bool {
        let queues = self.queues.read().await;
        match queues.get(&event.widget_id) {
            Some(sender) => sender.send(event.clone()).is_ok(),
            None => false,
        }
    }

    /// Whether a local consumer is attached for the widget.
    pub async fn has_listener(&self, widget_id: &WidgetId) -> bool {
        let queues = self.queues.read().await;
        queues
            .get(widget_id)
            .map(|s| s.receiver_count() > 0)
            .unwrap_or(false)
    }

    /// Widgets with a local queue (for monitoring/shutdown).
    pub async fn attached_widgets(&self) -> Vec<WidgetId> {
        self.queues.read().await.keys().cloned().collect()
    }

    /// Drops every queue, closing all attached receivers.
    pub async fn clear(&self) {
        self.queues.write().await.clear();
    }
}

impl Default for LocalDelivery {
    fn default() -> Self {
        Self::new(128)
    }
}
