//! Event message envelope and channel naming.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::foundation::{MessageId, Timestamp, WidgetId, WorkerId};

/// Returns the per-widget routing channel name: `widget:{widget_id}`.
pub fn widget_channel(widget_id: &WidgetId) -> String {
    format!("widget:{}", widget_id)
}

/// One event published on the bus.
///
/// Immutable once created. Delivery is fire-and-forget, at-least-once to
/// currently connected subscribers — there is no replay, and no ordering
/// guarantee across channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Event kind, e.g. `click`, `value_change`, `worker.shutdown`.
    pub event_type: String,

    /// Widget the event concerns.
    pub widget_id: WidgetId,

    /// Open payload.
    pub data: Value,

    /// Worker that published the event.
    pub source_worker_id: WorkerId,

    /// Worker the event is addressed to, when routed at a specific owner.
    pub target_worker_id: Option<WorkerId>,

    /// When the event was published.
    pub timestamp: Timestamp,

    /// Unique id for dedup/tracing.
    pub message_id: MessageId,
}

impl EventMessage {
    /// Creates an event published by `source` for `widget_id`.
    pub fn new(
        event_type: impl Into<String>,
        widget_id: WidgetId,
        data: Value,
        source_worker_id: WorkerId,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            widget_id,
            data,
            source_worker_id,
            target_worker_id: None,
            timestamp: Timestamp::now(),
            message_id: MessageId::new(),
        }
    }

    /// Addresses the event at a specific worker.
    pub fn with_target(mut self, worker_id: WorkerId) -> Self {
        self.target_worker_id = Some(worker_id);
        self
    }

    /// Whether this event is addressed at the given worker (or broadcast).
    pub fn is_for_worker(&self, worker_id: &WorkerId) -> bool {
        match &self.target_worker_id {
            Some(target) => target == worker_id,
            None => true,
        }
    }
}
