//! EventBus port - publish/subscribe fan-out of events on named channels.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::{EventMessage, StoreError};

/// Stream of events delivered to one subscriber.
///
/// Lives until dropped or until `unsubscribe` closes the channel;
/// consumption suspends between messages indefinitely.
pub type EventStream = BoxStream<'static, EventMessage>;

/// Port for the cross-worker event bus.
///
/// Delivery semantics are fire-and-forget, at-least-once to *currently
/// connected* subscribers only — a subscriber that was not listening when
/// `publish` occurred never sees that message. Channels follow the
/// `widget:{widget_id}` convention for per-widget routing; callers may
/// define other namespaces.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes an event on a channel.
    ///
    /// Returns once the backend accepted the message; does not wait for
    /// any subscriber to consume it.
    async fn publish(&self, channel: &str, event: EventMessage) -> Result<(), StoreError>;

    /// Subscribes to a channel, returning a stream of its events.
    ///
    /// Each call creates an independent subscription; dropping the stream
    /// ends it.
    async fn subscribe(&self, channel: &str) -> Result<EventStream, StoreError>;

    /// Ends all of this bus instance's subscriptions to a channel.
    ///
    /// Best-effort: subscriptions are owned by their stream's lifetime,
    /// and a stream already handed out may observe a few more messages
    /// before closing.
    async fn unsubscribe(&self, channel: &str) -> Result<(), StoreError>;
}
