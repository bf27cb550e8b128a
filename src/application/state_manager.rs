//! StateManager - the composition root unifying all stores.
//!
//! One facade, two interchangeable backend families. Callers never branch
//! on deployment mode: backend selection happens once, lazily, inside the
//! manager. The manager is explicitly constructed and passed down by
//! whatever owns the process lifecycle — there is no hidden global, so
//! tests can run any number of independent instances.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, OnceCell};

use crate::adapters::memory::{
    MemoryConnectionRouter, MemoryEventBus, MemorySessionStore, MemoryWidgetStore,
};
use crate::adapters::redis::{
    KeySpace, RedisConnectionRouter, RedisEventBus, RedisSessionStore, RedisWidgetStore,
};
use crate::config::AppConfig;
use crate::domain::{
    widget_channel, ConnectionInfo, EventMessage, RolePermissions, SessionId, StoreError, UserId,
    UserSession, WidgetId, WidgetRecord, WorkerId,
};
use crate::ports::{ConnectionRouter, EventBus, EventStream, SessionStore, WidgetStore};

use super::callbacks::{Callback, CallbackRegistry, CallbackStats};
use super::local_queues::LocalDelivery;

struct Backends {
    widgets: Arc<dyn WidgetStore>,
    events: Arc<dyn EventBus>,
    connections: Arc<dyn ConnectionRouter>,
    sessions: Arc<dyn SessionStore>,
}

/// Composition root over widget, connection, session, event, and callback
/// state.
///
/// Backend construction is lazy and idempotent: the first store operation
/// builds the memory or Redis backends under the cell's lock; every later
/// call reuses them. Configuration is immutable after construction.
pub struct StateManager {
    config: AppConfig,
    worker_id: WorkerId,
    backends: OnceCell<Backends>,
    callbacks: CallbackRegistry,
    local: LocalDelivery,
}

impl StateManager {
    /// Creates a manager with a freshly generated worker id.
    pub fn new(config: AppConfig) -> Self {
        let capacity = config.state.event_queue_capacity;
        Self {
            worker_id: WorkerId::generate(),
            backends: OnceCell::new(),
            callbacks: CallbackRegistry::new(),
            local: LocalDelivery::new(capacity),
            config,
        }
    }

    /// Overrides the generated worker id (used by tests simulating a
    /// specific fleet member).
    pub fn with_worker_id(mut self, worker_id: WorkerId) -> Self {
        self.worker_id = worker_id;
        self
    }

    /// Stable per-process worker identifier.
    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Whether this manager runs against the shared Redis backends.
    pub fn deploy_mode(&self) -> bool {
        self.config.state.deploy_mode
    }

    async fn backends(&self) -> Result<&Backends, StoreError> {
        self.backends
            .get_or_try_init(|| self.build_backends())
            .await
    }

    async fn build_backends(&self) -> Result<Backends, StoreError> {
        let state = &self.config.state;
        let roles = RolePermissions::with_defaults(state.admin_implies_all);

        if state.deploy_mode {
            tracing::debug!(worker_id = %self.worker_id, "building redis backends");
            let client = redis::Client::open(self.config.redis.url.as_str())
                .map_err(StoreError::backend)?;
            let conn = client
                .get_multiplexed_tokio_connection()
                .await
                .map_err(StoreError::backend)?;
            let keys = KeySpace::new(&state.key_prefix);

            let sessions =
                RedisSessionStore::new(conn.clone(), keys.clone(), &roles).await?;

            Ok(Backends {
                widgets: Arc::new(RedisWidgetStore::new(
                    conn.clone(),
                    keys.clone(),
                    state.widget_ttl(),
                )),
                events: Arc::new(RedisEventBus::new(
                    client,
                    conn.clone(),
                    keys.clone(),
                    state.event_queue_capacity,
                )),
                connections: Arc::new(RedisConnectionRouter::new(
                    conn,
                    keys,
                    state.connection_ttl(),
                )),
                sessions: Arc::new(sessions),
            })
        } else {
            tracing::debug!(worker_id = %self.worker_id, "building memory backends");
            Ok(Backends {
                widgets: Arc::new(MemoryWidgetStore::new()),
                events: Arc::new(MemoryEventBus::new(state.event_queue_capacity)),
                connections: Arc::new(MemoryConnectionRouter::new(state.connection_ttl())),
                sessions: Arc::new(MemorySessionStore::new(roles)),
            })
        }
    }

    // === Widgets ===

    /// Registers (or replaces) a widget owned by this worker.
    pub async fn register_widget(
        &self,
        widget_id: WidgetId,
        html: impl Into<String> + Send,
        token: Option<String>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<(), StoreError> {
        let mut record =
            WidgetRecord::new(widget_id, html).with_owner(self.worker_id.clone());
        if let Some(token) = token {
            record = record.with_token(token);
        }
        if let Some(metadata) = metadata {
            record = record.with_metadata(metadata);
        }
        self.backends().await?.widgets.register(record).await
    }

    /// Full widget record.
    pub async fn get_widget(
        &self,
        widget_id: &WidgetId,
    ) -> Result<Option<WidgetRecord>, StoreError> {
        self.backends().await?.widgets.get(widget_id).await
    }

    /// Rendered document for a widget.
    pub async fn get_widget_html(
        &self,
        widget_id: &WidgetId,
    ) -> Result<Option<String>, StoreError> {
        self.backends().await?.widgets.get_html(widget_id).await
    }

    /// Connection token for a widget.
    pub async fn get_widget_token(
        &self,
        widget_id: &WidgetId,
    ) -> Result<Option<String>, StoreError> {
        self.backends().await?.widgets.get_token(widget_id).await
    }

    /// Whether a widget exists.
    pub async fn widget_exists(&self, widget_id: &WidgetId) -> Result<bool, StoreError> {
        self.backends().await?.widgets.exists(widget_id).await
    }

    /// Replaces a widget's document; `false` if the widget is missing.
    pub async fn update_widget_html(
        &self,
        widget_id: &WidgetId,
        html: &str,
    ) -> Result<bool, StoreError> {
        self.backends().await?.widgets.update_html(widget_id, html).await
    }

    /// Replaces a widget's token; `false` if the widget is missing.
    pub async fn update_widget_token(
        &self,
        widget_id: &WidgetId,
        token: &str,
    ) -> Result<bool, StoreError> {
        self.backends().await?.widgets.update_token(widget_id, token).await
    }

    /// Deletes a widget and drops its local callbacks.
    pub async fn delete_widget(&self, widget_id: &WidgetId) -> Result<bool, StoreError> {
        let removed = self.backends().await?.widgets.delete(widget_id).await?;
        self.callbacks.unregister_widget(widget_id);
        self.local.detach(widget_id).await;
        Ok(removed)
    }

    /// Ids of all active widgets.
    pub async fn list_active_widgets(&self) -> Result<Vec<WidgetId>, StoreError> {
        self.backends().await?.widgets.list_active().await
    }

    /// Number of active widgets.
    pub async fn widget_count(&self) -> Result<usize, StoreError> {
        self.backends().await?.widgets.count().await
    }

    // === Connections ===

    /// Records that this worker owns a widget's live connection.
    pub async fn register_connection(
        &self,
        widget_id: WidgetId,
        user_id: Option<UserId>,
        session_id: Option<SessionId>,
    ) -> Result<(), StoreError> {
        let mut info = ConnectionInfo::new(widget_id, self.worker_id.clone());
        if let Some(user_id) = user_id {
            info = info.with_user(user_id);
        }
        if let Some(session_id) = session_id {
            info = info.with_session(session_id);
        }
        self.backends().await?.connections.register_connection(info).await
    }

    /// Live connection record for a widget.
    pub async fn connection_info(
        &self,
        widget_id: &WidgetId,
    ) -> Result<Option<ConnectionInfo>, StoreError> {
        self.backends().await?.connections.get_connection_info(widget_id).await
    }

    /// Worker currently owning a widget's connection.
    pub async fn connection_owner(
        &self,
        widget_id: &WidgetId,
    ) -> Result<Option<WorkerId>, StoreError> {
        self.backends().await?.connections.get_owner(widget_id).await
    }

    /// Heartbeat refresh; `false` means the connection already expired and
    /// must be re-registered.
    pub async fn refresh_heartbeat(&self, widget_id: &WidgetId) -> Result<bool, StoreError> {
        self.backends().await?.connections.refresh_heartbeat(widget_id).await
    }

    /// Removes a widget's connection record and its local queue.
    pub async fn unregister_connection(&self, widget_id: &WidgetId) -> Result<bool, StoreError> {
        let removed = self
            .backends()
            .await?
            .connections
            .unregister_connection(widget_id)
            .await?;
        self.local.detach(widget_id).await;
        Ok(removed)
    }

    /// Widgets whose connections this worker currently owns.
    pub async fn list_own_connections(&self) -> Result<Vec<WidgetId>, StoreError> {
        self.backends()
            .await?
            .connections
            .list_worker_connections(&self.worker_id)
            .await
    }

    /// Attaches a local consumer (the duplex handler) for a widget.
    pub async fn attach_local(&self, widget_id: &WidgetId) -> broadcast::Receiver<EventMessage> {
        self.local.attach(widget_id).await
    }

    /// Detaches a widget's local queue once its consumer is gone.
    pub async fn detach_local(&self, widget_id: &WidgetId) {
        self.local.detach(widget_id).await;
    }

    // === Sessions ===

    /// Creates a session. Without an explicit TTL the configured default
    /// applies (a zero configured default means non-expiring).
    pub async fn create_session(
        &self,
        session_id: SessionId,
        user_id: UserId,
        roles: Vec<String>,
        ttl: Option<Duration>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<(), StoreError> {
        let mut session = UserSession::new(session_id, user_id).with_roles(roles);
        if let Some(ttl) = ttl.or_else(|| self.config.state.default_session_ttl()) {
            session = session.with_ttl(ttl);
        }
        if let Some(metadata) = metadata {
            session = session.with_metadata(metadata);
        }
        self.backends().await?.sessions.create_session(session).await
    }

    /// Fetches an unexpired session.
    pub async fn get_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<UserSession>, StoreError> {
        self.backends().await?.sessions.get_session(session_id).await
    }

    /// Whether a session exists and is unexpired.
    pub async fn validate_session(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        self.backends().await?.sessions.validate_session(session_id).await
    }

    /// Deletes a session; `false` if it did not exist.
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        self.backends().await?.sessions.delete_session(session_id).await
    }

    /// Extends a session's lifetime (original TTL when `extend_ttl` is
    /// `None`).
    pub async fn refresh_session(
        &self,
        session_id: &SessionId,
        extend_ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.backends()
            .await?
            .sessions
            .refresh_session(session_id, extend_ttl)
            .await
    }

    /// All live sessions for a user.
    pub async fn list_user_sessions(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<UserSession>, StoreError> {
        self.backends().await?.sessions.list_user_sessions(user_id).await
    }

    /// Resolves a permission for a session against a resource.
    pub async fn check_permission(
        &self,
        session_id: &SessionId,
        resource_type: &str,
        resource_id: &str,
        permission: &str,
    ) -> Result<bool, StoreError> {
        self.backends()
            .await?
            .sessions
            .check_permission(session_id, resource_type, resource_id, permission)
            .await
    }

    // === Callbacks ===

    /// Registers a handler for `(widget_id, event_type)` on this worker.
    pub fn register_callback(
        &self,
        widget_id: WidgetId,
        event_type: impl Into<String>,
        callback: Callback,
    ) {
        self.callbacks.register(widget_id, event_type, callback);
    }

    /// Whether a local handler exists for `(widget_id, event_type)`.
    pub fn has_callback(&self, widget_id: &WidgetId, event_type: &str) -> bool {
        self.callbacks.has_callback(widget_id, event_type)
    }

    /// Removes a handler.
    pub fn unregister_callback(&self, widget_id: &WidgetId, event_type: &str) -> bool {
        self.callbacks.unregister(widget_id, event_type)
    }

    /// Removes every handler for a widget.
    pub fn unregister_widget_callbacks(&self, widget_id: &WidgetId) -> usize {
        self.callbacks.unregister_widget(widget_id)
    }

    /// Event types with a local handler for the widget.
    pub fn list_widget_callbacks(&self, widget_id: &WidgetId) -> Vec<String> {
        self.callbacks.list_widget_events(widget_id)
    }

    /// Aggregate callback counters.
    pub fn callback_stats(&self) -> CallbackStats {
        self.callbacks.get_stats()
    }

    // === Events ===

    /// Builds and routes an event for a widget.
    ///
    /// Delivers to the local queue when a consumer is attached here; in
    /// deploy mode the event is also published on the widget's channel so
    /// peer workers see it.
    pub async fn broadcast_event(
        &self,
        widget_id: &WidgetId,
        event_type: &str,
        data: Value,
    ) -> Result<(), StoreError> {
        let event = EventMessage::new(
            event_type,
            widget_id.clone(),
            data,
            self.worker_id.clone(),
        );
        let delivered = self.local.try_deliver(&event).await;
        if self.deploy_mode() {
            self.backends()
                .await?
                .events
                .publish(&widget_channel(widget_id), event)
                .await?;
        } else if !delivered {
            tracing::debug!(widget_id = %widget_id, event_type, "no local consumer for event");
        }
        Ok(())
    }

    /// Routes a prebuilt event to whichever worker holds the widget's
    /// connection.
    ///
    /// The local queue is tried first; on a miss the event is published to
    /// the widget's channel for the owning worker to pick up. Returns
    /// `true` when delivery happened locally.
    pub async fn send_to_widget(
        &self,
        widget_id: &WidgetId,
        event: EventMessage,
    ) -> Result<bool, StoreError> {
        if self.local.try_deliver(&event).await {
            return Ok(true);
        }
        self.backends()
            .await?
            .events
            .publish(&widget_channel(widget_id), event)
            .await?;
        Ok(false)
    }

    /// Dispatches an inbound client event (click, input change, ...).
    ///
    /// A locally registered handler wins. Otherwise the event is
    /// republished toward the owning worker, which resolves and executes
    /// it against its own registry; the local report is then
    /// `(false, None)`.
    pub async fn dispatch_client_event(
        &self,
        widget_id: &WidgetId,
        event_type: &str,
        data: Value,
    ) -> Result<(bool, Option<Value>), StoreError> {
        if self.callbacks.has_callback(widget_id, event_type) {
            return Ok(self.callbacks.invoke(widget_id, event_type, data).await);
        }

        let backends = self.backends().await?;
        let mut event = EventMessage::new(
            event_type,
            widget_id.clone(),
            data,
            self.worker_id.clone(),
        );
        match backends.connections.get_owner(widget_id).await? {
            // Owned here, but nothing is registered: there is no handler
            // to find anywhere else either.
            Some(owner) if owner == self.worker_id => return Ok((false, None)),
            Some(owner) => event = event.with_target(owner),
            None => {}
        }
        backends
            .events
            .publish(&widget_channel(widget_id), event)
            .await?;
        Ok((false, None))
    }

    /// Handles an event received from a bus subscription.
    ///
    /// Events addressed at other workers are ignored. A matching local
    /// handler runs; otherwise the event is forwarded to the widget's
    /// local queue.
    pub async fn handle_bus_event(&self, event: EventMessage) -> (bool, Option<Value>) {
        if !event.is_for_worker(&self.worker_id) {
            return (false, None);
        }
        if self
            .callbacks
            .has_callback(&event.widget_id, &event.event_type)
        {
            return self
                .callbacks
                .invoke(&event.widget_id, &event.event_type, event.data.clone())
                .await;
        }
        let delivered = self.local.try_deliver(&event).await;
        (delivered, None)
    }

    /// Subscribes to a widget's channel.
    pub async fn subscribe_widget(&self, widget_id: &WidgetId) -> Result<EventStream, StoreError> {
        self.subscribe_channel(&widget_channel(widget_id)).await
    }

    /// Subscribes to an arbitrary channel.
    pub async fn subscribe_channel(&self, channel: &str) -> Result<EventStream, StoreError> {
        self.backends().await?.events.subscribe(channel).await
    }

    /// Ends this worker's subscriptions to a channel (best-effort).
    pub async fn unsubscribe_channel(&self, channel: &str) -> Result<(), StoreError> {
        self.backends().await?.events.unsubscribe(channel).await
    }

    // === Shutdown ===

    /// Graceful local cleanup on process termination.
    ///
    /// Unregisters every connection this worker owns, notifies each
    /// widget's channel so peers observe the closure, cancels the
    /// matching subscriptions, and closes the local queues. Backend
    /// records for widgets and sessions are left alone — they expire
    /// naturally or belong to other workers.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        let backends = self.backends().await?;
        let owned = backends
            .connections
            .list_worker_connections(&self.worker_id)
            .await?;

        tracing::debug!(
            worker_id = %self.worker_id,
            connections = owned.len(),
            "shutting down"
        );

        for widget_id in &owned {
            backends.connections.unregister_connection(widget_id).await?;

            if self.deploy_mode() {
                let notice = EventMessage::new(
                    "connection.closed",
                    widget_id.clone(),
                    json!({ "reason": "worker_shutdown" }),
                    self.worker_id.clone(),
                );
                // Best-effort: peers that miss this still see the TTL lapse.
                if let Err(err) = backends
                    .events
                    .publish(&widget_channel(widget_id), notice)
                    .await
                {
                    tracing::warn!(widget_id = %widget_id, %err, "shutdown notice failed");
                }
            }

            backends
                .events
                .unsubscribe(&widget_channel(widget_id))
                .await?;
        }

        self.local.clear().await;
        Ok(())
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("worker_id", &self.worker_id)
            .field("deploy_mode", &self.deploy_mode())
            .finish_non_exhaustive()
    }
}
