//! In-memory connection router with lazy TTL expiry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::{ConnectionInfo, StoreError, Timestamp, WidgetId, WorkerId};
use crate::ports::ConnectionRouter;

/// Default connection TTL when none is configured.
const DEFAULT_CONNECTION_TTL: Duration = Duration::from_secs(90);

/// Single-process connection-ownership tracker.
///
/// There is no reaper task: expiry is lazy. Every read path treats a
/// record whose `last_heartbeat + ttl` has passed as absent and removes
/// it, so a crashed caller's connection disappears on next observation.
pub struct MemoryConnectionRouter {
    connections: Mutex<HashMap<WidgetId, ConnectionInfo>>,
    ttl: Duration,
}

impl MemoryConnectionRouter {
    /// Creates a router with the given connection TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Creates a router with the default TTL (90 seconds).
    pub fn with_default_ttl() -> Self {
        Self::new(DEFAULT_CONNECTION_TTL)
    }
}

impl Default for MemoryConnectionRouter {
    fn default() -> Self {
        Self::with_default_ttl()
    }
}

#[async_trait]
impl ConnectionRouter for MemoryConnectionRouter {
    async fn register_connection(&self, info: ConnectionInfo) -> Result<(), StoreError> {
        let mut connections = self.connections.lock().await;
        if let Some(previous) = connections.get(&info.widget_id) {
            tracing::debug!(
                widget_id = %info.widget_id,
                previous_worker = %previous.worker_id,
                new_worker = %info.worker_id,
                "connection superseded"
            );
        }
        connections.insert(info.widget_id.clone(), info);
        Ok(())
    }

    async fn get_connection_info(
        &self,
        widget_id: &WidgetId,
    ) -> Result<Option<ConnectionInfo>, StoreError> {
        let mut connections = self.connections.lock().await;
        let now = Timestamp::now();

        let stale = match connections.get(widget_id) {
            Some(info) => info.is_stale(self.ttl, &now),
            None => return Ok(None),
        };
        if stale {
            connections.remove(widget_id);
            return Ok(None);
        }
        Ok(connections.get(widget_id).cloned())
    }

    async fn get_owner(&self, widget_id: &WidgetId) -> Result<Option<WorkerId>, StoreError> {
        Ok(self
            .get_connection_info(widget_id)
            .await?
            .map(|info| info.worker_id))
    }

    async fn refresh_heartbeat(&self, widget_id: &WidgetId) -> Result<bool, StoreError> {
        let mut connections = self.connections.lock().await;
        let now = Timestamp::now();

        let stale = match connections.get(widget_id) {
            Some(info) => info.is_stale(self.ttl, &now),
            None => return Ok(false),
        };
        if stale {
            connections.remove(widget_id);
            return Ok(false);
        }
        if let Some(info) = connections.get_mut(widget_id) {
            info.touch();
        }
        Ok(true)
    }

    async fn unregister_connection(&self, widget_id: &WidgetId) -> Result<bool, StoreError> {
        Ok(self.connections.lock().await.remove(widget_id).is_some())
    }

    async fn list_worker_connections(
        &self,
        worker_id: &WorkerId,
    ) -> Result<Vec<WidgetId>, StoreError> {
        let mut connections = self.connections.lock().await;
        let now = Timestamp::now();

        connections.retain(|_, info| !info.is_stale(self.ttl, &now));

        Ok(connections
            .values()
            .filter(|info| &info.worker_id == worker_id)
            .map(|info| info.widget_id.clone())
            .collect())
    }
}
