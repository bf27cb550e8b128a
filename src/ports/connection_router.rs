//! ConnectionRouter port - tracks which worker owns each live connection.

use async_trait::async_trait;

use crate::domain::{ConnectionInfo, StoreError, WidgetId, WorkerId};

/// Port for connection-ownership routing.
///
/// For a given widget there is at most one live connection record; a new
/// registration supersedes (last-registered wins) and the superseded
/// worker's membership set loses the widget. The router never closes the
/// superseded connection itself — the caller does, once it observes the
/// overwrite. Records are heartbeat-refreshed and expire by TTL, so a
/// crashed worker's connections disappear without cleanup.
#[async_trait]
pub trait ConnectionRouter: Send + Sync {
    /// Records that `info.worker_id` now owns `info.widget_id`'s connection.
    async fn register_connection(&self, info: ConnectionInfo) -> Result<(), StoreError>;

    /// Fetches the live connection record for a widget.
    async fn get_connection_info(
        &self,
        widget_id: &WidgetId,
    ) -> Result<Option<ConnectionInfo>, StoreError>;

    /// The worker currently owning the widget's connection.
    async fn get_owner(&self, widget_id: &WidgetId) -> Result<Option<WorkerId>, StoreError>;

    /// Refreshes the heartbeat timestamp and resets the TTL.
    ///
    /// Returns `false` when the connection already expired — the caller
    /// should re-register rather than keep heartbeating a ghost.
    async fn refresh_heartbeat(&self, widget_id: &WidgetId) -> Result<bool, StoreError>;

    /// Removes the connection record; `false` if none existed.
    async fn unregister_connection(&self, widget_id: &WidgetId) -> Result<bool, StoreError>;

    /// Widgets whose live connection the given worker currently owns.
    ///
    /// Used on shutdown to enumerate and gracefully close everything the
    /// worker holds.
    async fn list_worker_connections(
        &self,
        worker_id: &WorkerId,
    ) -> Result<Vec<WidgetId>, StoreError>;
}
