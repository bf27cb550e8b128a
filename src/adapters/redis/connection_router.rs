//! Redis-backed connection router.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::{
    ConnectionInfo, SessionId, StoreError, Timestamp, UserId, WidgetId, WorkerId,
};
use crate::ports::ConnectionRouter;

use super::keys::KeySpace;

/// Connection-ownership tracking shared across workers.
///
/// One TTL-bound hash per widget connection plus a per-worker membership
/// set. Heartbeats reset the TTL, so a crashed worker's connections
/// disappear on their own; its membership set is healed lazily by
/// `list_worker_connections`.
#[derive(Clone)]
pub struct RedisConnectionRouter {
    conn: MultiplexedConnection,
    keys: KeySpace,
    ttl: Duration,
}

impl RedisConnectionRouter {
    /// Creates a router over an established connection.
    pub fn new(conn: MultiplexedConnection, keys: KeySpace, ttl: Duration) -> Self {
        Self { conn, keys, ttl }
    }

    fn ttl_secs(&self) -> i64 {
        (self.ttl.as_secs() as i64).max(1)
    }

    fn hash_fields(info: &ConnectionInfo) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("worker_id", info.worker_id.as_str().to_string()),
            (
                "connected_at",
                info.connected_at.as_unix_millis().to_string(),
            ),
            (
                "last_heartbeat",
                info.last_heartbeat.as_unix_millis().to_string(),
            ),
        ];
        if let Some(user_id) = &info.user_id {
            fields.push(("user_id", user_id.as_str().to_string()));
        }
        if let Some(session_id) = &info.session_id {
            fields.push(("session_id", session_id.as_str().to_string()));
        }
        fields
    }

    fn info_from_hash(
        widget_id: &WidgetId,
        mut hash: HashMap<String, String>,
    ) -> Option<ConnectionInfo> {
        let worker_id = WorkerId::new(hash.remove("worker_id")?);
        let connected_at = hash
            .remove("connected_at")
            .and_then(|v| v.parse::<i64>().ok())
            .map(Timestamp::from_unix_millis)?;
        let last_heartbeat = hash
            .remove("last_heartbeat")
            .and_then(|v| v.parse::<i64>().ok())
            .map(Timestamp::from_unix_millis)
            .unwrap_or(connected_at);

        Some(ConnectionInfo {
            widget_id: widget_id.clone(),
            worker_id,
            connected_at,
            last_heartbeat,
            user_id: hash.remove("user_id").and_then(|u| UserId::new(u).ok()),
            session_id: hash
                .remove("session_id")
                .and_then(|s| SessionId::new(s).ok()),
        })
    }
}

#[async_trait]
impl ConnectionRouter for RedisConnectionRouter {
    async fn register_connection(&self, info: ConnectionInfo) -> Result<(), StoreError> {
        let key = self.keys.connection(&info.widget_id);
        let mut conn = self.conn.clone();

        // Last-registered wins: a superseded worker loses its membership in
        // the same transaction that installs the new owner.
        let previous_worker: Option<String> = conn
            .hget(&key, "worker_id")
            .await
            .map_err(StoreError::backend)?;

        let fields = Self::hash_fields(&info);
        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(&key)
            .ignore()
            .hset_multiple(&key, &fields)
            .ignore()
            .expire(&key, self.ttl_secs())
            .ignore()
            .sadd(
                self.keys.worker_connections(&info.worker_id),
                info.widget_id.as_str(),
            )
            .ignore();

        if let Some(previous) = previous_worker {
            if previous != info.worker_id.as_str() {
                tracing::debug!(
                    widget_id = %info.widget_id,
                    previous_worker = %previous,
                    new_worker = %info.worker_id,
                    "connection superseded"
                );
                pipe.srem(
                    self.keys.worker_connections(&WorkerId::new(previous)),
                    info.widget_id.as_str(),
                )
                .ignore();
            }
        }

        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(StoreError::backend)
    }

    async fn get_connection_info(
        &self,
        widget_id: &WidgetId,
    ) -> Result<Option<ConnectionInfo>, StoreError> {
        let mut conn = self.conn.clone();
        let hash: HashMap<String, String> = conn
            .hgetall(self.keys.connection(widget_id))
            .await
            .map_err(StoreError::backend)?;

        if hash.is_empty() {
            return Ok(None);
        }
        Ok(Self::info_from_hash(widget_id, hash))
    }

    async fn get_owner(&self, widget_id: &WidgetId) -> Result<Option<WorkerId>, StoreError> {
        let mut conn = self.conn.clone();
        let worker: Option<String> = conn
            .hget(self.keys.connection(widget_id), "worker_id")
            .await
            .map_err(StoreError::backend)?;
        Ok(worker.map(WorkerId::new))
    }

    async fn refresh_heartbeat(&self, widget_id: &WidgetId) -> Result<bool, StoreError> {
        let key = self.keys.connection(widget_id);
        let mut conn = self.conn.clone();

        let exists: bool = conn.exists(&key).await.map_err(StoreError::backend)?;
        if !exists {
            // Already expired; the caller should re-register.
            return Ok(false);
        }

        redis::pipe()
            .atomic()
            .hset(
                &key,
                "last_heartbeat",
                Timestamp::now().as_unix_millis().to_string(),
            )
            .ignore()
            .expire(&key, self.ttl_secs())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(StoreError::backend)?;
        Ok(true)
    }

    async fn unregister_connection(&self, widget_id: &WidgetId) -> Result<bool, StoreError> {
        let key = self.keys.connection(widget_id);
        let mut conn = self.conn.clone();

        let worker: Option<String> = conn
            .hget(&key, "worker_id")
            .await
            .map_err(StoreError::backend)?;

        let Some(worker) = worker else {
            return Ok(false);
        };

        let (deleted,): (i64,) = redis::pipe()
            .atomic()
            .del(&key)
            .srem(
                self.keys.worker_connections(&WorkerId::new(worker)),
                widget_id.as_str(),
            )
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(StoreError::backend)?;
        Ok(deleted > 0)
    }

    async fn list_worker_connections(
        &self,
        worker_id: &WorkerId,
    ) -> Result<Vec<WidgetId>, StoreError> {
        let set_key = self.keys.worker_connections(worker_id);
        let mut conn = self.conn.clone();

        let members: Vec<String> = conn.smembers(&set_key).await.map_err(StoreError::backend)?;

        let mut owned = Vec::with_capacity(members.len());
        for member in members {
            let Ok(widget_id) = WidgetId::new(&member) else {
                continue;
            };
            let current: Option<String> = conn
                .hget(self.keys.connection(&widget_id), "worker_id")
                .await
                .map_err(StoreError::backend)?;

            match current {
                Some(current) if current == worker_id.as_str() => owned.push(widget_id),
                // Expired or superseded; heal the membership set.
                _ => {
                    conn.srem::<_, _, ()>(&set_key, &member)
                        .await
                        .map_err(StoreError::backend)?;
                }
            }
        }
        Ok(owned)
    }
}

impl std::fmt::Debug for RedisConnectionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnectionRouter")
            .field("keys", &self.keys)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
