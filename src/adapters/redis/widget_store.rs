//! Redis-backed widget store for multi-worker deployments.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::{StoreError, Timestamp, WidgetId, WidgetRecord, WorkerId};
use crate::ports::WidgetStore;

use super::keys::KeySpace;

/// Shared widget registry backed by Redis hashes.
///
/// `register` writes the hash, its TTL, and the active-set membership in
/// one atomic pipeline, so a widget is never "listed active" without a
/// payload. Updates refresh the TTL (sliding expiry) so a widget that is
/// actively being updated is not evicted mid-flight.
#[derive(Clone)]
pub struct RedisWidgetStore {
    conn: MultiplexedConnection,
    keys: KeySpace,
    ttl: Duration,
}

impl RedisWidgetStore {
    /// Creates a store over an established connection.
    pub fn new(conn: MultiplexedConnection, keys: KeySpace, ttl: Duration) -> Self {
        Self { conn, keys, ttl }
    }

    fn ttl_secs(&self) -> i64 {
        (self.ttl.as_secs() as i64).max(1)
    }

    fn hash_fields(record: &WidgetRecord) -> Result<Vec<(&'static str, String)>, StoreError> {
        let mut fields = vec![
            ("html", record.html.clone()),
            (
                "created_at",
                record.created_at.as_unix_millis().to_string(),
            ),
            ("metadata", serde_json::to_string(&record.metadata)?),
        ];
        if let Some(token) = &record.token {
            fields.push(("token", token.clone()));
        }
        if let Some(owner) = &record.owner_worker_id {
            fields.push(("owner_worker_id", owner.as_str().to_string()));
        }
        Ok(fields)
    }

    fn record_from_hash(
        widget_id: &WidgetId,
        mut hash: HashMap<String, String>,
    ) -> Result<WidgetRecord, StoreError> {
        let html = hash.remove("html").unwrap_or_default();
        let created_at = hash
            .remove("created_at")
            .and_then(|v| v.parse::<i64>().ok())
            .map(Timestamp::from_unix_millis)
            .unwrap_or_else(Timestamp::now);
        let metadata = match hash.remove("metadata") {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Default::default(),
        };

        Ok(WidgetRecord {
            widget_id: widget_id.clone(),
            html,
            token: hash.remove("token"),
            created_at,
            owner_worker_id: hash.remove("owner_worker_id").map(WorkerId::new),
            metadata,
        })
    }
}

#[async_trait]
impl WidgetStore for RedisWidgetStore {
    async fn register(&self, record: WidgetRecord) -> Result<(), StoreError> {
        let key = self.keys.widget(&record.widget_id);
        let fields = Self::hash_fields(&record)?;
        let mut conn = self.conn.clone();

        // DEL + HSET in one transaction so optional fields from a previous
        // registration (token, owner) cannot survive the upsert.
        redis::pipe()
            .atomic()
            .del(&key)
            .ignore()
            .hset_multiple(&key, &fields)
            .ignore()
            .expire(&key, self.ttl_secs())
            .ignore()
            .sadd(self.keys.widgets_active(), record.widget_id.as_str())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(StoreError::backend)?;

        tracing::debug!(widget_id = %record.widget_id, "widget registered");
        Ok(())
    }

    async fn get(&self, widget_id: &WidgetId) -> Result<Option<WidgetRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let hash: HashMap<String, String> = conn
            .hgetall(self.keys.widget(widget_id))
            .await
            .map_err(StoreError::backend)?;

        if hash.is_empty() {
            return Ok(None);
        }
        Self::record_from_hash(widget_id, hash).map(Some)
    }

    async fn get_html(&self, widget_id: &WidgetId) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.hget(self.keys.widget(widget_id), "html")
            .await
            .map_err(StoreError::backend)
    }

    async fn get_token(&self, widget_id: &WidgetId) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.hget(self.keys.widget(widget_id), "token")
            .await
            .map_err(StoreError::backend)
    }

    async fn exists(&self, widget_id: &WidgetId) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        conn.exists(self.keys.widget(widget_id))
            .await
            .map_err(StoreError::backend)
    }

    async fn update_html(&self, widget_id: &WidgetId, html: &str) -> Result<bool, StoreError> {
        let key = self.keys.widget(widget_id);
        let mut conn = self.conn.clone();

        let exists: bool = conn.exists(&key).await.map_err(StoreError::backend)?;
        if !exists {
            return Ok(false);
        }

        redis::pipe()
            .atomic()
            .hset(&key, "html", html)
            .ignore()
            .expire(&key, self.ttl_secs())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(StoreError::backend)?;
        Ok(true)
    }

    async fn update_token(&self, widget_id: &WidgetId, token: &str) -> Result<bool, StoreError> {
        let key = self.keys.widget(widget_id);
        let mut conn = self.conn.clone();

        let exists: bool = conn.exists(&key).await.map_err(StoreError::backend)?;
        if !exists {
            return Ok(false);
        }

        redis::pipe()
            .atomic()
            .hset(&key, "token", token)
            .ignore()
            .expire(&key, self.ttl_secs())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(StoreError::backend)?;
        Ok(true)
    }

    async fn delete(&self, widget_id: &WidgetId) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let (deleted,): (i64,) = redis::pipe()
            .atomic()
            .del(self.keys.widget(widget_id))
            .srem(self.keys.widgets_active(), widget_id.as_str())
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(StoreError::backend)?;
        Ok(deleted > 0)
    }

    async fn list_active(&self) -> Result<Vec<WidgetId>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn
            .smembers(self.keys.widgets_active())
            .await
            .map_err(StoreError::backend)?;

        let mut active = Vec::with_capacity(members.len());
        for member in members {
            let Ok(widget_id) = WidgetId::new(&member) else {
                continue;
            };
            let exists: bool = conn
                .exists(self.keys.widget(&widget_id))
                .await
                .map_err(StoreError::backend)?;
            if exists {
                active.push(widget_id);
            } else {
                // The hash expired while the membership lingered; heal the set.
                tracing::debug!(widget_id = %member, "pruning expired widget from active set");
                conn.srem::<_, _, ()>(self.keys.widgets_active(), &member)
                    .await
                    .map_err(StoreError::backend)?;
            }
        }
        Ok(active)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let count: i64 = conn
            .scard(self.keys.widgets_active())
            .await
            .map_err(StoreError::backend)?;
        Ok(count.max(0) as usize)
    }
}

impl std::fmt::Debug for RedisWidgetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisWidgetStore")
            .field("keys", &self.keys)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_fields_omit_absent_optionals() {
        let record = WidgetRecord::new(WidgetId::new("w1").unwrap(), "<p/>");
        let fields = RedisWidgetStore::hash_fields(&record).unwrap();
        let names: Vec<&str> = fields.iter().map(|(k, _)| *k).collect();

        assert!(names.contains(&"html"));
        assert!(!names.contains(&"token"));
        assert!(!names.contains(&"owner_worker_id"));
    }

    #[test]
    fn record_roundtrips_through_hash_fields() {
        let record = WidgetRecord::new(WidgetId::new("w1").unwrap(), "<p>hi</p>")
            .with_token("tok")
            .with_owner("worker-a".into());

        let fields = RedisWidgetStore::hash_fields(&record).unwrap();
        let hash: HashMap<String, String> = fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        let back = RedisWidgetStore::record_from_hash(&record.widget_id, hash).unwrap();
        assert_eq!(back.html, "<p>hi</p>");
        assert_eq!(back.token.as_deref(), Some("tok"));
        assert_eq!(back.owner_worker_id, Some("worker-a".into()));
        // Millisecond precision survives the roundtrip.
        assert_eq!(
            back.created_at.as_unix_millis(),
            record.created_at.as_unix_millis()
        );
    }

    // Redis integration tests live in tests/redis_backend.rs and require a
    // running instance; they are marked #[ignore].
}
