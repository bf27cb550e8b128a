//! Redis-backed session store with RBAC resolution.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::{
    RolePermissions, SessionId, StoreError, Timestamp, UserId, UserSession,
};
use crate::ports::SessionStore;

use super::keys::KeySpace;

/// Session store shared across workers.
///
/// Records are TTL-bound hashes, but every read path also checks
/// `expires_at` itself — an eventually-expiring backend can serve a stale
/// entry under load, and an expired session must behave identically to no
/// session.
///
/// The role → permission table is seeded into `{prefix}:role_permissions`
/// with `HSETNX` at construction, so operator edits to the hash survive
/// restarts.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: MultiplexedConnection,
    keys: KeySpace,
    admin_implies_all: bool,
}

impl RedisSessionStore {
    /// Creates a store over an established connection, seeding the role
    /// table.
    pub async fn new(
        conn: MultiplexedConnection,
        keys: KeySpace,
        roles: &RolePermissions,
    ) -> Result<Self, StoreError> {
        let store = Self {
            conn,
            keys,
            admin_implies_all: roles.admin_implies_all(),
        };
        store.seed_roles(roles).await?;
        Ok(store)
    }

    async fn seed_roles(&self, roles: &RolePermissions) -> Result<(), StoreError> {
        let key = self.keys.role_permissions();
        let mut conn = self.conn.clone();
        for (role, permissions) in roles.iter() {
            let permissions: Vec<&String> = permissions.iter().collect();
            let json = serde_json::to_string(&permissions)?;
            conn.hset_nx::<_, _, _, ()>(&key, role, json)
                .await
                .map_err(StoreError::backend)?;
        }
        Ok(())
    }

    fn hash_fields(session: &UserSession) -> Result<Vec<(&'static str, String)>, StoreError> {
        let mut fields = vec![
            ("user_id", session.user_id.as_str().to_string()),
            ("roles", serde_json::to_string(&session.roles)?),
            (
                "created_at",
                session.created_at.as_unix_millis().to_string(),
            ),
            ("metadata", serde_json::to_string(&session.metadata)?),
        ];
        if let Some(expires_at) = &session.expires_at {
            fields.push(("expires_at", expires_at.as_unix_millis().to_string()));
        }
        Ok(fields)
    }

    fn session_from_hash(
        session_id: &SessionId,
        mut hash: HashMap<String, String>,
    ) -> Result<Option<UserSession>, StoreError> {
        let Some(user_id) = hash.remove("user_id").and_then(|u| UserId::new(u).ok()) else {
            return Ok(None);
        };
        let roles = match hash.remove("roles") {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Default::default(),
        };
        let created_at = hash
            .remove("created_at")
            .and_then(|v| v.parse::<i64>().ok())
            .map(Timestamp::from_unix_millis)
            .unwrap_or_else(Timestamp::now);
        let expires_at = hash
            .remove("expires_at")
            .and_then(|v| v.parse::<i64>().ok())
            .map(Timestamp::from_unix_millis);
        let metadata = match hash.remove("metadata") {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Default::default(),
        };

        Ok(Some(UserSession {
            session_id: session_id.clone(),
            user_id,
            roles,
            created_at,
            expires_at,
            metadata,
        }))
    }

    /// Remaining TTL seconds until `expires_at`, at least 1.
    fn secs_until(expires_at: &Timestamp) -> i64 {
        expires_at
            .duration_since(&Timestamp::now())
            .num_seconds()
            .max(1)
    }

    async fn purge(&self, session: &UserSession) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .del(self.keys.session(&session.session_id))
            .ignore()
            .srem(
                self.keys.user_sessions(&session.user_id),
                session.session_id.as_str(),
            )
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(StoreError::backend)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create_session(&self, session: UserSession) -> Result<(), StoreError> {
        let key = self.keys.session(&session.session_id);
        let fields = Self::hash_fields(&session)?;
        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(&key)
            .ignore()
            .hset_multiple(&key, &fields)
            .ignore()
            .sadd(
                self.keys.user_sessions(&session.user_id),
                session.session_id.as_str(),
            )
            .ignore();
        if let Some(expires_at) = &session.expires_at {
            pipe.expire(&key, Self::secs_until(expires_at)).ignore();
        }

        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(StoreError::backend)?;

        tracing::debug!(session_id = %session.session_id, user_id = %session.user_id, "session created");
        Ok(())
    }

    async fn get_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<UserSession>, StoreError> {
        let mut conn = self.conn.clone();
        let hash: HashMap<String, String> = conn
            .hgetall(self.keys.session(session_id))
            .await
            .map_err(StoreError::backend)?;

        if hash.is_empty() {
            return Ok(None);
        }
        let Some(session) = Self::session_from_hash(session_id, hash)? else {
            return Ok(None);
        };

        if session.is_expired() {
            // Backend TTL has not fired yet; treat as absent and purge.
            self.purge(&session).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn validate_session(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.get_session(session_id).await?.is_some())
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        let key = self.keys.session(session_id);
        let mut conn = self.conn.clone();

        let user_id: Option<String> = conn
            .hget(&key, "user_id")
            .await
            .map_err(StoreError::backend)?;

        let Some(user_id) = user_id else {
            return Ok(false);
        };
        let Ok(user_id) = UserId::new(user_id) else {
            return Ok(false);
        };

        let (deleted,): (i64,) = redis::pipe()
            .atomic()
            .del(&key)
            .srem(self.keys.user_sessions(&user_id), session_id.as_str())
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(StoreError::backend)?;
        Ok(deleted > 0)
    }

    async fn refresh_session(
        &self,
        session_id: &SessionId,
        extend_ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let Some(session) = self.get_session(session_id).await? else {
            return Ok(false);
        };

        let Some(ttl) = extend_ttl.or_else(|| session.original_ttl()) else {
            // Non-expiring session with no explicit extension: unchanged.
            return Ok(true);
        };

        let key = self.keys.session(session_id);
        let new_expiry = Timestamp::now().plus_duration(ttl);
        let mut conn = self.conn.clone();

        redis::pipe()
            .atomic()
            .hset(&key, "expires_at", new_expiry.as_unix_millis().to_string())
            .ignore()
            .expire(&key, (ttl.as_secs() as i64).max(1))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(StoreError::backend)?;
        Ok(true)
    }

    async fn list_user_sessions(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<UserSession>, StoreError> {
        let set_key = self.keys.user_sessions(user_id);
        let mut conn = self.conn.clone();

        let members: Vec<String> = conn.smembers(&set_key).await.map_err(StoreError::backend)?;

        let mut sessions = Vec::with_capacity(members.len());
        for member in members {
            let Ok(session_id) = SessionId::new(&member) else {
                continue;
            };
            match self.get_session(&session_id).await? {
                Some(session) => sessions.push(session),
                // Expired or deleted; heal the membership set.
                None => {
                    conn.srem::<_, _, ()>(&set_key, &member)
                        .await
                        .map_err(StoreError::backend)?;
                }
            }
        }
        Ok(sessions)
    }

    async fn check_permission(
        &self,
        session_id: &SessionId,
        resource_type: &str,
        resource_id: &str,
        permission: &str,
    ) -> Result<bool, StoreError> {
        let Some(session) = self.get_session(session_id).await? else {
            return Ok(false);
        };

        let roles_key = self.keys.role_permissions();
        let mut conn = self.conn.clone();

        for role in &session.roles {
            let raw: Option<String> = conn
                .hget(&roles_key, role)
                .await
                .map_err(StoreError::backend)?;
            let Some(raw) = raw else {
                continue;
            };
            let permissions: Vec<String> = serde_json::from_str(&raw)?;
            if permissions.iter().any(|p| p == permission) {
                return Ok(true);
            }
            if self.admin_implies_all && permissions.iter().any(|p| p == "admin") {
                return Ok(true);
            }
        }

        Ok(session.has_resource_permission(resource_type, resource_id, permission))
    }
}

impl std::fmt::Debug for RedisSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSessionStore")
            .field("keys", &self.keys)
            .field("admin_implies_all", &self.admin_implies_all)
            .finish_non_exhaustive()
    }
}
