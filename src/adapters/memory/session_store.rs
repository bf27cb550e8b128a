//! In-memory session store with lazy expiry and RBAC resolution.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::{RolePermissions, SessionId, StoreError, Timestamp, UserId, UserSession};
use crate::ports::SessionStore;

/// Single-process session store.
///
/// Expiry is lazy: expired records are removed when a read path touches
/// them. The role → permission table is fixed at construction.
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, UserSession>>,
    roles: RolePermissions,
}

impl MemorySessionStore {
    /// Creates a store with the given role table.
    pub fn new(roles: RolePermissions) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            roles,
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(RolePermissions::default())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: UserSession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        tracing::debug!(session_id = %session.session_id, user_id = %session.user_id, "session created");
        sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn get_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<UserSession>, StoreError> {
        let mut sessions = self.sessions.lock().await;
        let now = Timestamp::now();

        let expired = match sessions.get(session_id) {
            Some(session) => session.is_expired_at(&now),
            None => return Ok(None),
        };
        if expired {
            sessions.remove(session_id);
            return Ok(None);
        }
        Ok(sessions.get(session_id).cloned())
    }

    async fn validate_session(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.get_session(session_id).await?.is_some())
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.sessions.lock().await.remove(session_id).is_some())
    }

    async fn refresh_session(
        &self,
        session_id: &SessionId,
        extend_ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.lock().await;
        let now = Timestamp::now();

        let expired = match sessions.get(session_id) {
            Some(session) => session.is_expired_at(&now),
            None => return Ok(false),
        };
        if expired {
            sessions.remove(session_id);
            return Ok(false);
        }

        if let Some(session) = sessions.get_mut(session_id) {
            match extend_ttl.or_else(|| session.original_ttl()) {
                Some(ttl) => session.expires_at = Some(now.plus_duration(ttl)),
                // Non-expiring session with no explicit extension: unchanged.
                None => {}
            }
        }
        Ok(true)
    }

    async fn list_user_sessions(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<UserSession>, StoreError> {
        let mut sessions = self.sessions.lock().await;
        let now = Timestamp::now();

        sessions.retain(|_, s| !s.is_expired_at(&now));

        Ok(sessions
            .values()
            .filter(|s| &s.user_id == user_id)
            .cloned()
            .collect())
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

        if self.roles.role_grants(&session.roles, permission) {
            return Ok(true);
        }

        Ok(session.has_resource_permission(resource_type, resource_id, permission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn sid(s: &str) -> SessionId {
        SessionId::new(s).unwrap()
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn session(id: &str, user: &str) -> UserSession {
        UserSession::new(sid(id), uid(user))
    }

    #[tokio::test]
    async fn create_then_validate() {
        let store = MemorySessionStore::default();
        store.create_session(session("s1", "u1")).await.unwrap();

        assert!(store.validate_session(&sid("s1")).await.unwrap());
        assert!(!store.validate_session(&sid("ghost")).await.unwrap());
    }

    #[tokio::test]
    async fn short_ttl_session_expires() {
        let store = MemorySessionStore::default();
        store
            .create_session(session("s1", "u1").with_ttl(Duration::from_millis(20)))
            .await
            .unwrap();

        assert!(store.validate_session(&sid("s1")).await.unwrap());

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!store.validate_session(&sid("s1")).await.unwrap());
        assert!(store.get_session(&sid("s1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_session_reports_existence() {
        let store = MemorySessionStore::default();
        store.create_session(session("s1", "u1")).await.unwrap();

        assert!(store.delete_session(&sid("s1")).await.unwrap());
        assert!(!store.delete_session(&sid("s1")).await.unwrap());
    }

    #[tokio::test]
    async fn refresh_reapplies_original_ttl() {
        let store = MemorySessionStore::default();
        store
            .create_session(session("s1", "u1").with_ttl(Duration::from_secs(3600)))
            .await
            .unwrap();

        assert!(store.refresh_session(&sid("s1"), None).await.unwrap());

        let refreshed = store.get_session(&sid("s1")).await.unwrap().unwrap();
        let remaining = refreshed
            .expires_at
            .unwrap()
            .duration_since(&Timestamp::now());
        // Still roughly an hour out after refresh.
        assert!(remaining.num_seconds() > 3500);
    }

    #[tokio::test]
    async fn refresh_with_explicit_ttl_overrides() {
        let store = MemorySessionStore::default();
        store
            .create_session(session("s1", "u1").with_ttl(Duration::from_secs(60)))
            .await
            .unwrap();

        assert!(store
            .refresh_session(&sid("s1"), Some(Duration::from_secs(7200)))
            .await
            .unwrap());

        let refreshed = store.get_session(&sid("s1")).await.unwrap().unwrap();
        let remaining = refreshed
            .expires_at
            .unwrap()
            .duration_since(&Timestamp::now());
        assert!(remaining.num_seconds() > 7000);
    }

    #[tokio::test]
    async fn refresh_of_expired_session_fails() {
        let store = MemorySessionStore::default();
        store
            .create_session(session("s1", "u1").with_ttl(Duration::from_millis(10)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!store.refresh_session(&sid("s1"), None).await.unwrap());
    }

    #[tokio::test]
    async fn refresh_keeps_non_expiring_session_non_expiring() {
        let store = MemorySessionStore::default();
        store.create_session(session("s1", "u1")).await.unwrap();

        assert!(store.refresh_session(&sid("s1"), None).await.unwrap());

        let refreshed = store.get_session(&sid("s1")).await.unwrap().unwrap();
        assert!(refreshed.expires_at.is_none());
    }

    #[tokio::test]
    async fn list_user_sessions_filters_by_user_and_expiry() {
        let store = MemorySessionStore::default();
        store.create_session(session("s1", "u1")).await.unwrap();
        store.create_session(session("s2", "u1")).await.unwrap();
        store.create_session(session("s3", "u2")).await.unwrap();
        store
            .create_session(session("s4", "u1").with_ttl(Duration::from_millis(10)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        let sessions = store.list_user_sessions(&uid("u1")).await.unwrap();
        let mut ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn viewer_role_cannot_write() {
        let store = MemorySessionStore::default();
        store
            .create_session(session("s1", "u1").with_roles(["viewer"]))
            .await
            .unwrap();

        assert!(store
            .check_permission(&sid("s1"), "document", "d1", "read")
            .await
            .unwrap());
        assert!(!store
            .check_permission(&sid("s1"), "document", "d1", "write")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn resource_scoped_grant_overrides_role_denial() {
        let store = MemorySessionStore::default();

        let mut meta = Map::new();
        meta.insert(
            "permissions".to_string(),
            json!({"document:d1": ["write"]}),
        );
        store
            .create_session(
                session("s1", "u1")
                    .with_roles(["viewer"])
                    .with_metadata(meta),
            )
            .await
            .unwrap();

        assert!(store
            .check_permission(&sid("s1"), "document", "d1", "write")
            .await
            .unwrap());
        // Same permission on a different resource still fails.
        assert!(!store
            .check_permission(&sid("s1"), "document", "d2", "write")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn expired_session_fails_every_permission_check() {
        let store = MemorySessionStore::default();
        store
            .create_session(
                session("s1", "u1")
                    .with_roles(["admin"])
                    .with_ttl(Duration::from_millis(10)),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!store
            .check_permission(&sid("s1"), "document", "d1", "read")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn admin_implies_all_is_honored_when_enabled() {
        let store = MemorySessionStore::new(RolePermissions::with_defaults(true));
        store
            .create_session(session("s1", "u1").with_roles(["admin"]))
            .await
            .unwrap();

        // "purge" is in no static permission set.
        assert!(store
            .check_permission(&sid("s1"), "document", "d1", "purge")
            .await
            .unwrap());
    }
}
