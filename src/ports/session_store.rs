//! SessionStore port - authenticated sessions with roles, TTL, and RBAC.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{SessionId, StoreError, UserId, UserSession};

/// Port for the session/RBAC store.
///
/// Expiry policy: `expires_at == None` never expires. Every read path
/// checks `expires_at < now` itself, even when the backend also applies a
/// native TTL — eventually-expiring backends can serve stale entries under
/// load, and an expired session must behave identically to no session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stores a session (upsert by `session_id`).
    async fn create_session(&self, session: UserSession) -> Result<(), StoreError>;

    /// Fetches a session; expired sessions read as `None`.
    async fn get_session(&self, session_id: &SessionId)
        -> Result<Option<UserSession>, StoreError>;

    /// Whether the session exists and is unexpired.
    async fn validate_session(&self, session_id: &SessionId) -> Result<bool, StoreError>;

    /// Deletes a session; `false` if it did not exist.
    async fn delete_session(&self, session_id: &SessionId) -> Result<bool, StoreError>;

    /// Extends a session's lifetime.
    ///
    /// With `extend_ttl` the session gains that TTL from now; without it,
    /// the session's *original* TTL duration (`expires_at - created_at`)
    /// is reapplied. A non-expiring session stays non-expiring. Returns
    /// `false` when the session is missing or already expired.
    async fn refresh_session(
        &self,
        session_id: &SessionId,
        extend_ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// All live sessions belonging to a user.
    async fn list_user_sessions(&self, user_id: &UserId)
        -> Result<Vec<UserSession>, StoreError>;

    /// Resolves a permission for a session against a specific resource.
    ///
    /// Two layers, either of which grants: (a) the session's roles against
    /// the static role → permission table; (b) resource-scoped grants in
    /// the session metadata under `permissions.{type}:{id}`. An expired or
    /// missing session fails every check.
    async fn check_permission(
        &self,
        session_id: &SessionId,
        resource_type: &str,
        resource_id: &str,
        permission: &str,
    ) -> Result<bool, StoreError>;
}
