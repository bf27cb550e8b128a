//! Authenticated session record and role-based permission resolution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use super::foundation::{SessionId, Timestamp, UserId};

/// Metadata key under which resource-scoped grants live.
const PERMISSIONS_KEY: &str = "permissions";

/// The permission name that marks administrative roles.
const ADMIN_PERMISSION: &str = "admin";

/// One authenticated session with its roles and expiry.
///
/// A session with `expires_at` in the past is treated as absent by every
/// read path, even when the backend has not yet purged it — eventually
/// expiring backends can serve stale entries under load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    /// Session identifier issued by the auth layer.
    pub session_id: SessionId,

    /// The authenticated user.
    pub user_id: UserId,

    /// Role names granted to the session.
    pub roles: BTreeSet<String>,

    /// When the session was created.
    pub created_at: Timestamp,

    /// Expiry instant; `None` means the session never expires.
    pub expires_at: Option<Timestamp>,

    /// Open metadata map, including optional resource-scoped grants under
    /// `permissions.{resource_type}:{resource_id}`.
    pub metadata: Map<String, Value>,
}

impl UserSession {
    /// Creates a non-expiring session with no roles.
    pub fn new(session_id: SessionId, user_id: UserId) -> Self {
        Self {
            session_id,
            user_id,
            roles: BTreeSet::new(),
            created_at: Timestamp::now(),
            expires_at: None,
            metadata: Map::new(),
        }
    }

    /// Replaces the role set.
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Gives the session a TTL measured from `created_at`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(self.created_at.plus_duration(ttl));
        self
    }

    /// Replaces the metadata map.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether the session is expired as of `now`.
    pub fn is_expired_at(&self, now: &Timestamp) -> bool {
        match &self.expires_at {
            Some(expires) => expires.is_before(now),
            None => false,
        }
    }

    /// Whether the session is expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(&Timestamp::now())
    }

    /// The TTL the session was originally created with.
    ///
    /// Computed as `expires_at - created_at`; `None` for non-expiring
    /// sessions. Used by refresh to extend by the same duration rather
    /// than a fixed default.
    pub fn original_ttl(&self) -> Option<Duration> {
        let expires = self.expires_at.as_ref()?;
        expires.duration_since(&self.created_at).to_std().ok()
    }

    /// Resource-scoped permissions granted for `(resource_type, resource_id)`.
    ///
    /// Reads `metadata.permissions["{type}:{id}"]` as a string array;
    /// anything missing or mis-shaped resolves to no grants.
    pub fn resource_permissions(&self, resource_type: &str, resource_id: &str) -> Vec<String> {
        let key = format!("{}:{}", resource_type, resource_id);
        self.metadata
            .get(PERMISSIONS_KEY)
            .and_then(|v| v.get(&key))
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the session carries a resource-scoped grant for `permission`.
    pub fn has_resource_permission(
        &self,
        resource_type: &str,
        resource_id: &str,
        permission: &str,
    ) -> bool {
        self.resource_permissions(resource_type, resource_id)
            .iter()
            .any(|p| p == permission)
    }
}

/// Static role → permission set table.
///
/// The first layer of `check_permission`: a permission is granted when any
/// of the session's roles maps to a set containing it. The optional
/// `admin_implies_all` short-circuit makes any role holding the `admin`
/// permission satisfy every check, including resource-scoped ones.
#[derive(Debug, Clone)]
pub struct RolePermissions {
    grants: HashMap<String, BTreeSet<String>>,
    admin_implies_all: bool,
}

impl RolePermissions {
    /// Creates the default table: `admin → {read, write, admin}`,
    /// `editor → {read, write}`, `viewer → {read}`.
    pub fn with_defaults(admin_implies_all: bool) -> Self {
        let mut grants = HashMap::new();
        grants.insert(
            "admin".to_string(),
            ["read", "write", "admin"].iter().map(|s| s.to_string()).collect(),
        );
        grants.insert(
            "editor".to_string(),
            ["read", "write"].iter().map(|s| s.to_string()).collect(),
        );
        grants.insert(
            "viewer".to_string(),
            ["read"].iter().map(|s| s.to_string()).collect(),
        );
        Self {
            grants,
            admin_implies_all,
        }
    }

    /// Replaces the permission set for a role.
    pub fn set_role<I, S>(&mut self, role: impl Into<String>, permissions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grants
            .insert(role.into(), permissions.into_iter().map(Into::into).collect());
    }

    /// The permission set for a role, if defined.
    pub fn permissions_for(&self, role: &str) -> Option<&BTreeSet<String>> {
        self.grants.get(role)
    }

    /// Iterates all `(role, permissions)` pairs, e.g. for backend seeding.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.grants.iter()
    }

    /// Whether the short-circuit for administrative roles is enabled.
    pub fn admin_implies_all(&self) -> bool {
        self.admin_implies_all
    }

    /// Resolves `permission` against the given roles.
    pub fn role_grants(&self, roles: &BTreeSet<String>, permission: &str) -> bool {
        for role in roles {
            if let Some(set) = self.grants.get(role) {
                if set.contains(permission) {
                    return true;
                }
                if self.admin_implies_all && set.contains(ADMIN_PERMISSION) {
                    return true;
                }
            }
        }
        false
    }
}

impl Default for RolePermissions {
    fn default() -> Self {
        Self::with_defaults(false)
    }
}
