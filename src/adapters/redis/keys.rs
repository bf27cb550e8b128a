//! Redis key layout.
//!
//! All keys are namespaced under a configurable prefix and kept flat and
//! inspectable for operational debugging:
//!
//! ```text
//! {prefix}:widget:{id}                hash: html/token/created_at/owner/metadata
//! {prefix}:widgets:active             set of widget ids
//! {prefix}:conn:{widget_id}           hash, TTL-bound
//! {prefix}:worker:{worker_id}:connections   set of widget ids
//! {prefix}:session:{id}               hash, TTL-bound
//! {prefix}:user:{user_id}:sessions    set of session ids
//! {prefix}:role_permissions           hash: role -> JSON permission list
//! {prefix}:channel:{channel}          pub/sub channel
//! ```

use crate::domain::{SessionId, UserId, WidgetId, WorkerId};

/// Namespaced key builder shared by all Redis adapters.
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    /// Creates a key space under the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Hash holding one widget record.
    pub fn widget(&self, widget_id: &WidgetId) -> String {
        format!("{}:widget:{}", self.prefix, widget_id)
    }

    /// Set of all active widget ids.
    pub fn widgets_active(&self) -> String {
        format!("{}:widgets:active", self.prefix)
    }

    /// Hash holding one widget's live connection.
    pub fn connection(&self, widget_id: &WidgetId) -> String {
        format!("{}:conn:{}", self.prefix, widget_id)
    }

    /// Set of widget ids whose connections a worker owns.
    pub fn worker_connections(&self, worker_id: &WorkerId) -> String {
        format!("{}:worker:{}:connections", self.prefix, worker_id)
    }

    /// Hash holding one session record.
    pub fn session(&self, session_id: &SessionId) -> String {
        format!("{}:session:{}", self.prefix, session_id)
    }

    /// Set of session ids belonging to a user.
    pub fn user_sessions(&self, user_id: &UserId) -> String {
        format!("{}:user:{}:sessions", self.prefix, user_id)
    }

    /// Hash of role name to JSON permission list.
    pub fn role_permissions(&self) -> String {
        format!("{}:role_permissions", self.prefix)
    }

    /// Fully-qualified pub/sub channel name.
    pub fn channel(&self, channel: &str) -> String {
        format!("{}:channel:{}", self.prefix, channel)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("widgetrelay")
    }
}
