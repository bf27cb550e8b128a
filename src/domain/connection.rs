//! Live connection tracking record.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::foundation::{SessionId, Timestamp, UserId, WidgetId, WorkerId};

/// The worker currently holding a widget's live connection.
///
/// At most one record is live per widget; registering a new connection for
/// the same id supersedes the previous one (the router does not close the
/// superseded connection — that is the caller's responsibility).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// The widget this connection serves.
    pub widget_id: WidgetId,

    /// The worker that accepted the connection.
    pub worker_id: WorkerId,

    /// When the connection was accepted.
    pub connected_at: Timestamp,

    /// Last heartbeat refresh; staleness is measured from here.
    pub last_heartbeat: Timestamp,

    /// Authenticated user behind the connection, if any.
    pub user_id: Option<UserId>,

    /// Session behind the connection, if any.
    pub session_id: Option<SessionId>,
}

impl ConnectionInfo {
    /// Creates a connection record for a freshly accepted connection.
    pub fn new(widget_id: WidgetId, worker_id: WorkerId) -> Self {
        let now = Timestamp::now();
        Self {
            widget_id,
            worker_id,
            connected_at: now,
            last_heartbeat: now,
            user_id: None,
            session_id: None,
        }
    }

    /// Attaches the authenticated user.
    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Attaches the session.
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Refreshes the heartbeat timestamp.
    pub fn touch(&mut self) {
        self.last_heartbeat = Timestamp::now();
    }

    /// Whether the connection has outlived its TTL as of `now`.
    pub fn is_stale(&self, ttl: Duration, now: &Timestamp) -> bool {
        self.last_heartbeat.plus_duration(ttl).is_before(now)
    }
}
