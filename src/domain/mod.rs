//! Domain layer - value objects shared across stores and workers.
//!
//! All records are plain data: they cross process boundaries as JSON and
//! never carry behavior beyond construction and derived checks.

pub mod connection;
pub mod event;
pub mod foundation;
pub mod session;
pub mod widget;

pub use connection::ConnectionInfo;
pub use event::{widget_channel, EventMessage};
pub use foundation::{
    MessageId, SessionId, StoreError, Timestamp, UserId, ValidationError, WidgetId, WorkerId,
};
pub use session::{RolePermissions, UserSession};
pub use widget::WidgetRecord;
