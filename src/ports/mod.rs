//! Ports - Interfaces between the coordination core and its backends.
//!
//! Following hexagonal architecture, ports define the contracts the
//! composition root depends on; adapters implement them. Two adapter
//! families exist: in-process memory (single-worker deployments, tests)
//! and Redis (multi-worker deployments).
//!
//! - `WidgetStore` - widget registry CRUD with TTL
//! - `EventBus` - channel-based publish/subscribe fan-out
//! - `ConnectionRouter` - connection-ownership tracking with heartbeats
//! - `SessionStore` - session records, expiry, and RBAC checks
//!
//! The callback registry is deliberately *not* a port: handlers are native
//! closures that cannot cross a process boundary, so it lives in the
//! application layer and is process-local by construction.

mod connection_router;
mod event_bus;
mod session_store;
mod widget_store;

pub use connection_router::ConnectionRouter;
pub use event_bus::{EventBus, EventStream};
pub use session_store::SessionStore;
pub use widget_store::WidgetStore;
