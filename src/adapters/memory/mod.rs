//! In-process backends for single-worker deployments and tests.
//!
//! Each store guards its map with its own `tokio::sync::Mutex` — coarse
//! but sufficient, since every operation is O(1) map access. No two
//! stores share a lock. Expiry (connections, sessions) is lazy: read
//! paths treat stale records as absent and remove them.

mod connection_router;
mod event_bus;
mod session_store;
mod widget_store;

pub use connection_router::MemoryConnectionRouter;
pub use event_bus::MemoryEventBus;
pub use session_store::MemorySessionStore;
pub use widget_store::MemoryWidgetStore;
