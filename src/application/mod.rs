//! Application layer - process-local components and the composition root.
//!
//! - `CallbackRegistry` - local `(widget, event) -> handler` map
//! - `LocalDelivery` - per-widget queues for locally connected widgets
//! - `StateManager` - the facade unifying all stores behind one API
//! - `SyncBridge` - blocking adapter for synchronous call sites

mod callbacks;
mod local_queues;
mod state_manager;
mod sync_bridge;

pub use callbacks::{Callback, CallbackError, CallbackFuture, CallbackRegistry, CallbackStats};
pub use local_queues::LocalDelivery;
pub use state_manager::StateManager;
pub use sync_bridge::{BridgeError, SyncBridge};
