//! Redis-backed adapters for multi-worker deployments.
//!
//! All adapters share one multiplexed command connection (cheap to clone
//! per call) and rely on atomic `MULTI`/`EXEC` pipelines instead of local
//! locks — state is shared across processes, where an in-process mutex
//! provides no guarantee. Configuration is immutable once an adapter is
//! built.

mod connection_router;
mod event_bus;
mod keys;
mod session_store;
mod widget_store;

pub use connection_router::RedisConnectionRouter;
pub use event_bus::RedisEventBus;
pub use keys::KeySpace;
pub use session_store::RedisSessionStore;
pub use widget_store::RedisWidgetStore;
