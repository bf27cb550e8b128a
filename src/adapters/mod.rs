//! Adapters - Implementations of port interfaces.
//!
//! Two families, selected by the composition root per the deploy-mode
//! flag:
//! - `memory` - in-process backends (single worker, tests)
//! - `redis` - shared backends for multi-worker deployments

pub mod memory;
pub mod redis;

pub use self::memory::{
    MemoryConnectionRouter, MemoryEventBus, MemorySessionStore, MemoryWidgetStore,
};
pub use self::redis::{
    KeySpace, RedisConnectionRouter, RedisEventBus, RedisSessionStore, RedisWidgetStore,
};
