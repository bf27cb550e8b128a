//! Widget Relay - distributed state and coordination core for fleets of
//! stateless workers hosting live, browser-connected UI widgets.
//!
//! The hard problem is not rendering HTML — it is coordinating mutable,
//! shared state (which widget exists, which worker owns its connection,
//! which session is active, which local function handles which event)
//! across processes that may not share memory, while keeping a
//! single-process deployment simple.
//!
//! The crate exposes one facade, [`application::StateManager`], over two
//! interchangeable backend families: in-process memory and Redis.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::{
    Callback, CallbackError, CallbackRegistry, CallbackStats, StateManager, SyncBridge,
};
pub use config::AppConfig;
pub use domain::{
    ConnectionInfo, EventMessage, SessionId, StoreError, UserId, UserSession, WidgetId,
    WidgetRecord, WorkerId,
};
