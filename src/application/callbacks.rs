//! Process-local callback registry.
//!
//! Maps `(widget_id, event_type)` to a handler closure. Handlers are
//! native functions and cannot cross a process boundary, so this registry
//! is intentionally not mirrored by any backend — cross-worker delivery
//! is achieved one layer up by routing through the event bus and the
//! connection router.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::domain::WidgetId;

/// Error returned by a failing handler.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CallbackError(String);

impl CallbackError {
    /// Creates a handler error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Boxed future returned by asynchronous handlers.
pub type CallbackFuture = Pin<Box<dyn Future<Output = Result<Value, CallbackError>> + Send>>;

type SyncHandler = Arc<dyn Fn(Value) -> Result<Value, CallbackError> + Send + Sync>;
type AsyncHandler = Arc<dyn Fn(Value) -> CallbackFuture + Send + Sync>;

/// One registered handler, synchronous or asynchronous.
///
/// Both styles funnel through [`CallbackRegistry::invoke`]: synchronous
/// handlers run on a blocking worker thread so they never stall the
/// scheduler, asynchronous handlers run as their own task.
#[derive(Clone)]
pub enum Callback {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

impl Callback {
    /// Wraps a synchronous handler.
    pub fn sync<F>(handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value, CallbackError> + Send + Sync + 'static,
    {
        Callback::Sync(Arc::new(handler))
    }

    /// Wraps an asynchronous handler.
    pub fn async_fn<F, Fut>(handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CallbackError>> + Send + 'static,
    {
        Callback::Async(Arc::new(move |data| Box::pin(handler(data))))
    }

    /// Whether this is an asynchronous handler.
    pub fn is_async(&self) -> bool {
        matches!(self, Callback::Async(_))
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callback::Sync(_) => f.write_str("Callback::Sync"),
            Callback::Async(_) => f.write_str("Callback::Async"),
        }
    }
}

#[derive(Debug)]
struct Registration {
    callback: Callback,
    invocations: u64,
    failures: u64,
}

/// Aggregate counters across the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallbackStats {
    /// Currently registered handlers.
    pub registrations: usize,
    /// Successful invocations.
    pub invocations: u64,
    /// Invocations that failed or panicked.
    pub failures: u64,
}

/// Process-local `(widget, event) -> handler` map.
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    entries: Mutex<HashMap<(WidgetId, String), Registration>>,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the handler for `(widget_id, event_type)`.
    pub fn register(&self, widget_id: WidgetId, event_type: impl Into<String>, callback: Callback) {
        let mut entries = self.entries.lock().expect("callback registry lock poisoned");
        entries.insert(
            (widget_id, event_type.into()),
            Registration {
                callback,
                invocations: 0,
                failures: 0,
            },
        );
    }

    /// The handler for `(widget_id, event_type)`, if registered.
    pub fn get(&self, widget_id: &WidgetId, event_type: &str) -> Option<Callback> {
        let entries = self.entries.lock().expect("callback registry lock poisoned");
        entries
            .get(&(widget_id.clone(), event_type.to_string()))
            .map(|r| r.callback.clone())
    }

    /// Whether a handler is registered for `(widget_id, event_type)`.
    pub fn has_callback(&self, widget_id: &WidgetId, event_type: &str) -> bool {
        self.get(widget_id, event_type).is_some()
    }

    /// Invokes the handler for `(widget_id, event_type)` with `data`.
    ///
    /// Returns `(true, result)` on success, `(false, None)` when no
    /// handler is registered or the handler failed. A failing or panicking
    /// handler is caught and logged — it never crashes the
    /// event-processing path for other widgets.
    pub async fn invoke(
        &self,
        widget_id: &WidgetId,
        event_type: &str,
        data: Value,
    ) -> (bool, Option<Value>) {
        let Some(callback) = self.get(widget_id, event_type) else {
            return (false, None);
        };

        let outcome = match callback {
            Callback::Sync(handler) => {
                tokio::task::spawn_blocking(move || handler(data)).await
            }
            // A dedicated task isolates handler panics from the caller.
            Callback::Async(handler) => tokio::spawn(handler(data)).await,
        };

        match outcome {
            Ok(Ok(value)) => {
                self.record_outcome(widget_id, event_type, true);
                (true, Some(value))
            }
            Ok(Err(err)) => {
                tracing::error!(
                    widget_id = %widget_id,
                    event_type,
                    %err,
                    "callback failed"
                );
                self.record_outcome(widget_id, event_type, false);
                (false, None)
            }
            Err(join_err) => {
                tracing::error!(
                    widget_id = %widget_id,
                    event_type,
                    error = %join_err,
                    "callback panicked"
                );
                self.record_outcome(widget_id, event_type, false);
                (false, None)
            }
        }
    }

    fn record_outcome(&self, widget_id: &WidgetId, event_type: &str, success: bool) {
        let mut entries = self.entries.lock().expect("callback registry lock poisoned");
        // The handler may have been unregistered while it ran.
        if let Some(registration) = entries.get_mut(&(widget_id.clone(), event_type.to_string()))
        {
            registration.invocations += 1;
            if !success {
                registration.failures += 1;
            }
        }
    }

    /// Removes the handler for `(widget_id, event_type)`.
    pub fn unregister(&self, widget_id: &WidgetId, event_type: &str) -> bool {
        let mut entries = self.entries.lock().expect("callback registry lock poisoned");
        entries
            .remove(&(widget_id.clone(), event_type.to_string()))
            .is_some()
    }

    /// Removes every handler for a widget, returning how many were removed.
    pub fn unregister_widget(&self, widget_id: &WidgetId) -> usize {
        let mut entries = self.entries.lock().expect("callback registry lock poisoned");
        let before = entries.len();
        entries.retain(|(wid, _), _| wid != widget_id);
        before - entries.len()
    }

    /// Event types with a handler registered for the given widget.
    pub fn list_widget_events(&self, widget_id: &WidgetId) -> Vec<String> {
        let entries = self.entries.lock().expect("callback registry lock poisoned");
        let mut events: Vec<String> = entries
            .keys()
            .filter(|(wid, _)| wid == widget_id)
            .map(|(_, event)| event.clone())
            .collect();
        events.sort();
        events
    }

    /// Aggregate invocation counters.
    pub fn get_stats(&self) -> CallbackStats {
        let entries = self.entries.lock().expect("callback registry lock poisoned");
        let mut stats = CallbackStats {
            registrations: entries.len(),
            ..Default::default()
        };
        for registration in entries.values() {
            stats.invocations += registration.invocations;
            stats.failures += registration.failures;
        }
        stats
    }
}
