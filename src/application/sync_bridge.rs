//! Bridge for synchronous call sites into the async stores.
//!
//! Owns one persistent background thread running a dedicated tokio
//! runtime. Synchronous callers submit a future and block on its result;
//! a caller already inside an async runtime gets an error instead of a
//! deadlock.

use std::future::Future;
use std::sync::mpsc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the blocking bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The bridge was invoked from inside an async runtime context, where
    /// blocking on the helper loop would deadlock the caller.
    #[error("blocking bridge invoked from within an async runtime context")]
    WouldDeadlock,

    /// The bridged operation did not complete within the timeout.
    #[error("bridged operation timed out after {0:?}")]
    Timeout(Duration),

    /// The background runtime could not be started or has shut down.
    #[error("bridge runtime unavailable: {0}")]
    Unavailable(String),
}

/// Extra wait beyond the future's own timeout before giving up on the
/// result channel.
const RESULT_GRACE: Duration = Duration::from_secs(1);

/// Persistent helper loop for synchronous callers.
///
/// Construct once per process (typically alongside the composition root)
/// and reuse — spinning up an event loop per call is exactly what this
/// component exists to avoid.
#[derive(Debug)]
pub struct SyncBridge {
    handle: tokio::runtime::Handle,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
    default_timeout: Duration,
}

impl SyncBridge {
    /// Starts the background runtime thread.
    pub fn new(default_timeout: Duration) -> Result<Self, BridgeError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name("widget-relay-bridge")
            .build()
            .map_err(|e| BridgeError::Unavailable(e.to_string()))?;
        let handle = runtime.handle().clone();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let thread = std::thread::Builder::new()
            .name("widget-relay-bridge".to_string())
            .spawn(move || {
                // Drives spawned futures until shutdown is signalled.
                let _ = runtime.block_on(shutdown_rx);
            })
            .map_err(|e| BridgeError::Unavailable(e.to_string()))?;

        Ok(Self {
            handle,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
            default_timeout,
        })
    }

    /// Runs a future to completion with the default timeout.
    pub fn run<F>(&self, future: F) -> Result<F::Output, BridgeError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.run_with_timeout(future, self.default_timeout)
    }

    /// Runs a future to completion, blocking the calling thread.
    ///
    /// Returns `BridgeError::WouldDeadlock` when called from inside an
    /// async runtime context — submit the future directly there instead.
    pub fn run_with_timeout<F>(
        &self,
        future: F,
        timeout: Duration,
    ) -> Result<F::Output, BridgeError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(BridgeError::WouldDeadlock);
        }

        let (tx, rx) = mpsc::channel();
        self.handle.spawn(async move {
            let result = tokio::time::timeout(timeout, future).await;
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout + RESULT_GRACE) {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(_elapsed)) => Err(BridgeError::Timeout(timeout)),
            Err(_) => Err(BridgeError::Timeout(timeout)),
        }
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_runs_future_from_plain_thread() {
        let bridge = SyncBridge::new(Duration::from_secs(5)).unwrap();
        let result = bridge.run(async { 2 + 2 }).unwrap();
        assert_eq!(result, 4);
    }

    #[test]
    fn bridge_runs_futures_repeatedly_on_same_loop() {
        let bridge = SyncBridge::new(Duration::from_secs(5)).unwrap();
        for i in 0..10 {
            let result = bridge.run(async move { i * 2 }).unwrap();
            assert_eq!(result, i * 2);
        }
    }

    #[test]
    fn bridge_times_out_long_operations() {
        let bridge = SyncBridge::new(Duration::from_secs(5)).unwrap();
        let result = bridge.run_with_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            },
            Duration::from_millis(50),
        );
        assert!(matches!(result, Err(BridgeError::Timeout(_))));
    }

    #[tokio::test]
    async fn bridge_refuses_reentrant_use() {
        let bridge = SyncBridge::new(Duration::from_secs(5)).unwrap();
        let result = bridge.run(async { 1 });
        assert!(matches!(result, Err(BridgeError::WouldDeadlock)));
    }

    #[test]
    fn drop_shuts_the_loop_down() {
        let bridge = SyncBridge::new(Duration::from_secs(5)).unwrap();
        bridge.run(async {}).unwrap();
        drop(bridge); // must not hang
    }
}
