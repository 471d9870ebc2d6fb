//! Stoppable background tasks.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::{Shutdown, ShutdownListener};

/// A spawned loop paired with the signal that stops it.
///
/// Dropping the task triggers its shutdown signal without waiting for it.
#[derive(Debug)]
pub struct BackgroundTask {
    name: String,
    shutdown: Shutdown,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Spawn `body` on the current runtime, handing it a shutdown listener.
    pub fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(ShutdownListener) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(body(shutdown.subscribe()));
        Self {
            name: name.into(),
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signal the loop to stop and wait for it to exit.
    ///
    /// Waits at most `timeout` (`None` waits indefinitely). Returns `true`
    /// once the task has exited; `false` if it is still running after the
    /// timeout, in which case `stop` may be called again.
    pub async fn stop(&mut self, timeout: Option<Duration>) -> bool {
        self.shutdown.trigger();

        let Some(handle) = self.handle.as_mut() else {
            return true;
        };

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!(task = %self.name, timeout = ?limit, "Background task still running after stop timeout");
                    return false;
                }
            },
            None => handle.await,
        };

        if let Err(e) = joined {
            tracing::error!(task = %self.name, error = %e, "Background task ended abnormally");
        }
        self.handle = None;
        tracing::debug!(task = %self.name, "Background task stopped");
        true
    }

    /// Whether stop has been requested.
    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
