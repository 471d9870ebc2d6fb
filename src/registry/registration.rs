//! Heartbeat registration of one instance.
//!
//! # Responsibilities
//! - Re-PUT the instance announcement on a fixed interval
//! - Absorb every failure (log + metric), never surface it to the registrant
//! - Stop promptly when asked, without starting another heartbeat

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Method;
use serde_json::Value;

use crate::lifecycle::{BackgroundTask, ShutdownListener};
use crate::observability::metrics;
use crate::registry::transport::RegistryTransport;
use crate::registry::types::RegistryError;

/// Handle to a running heartbeat loop.
///
/// Dropping the handle stops the loop without waiting for it.
#[derive(Debug)]
pub struct Registration {
    path: String,
    interval: Duration,
    task: BackgroundTask,
}

impl Registration {
    pub(crate) fn start(transport: Arc<RegistryTransport>, path: String, payload: Value, interval: Duration) -> Self {
        tracing::info!(path = %path, interval = ?interval, "Starting registration heartbeat");

        let task_path = path.clone();
        let task = BackgroundTask::spawn(format!("registration {path}"), move |stop| {
            heartbeat_loop(transport, task_path, payload, interval, stop)
        });

        Self { path, interval, task }
    }

    /// Registry path the announcement is written to.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop heartbeating.
    ///
    /// Waits up to `timeout` for the loop to exit (`None` waits
    /// indefinitely) and returns whether it did. A heartbeat already in
    /// flight completes, but no further heartbeats are sent.
    pub async fn stop(&mut self, timeout: Option<Duration>) -> bool {
        tracing::info!(path = %self.path, "Stopping registration heartbeat");
        self.task.stop(timeout).await
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }
}

async fn heartbeat_loop(
    transport: Arc<RegistryTransport>,
    path: String,
    payload: Value,
    interval: Duration,
    mut stop: ShutdownListener,
) {
    while !stop.is_triggered() {
        let started = Instant::now();
        let result = heartbeat(&transport, &path, &payload, interval).await;
        let elapsed = started.elapsed();

        metrics::record_heartbeat(result.is_ok(), elapsed);
        match result {
            Ok(()) => tracing::debug!(path = %path, elapsed = ?elapsed, "Updated service registry"),
            Err(e) => tracing::error!(path = %path, error = %e, "Could not talk to service registry"),
        }

        if stop.sleep(interval).await {
            break;
        }
    }
    tracing::debug!(path = %path, "Registration heartbeat exited");
}

async fn heartbeat(transport: &RegistryTransport, path: &str, payload: &Value, interval: Duration) -> Result<(), RegistryError> {
    let response = transport.request(Method::PUT, path, Some(payload), Some(interval)).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(RegistryError::Status {
            status,
            path: path.to_string(),
        });
    }
    Ok(())
}
