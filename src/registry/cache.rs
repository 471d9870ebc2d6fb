//! Background snapshot of every instance in one formation.
//!
//! # Responsibilities
//! - Refresh the formation on a fixed interval
//! - Serve reads from memory, never from the network
//! - Keep the last good snapshot when a refresh fails
//!
//! # Design Decisions
//! - Each refresh replaces the whole snapshot; readers get one complete
//!   `Arc` and never a mix of two refreshes
//! - The swap happens after the network call returns, never during it

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::lifecycle::{BackgroundTask, ShutdownListener};
use crate::observability::metrics;
use crate::registry::client::ServiceRegistryClient;

/// Instance key → value, as of one refresh.
pub type FormationSnapshot<T> = HashMap<String, T>;

/// Handle to a formation cache kept fresh by a background task.
///
/// Dropping the handle stops the refresh loop without waiting for it.
#[derive(Debug)]
pub struct FormationCache<T> {
    formation: String,
    interval: Duration,
    snapshot: Arc<ArcSwap<FormationSnapshot<T>>>,
    ready: watch::Receiver<bool>,
    task: BackgroundTask,
}

impl<T> FormationCache<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    /// Start refreshing and wait up to `ready_timeout` for the first attempt.
    ///
    /// The first refresh may not have finished when this returns; `query()`
    /// then yields an empty snapshot.
    pub(crate) async fn start(
        client: ServiceRegistryClient,
        formation: String,
        interval: Duration,
        ready_timeout: Duration,
    ) -> Self {
        let snapshot = Arc::new(ArcSwap::from_pointee(FormationSnapshot::new()));
        let (ready_tx, ready) = watch::channel(false);

        tracing::info!(formation = %formation, interval = ?interval, "Starting formation cache");

        let task = {
            let snapshot = snapshot.clone();
            let formation = formation.clone();
            BackgroundTask::spawn(format!("formation cache {formation}"), move |stop| {
                refresh_loop(client, formation, interval, snapshot, ready_tx, stop)
            })
        };

        let cache = Self {
            formation,
            interval,
            snapshot,
            ready,
            task,
        };
        if !cache.wait_ready(ready_timeout).await {
            tracing::debug!(formation = %cache.formation, "Formation cache not ready yet, serving empty snapshot");
        }
        cache
    }
}

impl<T> FormationCache<T> {
    /// All instances of the formation as of the latest successful refresh.
    pub fn query(&self) -> Arc<FormationSnapshot<T>> {
        self.snapshot.load_full()
    }

    pub fn formation(&self) -> &str {
        &self.formation
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the first refresh attempt has completed.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait up to `timeout` for the first refresh attempt to complete.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut ready = self.ready.clone();
        let waited = tokio::time::timeout(timeout, ready.wait_for(|ready| *ready)).await;
        matches!(waited, Ok(Ok(_)))
    }

    /// Stop refreshing. The last snapshot stays readable.
    ///
    /// Waits up to `timeout` for the loop to exit (`None` waits
    /// indefinitely) and returns whether it did.
    pub async fn stop(&mut self, timeout: Option<Duration>) -> bool {
        tracing::info!(formation = %self.formation, "Stopping formation cache");
        self.task.stop(timeout).await
    }
}

async fn refresh_loop<T>(
    client: ServiceRegistryClient,
    formation: String,
    interval: Duration,
    snapshot: Arc<ArcSwap<FormationSnapshot<T>>>,
    ready: watch::Sender<bool>,
    mut stop: ShutdownListener,
) where
    T: DeserializeOwned + Send + Sync + 'static,
{
    while !stop.is_triggered() {
        match client.query_formation::<T>(&formation).await {
            Ok(instances) => {
                let size = instances.len();
                snapshot.store(Arc::new(instances));
                metrics::record_cache_refresh(&formation, true, size);
                tracing::debug!(formation = %formation, instances = size, "Formation cache refreshed");
            }
            Err(e) => {
                metrics::record_cache_refresh(&formation, false, 0);
                tracing::warn!(formation = %formation, error = %e, "Formation cache refresh failed, keeping previous snapshot");
            }
        }
        ready.send_replace(true);

        if stop.sleep(interval).await {
            break;
        }
    }
    tracing::debug!(formation = %formation, "Formation cache refresh loop exited");
}
