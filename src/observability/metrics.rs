//! Metrics collection and exposition.
//!
//! # Metrics
//! - `registry_requests_total` (counter): attempts per node, by outcome
//! - `registry_unreachable_total` (counter): calls that exhausted every node
//! - `registry_breaker_transitions_total` (counter): breaker state changes per node
//! - `registry_heartbeats_total` (counter): heartbeat PUTs, by outcome
//! - `registry_heartbeat_duration_seconds` (histogram): heartbeat round-trip time
//! - `registry_cache_refreshes_total` (counter): cache refreshes per formation, by outcome
//! - `registry_cache_instances` (gauge): instances in the latest snapshot
//! - `registry_resolutions_total` (counter): symbolic name resolutions, by outcome
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failure"
    }
}

/// Record one attempt against a registry node.
pub fn record_registry_request(node: &str, outcome: &'static str) {
    counter!("registry_requests_total", "node" => node.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_registry_unreachable() {
    counter!("registry_unreachable_total").increment(1);
}

pub fn record_breaker_transition(target: &str, state: &'static str) {
    counter!("registry_breaker_transitions_total", "node" => target.to_string(), "state" => state)
        .increment(1);
}

pub fn record_heartbeat(ok: bool, elapsed: Duration) {
    counter!("registry_heartbeats_total", "outcome" => outcome(ok)).increment(1);
    histogram!("registry_heartbeat_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_cache_refresh(formation: &str, ok: bool, size: usize) {
    counter!(
        "registry_cache_refreshes_total",
        "formation" => formation.to_string(),
        "outcome" => outcome(ok)
    )
    .increment(1);
    if ok {
        gauge!("registry_cache_instances", "formation" => formation.to_string()).set(size as f64);
    }
}

pub fn record_resolution(outcome: &'static str) {
    counter!("registry_resolutions_total", "outcome" => outcome).increment(1);
}
