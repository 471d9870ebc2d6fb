//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the discovery client.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the discovery client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Registry cluster and timing settings.
    pub registry: RegistryConfig,

    /// Per-node circuit breaker settings.
    pub breaker: BreakerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Registry cluster configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry node addresses (`host:port` or full URL).
    pub nodes: Vec<String>,

    /// Default formation used to resolve bare service names.
    pub search_domain: Option<String>,

    /// Interval between heartbeats in seconds.
    pub heartbeat_interval_secs: u64,

    /// Interval between formation cache refreshes in seconds.
    pub cache_interval_secs: u64,

    /// How long `formation_cache()` waits for the first refresh, in milliseconds.
    pub cache_ready_timeout_ms: u64,
}

impl RegistryConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn cache_interval(&self) -> Duration {
        Duration::from_secs(self.cache_interval_secs)
    }

    pub fn cache_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_ready_timeout_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            search_domain: None,
            heartbeat_interval_secs: 3,
            cache_interval_secs: 15,
            cache_ready_timeout_ms: 100,
        }
    }
}

/// Circuit breaker configuration, applied to every registry node.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failures within the window before a node's breaker opens.
    pub failure_threshold: u32,

    /// Seconds an open breaker waits before allowing a trial call.
    pub reset_timeout_secs: u64,

    /// Sliding window in seconds over which failures are counted.
    pub failure_window_secs: u64,
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }

    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_secs: 10,
            failure_window_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Prometheus exporter bind address. Metrics are only exported when set.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: None,
        }
    }
}
