//! Failover transport across registry nodes.
//!
//! # Responsibilities
//! - Hold the node list in a fixed order, shuffled once at construction
//! - Try nodes in order, skipping those whose breaker is open
//! - Treat network errors and 5xx responses as node failures and move on
//! - Return any other response (including 4xx) to the caller untouched
//!
//! # Design Decisions
//! - Nodes are interchangeable; the shuffle spreads load across clients
//! - No retries beyond one pass over the node list

use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::{Method, Response};
use serde_json::Value;

use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::registry::types::{ClusterNode, RegistryError, RegistryResult};
use crate::resilience::circuit_breaker::{BreakerError, CircuitBreakerSet};

/// Issues requests to some healthy node of the registry cluster.
#[derive(Debug)]
pub struct RegistryTransport {
    nodes: Vec<ClusterNode>,
    http: reqwest::Client,
    breakers: CircuitBreakerSet,
}

impl RegistryTransport {
    /// Create a transport over `nodes` in a random order.
    pub fn new(mut nodes: Vec<ClusterNode>, breaker: BreakerConfig) -> RegistryResult<Self> {
        nodes.shuffle(&mut rand::thread_rng());
        Self::with_order(nodes, breaker)
    }

    /// Create a transport that tries `nodes` in exactly the given order.
    pub fn with_order(nodes: Vec<ClusterNode>, breaker: BreakerConfig) -> RegistryResult<Self> {
        if nodes.is_empty() {
            return Err(RegistryError::NoNodes);
        }
        // Registry nodes are cluster-internal.
        let http = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self {
            nodes,
            http,
            breakers: CircuitBreakerSet::new(breaker),
        })
    }

    /// Nodes in the order they are tried.
    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn breakers(&self) -> &CircuitBreakerSet {
        &self.breakers
    }

    /// Issue `method path` against the first node that answers.
    ///
    /// `timeout` bounds each individual node attempt.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        timeout: Option<Duration>,
    ) -> RegistryResult<Response> {
        let mut attempted = 0;

        for node in &self.nodes {
            let mut builder = self.http.request(method.clone(), node.join(path)?);
            if let Some(body) = body {
                builder = builder.json(body);
            }
            if let Some(timeout) = timeout {
                builder = builder.timeout(timeout);
            }

            match self.breakers.call(node.key(), || send_once(builder)).await {
                Ok(response) => {
                    metrics::record_registry_request(node.key(), "success");
                    return Ok(response);
                }
                Err(BreakerError::Open { .. }) => {
                    metrics::record_registry_request(node.key(), "skipped");
                    tracing::debug!(node = %node, %method, path, "Circuit open, skipping registry node");
                }
                Err(BreakerError::Failed(e)) => {
                    attempted += 1;
                    metrics::record_registry_request(node.key(), "failure");
                    tracing::warn!(node = %node, %method, path, error = %e, "Registry node failed, trying next");
                }
            }
        }

        metrics::record_registry_unreachable();
        tracing::error!(%method, path, attempted, nodes = self.nodes.len(), "No registry node reachable");
        Err(RegistryError::Unreachable {
            method: method.to_string(),
            path: path.to_string(),
            attempted,
        })
    }
}

async fn send_once(builder: reqwest::RequestBuilder) -> RegistryResult<Response> {
    let response = builder.send().await?;
    let status = response.status();
    if status.as_u16() >= 500 {
        return Err(RegistryError::ServerError { status });
    }
    Ok(response)
}
