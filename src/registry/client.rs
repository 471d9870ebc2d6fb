//! Service registry client.
//!
//! # Responsibilities
//! - Own the registry node list and its circuit breakers
//! - Query formations from the registry
//! - Create registrations, formation caches and resolvers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::config::{BreakerConfig, ClientConfig, RegistryConfig};
use crate::registry::cache::FormationCache;
use crate::registry::registration::Registration;
use crate::registry::transport::RegistryTransport;
use crate::registry::types::{
    formation_path, instance_path, Announcement, ClusterNode, RegistryError, RegistryResult,
};
use crate::resolver::{ResolveResult, Resolver};

/// Client for a cluster of service registry nodes.
///
/// Cheap to clone; clones share the node list and breaker state.
#[derive(Debug, Clone)]
pub struct ServiceRegistryClient {
    transport: Arc<RegistryTransport>,
    config: Arc<RegistryConfig>,
}

impl ServiceRegistryClient {
    /// Create a client for the nodes in `config`.
    pub fn new(config: RegistryConfig, breaker: BreakerConfig) -> RegistryResult<Self> {
        let nodes = config
            .nodes
            .iter()
            .map(|address| ClusterNode::parse(address))
            .collect::<RegistryResult<Vec<_>>>()?;

        let transport = RegistryTransport::new(nodes, breaker)?;
        tracing::info!(
            nodes = transport.nodes().len(),
            search_domain = ?config.search_domain,
            "Service registry client initialized"
        );
        Ok(Self::with_transport(transport, config))
    }

    pub fn from_config(config: &ClientConfig) -> RegistryResult<Self> {
        Self::new(config.registry.clone(), config.breaker.clone())
    }

    /// Create a client over an existing transport.
    ///
    /// `config.nodes` is ignored; the transport's nodes are used.
    pub fn with_transport(transport: RegistryTransport, config: RegistryConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config: Arc::new(config),
        }
    }

    /// Nodes in the order they are tried.
    pub fn nodes(&self) -> &[ClusterNode] {
        self.transport.nodes()
    }

    pub fn transport(&self) -> &RegistryTransport {
        &self.transport
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Build an announcement for `instance` of `service` in `formation`.
    pub fn build_announcement<I>(formation: &str, service: &str, instance: &str, ports: I) -> Announcement
    where
        I: IntoIterator<Item = (u16, u16)>,
    {
        Announcement::new(formation, service, instance).with_ports(ports)
    }

    /// Fetch every instance of `formation`, keyed by instance key.
    ///
    /// Each value is deserialized into `T`; entries that do not fit `T` are
    /// logged and left out.
    pub async fn query_formation<T>(&self, formation: &str) -> RegistryResult<HashMap<String, T>>
    where
        T: DeserializeOwned,
    {
        let path = formation_path(formation);
        let response = self.transport.request(Method::GET, &path, None, None).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status { status, path });
        }

        let raw: HashMap<String, Value> = response
            .json()
            .await
            .map_err(|e| RegistryError::Decode(format!("{path}: {e}")))?;

        let mut instances = HashMap::with_capacity(raw.len());
        for (key, value) in raw {
            match serde_json::from_value::<T>(value) {
                Ok(instance) => {
                    instances.insert(key, instance);
                }
                Err(e) => {
                    tracing::warn!(formation, key = %key, error = %e, "Skipping malformed registry entry");
                }
            }
        }
        Ok(instances)
    }

    /// Register `instance` of `service` in `formation`, heartbeating at the
    /// configured interval until the returned handle is stopped.
    pub fn register<A>(&self, formation: &str, service: &str, instance: &str, announcement: &A) -> RegistryResult<Registration>
    where
        A: Serialize + ?Sized,
    {
        self.register_with_interval(formation, service, instance, announcement, self.config.heartbeat_interval())
    }

    pub fn register_with_interval<A>(
        &self,
        formation: &str,
        service: &str,
        instance: &str,
        announcement: &A,
        interval: Duration,
    ) -> RegistryResult<Registration>
    where
        A: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(announcement).map_err(|e| RegistryError::Decode(e.to_string()))?;
        Ok(Registration::start(
            self.transport.clone(),
            instance_path(formation, service, instance),
            payload,
            interval,
        ))
    }

    /// Cache all instances of `formation`, refreshed at the configured interval.
    pub async fn formation_cache<T>(&self, formation: &str) -> FormationCache<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.formation_cache_with_interval(formation, self.config.cache_interval())
            .await
    }

    pub async fn formation_cache_with_interval<T>(&self, formation: &str, interval: Duration) -> FormationCache<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        FormationCache::start(
            self.clone(),
            formation.to_string(),
            interval,
            self.config.cache_ready_timeout(),
        )
        .await
    }

    /// A resolver using the configured search domain.
    pub fn resolver(&self) -> Resolver {
        Resolver::new(self.clone(), self.config.search_domain.as_deref())
    }

    /// A resolver using `search_domain` for bare service names.
    pub fn resolver_with_search_domain(&self, search_domain: Option<&str>) -> Resolver {
        Resolver::new(self.clone(), search_domain)
    }

    /// Resolve a URL without a search domain.
    pub async fn resolve(&self, url: &str) -> ResolveResult<Url> {
        self.resolver_with_search_domain(None).resolve_url(url).await
    }
}
