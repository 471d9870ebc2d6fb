//! Resolution of symbolic names against the registry.

use std::net::Ipv6Addr;

use rand::seq::SliceRandom;
use url::{Host, Url};

use crate::observability::metrics;
use crate::registry::client::ServiceRegistryClient;
use crate::registry::types::Announcement;
use crate::resolver::name::ServiceName;
use crate::resolver::{ResolveError, ResolveResult};

/// Turns symbolic service names into concrete host/port pairs.
///
/// Every resolution queries the registry directly rather than a
/// formation cache, so results reflect the latest accepted registrations.
#[derive(Debug, Clone)]
pub struct Resolver {
    client: ServiceRegistryClient,
    search_domain: Option<String>,
}

impl Resolver {
    /// Create a resolver. Only the first label of `search_domain` is used.
    pub fn new(client: ServiceRegistryClient, search_domain: Option<&str>) -> Self {
        let search_domain = search_domain
            .and_then(|domain| domain.split('.').next())
            .filter(|formation| !formation.is_empty())
            .map(String::from);
        Self { client, search_domain }
    }

    /// Formation used for bare service names.
    pub fn search_domain(&self) -> Option<&str> {
        self.search_domain.as_deref()
    }

    /// Resolve the host and port of `url`, keeping everything else.
    ///
    /// A URL without an explicit port uses its scheme's default port.
    pub async fn resolve_url(&self, url: &str) -> ResolveResult<Url> {
        let parsed = Url::parse(url).map_err(|e| ResolveError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        self.resolve_parsed_url(&parsed).await
    }

    pub async fn resolve_parsed_url(&self, url: &Url) -> ResolveResult<Url> {
        let invalid = |reason: &str| ResolveError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain,
            Some(_) => {
                metrics::record_resolution("passthrough");
                return Ok(url.clone());
            }
            None => return Err(invalid("missing host")),
        };
        if ServiceName::parse(host)?.is_concrete() {
            metrics::record_resolution("passthrough");
            return Ok(url.clone());
        }
        let port = url.port_or_known_default().ok_or_else(|| invalid("missing port"))?;

        let (resolved_host, resolved_port) = self.resolve_host_port(host, port).await?;

        let mut resolved = url.clone();
        resolved
            .set_host(Some(&url_host(&resolved_host)))
            .map_err(|e| invalid(&format!("resolved host '{resolved_host}': {e}")))?;
        resolved
            .set_port(Some(resolved_port))
            .map_err(|_| invalid("cannot carry a port"))?;
        Ok(resolved)
    }

    /// Resolve `host:port` to the published address of a registered instance.
    ///
    /// Concrete hosts are returned unchanged.
    pub async fn resolve_host_port(&self, host: &str, port: u16) -> ResolveResult<(String, u16)> {
        let result = match ServiceName::parse(host)? {
            ServiceName::Concrete => {
                metrics::record_resolution("passthrough");
                return Ok((host.to_string(), port));
            }
            ServiceName::Local { service } => {
                let formation = self
                    .search_domain
                    .as_deref()
                    .ok_or_else(|| ResolveError::NoSearchDomain { host: host.to_string() })?;
                self.resolve_any(port, service, formation).await
            }
            ServiceName::Formation { service, formation } => self.resolve_any(port, service, formation).await,
            ServiceName::Instance {
                instance,
                service,
                formation,
            } => self.resolve_one(port, instance, service, formation).await,
        };

        match &result {
            Ok((resolved_host, resolved_port)) => {
                metrics::record_resolution("resolved");
                tracing::debug!(host, port, resolved_host = %resolved_host, resolved_port, "Resolved service name");
            }
            Err(e) => {
                metrics::record_resolution("failed");
                tracing::debug!(host, port, error = %e, "Service name resolution failed");
            }
        }
        result
    }

    async fn resolve_any(&self, port: u16, service: &str, formation: &str) -> ResolveResult<(String, u16)> {
        let instances = self.client.query_formation::<Announcement>(formation).await?;
        let chosen = select_instance(instances.values(), service, None).ok_or_else(|| ResolveError::NoInstances {
            service: service.to_string(),
            formation: formation.to_string(),
            port,
        })?;
        endpoint(chosen, port)
    }

    async fn resolve_one(&self, port: u16, instance: &str, service: &str, formation: &str) -> ResolveResult<(String, u16)> {
        let instances = self.client.query_formation::<Announcement>(formation).await?;
        let chosen =
            select_instance(instances.values(), service, Some(instance)).ok_or_else(|| ResolveError::NoSuchInstance {
                instance: instance.to_string(),
                service: service.to_string(),
                formation: formation.to_string(),
                port,
            })?;
        endpoint(chosen, port)
    }
}

/// Pick uniformly at random among announcements of `service` (and
/// `instance`, if given). Names compare ASCII case-insensitively.
pub fn select_instance<'a, I>(candidates: I, service: &str, instance: Option<&str>) -> Option<&'a Announcement>
where
    I: IntoIterator<Item = &'a Announcement>,
{
    let matching: Vec<&Announcement> = candidates
        .into_iter()
        .filter(|a| a.service.eq_ignore_ascii_case(service))
        .filter(|a| instance.map_or(true, |name| a.instance.eq_ignore_ascii_case(name)))
        .collect();

    matching.choose(&mut rand::thread_rng()).copied()
}

/// Host and published port of `announcement` for an exposed `port`.
pub fn endpoint(announcement: &Announcement, port: u16) -> ResolveResult<(String, u16)> {
    let published = announcement
        .published_port(port)
        .ok_or_else(|| ResolveError::PortNotPublished {
            instance: announcement.instance.clone(),
            service: announcement.service.clone(),
            formation: announcement.formation.clone(),
            port,
        })?;
    let host = announcement.host.clone().ok_or_else(|| ResolveError::MissingHost {
        instance: announcement.instance.clone(),
        service: announcement.service.clone(),
        formation: announcement.formation.clone(),
    })?;
    Ok((host, published))
}

/// `host` as it must appear in a URL; IPv6 literals get brackets.
fn url_host(host: &str) -> String {
    if host.parse::<Ipv6Addr>().is_ok() {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}
