//! Registry data model and error definitions.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

/// One registry replica, identified by its base URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterNode {
    url: Url,
}

impl ClusterNode {
    /// Parse a node address, either bare `host:port` or an `http(s)://` URL.
    pub fn parse(address: &str) -> RegistryResult<Self> {
        let address = address.trim();
        let candidate = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };

        let url = Url::parse(&candidate).map_err(|_| RegistryError::InvalidNode(address.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(RegistryError::InvalidNode(address.to_string()));
        }
        Ok(Self { url })
    }

    /// Base URL of the node.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Breaker key for this node.
    pub fn key(&self) -> &str {
        self.url.as_str()
    }

    /// Absolute URL for `path` on this node.
    pub fn join(&self, path: &str) -> RegistryResult<Url> {
        self.url
            .join(path)
            .map_err(|e| RegistryError::InvalidPath(format!("{path}: {e}")))
    }
}

impl fmt::Display for ClusterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

const RESERVED_FIELDS: [&str; 5] = ["formation", "service", "instance", "host", "ports"];

/// The record an instance publishes about itself.
///
/// `ports` maps the container-exposed port to the externally published
/// port; on the wire the keys are strings. Fields beyond the well-known
/// ones are kept in `extra` and round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(default)]
    pub formation: String,
    pub service: String,
    pub instance: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, with = "port_map")]
    pub ports: BTreeMap<u16, u16>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Announcement {
    pub fn new(formation: impl Into<String>, service: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            formation: formation.into(),
            service: service.into(),
            instance: instance.into(),
            host: None,
            ports: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Publish `exposed` as `published`.
    pub fn with_port(mut self, exposed: u16, published: u16) -> Self {
        self.ports.insert(exposed, published);
        self
    }

    pub fn with_ports<I>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = (u16, u16)>,
    {
        self.ports.extend(ports);
        self
    }

    /// Attach an arbitrary field. Keys naming a typed field are ignored.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if RESERVED_FIELDS.contains(&key.as_str()) {
            tracing::debug!(field = %key, "Ignoring extra field that shadows a typed field");
            return self;
        }
        self.extra.insert(key, value.into());
        self
    }

    /// The externally reachable port for an exposed container port.
    pub fn published_port(&self, exposed: u16) -> Option<u16> {
        self.ports.get(&exposed).copied()
    }

    /// Registry path this announcement is stored under.
    pub fn registry_path(&self) -> String {
        instance_path(&self.formation, &self.service, &self.instance)
    }
}

/// Wire codec for `ports`: string keys, integer values.
///
/// Needed because `extra` is flattened, which makes serde buffer the object
/// and lose serde_json's string-to-integer key coercion. Published ports
/// written as numeric strings are accepted too.
mod port_map {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PublishedPort {
        Number(u16),
        Text(String),
    }

    pub fn serialize<S>(ports: &BTreeMap<u16, u16>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(ports.iter().map(|(exposed, published)| (exposed.to_string(), published)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<u16, u16>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, PublishedPort>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(exposed, published)| -> Result<(u16, u16), D::Error> {
                let port = exposed
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| D::Error::custom(format!("invalid exposed port '{exposed}'")))?;
                let published = match published {
                    PublishedPort::Number(published) => published,
                    PublishedPort::Text(text) => text
                        .trim()
                        .parse::<u16>()
                        .map_err(|_| D::Error::custom(format!("invalid published port '{text}' for {port}")))?,
                };
                Ok((port, published))
            })
            .collect()
    }
}

/// `/{formation}/{service}.{instance}`
pub fn instance_path(formation: &str, service: &str, instance: &str) -> String {
    format!("/{formation}/{service}.{instance}")
}

/// `/{formation}`
pub fn formation_path(formation: &str) -> String {
    format!("/{formation}")
}

/// Errors talking to the registry cluster.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Every node was either breaker-open or failed.
    #[error("no reachable registry node for {method} {path} ({attempted} attempted)")]
    Unreachable {
        method: String,
        path: String,
        attempted: usize,
    },

    /// The client was constructed without any nodes.
    #[error("no registry nodes configured")]
    NoNodes,

    /// A node answered with a non-success status below 500.
    #[error("registry returned {status} for {path}")]
    Status { status: StatusCode, path: String },

    /// Network-level failure against a single node.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A node answered with a 5xx status.
    #[error("registry node error {status}")]
    ServerError { status: StatusCode },

    /// The response body could not be decoded.
    #[error("invalid registry response: {0}")]
    Decode(String),

    #[error("invalid registry node address '{0}'")]
    InvalidNode(String),

    #[error("invalid registry path {0}")]
    InvalidPath(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
