//! Formation service discovery client library.
//!
//! Registers instances with a cluster of registry nodes, caches formation
//! membership in the background, and resolves symbolic service names such
//! as `db.billing.service` to concrete host/port pairs.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod resolver;

pub use config::ClientConfig;
pub use http::ResolvingClient;
pub use registry::{Announcement, FormationCache, Registration, RegistryError, ServiceRegistryClient};
pub use resolver::{ResolveError, Resolver};
