//! Service name resolution subsystem.
//!
//! # Data Flow
//! ```text
//! URL or host:port
//!     → name.rs (classify: concrete, service, service.formation.service,
//!       instance.service.formation.service)
//!     → engine.rs (query the formation, filter, pick one at random)
//!     → published host:port from the chosen announcement
//! ```
//!
//! # Design Decisions
//! - Concrete hosts pass through untouched
//! - Resolution failures are semantic and never retried
//! - A named instance never falls back to "any instance"

pub mod engine;
pub mod name;

use thiserror::Error;

use crate::registry::types::RegistryError;

pub use engine::Resolver;
pub use name::ServiceName;

/// Errors resolving a symbolic service name.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{host}: no search domain specified")]
    NoSearchDomain { host: String },

    #[error("{host}: unsupported service name")]
    MalformedName { host: String },

    #[error("{service}.{formation}.service:{port}: no instances")]
    NoInstances {
        service: String,
        formation: String,
        port: u16,
    },

    #[error("{instance}.{service}.{formation}.service:{port}: no such instance")]
    NoSuchInstance {
        instance: String,
        service: String,
        formation: String,
        port: u16,
    },

    #[error("{instance}.{service}.{formation}.service: port {port} not exposed")]
    PortNotPublished {
        instance: String,
        service: String,
        formation: String,
        port: u16,
    },

    #[error("{instance}.{service}.{formation}.service: announcement has no host")]
    MissingHost {
        instance: String,
        service: String,
        formation: String,
    },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The registry could not be queried.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result type for resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;
