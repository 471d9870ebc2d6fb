//! Symbolic service name grammar.
//!
//! ```text
//! service                               → service in the search domain
//! service.formation.service             → any instance of service in formation
//! instance.service.formation.service    → that exact instance
//! ```
//!
//! Any other dotted host not ending in `.service` is already concrete.

use std::net::IpAddr;

use crate::resolver::{ResolveError, ResolveResult};

/// Reserved final label marking a symbolic name. Case-sensitive.
pub const SERVICE_MARKER: &str = "service";

/// A hostname classified by shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceName<'a> {
    /// A real host; resolution returns it unchanged.
    Concrete,
    /// `service`, resolved in the search domain.
    Local { service: &'a str },
    /// `service.formation.service`
    Formation { service: &'a str, formation: &'a str },
    /// `instance.service.formation.service`
    Instance {
        instance: &'a str,
        service: &'a str,
        formation: &'a str,
    },
}

impl<'a> ServiceName<'a> {
    pub fn parse(host: &'a str) -> ResolveResult<Self> {
        if host.parse::<IpAddr>().is_ok() {
            return Ok(ServiceName::Concrete);
        }
        if host.contains('.') && !host.ends_with(".service") {
            return Ok(ServiceName::Concrete);
        }

        let parts: Vec<&str> = host.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(malformed(host));
        }

        match parts[..] {
            [service] => Ok(ServiceName::Local { service }),
            [service, formation, marker] if marker == SERVICE_MARKER => Ok(ServiceName::Formation { service, formation }),
            [instance, service, formation, marker] if marker == SERVICE_MARKER => Ok(ServiceName::Instance {
                instance,
                service,
                formation,
            }),
            _ => Err(malformed(host)),
        }
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, ServiceName::Concrete)
    }
}

fn malformed(host: &str) -> ResolveError {
    ResolveError::MalformedName { host: host.to_string() }
}
