//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! Presence:
//!     Registration (registration.rs)
//!     → PUT /{formation}/{service}.{instance} every interval
//!     → transport.rs → some registry node
//!
//! Discovery:
//!     ServiceRegistryClient::query_formation (client.rs)
//!     → GET /{formation} → transport.rs → some registry node
//!     → instance key → announcement map
//!
//!     FormationCache (cache.rs) repeats the query in the background
//!     and swaps the result in whole
//! ```
//!
//! # Design Decisions
//! - No process-wide client; callers construct and pass one explicitly
//! - Background loops absorb failures; queries propagate them

pub mod cache;
pub mod client;
pub mod registration;
pub mod transport;
pub mod types;

pub use cache::{FormationCache, FormationSnapshot};
pub use client::ServiceRegistryClient;
pub use registration::Registration;
pub use transport::RegistryTransport;
pub use types::{Announcement, ClusterNode, RegistryError, RegistryResult};
