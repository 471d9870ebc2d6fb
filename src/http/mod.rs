//! HTTP glue for service consumers.
//!
//! # Data Flow
//! ```text
//! request to http://service.formation.service/...
//!     → resolving.rs (resolve host:port through the registry)
//!     → reqwest request to the published address
//! ```

pub mod resolving;

pub use resolving::ResolvingClient;
