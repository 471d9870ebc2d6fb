//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overlay: node list, search domain)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → handed to ServiceRegistryClient at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no process-wide client
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::BreakerConfig;
pub use schema::ClientConfig;
pub use schema::ObservabilityConfig;
pub use schema::RegistryConfig;
