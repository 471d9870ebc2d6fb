//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to a registry node:
//!     → circuit_breaker.rs (reject fast if the node's breaker is open)
//!     → call the node
//!     → circuit_breaker.rs (record success or failure for that node)
//! ```
//!
//! # Design Decisions
//! - Circuit breaker prevents hammering a down replica
//! - Failover across nodes lives in the transport, not here

pub mod circuit_breaker;

pub use circuit_breaker::{BreakerError, BreakerState, CircuitBreakerSet};
