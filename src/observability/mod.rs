//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! transport, breakers, heartbeats, caches, resolver:
//!     → logging.rs (tracing events, filtered by RUST_LOG or config)
//!     → metrics.rs (per-node, per-formation and per-outcome counters)
//!
//! Exposed via:
//!     → stdout
//!     → optional Prometheus listener
//! ```
//!
//! # Design Decisions
//! - Heartbeat and refresh loops have no caller to return errors to, so
//!   their failures surface only here
//! - Nothing is recorded or exported until the binary opts in

pub mod logging;
pub mod metrics;
