//! Lifecycle management for background loops.
//!
//! # Data Flow
//! ```text
//! register() / formation_cache()
//!     → task.rs spawns the loop with a shutdown listener
//!     → loop body runs, then shutdown.rs interruptible sleep
//!
//! stop(timeout):
//!     → trigger shutdown → sleep wakes early → loop exits
//!     → join the task, bounded by timeout
//! ```
//!
//! # Design Decisions
//! - A request already in flight finishes; no further iterations start
//! - Stop is idempotent and safe to retry after a timeout
//! - Dropping a handle stops its loop without blocking

pub mod shutdown;
pub mod task;

pub use shutdown::{Shutdown, ShutdownListener};
pub use task::BackgroundTask;
