//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every registry node address parses
//! - Validate value ranges (intervals > 0, thresholds > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::ClientConfig;
use crate::registry::types::ClusterNode;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no registry nodes configured")]
    NoNodes,

    #[error("invalid registry node address '{0}'")]
    InvalidNode(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.registry.nodes.is_empty() {
        errors.push(ValidationError::NoNodes);
    }
    for node in &config.registry.nodes {
        if ClusterNode::parse(node).is_err() {
            errors.push(ValidationError::InvalidNode(node.clone()));
        }
    }

    let positive = [
        ("registry.heartbeat_interval_secs", config.registry.heartbeat_interval_secs),
        ("registry.cache_interval_secs", config.registry.cache_interval_secs),
        ("breaker.failure_threshold", config.breaker.failure_threshold as u64),
        ("breaker.failure_window_secs", config.breaker.failure_window_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
