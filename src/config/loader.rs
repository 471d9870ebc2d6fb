//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ClientConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Comma-separated registry node addresses.
pub const NODES_ENV: &str = "SERVICE_REGISTRY_NODES";
/// Default formation for bare service names.
pub const SEARCH_DOMAIN_ENV: &str = "SERVICE_REGISTRY_SEARCH_DOMAIN";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML file without environment overrides or validation.
pub fn read_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate configuration from a TOML file.
///
/// Environment overrides are applied before validation.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let mut config = read_config(path)?;

    apply_env(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay registry settings from the process environment.
pub fn apply_env(config: &mut ClientConfig) {
    apply_env_from(config, |key| std::env::var(key).ok());
}

/// Overlay registry settings using `lookup` as the environment.
///
/// A non-empty node list replaces the configured one; an empty search
/// domain clears it.
pub fn apply_env_from<F>(config: &mut ClientConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(NODES_ENV) {
        let nodes = parse_node_list(&raw);
        if !nodes.is_empty() {
            tracing::debug!(count = nodes.len(), "Registry nodes taken from environment");
            config.registry.nodes = nodes;
        }
    }

    if let Some(domain) = lookup(SEARCH_DOMAIN_ENV) {
        let domain = domain.trim();
        config.registry.search_domain = if domain.is_empty() {
            None
        } else {
            Some(domain.to_string())
        };
    }
}

/// Split a comma-separated node list, dropping blank entries.
pub fn parse_node_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
