//! Command-line client for the formation service registry.
//!
//! # Commands
//!
//! ```text
//! discovery-cli resolve http://web.billing.service/status
//! discovery-cli query billing
//! discovery-cli announce billing web --host 10.0.0.7 --port 80:31080
//! discovery-cli watch billing --interval 5
//! ```
//!
//! Registry nodes come from `--nodes`, `SERVICE_REGISTRY_NODES` or a TOML
//! config file, in that order of precedence.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;

use formation_discovery::config::loader::{apply_env, read_config};
use formation_discovery::config::validation::validate_config;
use formation_discovery::config::ClientConfig;
use formation_discovery::observability::{logging, metrics};
use formation_discovery::{Announcement, ServiceRegistryClient};

#[derive(Parser)]
#[command(name = "discovery-cli")]
#[command(about = "Register, watch and resolve services in a formation registry", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Registry nodes (comma-separated host:port or URLs)
    #[arg(long, value_delimiter = ',')]
    nodes: Vec<String>,

    /// Default formation for bare service names
    #[arg(long)]
    search_domain: Option<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a service URL to a concrete one
    Resolve { url: String },
    /// Print every instance registered in a formation
    Query { formation: String },
    /// Announce an instance and keep heartbeating until Ctrl-C
    Announce {
        formation: String,
        service: String,
        /// Instance name (random if omitted)
        #[arg(long)]
        instance: Option<String>,
        /// Externally reachable host
        #[arg(long)]
        host: Option<String>,
        /// Port mapping EXPOSED:PUBLISHED (repeatable)
        #[arg(long = "port", value_parser = parse_port_mapping)]
        ports: Vec<(u16, u16)>,
        /// Extra announcement field KEY=VALUE (repeatable)
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
        /// Heartbeat interval in seconds
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Keep a formation cache and print it periodically until Ctrl-C
    Watch {
        formation: String,
        /// Refresh interval in seconds
        #[arg(long)]
        interval: Option<u64>,
    },
}

fn parse_port_mapping(raw: &str) -> Result<(u16, u16), String> {
    let (exposed, published) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected EXPOSED:PUBLISHED, got '{raw}'"))?;
    let exposed = exposed.parse().map_err(|e| format!("exposed port '{exposed}': {e}"))?;
    let published = published.parse().map_err(|e| format!("published port '{published}': {e}"))?;
    Ok((exposed, published))
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

fn build_config(cli: &Cli) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ClientConfig::default(),
    };
    apply_env(&mut config);

    if !cli.nodes.is_empty() {
        config.registry.nodes = cli.nodes.clone();
    }
    if let Some(domain) = &cli.search_domain {
        config.registry.search_domain = Some(domain.clone());
    }
    if let Some(addr) = &cli.metrics_address {
        config.observability.metrics_address = Some(addr.clone());
    }
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }

    if let Err(errors) = validate_config(&config) {
        let joined = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        return Err(format!("invalid configuration: {joined}").into());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    logging::init_logging(&config.observability.log_level);

    if let Some(addr) = &config.observability.metrics_address {
        match addr.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(metrics_address = %addr, "Failed to parse metrics address"),
        }
    }

    let client = ServiceRegistryClient::from_config(&config)?;

    match cli.command {
        Commands::Resolve { url } => {
            let resolved = client.resolver().resolve_url(&url).await?;
            println!("{resolved}");
        }
        Commands::Query { formation } => {
            let instances: BTreeMap<_, _> = client.query_formation::<Value>(&formation).await?.into_iter().collect();
            println!("{}", serde_json::to_string_pretty(&instances)?);
        }
        Commands::Announce {
            formation,
            service,
            instance,
            host,
            ports,
            fields,
            interval,
        } => {
            let instance = instance.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
            let mut announcement = ServiceRegistryClient::build_announcement(&formation, &service, &instance, ports);
            if let Some(host) = host {
                announcement = announcement.with_host(host);
            }
            for (key, value) in fields {
                announcement = announcement.with_field(key, value);
            }

            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.registry.heartbeat_interval());
            let mut registration =
                client.register_with_interval(&formation, &service, &instance, &announcement, interval)?;
            tracing::info!(path = %registration.path(), "Announcing instance, press Ctrl-C to stop");

            tokio::signal::ctrl_c().await?;
            registration.stop(Some(interval)).await;
        }
        Commands::Watch { formation, interval } => {
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.registry.cache_interval());
            let mut cache = client
                .formation_cache_with_interval::<Announcement>(&formation, interval)
                .await;

            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = cache.query();
                        let sorted: BTreeMap<_, _> = snapshot.iter().collect();
                        println!("{}", serde_json::to_string_pretty(&sorted)?);
                    }
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Shutdown signal received");
                        break;
                    }
                }
            }
            cache.stop(Some(interval)).await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_mapping() {
        assert_eq!(parse_port_mapping("80:31080").unwrap(), (80, 31080));
        assert!(parse_port_mapping("80").is_err());
        assert!(parse_port_mapping("http:80").is_err());
    }

    #[test]
    fn test_parse_field() {
        assert_eq!(parse_field("version=1.2=rc").unwrap(), ("version".into(), "1.2=rc".into()));
        assert!(parse_field("version").is_err());
    }

    #[test]
    fn test_cli_parses_announce() {
        let cli = Cli::try_parse_from([
            "discovery-cli",
            "--nodes",
            "a:1,b:2",
            "announce",
            "billing",
            "web",
            "--port",
            "80:8080",
            "--port",
            "443:8443",
            "--field",
            "zone=eu",
        ])
        .unwrap();

        assert_eq!(cli.nodes, vec!["a:1", "b:2"]);
        match cli.command {
            Commands::Announce { ports, fields, .. } => {
                assert_eq!(ports, vec![(80, 8080), (443, 8443)]);
                assert_eq!(fields, vec![("zone".to_string(), "eu".to_string())]);
            }
            _ => panic!("expected announce"),
        }
    }
}
