//! Registry client behavior against in-process registry nodes.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};

use formation_discovery::config::BreakerConfig;
use formation_discovery::resilience::BreakerState;
use formation_discovery::{Announcement, RegistryError};

mod common;

use common::{client_for, lenient_breaker, unused_node, MockRegistry};

fn web(instance: &str, host: &str) -> Announcement {
    Announcement::new("billing", "web", instance)
        .with_host(host)
        .with_port(80, 31080)
}

#[tokio::test]
async fn test_failover_to_next_node() {
    let bad = MockRegistry::start().await;
    let good = MockRegistry::start().await;
    bad.fail_with(Some(503));
    good.seed(&web("1", "10.0.0.1"));

    let breaker = BreakerConfig {
        failure_threshold: 1,
        ..BreakerConfig::default()
    };
    let client = client_for(&[bad.node(), good.node()], breaker);

    let instances = client.query_formation::<Announcement>("billing").await.unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances["web.1"].host.as_deref(), Some("10.0.0.1"));
    assert_eq!(bad.requests(), 1);
    assert_eq!(client.transport().breakers().state(&bad.key()), BreakerState::Open);

    // The open node is skipped entirely.
    client.query_formation::<Value>("billing").await.unwrap();
    assert_eq!(bad.requests(), 1);
    assert_eq!(good.requests(), 2);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let first = MockRegistry::start().await;
    let second = MockRegistry::start().await;
    first.fail_with(Some(404));

    let client = client_for(&[first.node(), second.node()], BreakerConfig::default());

    let err = client.query_formation::<Value>("billing").await.unwrap_err();
    assert!(matches!(err, RegistryError::Status { status, .. } if status == StatusCode::NOT_FOUND));
    assert_eq!(second.requests(), 0);
    assert_eq!(client.transport().breakers().state(&first.key()), BreakerState::Closed);
}

#[tokio::test]
async fn test_all_nodes_down() {
    let client = client_for(&[unused_node().await, unused_node().await], BreakerConfig::default());

    let err = client.query_formation::<Value>("billing").await.unwrap_err();
    assert!(matches!(err, RegistryError::Unreachable { attempted: 2, .. }), "got {err}");
}

#[tokio::test]
async fn test_query_skips_malformed_entries() {
    let registry = MockRegistry::start().await;
    registry.seed(&web("1", "10.0.0.1"));
    registry.seed_raw("billing", "web.2", json!({"service": "web"}));

    let client = client_for(&[registry.node()], BreakerConfig::default());

    let typed = client.query_formation::<Announcement>("billing").await.unwrap();
    assert_eq!(typed.keys().collect::<Vec<_>>(), vec!["web.1"]);

    let raw = client.query_formation::<Value>("billing").await.unwrap();
    assert_eq!(raw.len(), 2);
}

#[tokio::test]
async fn test_unknown_formation_is_empty() {
    let registry = MockRegistry::start().await;
    let client = client_for(&[registry.node()], BreakerConfig::default());

    let instances = client.query_formation::<Value>("nobody").await.unwrap();
    assert!(instances.is_empty());
}

#[tokio::test]
async fn test_heartbeat_survives_failures_and_stops() {
    let registry = MockRegistry::start().await;
    registry.fail_with(Some(503));
    let client = client_for(&[registry.node()], lenient_breaker());

    let announcement = web("1", "10.0.0.1").with_field("version", "1.4.2");
    let mut registration = client
        .register_with_interval("billing", "web", "1", &announcement, Duration::from_millis(50))
        .unwrap();
    assert_eq!(registration.path(), "/billing/web.1");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(registry.requests() >= 2, "heartbeats should continue after failures");
    assert!(registry.puts().is_empty());
    assert!(!registration.is_stopped());

    registry.fail_with(None);
    tokio::time::sleep(Duration::from_millis(300)).await;
    let puts = registry.puts();
    assert!(!puts.is_empty());
    let (path, body) = &puts[0];
    assert_eq!(path, "/billing/web.1");
    assert_eq!(body["ports"]["80"], 31080);
    assert_eq!(body["version"], "1.4.2");

    assert!(registration.stop(Some(Duration::from_secs(2))).await);
    assert!(registration.is_stopped());

    let after_stop = registry.requests();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(registry.requests(), after_stop);

    // Stopping twice is fine.
    assert!(registration.stop(None).await);
}

#[tokio::test]
async fn test_cache_keeps_snapshot_across_failures() {
    let registry = MockRegistry::start().await;
    registry.seed(&web("1", "10.0.0.1"));
    let client = client_for(&[registry.node()], lenient_breaker());

    let mut cache = client
        .formation_cache_with_interval::<Announcement>("billing", Duration::from_millis(50))
        .await;
    assert!(cache.wait_ready(Duration::from_secs(2)).await);
    assert_eq!(cache.formation(), "billing");
    assert_eq!(cache.query().len(), 1);

    registry.fail_with(Some(503));
    tokio::time::sleep(Duration::from_millis(200)).await;
    let snapshot = cache.query();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot["web.1"].host.as_deref(), Some("10.0.0.1"));

    registry.fail_with(None);
    registry.seed(&web("2", "10.0.0.2"));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(cache.query().len(), 2);

    assert!(cache.stop(Some(Duration::from_secs(2))).await);
    registry.seed(&web("3", "10.0.0.3"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(cache.query().len(), 2);
}

#[tokio::test]
async fn test_cache_ready_even_when_registry_is_down() {
    let client = client_for(&[unused_node().await], lenient_breaker());

    let cache = client
        .formation_cache_with_interval::<Value>("billing", Duration::from_secs(60))
        .await;
    assert!(cache.wait_ready(Duration::from_secs(2)).await);
    assert!(cache.query().is_empty());
}
