//! Shared utilities for integration tests: an in-process registry node.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{Map, Value};
use tokio::net::TcpListener;

use formation_discovery::config::{BreakerConfig, RegistryConfig};
use formation_discovery::registry::{ClusterNode, RegistryTransport};
use formation_discovery::{Announcement, ServiceRegistryClient};

#[derive(Default)]
struct MockState {
    formations: Mutex<HashMap<String, Map<String, Value>>>,
    puts: Mutex<Vec<(String, Value)>>,
    requests: AtomicUsize,
    fail_status: Mutex<Option<u16>>,
}

impl MockState {
    fn injected_failure(&self) -> Option<Response> {
        let status = (*self.fail_status.lock().unwrap())?;
        Some(StatusCode::from_u16(status).unwrap().into_response())
    }
}

/// A registry node speaking `GET /{formation}` and `PUT /{formation}/{key}`.
pub struct MockRegistry {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockRegistry {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/{formation}", get(get_formation))
            .route("/{formation}/{key}", put(put_instance))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Node address as passed to the client.
    pub fn node(&self) -> String {
        self.addr.to_string()
    }

    /// Breaker key of this node.
    pub fn key(&self) -> String {
        ClusterNode::parse(&self.node()).unwrap().key().to_string()
    }

    /// Store `announcement` as if its instance had heartbeated.
    pub fn seed(&self, announcement: &Announcement) {
        let key = format!("{}.{}", announcement.service, announcement.instance);
        self.state
            .formations
            .lock()
            .unwrap()
            .entry(announcement.formation.clone())
            .or_default()
            .insert(key, serde_json::to_value(announcement).unwrap());
    }

    /// Store a raw JSON entry under `key`.
    pub fn seed_raw(&self, formation: &str, key: &str, value: Value) {
        self.state
            .formations
            .lock()
            .unwrap()
            .entry(formation.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Answer every request with `status` until cleared with `None`.
    pub fn fail_with(&self, status: Option<u16>) {
        *self.state.fail_status.lock().unwrap() = status;
    }

    /// Requests received, failed ones included.
    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Accepted PUTs as `(path, body)`.
    pub fn puts(&self) -> Vec<(String, Value)> {
        self.state.puts.lock().unwrap().clone()
    }
}

async fn get_formation(State(state): State<Arc<MockState>>, Path(formation): Path<String>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if let Some(failure) = state.injected_failure() {
        return failure;
    }

    let instances = state
        .formations
        .lock()
        .unwrap()
        .get(&formation)
        .cloned()
        .unwrap_or_default();
    Json(Value::Object(instances)).into_response()
}

async fn put_instance(
    State(state): State<Arc<MockState>>,
    Path((formation, key)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if let Some(failure) = state.injected_failure() {
        return failure;
    }

    state
        .puts
        .lock()
        .unwrap()
        .push((format!("/{formation}/{key}"), body.clone()));
    state
        .formations
        .lock()
        .unwrap()
        .entry(formation)
        .or_default()
        .insert(key, body);
    StatusCode::OK.into_response()
}

/// An address with nothing listening on it.
pub async fn unused_node() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

/// Breaker settings that never open during a test.
pub fn lenient_breaker() -> BreakerConfig {
    BreakerConfig {
        failure_threshold: 1000,
        ..BreakerConfig::default()
    }
}

/// A client trying `nodes` in the given order.
pub fn client_for(nodes: &[String], breaker: BreakerConfig) -> ServiceRegistryClient {
    let nodes = nodes.iter().map(|n| ClusterNode::parse(n).unwrap()).collect();
    let transport = RegistryTransport::with_order(nodes, breaker).unwrap();
    ServiceRegistryClient::with_transport(transport, RegistryConfig::default())
}

/// A plain HTTP backend answering `GET /status` with `body`.
pub async fn start_backend(body: &'static str) -> SocketAddr {
    let app = Router::new().route("/status", get(move || async move { body }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
