//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use router_sync::bridge::{BridgeReconciler, ChangeSet, Operation};
use router_sync::config::{BridgeConfig, TcpEndpoint};
use router_sync::engine::Engine;
use router_sync::management::{ConnectionError, ManagementClient, ManagementConnector, ManagementError, ManagementPool};
use router_sync::tls::TlsMaterializer;

#[derive(Debug, Default)]
struct RouterState {
    bridges: BridgeConfig,
    ops: Vec<String>,
    reloads: Vec<String>,
    reject_updates: bool,
    unreachable: bool,
}

/// In-memory router management endpoint with failure injection.
#[derive(Debug, Clone, Default)]
pub struct FakeRouter {
    state: Arc<Mutex<RouterState>>,
}

impl FakeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bridges(bridges: BridgeConfig) -> Self {
        let router = Self::new();
        router.state.lock().unwrap().bridges = bridges;
        router
    }

    /// Live bridge configuration.
    pub fn bridges(&self) -> BridgeConfig {
        self.state.lock().unwrap().bridges.clone()
    }

    /// Management operations in the order they were issued.
    pub fn ops(&self) -> Vec<String> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn reloads(&self) -> Vec<String> {
        self.state.lock().unwrap().reloads.clone()
    }

    pub fn reject_updates(&self, reject: bool) {
        self.state.lock().unwrap().reject_updates = reject;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    pub fn pool(&self, max_connections: usize) -> Arc<ManagementPool> {
        ManagementPool::new(Arc::new(FakeConnector(self.clone())), max_connections)
    }
}

struct FakeConnector(FakeRouter);

#[async_trait]
impl ManagementConnector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn ManagementClient>, ConnectionError> {
        if self.0.state.lock().unwrap().unreachable {
            return Err(ConnectionError::Unreachable {
                endpoint: self.endpoint(),
                source: std::io::ErrorKind::ConnectionRefused.into(),
            });
        }
        Ok(Box::new(FakeSession(self.0.clone())))
    }

    fn endpoint(&self) -> String {
        "fake-router:5672".into()
    }
}

struct FakeSession(FakeRouter);

#[async_trait]
impl ManagementClient for FakeSession {
    async fn get_local_bridge_config(&self) -> Result<BridgeConfig, ManagementError> {
        Ok(self.0.bridges())
    }

    async fn update_local_bridge_config(&self, changes: &ChangeSet) -> Result<(), ManagementError> {
        let mut state = self.0.state.lock().unwrap();
        if state.reject_updates {
            return Err(ManagementError::Rejected {
                operation: "create",
                entity_type: "tcpListener",
                name: "*".into(),
                reason: "injected failure".into(),
            });
        }

        for op in changes.operations() {
            let line = match op {
                Operation::Delete { kind, name } => format!("delete {} {}", kind.as_str(), name),
                Operation::Create { kind, entity } => format!("create {} {}", kind.as_str(), entity.name),
            };
            state.ops.push(line);
        }
        state.bridges = changes.apply_to(&state.bridges);
        Ok(())
    }

    async fn reload_ssl_profile(&self, name: &str) -> Result<(), ManagementError> {
        self.0.state.lock().unwrap().reloads.push(name.to_string());
        Ok(())
    }
}

/// Engine wired to `router`, writing under `dir`.
pub fn engine(router: &FakeRouter, dir: &Path) -> Arc<Engine> {
    Engine::new(
        BridgeReconciler::new(router.pool(2)),
        TlsMaterializer::new(dir.join("certs")),
        Some(dir.join("skupper-router.json")),
    )
}

pub fn endpoint(name: &str, port: &str, address: &str) -> TcpEndpoint {
    TcpEndpoint {
        name: name.into(),
        host: Some("0.0.0.0".into()),
        port: port.into(),
        address: address.into(),
        ..Default::default()
    }
}

pub fn bridges(listeners: &[TcpEndpoint], connectors: &[TcpEndpoint]) -> BridgeConfig {
    BridgeConfig {
        tcp_listeners: listeners.iter().map(|e| (e.name.clone(), e.clone())).collect(),
        tcp_connectors: connectors.iter().map(|e| (e.name.clone(), e.clone())).collect(),
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
