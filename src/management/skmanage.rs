//! Management adapter that drives the router's `skmanage` tool.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::process::Command;
use url::Url;

use crate::bridge::diff::{ChangeSet, EntityKind, Operation};
use crate::config::schema::{BridgeConfig, TcpEndpoint};
use crate::management::client::{ConnectionError, ManagementClient, ManagementConnector, ManagementError};

const TCP_LISTENER_TYPE: &str = "io.skupper.router.tcpListener";
const TCP_CONNECTOR_TYPE: &str = "io.skupper.router.tcpConnector";
const SSL_PROFILE_TYPE: &str = "io.skupper.router.sslProfile";

const DEFAULT_AMQP_PORT: u16 = 5672;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn entity_type(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::TcpListener => TCP_LISTENER_TYPE,
        EntityKind::TcpConnector => TCP_CONNECTOR_TYPE,
    }
}

/// Opens sessions by probing the AMQP port, then hands out clients that run
/// `skmanage --bus <endpoint>` per operation.
#[derive(Debug, Clone)]
pub struct SkmanageConnector {
    binary: PathBuf,
    host: String,
    port: u16,
}

impl SkmanageConnector {
    pub fn new(binary: impl Into<PathBuf>, endpoint: &Url) -> Self {
        Self {
            binary: binary.into(),
            host: endpoint.host_str().unwrap_or("localhost").to_string(),
            port: endpoint.port().unwrap_or(DEFAULT_AMQP_PORT),
        }
    }
}

#[async_trait]
impl ManagementConnector for SkmanageConnector {
    async fn connect(&self) -> Result<Box<dyn ManagementClient>, ConnectionError> {
        let endpoint = self.endpoint();
        let probe = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((self.host.as_str(), self.port))).await;
        match probe {
            Ok(Ok(_stream)) => {}
            Ok(Err(source)) => return Err(ConnectionError::Unreachable { endpoint, source }),
            Err(_) => {
                return Err(ConnectionError::Unreachable {
                    endpoint,
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                })
            }
        }

        Ok(Box::new(SkmanageClient {
            binary: self.binary.clone(),
            bus: endpoint,
            usable: AtomicBool::new(true),
        }))
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One logical session; each operation is one tool invocation.
#[derive(Debug)]
pub struct SkmanageClient {
    binary: PathBuf,
    bus: String,
    usable: AtomicBool,
}

impl SkmanageClient {
    async fn run(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<std::process::Output, ManagementError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--bus")
            .arg(&self.bus)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().inspect_err(|_| self.usable.store(false, Ordering::Relaxed))?;
        if let (Some(body), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(body).await?;
            // Closing stdin lets the tool start processing.
            drop(pipe);
        }
        Ok(child.wait_with_output().await?)
    }

    async fn query<T: DeserializeOwned>(&self, kind: EntityKind) -> Result<Vec<T>, ManagementError> {
        let output = self.run(&["query", "--type", entity_type(kind)], None).await?;
        if !output.status.success() {
            return Err(ManagementError::Rejected {
                operation: "query",
                entity_type: entity_type(kind),
                name: String::new(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn mutate(
        &self,
        operation: &'static str,
        entity_type: &'static str,
        name: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(), ManagementError> {
        let mut args = vec![operation, "--type", entity_type, "--name", name];
        if body.is_some() {
            args.push("--stdin");
        }

        let output = self.run(&args, body.as_deref()).await?;
        if output.status.success() {
            return Ok(());
        }
        Err(ManagementError::Rejected {
            operation,
            entity_type,
            name: name.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[async_trait]
impl ManagementClient for SkmanageClient {
    async fn get_local_bridge_config(&self) -> Result<BridgeConfig, ManagementError> {
        let listeners: Vec<TcpEndpoint> = self.query(EntityKind::TcpListener).await?;
        let connectors: Vec<TcpEndpoint> = self.query(EntityKind::TcpConnector).await?;

        Ok(BridgeConfig {
            tcp_listeners: listeners.into_iter().map(|e| (e.name.clone(), e)).collect(),
            tcp_connectors: connectors.into_iter().map(|e| (e.name.clone(), e)).collect(),
        })
    }

    async fn update_local_bridge_config(&self, changes: &ChangeSet) -> Result<(), ManagementError> {
        for op in changes.operations() {
            match op {
                Operation::Delete { kind, name } => {
                    self.mutate("delete", entity_type(kind), name, None).await?;
                }
                Operation::Create { kind, entity } => {
                    let body = serde_json::to_vec(entity)?;
                    self.mutate("create", entity_type(kind), &entity.name, Some(body)).await?;
                }
            }
        }
        Ok(())
    }

    async fn reload_ssl_profile(&self, name: &str) -> Result<(), ManagementError> {
        // An update with no attributes makes the router re-read the profile's files.
        self.mutate("update", SSL_PROFILE_TYPE, name, Some(b"{}".to_vec())).await
    }

    fn is_usable(&self) -> bool {
        self.usable.load(Ordering::Relaxed)
    }
}
