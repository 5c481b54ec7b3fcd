//! Narrow interface to the router's live management endpoint.

use async_trait::async_trait;
use thiserror::Error;

use crate::bridge::diff::ChangeSet;
use crate::config::schema::BridgeConfig;

/// The management endpoint could not be reached or refused the session.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("management endpoint {endpoint} unreachable: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("management handshake with {endpoint} failed: {reason}")]
    Handshake { endpoint: String, reason: String },

    #[error("management connection pool is closed")]
    PoolClosed,
}

/// A logical management operation failed on an established connection.
#[derive(Debug, Error)]
pub enum ManagementError {
    #[error("{operation} {entity_type} '{name}' rejected by router: {reason}")]
    Rejected {
        operation: &'static str,
        entity_type: &'static str,
        name: String,
        reason: String,
    },

    #[error("failed to invoke management tool: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed management response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// An established management session.
#[async_trait]
pub trait ManagementClient: Send + Sync {
    /// Read the router's live TCP listeners and connectors.
    async fn get_local_bridge_config(&self) -> Result<BridgeConfig, ManagementError>;

    /// Apply a change set: every deletion, then every creation.
    async fn update_local_bridge_config(&self, changes: &ChangeSet) -> Result<(), ManagementError>;

    /// Ask the router to re-read a named SSL profile's files.
    async fn reload_ssl_profile(&self, name: &str) -> Result<(), ManagementError>;

    /// Whether the session can be handed to another caller.
    fn is_usable(&self) -> bool {
        true
    }
}

/// Establishes management sessions against a fixed local endpoint.
#[async_trait]
pub trait ManagementConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ManagementClient>, ConnectionError>;

    /// Human-readable endpoint, for logs.
    fn endpoint(&self) -> String;
}
