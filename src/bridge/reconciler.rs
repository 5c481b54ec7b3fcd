//! Convergence of the router's live bridge entities.

use std::sync::Arc;

use thiserror::Error;

use crate::bridge::diff::ChangeSet;
use crate::config::schema::BridgeConfig;
use crate::management::{ConnectionError, ManagementError, ManagementPool};
use crate::observability::metrics;

/// A reconciliation step failed. Changes applied before the failure stay
/// applied; the next run re-diffs from whatever the router holds.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to acquire management connection: {0}")]
    Acquire(#[from] ConnectionError),

    #[error("failed to read live bridge configuration: {0}")]
    Fetch(#[source] ManagementError),

    #[error("failed to apply bridge changes: {0}")]
    Apply(#[source] ManagementError),

    #[error("failed to reload ssl profile '{profile}': {source}")]
    Reload {
        profile: String,
        #[source]
        source: ManagementError,
    },
}

/// Fetches, diffs and applies bridge configuration over pooled connections.
#[derive(Debug, Clone)]
pub struct BridgeReconciler {
    pool: Arc<ManagementPool>,
}

impl BridgeReconciler {
    pub fn new(pool: Arc<ManagementPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<ManagementPool> {
        &self.pool
    }

    /// Move the router's bridges to `desired`, returning what was changed.
    pub async fn reconcile(&self, desired: &BridgeConfig) -> Result<ChangeSet, ReconcileError> {
        let conn = self.pool.acquire().await?;

        let current = conn.get_local_bridge_config().await.map_err(ReconcileError::Fetch)?;
        let changes = ChangeSet::difference(&current, desired);
        if changes.is_empty() {
            tracing::debug!("Bridge configuration already converged");
            return Ok(changes);
        }

        let (deleted, added) = changes.counts();
        tracing::info!(deleted, added, "Applying bridge changes");

        // The guard returns the session to the pool on every path out of here.
        conn.update_local_bridge_config(&changes)
            .await
            .map_err(ReconcileError::Apply)?;

        metrics::record_bridge_changes(&changes);
        Ok(changes)
    }

    /// Make the router re-read a profile's certificate files.
    pub async fn reload_profile(&self, name: &str) -> Result<(), ReconcileError> {
        let conn = self.pool.acquire().await?;
        let result = conn.reload_ssl_profile(name).await;
        metrics::record_profile_reload(result.is_ok());

        result.map_err(|source| ReconcileError::Reload {
            profile: name.to_string(),
            source,
        })?;
        tracing::info!(profile = %name, "SSL profile reloaded");
        Ok(())
    }
}
