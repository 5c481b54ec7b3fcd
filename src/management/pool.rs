//! Reusable management connections.
//!
//! # Responsibilities
//! - Hand out an idle connection or establish a new one
//! - Bound the number of concurrently checked-out connections
//! - Take connections back on release instead of closing them
//!
//! # Design Decisions
//! - No background tasks: the pool is a synchronized cache
//! - No retries: a failed connect is returned to the caller as-is
//! - Unusable connections are dropped on release and replaced lazily

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::management::client::{ConnectionError, ManagementClient, ManagementConnector};

type Idle = Vec<Box<dyn ManagementClient>>;

/// Pool of management sessions to the local router.
pub struct ManagementPool {
    connector: Arc<dyn ManagementConnector>,
    idle: Mutex<Idle>,
    limit: Arc<Semaphore>,
}

impl ManagementPool {
    pub fn new(connector: Arc<dyn ManagementConnector>, max_connections: usize) -> Arc<Self> {
        Arc::new(Self {
            connector,
            idle: Mutex::new(Vec::new()),
            limit: Arc::new(Semaphore::new(max_connections.max(1))),
        })
    }

    /// Check out a connection.
    ///
    /// Waits while `max_connections` are already checked out. The returned
    /// guard goes back to the pool when dropped.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection, ConnectionError> {
        let permit = self
            .limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ConnectionError::PoolClosed)?;

        let conn = match self.take_idle() {
            Some(conn) => conn,
            None => {
                tracing::debug!(endpoint = %self.connector.endpoint(), "Opening management connection");
                self.connector.connect().await?
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: self.clone(),
            _permit: permit,
        })
    }

    /// Return a connection to the idle set.
    pub fn release(&self, conn: Box<dyn ManagementClient>) {
        if conn.is_usable() {
            self.lock_idle().push(conn);
        } else {
            tracing::debug!("Dropping unusable management connection");
        }
    }

    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    /// Reject further acquisitions. Checked-out connections still come back.
    pub fn close(&self) {
        self.limit.close();
        self.lock_idle().clear();
    }

    fn take_idle(&self) -> Option<Box<dyn ManagementClient>> {
        let mut idle = self.lock_idle();
        while let Some(conn) = idle.pop() {
            if conn.is_usable() {
                return Some(conn);
            }
        }
        None
    }

    fn lock_idle(&self) -> MutexGuard<'_, Idle> {
        // A poisoned idle list is still a valid list.
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ManagementPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementPool")
            .field("endpoint", &self.connector.endpoint())
            .field("idle", &self.idle_count())
            .field("available", &self.limit.available_permits())
            .finish()
    }
}

/// A checked-out connection; returned to its pool on drop.
pub struct PooledConnection {
    conn: Option<Box<dyn ManagementClient>>,
    pool: Arc<ManagementPool>,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    /// Close the connection instead of returning it.
    pub fn discard(mut self) {
        self.conn = None;
    }
}

impl Deref for PooledConnection {
    type Target = dyn ManagementClient;

    fn deref(&self) -> &Self::Target {
        match &self.conn {
            Some(conn) => conn.as_ref(),
            // `conn` is only taken in `drop` and `discard`, both of which consume the guard.
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
