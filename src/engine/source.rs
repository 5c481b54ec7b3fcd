//! Where desired configuration comes from.
//!
//! - [`FileBasedSource`]: a router document mounted by the platform, followed
//!   by the config file watcher.
//! - [`PushBasedSource`]: an orchestrator that announces new configuration and
//!   serves it on request.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::document::{parse_document, ConfigError};
use crate::config::schema::DesiredConfig;
use crate::engine::{Engine, UpdateError};
use crate::orchestrator::{OrchestratorClient, OrchestratorError};
use crate::resilience::{retry, RetryPolicy};
use crate::watch::{ConfigFileWatcher, WatchSetupError, DEFAULT_DEBOUNCE};

/// The mounted file may appear shortly after the sidecar starts.
const FILE_WAIT: RetryPolicy = RetryPolicy::fixed(30, Duration::from_secs(1));

/// Attempt budget for fetching pushed configuration.
const PUSH_FETCH: RetryPolicy = RetryPolicy::exponential(5, Duration::from_millis(500), Duration::from_secs(10));

/// Attempt budget for applying pushed configuration.
const PUSH_UPDATE: RetryPolicy = RetryPolicy::exponential(5, Duration::from_secs(1), Duration::from_secs(15));

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read configuration file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ConfigError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("orchestrator payload is not a valid configuration: {0}")]
    Payload(#[source] serde_json::Error),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error(transparent)]
    Watch(#[from] WatchSetupError),
}

impl SourceError {
    /// Whether trying again could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Orchestrator(_) => true,
            SourceError::Update(UpdateError::Reconcile(_) | UpdateError::Persist { .. }) => true,
            _ => false,
        }
    }
}

/// Topology strategy: how the first configuration is obtained and how later
/// changes reach the engine.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch_initial(&self) -> Result<DesiredConfig, SourceError>;

    /// Start delivering changes to `engine` until `shutdown` fires.
    fn subscribe(
        &self,
        engine: Arc<Engine>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>, SourceError>;
}

/// Router document mounted into the container.
#[derive(Debug)]
pub struct FileBasedSource {
    path: PathBuf,
    wait: RetryPolicy,
    debounce: Duration,
    initial: OnceLock<String>,
}

impl FileBasedSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wait: FILE_WAIT,
            debounce: DEFAULT_DEBOUNCE,
            initial: OnceLock::new(),
        }
    }

    pub fn with_wait(mut self, wait: RetryPolicy) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigSource for FileBasedSource {
    async fn fetch_initial(&self) -> Result<DesiredConfig, SourceError> {
        let path = self.path.as_path();
        let content = retry(
            "read configuration file",
            self.wait,
            |e: &std::io::Error| e.kind() == std::io::ErrorKind::NotFound,
            move || tokio::fs::read_to_string(path),
        )
        .await
        .map_err(|source| SourceError::Read {
            path: self.path.clone(),
            source,
        })?;

        let desired = parse_document(&content)?;
        let _ = self.initial.set(content);

        tracing::info!(path = ?self.path, "Loaded router configuration from file");
        Ok(desired)
    }

    fn subscribe(
        &self,
        engine: Arc<Engine>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>, SourceError> {
        let mut watcher = ConfigFileWatcher::new(&self.path).with_debounce(self.debounce);
        if let Some(initial) = self.initial.get() {
            watcher = watcher.with_last_applied(initial.as_bytes());
        }

        let handle = watcher.spawn(
            move |content| {
                let engine = engine.clone();
                async move { engine.apply_document(&content).await.map(|_| ()) }
            },
            shutdown,
        )?;
        Ok(handle)
    }
}

/// Configuration pushed by an orchestrator.
#[derive(Debug)]
pub struct PushBasedSource<C> {
    client: Arc<C>,
    fetch: RetryPolicy,
    update: RetryPolicy,
}

impl<C: OrchestratorClient> PushBasedSource<C> {
    pub fn new(client: C) -> Self {
        Self {
            client: Arc::new(client),
            fetch: PUSH_FETCH,
            update: PUSH_UPDATE,
        }
    }

    pub fn with_policies(mut self, fetch: RetryPolicy, update: RetryPolicy) -> Self {
        self.fetch = fetch;
        self.update = update;
        self
    }
}

async fn fetch_desired<C: OrchestratorClient>(client: &C) -> Result<DesiredConfig, SourceError> {
    let text = client.fetch_config().await?;
    serde_json::from_str(&text).map_err(SourceError::Payload)
}

#[async_trait]
impl<C: OrchestratorClient> ConfigSource for PushBasedSource<C> {
    async fn fetch_initial(&self) -> Result<DesiredConfig, SourceError> {
        let client = self.client.as_ref();
        let desired = retry("fetch configuration", self.fetch, |_| true, move || fetch_desired(client)).await?;
        tracing::info!(id = %desired.metadata.id, "Fetched router configuration from orchestrator");
        Ok(desired)
    }

    fn subscribe(
        &self,
        engine: Arc<Engine>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>, SourceError> {
        let client = self.client.clone();
        let policy = self.update;
        let mut notifications = client.notifications(shutdown.resubscribe());

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    signal = notifications.recv() => {
                        if signal.is_none() {
                            tracing::warn!("Orchestrator notification channel closed");
                            break;
                        }

                        let result = retry("apply pushed configuration", policy, SourceError::is_transient, || {
                            let client = client.clone();
                            let engine = engine.clone();
                            async move {
                                let desired = fetch_desired(client.as_ref()).await?;
                                engine.update_router(desired).await?;
                                Ok::<(), SourceError>(())
                            }
                        })
                        .await;

                        // Failures after startup are not fatal: the next
                        // notification gets another chance.
                        if let Err(e) = result {
                            tracing::error!(error = %e, "Failed to apply pushed configuration");
                        }
                    }
                }
            }
        });

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn file_source_waits_for_mount() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("skrouterd.json");
        let source = FileBasedSource::new(&path).with_wait(RetryPolicy::fixed(20, Duration::from_millis(25)));

        let writer = {
            let path = path.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                std::fs::write(&path, r#"[["router", {"id": "r1", "mode": "interior"}]]"#).unwrap();
            })
        };

        let desired = source.fetch_initial().await.unwrap();
        writer.await.unwrap();
        assert_eq!(desired.metadata.id, "r1");
    }

    #[tokio::test]
    async fn file_source_gives_up_when_mount_never_appears() {
        let dir = TempDir::new().unwrap();
        let source = FileBasedSource::new(dir.path().join("absent.json"))
            .with_wait(RetryPolicy::fixed(3, Duration::from_millis(5)));

        let err = source.fetch_initial().await.unwrap_err();
        assert!(matches!(err, SourceError::Read { .. }));
    }

    #[tokio::test]
    async fn file_source_rejects_malformed_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("skrouterd.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = FileBasedSource::new(&path).fetch_initial().await.unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn transient_errors() {
        let status = SourceError::Orchestrator(OrchestratorError::Status {
            status: 503,
            body: String::new(),
        });
        assert!(status.is_transient());

        let invalid = SourceError::Update(UpdateError::Invalid(Vec::new()));
        assert!(!invalid.is_transient());
    }
}
