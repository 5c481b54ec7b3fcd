//! Watcher for the orchestrator-mounted router configuration file.

use std::ffi::OsString;
use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::watch::debounce::{Debounce, DEFAULT_DEBOUNCE};
use crate::watch::WatchSetupError;

const WATCHER: &str = "config_file";

/// Hex sha256 of a document, used to recognise content already applied.
pub fn fingerprint(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Watches one file through its parent directory and hands new content to a
/// callback, at most once per debounce window.
#[derive(Debug)]
pub struct ConfigFileWatcher {
    path: PathBuf,
    debounce: Duration,
    last_applied: Option<String>,
}

impl ConfigFileWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            debounce: DEFAULT_DEBOUNCE,
            last_applied: None,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Seed the watcher with content that is already in effect.
    pub fn with_last_applied(mut self, content: &[u8]) -> Self {
        self.last_applied = Some(fingerprint(content));
        self
    }

    /// Register the watch and spawn the watch loop.
    ///
    /// The callback's content is remembered only when it returns `Ok`, so a
    /// failed apply is retried on the next write even if the bytes repeat.
    pub fn spawn<F, Fut, E>(
        self,
        on_change: F,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>, WatchSetupError>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();

        std::fs::create_dir_all(&dir).map_err(|source| WatchSetupError::Io {
            path: dir.clone(),
            source,
        })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, dir = ?dir, "Config file watcher started");

        let mut state = self;
        let handle = tokio::spawn(async move {
            // Dropping the watcher at the end of the task releases the OS handle.
            let _watcher = watcher;
            let mut debounce = Debounce::new(state.debounce);

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!(path = ?state.path, "Config file watcher stopping");
                        break;
                    }
                    event = rx.recv() => match event {
                        Some(Ok(event)) => {
                            if concerns(&event, &file_name) {
                                metrics::record_watch_event(WATCHER);
                                debounce.bump();
                            }
                        }
                        Some(Err(e)) => tracing::warn!(error = %e, "Config file watch error"),
                        None => break,
                    },
                    _ = debounce.elapsed() => state.apply(&on_change).await,
                }
            }
        });

        Ok(handle)
    }

    async fn apply<F, Fut, E>(&mut self, on_change: &F)
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = ?self.path, "Config file disappeared before it could be read");
                return;
            }
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Failed to read config file");
                return;
            }
        };

        if content.trim().is_empty() {
            tracing::debug!(path = ?self.path, "Ignoring empty config file, write still in progress");
            return;
        }

        let digest = fingerprint(content.as_bytes());
        if self.last_applied.as_deref() == Some(digest.as_str()) {
            tracing::debug!(path = ?self.path, "Config file unchanged since last apply");
            return;
        }

        tracing::info!(path = ?self.path, "Config file changed, reconciling");
        match on_change(content).await {
            Ok(()) => self.last_applied = Some(digest),
            Err(e) => {
                tracing::error!(path = ?self.path, error = %e, "Failed to apply config file. Keeping current configuration.")
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn concerns(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}
