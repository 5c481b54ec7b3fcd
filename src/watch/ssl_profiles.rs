//! Watcher for the SSL profile directory tree.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::schema::SslProfileFiles;
use crate::observability::metrics;
use crate::tls::scan::scan_ssl_profile_dir;
use crate::watch::debounce::{Debounce, DEFAULT_DEBOUNCE};
use crate::watch::WatchSetupError;

const WATCHER: &str = "ssl_profiles";

/// Profile files plus the newest modification time among them.
type Snapshot = BTreeMap<String, (SslProfileFiles, Option<SystemTime>)>;

/// Watches `<base>` and each `<base>/<profile>` directory, rescanning after
/// every debounced burst and reporting the full profile map when it changed.
#[derive(Debug)]
pub struct SslProfileWatcher {
    base: PathBuf,
    debounce: Duration,
    known: Option<Snapshot>,
}

impl SslProfileWatcher {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            debounce: DEFAULT_DEBOUNCE,
            known: None,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Seed with profiles already merged at startup so they are not reported
    /// again until they change on disk.
    pub fn with_initial(mut self, profiles: &BTreeMap<String, SslProfileFiles>) -> Self {
        self.known = Some(snapshot(profiles));
        self
    }

    /// Register watches and spawn the watch loop.
    ///
    /// Returns `Ok(None)` when the base directory does not exist: no profiles
    /// are configured and there is nothing to watch.
    pub fn spawn<F, Fut, E>(
        self,
        on_profiles: F,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<Option<JoinHandle<()>>, WatchSetupError>
    where
        F: Fn(BTreeMap<String, SslProfileFiles>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        if !self.base.is_dir() {
            tracing::info!(path = ?self.base, "SSL profile directory not found, no profiles to watch");
            return Ok(None);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        let mut watched = HashSet::new();
        watcher.watch(&self.base, RecursiveMode::NonRecursive)?;
        let entries = std::fs::read_dir(&self.base).map_err(|source| WatchSetupError::Io {
            path: self.base.clone(),
            source,
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                watcher.watch(&path, RecursiveMode::NonRecursive)?;
                watched.insert(path);
            }
        }

        tracing::info!(path = ?self.base, profiles = watched.len(), "SSL profile watcher started");

        let mut state = self;
        let handle = tokio::spawn(async move {
            let mut watcher = watcher;
            let mut debounce = Debounce::new(state.debounce);

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!(path = ?state.base, "SSL profile watcher stopping");
                        break;
                    }
                    event = rx.recv() => match event {
                        Some(Ok(event)) => {
                            if !matches!(
                                event.kind,
                                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                            ) {
                                continue;
                            }
                            if event.kind.is_create() {
                                state.track_new_dirs(&mut watcher, &mut watched, &event.paths);
                            }
                            metrics::record_watch_event(WATCHER);
                            debounce.bump();
                        }
                        Some(Err(e)) => tracing::warn!(error = %e, "SSL profile watch error"),
                        None => break,
                    },
                    _ = debounce.elapsed() => state.rescan(&on_profiles).await,
                }
            }
        });

        Ok(Some(handle))
    }

    /// Add newly created profile directories to the watch set. The set only
    /// grows; removed directories are left registered.
    fn track_new_dirs(
        &self,
        watcher: &mut RecommendedWatcher,
        watched: &mut HashSet<PathBuf>,
        paths: &[PathBuf],
    ) {
        for path in paths {
            if path.parent() != Some(self.base.as_path()) || !path.is_dir() || watched.contains(path) {
                continue;
            }
            match watcher.watch(path, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    tracing::info!(path = ?path, "Watching new SSL profile directory");
                    watched.insert(path.clone());
                }
                Err(e) => tracing::warn!(path = ?path, error = %e, "Failed to watch SSL profile directory"),
            }
        }
    }

    async fn rescan<F, Fut, E>(&mut self, on_profiles: &F)
    where
        F: Fn(BTreeMap<String, SslProfileFiles>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let profiles = match scan_ssl_profile_dir(&self.base) {
            Ok(profiles) => profiles,
            Err(e) => {
                tracing::warn!(path = ?self.base, error = %e, "Failed to scan SSL profile directory");
                return;
            }
        };

        if profiles.is_empty() {
            tracing::debug!(path = ?self.base, "No valid SSL profiles found");
            return;
        }

        let current = snapshot(&profiles);
        if self.known.as_ref() == Some(&current) {
            tracing::debug!(path = ?self.base, "SSL profiles unchanged");
            return;
        }

        tracing::info!(count = profiles.len(), "SSL profiles changed on disk");
        match on_profiles(profiles).await {
            Ok(()) => self.known = Some(current),
            Err(e) => tracing::error!(error = %e, "Failed to apply SSL profiles from disk"),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

fn snapshot(profiles: &BTreeMap<String, SslProfileFiles>) -> Snapshot {
    profiles
        .iter()
        .map(|(name, files)| (name.clone(), (files.clone(), newest_mtime(files))))
        .collect()
}

fn newest_mtime(files: &SslProfileFiles) -> Option<SystemTime> {
    [&files.cert_file, &files.private_key_file, &files.ca_cert_file]
        .into_iter()
        .flatten()
        .filter_map(|path| std::fs::metadata(path).and_then(|m| m.modified()).ok())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn snapshot_tracks_rewrites() {
        let dir = TempDir::new().unwrap();
        let profile = dir.path().join("p");
        std::fs::create_dir_all(&profile).unwrap();
        std::fs::write(profile.join("ca.crt"), "one").unwrap();

        let profiles = scan_ssl_profile_dir(dir.path()).unwrap();
        let before = snapshot(&profiles);
        assert_eq!(before, snapshot(&profiles));

        let ca = std::fs::File::options()
            .write(true)
            .open(profile.join("ca.crt"))
            .unwrap();
        ca.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();

        assert_ne!(before, snapshot(&profiles));
    }

    #[test]
    fn missing_base_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let (_tx, rx) = broadcast::channel::<()>(1);

        let watcher = SslProfileWatcher::new(dir.path().join("absent"));
        let handle = watcher
            .spawn(|_profiles| async { Ok::<(), std::io::Error>(()) }, rx)
            .unwrap();
        assert!(handle.is_none());
    }
}
