//! Reconciliation engine.
//!
//! # Data Flow
//! ```text
//! ConfigSource (source.rs)            SslProfileWatcher
//!     → Engine::update_router              → Engine::on_ssl_profiles_from_disk
//!         materialize inline profiles          merge into desired state
//!         merge disk profiles                  re-persist rendered config
//!         validate                             reload profiles the router knows
//!         render
//!         reconcile bridges (pooled session)
//!         persist rendered config
//!         swap desired state
//! ```
//!
//! # Design Decisions
//! - One engine per process, constructed at startup and shared by `Arc`
//! - Desired state is swapped whole; only the profile map is merged in place
//! - Updates are serialized by one async mutex
//! - Nothing is swapped in until the router has accepted the bridge changes

pub mod source;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::bridge::{BridgeReconciler, ChangeSet, ReconcileError};
use crate::config::document::{parse_document, render_document, ConfigError, RenderError};
use crate::config::schema::{DesiredConfig, SslProfile, SslProfileFiles};
use crate::config::validation::{validate_config, ValidationError};
use crate::observability::metrics;
use crate::tls::{TlsError, TlsMaterializer};
use crate::watch::fingerprint;

pub use source::{ConfigSource, FileBasedSource, PushBasedSource, SourceError};

/// A reconciliation cycle was aborted. Prior state stays in place.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("invalid configuration document: {0}")]
    Parse(#[from] ConfigError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("configuration rejected: {}", join(.0))]
    Invalid(Vec<ValidationError>),

    #[error("failed to render router configuration: {0}")]
    Render(#[from] RenderError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("failed to write router configuration to {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Explicit reconciliation context shared by every task that changes the router.
pub struct Engine {
    state: ArcSwap<DesiredConfig>,
    disk_profiles: ArcSwap<BTreeMap<String, SslProfileFiles>>,
    reconciler: BridgeReconciler,
    materializer: TlsMaterializer,
    rendered_path: Option<PathBuf>,
    /// Serializes updates; holds the fingerprint of the last persisted document.
    persisted: Mutex<Option<String>>,
}

impl Engine {
    /// `rendered_path` is where the router reads its configuration from, or
    /// `None` when the router receives it inline and nothing is persisted.
    pub fn new(
        reconciler: BridgeReconciler,
        materializer: TlsMaterializer,
        rendered_path: Option<PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: ArcSwap::from_pointee(DesiredConfig::default()),
            disk_profiles: ArcSwap::from_pointee(BTreeMap::new()),
            reconciler,
            materializer,
            rendered_path,
            persisted: Mutex::new(None),
        })
    }

    /// Current desired state.
    pub fn current(&self) -> Arc<DesiredConfig> {
        self.state.load_full()
    }

    pub fn rendered_path(&self) -> Option<&Path> {
        self.rendered_path.as_deref()
    }

    /// Establish the first desired state before the router runs.
    ///
    /// Profiles found on disk are merged in without overriding configured
    /// ones. Bridges are not reconciled: the router loads them from the
    /// returned document at launch.
    pub async fn bootstrap(
        &self,
        initial: DesiredConfig,
        disk_profiles: BTreeMap<String, SslProfileFiles>,
    ) -> Result<String, UpdateError> {
        let mut persisted = self.persisted.lock().await;
        self.disk_profiles.store(Arc::new(disk_profiles));

        let (desired, rendered) = self.prepare(initial).await?;
        self.persist(&mut persisted, &rendered).await?;
        self.state.store(Arc::new(desired));

        tracing::info!(
            profiles = self.state.load().ssl_profiles.len(),
            tcp_listeners = self.state.load().bridges.tcp_listeners.len(),
            tcp_connectors = self.state.load().bridges.tcp_connectors.len(),
            "Initial router configuration prepared"
        );
        Ok(rendered)
    }

    /// Drive the router to `desired` and make it the current state.
    pub async fn update_router(&self, desired: DesiredConfig) -> Result<ChangeSet, UpdateError> {
        let mut persisted = self.persisted.lock().await;

        let result = self.apply(&mut persisted, desired).await;
        match &result {
            Ok(_) => metrics::record_reconcile("success"),
            Err(e) => {
                metrics::record_reconcile("failure");
                tracing::warn!(error = %e, "Reconciliation aborted, keeping previous configuration");
            }
        }
        result
    }

    /// Parse a router configuration document and apply it.
    pub async fn apply_document(&self, text: &str) -> Result<ChangeSet, UpdateError> {
        let desired = parse_document(text)?;
        self.update_router(desired).await
    }

    /// Merge profiles discovered on disk and reload the ones the router
    /// already uses so rotated material takes effect without a restart.
    ///
    /// A configured profile keeps precedence over a disk profile of the same
    /// name, matching what every later update produces.
    pub async fn on_ssl_profiles_from_disk(
        &self,
        profiles: BTreeMap<String, SslProfileFiles>,
    ) -> Result<(), UpdateError> {
        let mut persisted = self.persisted.lock().await;

        let earlier = self.disk_profiles.load_full();
        let mut found = BTreeMap::clone(&earlier);
        found.extend(profiles.iter().map(|(n, p)| (n.clone(), p.clone())));
        self.disk_profiles.store(Arc::new(found));

        let previous = self.state.rcu(|current| {
            let mut next = DesiredConfig::clone(current);
            merge_disk_profiles(&mut next.ssl_profiles, &profiles, &earlier);
            next
        });
        let known: BTreeSet<&str> = previous.ssl_profiles.keys().map(String::as_str).collect();

        let rendered = render_document(&self.state.load())?;
        self.persist(&mut persisted, &rendered).await?;

        let mut failure = None;
        for name in profiles.keys() {
            if !known.contains(name.as_str()) {
                tracing::info!(profile = %name, "Discovered SSL profile on disk");
                continue;
            }
            if let Err(e) = self.reconciler.reload_profile(name).await {
                tracing::error!(profile = %name, error = %e, "Failed to reload SSL profile");
                failure = Some(e);
            }
        }

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Render the current state, e.g. to hand it to the router inline.
    pub fn render_current(&self) -> Result<String, RenderError> {
        render_document(&self.state.load())
    }

    async fn apply(
        &self,
        persisted: &mut Option<String>,
        desired: DesiredConfig,
    ) -> Result<ChangeSet, UpdateError> {
        let (desired, rendered) = self.prepare(desired).await?;
        let changes = self.reconciler.reconcile(&desired.bridges).await?;
        self.persist(persisted, &rendered).await?;
        self.state.store(Arc::new(desired));
        Ok(changes)
    }

    /// Materialize, merge disk profiles, validate and render.
    async fn prepare(&self, mut desired: DesiredConfig) -> Result<(DesiredConfig, String), UpdateError> {
        desired.ssl_profiles = self.materializer.resolve_all(&desired.ssl_profiles).await?;

        merge_disk_profiles(&mut desired.ssl_profiles, &self.disk_profiles.load(), &BTreeMap::new());

        validate_config(&desired).map_err(UpdateError::Invalid)?;
        let rendered = render_document(&desired)?;
        Ok((desired, rendered))
    }

    /// Write the rendered document for the router, skipping identical content.
    async fn persist(&self, persisted: &mut Option<String>, rendered: &str) -> Result<(), UpdateError> {
        let Some(path) = &self.rendered_path else {
            return Ok(());
        };

        let digest = fingerprint(rendered.as_bytes());
        if persisted.as_deref() == Some(digest.as_str()) {
            tracing::debug!(path = ?path, "Rendered configuration unchanged, not rewriting");
            return Ok(());
        }

        write_atomically(path, rendered.as_bytes())
            .await
            .map_err(|source| UpdateError::Persist {
                path: path.clone(),
                source,
            })?;
        *persisted = Some(digest);

        tracing::info!(path = ?path, "Router configuration written");
        Ok(())
    }
}

/// Add profiles found on disk without replacing configured ones.
///
/// A profile equal to its `earlier` disk entry came from disk, not from the
/// configuration, and is refreshed.
fn merge_disk_profiles(
    profiles: &mut BTreeMap<String, SslProfile>,
    found: &BTreeMap<String, SslProfileFiles>,
    earlier: &BTreeMap<String, SslProfileFiles>,
) {
    for (name, files) in found {
        let from_disk = match profiles.get(name) {
            None => true,
            Some(current) => earlier.get(name).is_some_and(|e| current.files() == Some(e)),
        };
        if from_disk {
            profiles.insert(name.clone(), SslProfile::Files(files.clone()));
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("rendered_path", &self.rendered_path)
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

/// Replace `path` so readers never observe a half-written document.
async fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}
