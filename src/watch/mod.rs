//! Filesystem watchers.
//!
//! # Data Flow
//! ```text
//! notify (OS thread)
//!     → unbounded mpsc (into tokio)
//!     → debounce.rs (500ms quiet period, last event wins)
//!     → config_file.rs: read, drop empty or already-applied content, callback
//!     → ssl_profiles.rs: rescan base dir, drop empty or unchanged sets, callback
//! ```
//!
//! # Design Decisions
//! - Watch directories, not files: mounts and editors replace files by rename
//! - Watch state is private to its task and dies with it
//! - Setup failures end that watcher only; the sidecar keeps running

use std::path::PathBuf;

use thiserror::Error;

pub mod config_file;
pub mod debounce;
pub mod ssl_profiles;

pub use config_file::{fingerprint, ConfigFileWatcher};
pub use debounce::{Debounce, DEFAULT_DEBOUNCE};
pub use ssl_profiles::SslProfileWatcher;

/// Failure to establish a watch.
#[derive(Debug, Error)]
pub enum WatchSetupError {
    #[error("failed to register filesystem watch: {0}")]
    Notify(#[from] notify::Error),

    #[error("failed to prepare watched directory {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
