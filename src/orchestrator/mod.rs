//! Orchestrator control channel (push topology).
//!
//! # Data Flow
//! ```text
//! agent websocket frame (new config)
//!     → notifications() channel (coalesced, capacity 1)
//!     → PushBasedSource fetches the full config over HTTP
//!     → Engine::update_router
//! ```

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

pub mod iofog;

pub use iofog::IoFogClient;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("request to orchestrator agent failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("orchestrator agent answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid orchestrator url: {0}")]
    Url(#[from] url::ParseError),
}

/// Source of pushed configuration.
#[async_trait]
pub trait OrchestratorClient: Send + Sync + 'static {
    /// Fetch the element's full configuration as JSON text.
    async fn fetch_config(&self) -> Result<String, OrchestratorError>;

    /// Start listening for "new configuration available" signals.
    ///
    /// Signals that arrive while one is already pending are merged. The
    /// channel closes when `shutdown` fires.
    fn notifications(&self, shutdown: broadcast::Receiver<()>) -> mpsc::Receiver<()>;
}
