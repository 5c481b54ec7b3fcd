//! Router configuration sidecar.
//!
//! Keeps a running router's bridges and SSL profiles synchronized with a
//! desired configuration that arrives either as a mounted file or from an
//! orchestrator.

pub mod config;
pub mod engine;
pub mod tls;

// Router-facing
pub mod bridge;
pub mod management;
pub mod process;

// Change delivery
pub mod orchestrator;
pub mod watch;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{DesiredConfig, Settings};
pub use engine::Engine;
pub use lifecycle::Shutdown;
