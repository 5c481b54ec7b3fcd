//! Router process supervision.
//!
//! The supervisor starts the router once and reports its exit; restarting
//! is left to whatever manages the sidecar's own container.

pub mod supervisor;

pub use supervisor::{exit_code, LaunchConfig, RouterProcess, SupervisorError};
