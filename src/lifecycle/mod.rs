//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Settings → Initial config → Bootstrap → Launch router → Start watchers
//!
//! Shutdown (shutdown.rs):
//!     Router exit or signal → Stop watchers → Close management pool → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Stop the router and shut down
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, StartupError};
