//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Fetch initial config / apply pushed update:
//!     → retries.rs (bounded attempts, retryable errors only)
//!     → backoff.rs (delay between attempts)
//! ```
//!
//! # Design Decisions
//! - Retry boundaries sit at the edges, never inside the pool or reconciler
//! - Jittered backoff for remote calls, fixed delay for local files

pub mod backoff;
pub mod retries;

pub use retries::{retry, Backoff, RetryPolicy};
