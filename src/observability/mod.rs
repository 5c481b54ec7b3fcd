//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Watchers, engine, reconciler:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters)
//!
//! Consumers:
//!     → stdout (text or JSON)
//!     → Prometheus scrape (optional)
//! ```

pub mod logging;
pub mod metrics;
