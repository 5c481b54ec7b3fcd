//! Router management subsystem.
//!
//! # Data Flow
//! ```text
//! BridgeReconciler
//!     → pool.rs (acquire: idle session or connector.connect())
//!     → client.rs trait ops (query / apply change set / reload profile)
//!     → skmanage.rs (concrete adapter)
//!     → guard dropped: session back to the idle set
//! ```

pub mod client;
pub mod pool;
pub mod skmanage;

pub use client::{ConnectionError, ManagementClient, ManagementConnector, ManagementError};
pub use pool::{ManagementPool, PooledConnection};
pub use skmanage::SkmanageConnector;
