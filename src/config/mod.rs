//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! orchestrator payload (JSON object)  ─┐
//! mounted router document (JSON array) ┴→ document.rs / serde
//!     → DesiredConfig (schema.rs)
//!     → TLS materialization (crate::tls)
//!     → validation.rs (semantic checks)
//!     → document.rs renders the router's on-disk format
//!
//! settings.rs: flags + environment for the sidecar process itself
//! ```
//!
//! # Design Decisions
//! - DesiredConfig is a complete snapshot; updates replace it wholesale
//! - Maps are ordered so identical state renders to identical bytes
//! - Rendering never emits a partial document

pub mod document;
pub mod schema;
pub mod settings;
pub mod validation;

pub use document::{parse_document, render_document, ConfigError, RenderError};
pub use schema::{BridgeConfig, DesiredConfig, SslProfile, SslProfileFiles, TcpEndpoint};
pub use settings::{Settings, Topology};
