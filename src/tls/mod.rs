//! TLS material subsystem.
//!
//! # Data Flow
//! ```text
//! Push topology:
//!     inline base64 profile
//!     → material.rs (decode, write <certs>/<profile>/{tls.crt,tls.key,ca.crt})
//!     → SslProfileFiles with absolute paths
//!
//! Both topologies:
//!     <ssl-profile-path>/<profile>/ca.crt ...
//!     → scan.rs (discover valid bundles)
//!     → merged into desired state, router told to reload
//! ```
//!
//! # Design Decisions
//! - Decode everything before writing anything
//! - Materialization is idempotent; it overwrites deterministically
//! - A bundle is a profile only once its CA certificate exists

pub mod material;
pub mod scan;

pub use material::{TlsError, TlsMaterializer};
pub use scan::scan_ssl_profile_dir;
