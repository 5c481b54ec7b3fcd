//! Bridge configuration subsystem.
//!
//! # Data Flow
//! ```text
//! desired BridgeConfig
//!     → reconciler.rs (acquire pooled session, read live bridges)
//!     → diff.rs (ChangeSet: creations, deletions, replacements)
//!     → session applies deletions, then creations
//! ```
//!
//! # Design Decisions
//! - Replacement is delete + create, never in-place update
//! - No rollback: a partial apply converges on the next run
//! - Attribute echo from the router is not a difference

pub mod diff;
pub mod reconciler;

pub use diff::{ChangeSet, EntityChanges, EntityKind, Operation};
pub use reconciler::{BridgeReconciler, ReconcileError};
