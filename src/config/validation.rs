//! Desired-state validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check every resolved SSL profile can actually be used by the router
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DesiredConfig → Result<(), Vec<ValidationError>>
//! - Runs after TLS materialization, before anything touches the router

use std::fmt;

use crate::config::schema::{DesiredConfig, SslProfile};

/// A single semantic problem in a desired configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Profile has neither a CA file nor a certificate/key pair.
    UnusableProfile(String),
    /// Profile still carries inline material.
    UnresolvedProfile(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::UnusableProfile(name) => write!(
                f,
                "ssl profile '{}' needs a CA certificate or a certificate and key",
                name
            ),
            ValidationError::UnresolvedProfile(name) => {
                write!(f, "ssl profile '{}' has not been materialized", name)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a desired configuration whose profiles have been materialized.
pub fn validate_config(config: &DesiredConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (name, profile) in &config.ssl_profiles {
        match profile {
            SslProfile::Files(files) if !files.is_usable() => {
                errors.push(ValidationError::UnusableProfile(name.clone()));
            }
            SslProfile::Files(_) => {}
            SslProfile::Inline(_) => {
                errors.push(ValidationError::UnresolvedProfile(name.clone()));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
