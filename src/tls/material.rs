//! Materialization of inline certificate material to per-profile files.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use thiserror::Error;

use crate::config::schema::{InlineSslProfile, SslProfile, SslProfileFiles};

pub const CERT_FILE: &str = "tls.crt";
pub const KEY_FILE: &str = "tls.key";
pub const CA_FILE: &str = "ca.crt";

/// Errors that can occur while writing a profile's material.
#[derive(Debug, Error)]
pub enum TlsError {
    /// The name cannot be used as a single directory under the base.
    #[error("ssl profile name {0:?} is not a valid directory name")]
    InvalidName(String),

    /// Inline material is not valid base64.
    #[error("ssl profile '{profile}': {file} is not valid base64: {source}")]
    Decode {
        profile: String,
        file: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    /// The profile directory or a file in it could not be written.
    #[error("ssl profile '{profile}': failed to write {path:?}: {source}")]
    Io {
        profile: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes inline profile material under `<base>/<profile>/`.
#[derive(Debug, Clone)]
pub struct TlsMaterializer {
    base: PathBuf,
}

impl TlsMaterializer {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Decode and write one profile, returning it with file paths substituted.
    ///
    /// Everything is decoded before anything is written, so a decode error
    /// leaves the disk untouched. Absent material stays absent; re-running
    /// overwrites the same files.
    pub async fn materialize(&self, profile: &InlineSslProfile) -> Result<SslProfileFiles, TlsError> {
        if !is_single_component(&profile.name) {
            return Err(TlsError::InvalidName(profile.name.clone()));
        }

        let cert = decode(&profile.name, CERT_FILE, profile.tls_cert.as_deref())?;
        let key = decode(&profile.name, KEY_FILE, profile.tls_key.as_deref())?;
        let ca = decode(&profile.name, CA_FILE, profile.ca_cert.as_deref())?;

        let dir = self.base.join(&profile.name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| TlsError::Io {
                profile: profile.name.clone(),
                path: dir.clone(),
                source,
            })?;

        let mut resolved = SslProfileFiles {
            name: profile.name.clone(),
            ..Default::default()
        };

        if let Some(bytes) = cert {
            resolved.cert_file = Some(write_file(&profile.name, &dir, CERT_FILE, &bytes, false).await?);
        }
        if let Some(bytes) = key {
            resolved.private_key_file = Some(write_file(&profile.name, &dir, KEY_FILE, &bytes, true).await?);
        }
        if let Some(bytes) = ca {
            resolved.ca_cert_file = Some(write_file(&profile.name, &dir, CA_FILE, &bytes, false).await?);
        }

        tracing::debug!(
            profile = %profile.name,
            dir = ?dir,
            cert = resolved.cert_file.is_some(),
            key = resolved.private_key_file.is_some(),
            ca = resolved.ca_cert_file.is_some(),
            "SSL profile materialized"
        );

        Ok(resolved)
    }

    /// Resolve every inline profile in a map; file-backed profiles pass through.
    ///
    /// The map key is the profile's name: it names both the directory and
    /// the rendered `sslProfile`. The first failure aborts the whole map.
    pub async fn resolve_all(
        &self,
        profiles: &BTreeMap<String, SslProfile>,
    ) -> Result<BTreeMap<String, SslProfile>, TlsError> {
        let mut resolved = BTreeMap::new();
        for (name, profile) in profiles {
            let mut files = match profile {
                SslProfile::Inline(inline) => {
                    let named = InlineSslProfile {
                        name: name.clone(),
                        ..inline.clone()
                    };
                    self.materialize(&named).await?
                }
                SslProfile::Files(files) => files.clone(),
            };
            files.name = name.clone();
            resolved.insert(name.clone(), SslProfile::Files(files));
        }
        Ok(resolved)
    }
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn decode(profile: &str, file: &'static str, encoded: Option<&str>) -> Result<Option<Vec<u8>>, TlsError> {
    let Some(encoded) = encoded.filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    // Orchestrators commonly wrap base64 at 76 columns.
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    general_purpose::STANDARD
        .decode(compact)
        .map(Some)
        .map_err(|source| TlsError::Decode {
            profile: profile.to_string(),
            file,
            source,
        })
}

async fn write_file(
    profile: &str,
    dir: &Path,
    file: &str,
    bytes: &[u8],
    private: bool,
) -> Result<String, TlsError> {
    let path = dir.join(file);
    let io_err = |source| TlsError::Io {
        profile: profile.to_string(),
        path: path.clone(),
        source,
    };

    tokio::fs::write(&path, bytes).await.map_err(io_err)?;
    if private {
        restrict_to_owner(&path).await.map_err(io_err)?;
    }

    Ok(path.to_string_lossy().into_owned())
}

#[cfg(unix)]
async fn restrict_to_owner(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_to_owner(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
