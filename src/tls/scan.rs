//! Discovery of SSL profile bundles on disk.
//!
//! Layout: `<base>/<profile>/ca.crt` (required), `tls.crt` and `tls.key`
//! (optional). A subdirectory without `ca.crt` is not a profile yet.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::schema::SslProfileFiles;
use crate::tls::material::{CA_FILE, CERT_FILE, KEY_FILE};

/// Scan `base` for profile subdirectories.
///
/// A missing base directory means no profiles are configured and yields an
/// empty map.
pub fn scan_ssl_profile_dir(base: &Path) -> std::io::Result<BTreeMap<String, SslProfileFiles>> {
    let entries = match std::fs::read_dir(base) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e),
    };

    let mut profiles = BTreeMap::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!(path = ?entry.path(), "Skipping SSL profile directory with non UTF-8 name");
            continue;
        };

        let dir = base.join(&name);
        let ca = dir.join(CA_FILE);
        if !ca.is_file() {
            continue;
        }

        let present = |file: &str| {
            let path = dir.join(file);
            path.is_file().then(|| path.to_string_lossy().into_owned())
        };

        profiles.insert(
            name.clone(),
            SslProfileFiles {
                name,
                ca_cert_file: Some(ca.to_string_lossy().into_owned()),
                cert_file: present(CERT_FILE),
                private_key_file: present(KEY_FILE),
            },
        );
    }

    Ok(profiles)
}
