//! Desired-state schema definitions.
//!
//! This module defines the complete router configuration the sidecar drives
//! the router towards. All types derive Serde traits so the same structures
//! are read from the push payload, parsed out of the router's own document
//! format and rendered back into it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Complete target state for the router.
///
/// A `DesiredConfig` is always a full replacement snapshot; the only section
/// ever merged in place is `ssl_profiles`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DesiredConfig {
    /// Router identity and mode.
    pub metadata: RouterMetadata,

    /// SSL profiles keyed by profile name.
    pub ssl_profiles: BTreeMap<String, SslProfile>,

    /// AMQP listeners keyed by name.
    pub listeners: BTreeMap<String, Listener>,

    /// AMQP connectors keyed by name.
    pub connectors: BTreeMap<String, Connector>,

    /// Address distribution settings keyed by prefix.
    pub addresses: BTreeMap<String, Address>,

    /// Log settings keyed by module.
    pub log_config: BTreeMap<String, LogConfig>,

    /// Optional site description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_config: Option<SiteConfig>,

    /// Dynamic TCP bridge entities, reconciled by diff.
    pub bridges: BridgeConfig,
}

/// Router metadata (`router` section).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouterMetadata {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hello_max_age_seconds: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_connection_count: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// An SSL profile, either as received from the orchestrator or after its
/// material has been resolved to files on disk.
///
/// Decoding picks the inline form whenever any inline material field is
/// present; unknown keys are ignored in both forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SslProfile {
    /// Base64 material that still needs to be written to disk.
    Inline(InlineSslProfile),
    /// Absolute paths of material already on disk.
    Files(SslProfileFiles),
}

impl SslProfile {
    pub fn name(&self) -> &str {
        match self {
            SslProfile::Inline(p) => &p.name,
            SslProfile::Files(p) => &p.name,
        }
    }

    /// The resolved form, if this profile no longer carries inline material.
    pub fn files(&self) -> Option<&SslProfileFiles> {
        match self {
            SslProfile::Files(p) => Some(p),
            SslProfile::Inline(_) => None,
        }
    }
}

/// Every field either profile form may carry.
#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AnySslProfile {
    name: String,
    tls_cert: Option<String>,
    tls_key: Option<String>,
    ca_cert: Option<String>,
    cert_file: Option<String>,
    private_key_file: Option<String>,
    ca_cert_file: Option<String>,
}

impl<'de> Deserialize<'de> for SslProfile {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = AnySslProfile::deserialize(deserializer)?;
        let inline = raw.tls_cert.is_some() || raw.tls_key.is_some() || raw.ca_cert.is_some();
        Ok(if inline {
            SslProfile::Inline(InlineSslProfile {
                name: raw.name,
                tls_cert: raw.tls_cert,
                tls_key: raw.tls_key,
                ca_cert: raw.ca_cert,
            })
        } else {
            SslProfile::Files(SslProfileFiles {
                name: raw.name,
                cert_file: raw.cert_file,
                private_key_file: raw.private_key_file,
                ca_cert_file: raw.ca_cert_file,
            })
        })
    }
}

/// Inline certificate material as pushed by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InlineSslProfile {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_cert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
}

/// File-backed SSL profile as consumed by the router (`sslProfile` section).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SslProfileFiles {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert_file: Option<String>,
}

impl SslProfileFiles {
    /// A profile is usable with a CA file, a certificate/key pair, or both.
    pub fn is_usable(&self) -> bool {
        self.ca_cert_file.is_some() || (self.cert_file.is_some() && self.private_key_file.is_some())
    }
}

/// AMQP listener (`listener` section).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Listener {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub port: i32,
    #[serde(skip_serializing_if = "is_false")]
    pub route_container: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub http: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sasl_mechanisms: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub authenticate_peer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_capacity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frame_size: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_session_frames: Option<i32>,
}

/// AMQP connector (`connector` section).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Connector {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub host: String,
    pub port: String,
    #[serde(skip_serializing_if = "is_false")]
    pub route_container: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_hostname: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_capacity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frame_size: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_session_frames: Option<i32>,
}

/// Address distribution (`address` section), keyed by prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Address {
    pub prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<String>,
}

/// Log settings (`log` section), keyed by module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    pub module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable: Option<String>,
}

/// Site description (`site` section).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SiteConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Dynamic TCP forwarding entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    pub tcp_listeners: BTreeMap<String, TcpEndpoint>,
    pub tcp_connectors: BTreeMap<String, TcpEndpoint>,
}

/// A TCP listener or connector (`tcpListener` / `tcpConnector` sections).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TcpEndpoint {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub port: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_hostname: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
}

impl TcpEndpoint {
    /// Compare the attributes that affect forwarding.
    ///
    /// The live router echoes defaults back, so an absent optional string
    /// equals an empty one and an absent `verify_hostname` equals `true`.
    pub fn equivalent(&self, other: &TcpEndpoint) -> bool {
        fn norm(v: &Option<String>) -> &str {
            v.as_deref().unwrap_or("")
        }

        self.name == other.name
            && norm(&self.host) == norm(&other.host)
            && self.port == other.port
            && self.address == other.address
            && norm(&self.site_id) == norm(&other.site_id)
            && norm(&self.ssl_profile) == norm(&other.ssl_profile)
            && self.verify_hostname.unwrap_or(true) == other.verify_hostname.unwrap_or(true)
            && norm(&self.process_id) == norm(&other.process_id)
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}
