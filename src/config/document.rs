//! The router's on-disk configuration document.
//!
//! The router reads a JSON array of `[kind, payload]` pairs. Rendering emits
//! kinds in a fixed order (router, sslProfile, listener, connector,
//! tcpListener, tcpConnector, address, log, site); entries within a kind are
//! emitted in key order so identical state renders to identical bytes.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::schema::{
    Address, Connector, DesiredConfig, Listener, LogConfig, RouterMetadata, SiteConfig, SslProfile,
    SslProfileFiles, TcpEndpoint,
};

/// Error type for parsing a configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The text is not JSON at all.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The top level is not an array.
    #[error("configuration document must be a JSON array of [kind, payload] pairs")]
    NotAnArray,

    /// An element is not a `[string, object]` pair.
    #[error("section {index} is not a [kind, payload] pair")]
    MalformedSection { index: usize },

    /// A payload does not match the shape of its kind.
    #[error("section {index} ({kind}): {source}")]
    InvalidPayload {
        index: usize,
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Error type for rendering a configuration document.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A profile still carries inline material; it must be materialized first.
    #[error("ssl profile '{0}' has not been materialized to files")]
    UnresolvedProfile(String),

    #[error("failed to encode configuration: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Parse a configuration document into a desired-state snapshot.
pub fn parse_document(text: &str) -> Result<DesiredConfig, ConfigError> {
    let root: Value = serde_json::from_str(text)?;
    let Value::Array(sections) = root else {
        return Err(ConfigError::NotAnArray);
    };

    let mut config = DesiredConfig::default();

    for (index, section) in sections.into_iter().enumerate() {
        let (kind, payload) = match section {
            Value::Array(mut pair) if pair.len() == 2 => {
                let payload = pair.pop().unwrap_or(Value::Null);
                let kind = pair.pop().unwrap_or(Value::Null);
                match (kind, payload) {
                    (Value::String(kind), payload @ Value::Object(_)) => (kind, payload),
                    _ => return Err(ConfigError::MalformedSection { index }),
                }
            }
            _ => return Err(ConfigError::MalformedSection { index }),
        };

        let invalid = |source| ConfigError::InvalidPayload {
            index,
            kind: kind.clone(),
            source,
        };

        match kind.as_str() {
            "router" => {
                config.metadata = serde_json::from_value(payload).map_err(invalid)?;
            }
            "sslProfile" => {
                let profile: SslProfileFiles = serde_json::from_value(payload).map_err(invalid)?;
                config
                    .ssl_profiles
                    .insert(profile.name.clone(), SslProfile::Files(profile));
            }
            "listener" => {
                let listener: Listener = serde_json::from_value(payload).map_err(invalid)?;
                config.listeners.insert(listener.name.clone(), listener);
            }
            "connector" => {
                let connector: Connector = serde_json::from_value(payload).map_err(invalid)?;
                config.connectors.insert(connector.name.clone(), connector);
            }
            "tcpListener" => {
                let endpoint: TcpEndpoint = serde_json::from_value(payload).map_err(invalid)?;
                config
                    .bridges
                    .tcp_listeners
                    .insert(endpoint.name.clone(), endpoint);
            }
            "tcpConnector" => {
                let endpoint: TcpEndpoint = serde_json::from_value(payload).map_err(invalid)?;
                config
                    .bridges
                    .tcp_connectors
                    .insert(endpoint.name.clone(), endpoint);
            }
            "address" => {
                let address: Address = serde_json::from_value(payload).map_err(invalid)?;
                config.addresses.insert(address.prefix.clone(), address);
            }
            "log" => {
                let log: LogConfig = serde_json::from_value(payload).map_err(invalid)?;
                config.log_config.insert(log.module.clone(), log);
            }
            "site" => {
                let site: SiteConfig = serde_json::from_value(payload).map_err(invalid)?;
                config.site_config = Some(site);
            }
            other => {
                tracing::warn!(index, kind = %other, "Skipping unsupported configuration section");
            }
        }
    }

    Ok(config)
}

/// Render a desired-state snapshot into the router's document format.
///
/// Fails without producing output if any profile is still inline or if
/// encoding fails, so a caller never persists a partial document.
pub fn render_document(config: &DesiredConfig) -> Result<String, RenderError> {
    let mut sections: Vec<(&'static str, Value)> = Vec::new();

    sections.push(("router", section_payload::<RouterMetadata>(&config.metadata)?));

    for profile in config.ssl_profiles.values() {
        let files = profile
            .files()
            .ok_or_else(|| RenderError::UnresolvedProfile(profile.name().to_string()))?;
        sections.push(("sslProfile", section_payload(files)?));
    }
    for listener in config.listeners.values() {
        sections.push(("listener", section_payload(listener)?));
    }
    for connector in config.connectors.values() {
        sections.push(("connector", section_payload(connector)?));
    }
    for endpoint in config.bridges.tcp_listeners.values() {
        sections.push(("tcpListener", section_payload(endpoint)?));
    }
    for endpoint in config.bridges.tcp_connectors.values() {
        sections.push(("tcpConnector", section_payload(endpoint)?));
    }
    for address in config.addresses.values() {
        sections.push(("address", section_payload(address)?));
    }
    for log in config.log_config.values() {
        sections.push(("log", section_payload(log)?));
    }
    if let Some(site) = &config.site_config {
        sections.push(("site", section_payload(site)?));
    }

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    sections.serialize(&mut serializer)?;

    // serde_json only ever emits valid UTF-8.
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn section_payload<T: Serialize>(value: &T) -> Result<Value, RenderError> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::InlineSslProfile;

    fn kinds(rendered: &str) -> Vec<String> {
        let value: Value = serde_json::from_str(rendered).unwrap();
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|pair| pair[0].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn render_metadata_and_single_listener() {
        let mut config = DesiredConfig::default();
        config.metadata.id = "router-1".into();
        config.listeners.insert(
            "amqp".into(),
            Listener {
                name: "amqp".into(),
                port: 5672,
                ..Default::default()
            },
        );

        let rendered = render_document(&config).unwrap();
        assert_eq!(kinds(&rendered), vec!["router", "listener"]);
    }

    #[test]
    fn render_orders_kinds() {
        let mut config = DesiredConfig::default();
        config.site_config = Some(SiteConfig {
            name: "site".into(),
            ..Default::default()
        });
        config.log_config.insert(
            "DEFAULT".into(),
            LogConfig {
                module: "DEFAULT".into(),
                enable: Some("info+".into()),
            },
        );
        config.addresses.insert(
            "mc".into(),
            Address {
                prefix: "mc".into(),
                distribution: Some("multicast".into()),
            },
        );
        config.bridges.tcp_connectors.insert(
            "c1".into(),
            TcpEndpoint {
                name: "c1".into(),
                ..Default::default()
            },
        );
        config.bridges.tcp_listeners.insert(
            "l1".into(),
            TcpEndpoint {
                name: "l1".into(),
                ..Default::default()
            },
        );
        config.connectors.insert(
            "up".into(),
            Connector {
                name: "up".into(),
                ..Default::default()
            },
        );
        config.ssl_profiles.insert(
            "p".into(),
            SslProfile::Files(SslProfileFiles {
                name: "p".into(),
                ca_cert_file: Some("/certs/p/ca.crt".into()),
                ..Default::default()
            }),
        );

        let rendered = render_document(&config).unwrap();
        assert_eq!(
            kinds(&rendered),
            vec![
                "router",
                "sslProfile",
                "connector",
                "tcpListener",
                "tcpConnector",
                "address",
                "log",
                "site"
            ]
        );
    }

    #[test]
    fn render_refuses_inline_material() {
        let mut config = DesiredConfig::default();
        config.ssl_profiles.insert(
            "p".into(),
            SslProfile::Inline(InlineSslProfile {
                name: "p".into(),
                ca_cert: Some("Y2E=".into()),
                ..Default::default()
            }),
        );

        let err = render_document(&config).unwrap_err();
        assert!(matches!(err, RenderError::UnresolvedProfile(name) if name == "p"));
    }

    #[test]
    fn parse_reads_back_rendered_document() {
        let mut config = DesiredConfig::default();
        config.metadata.mode = "interior".into();
        config.bridges.tcp_listeners.insert(
            "db".into(),
            TcpEndpoint {
                name: "db".into(),
                port: "5432".into(),
                address: "db".into(),
                ..Default::default()
            },
        );

        let parsed = parse_document(&render_document(&config).unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn parse_rejects_malformed_sections() {
        assert!(matches!(
            parse_document(r#"{"router": {}}"#),
            Err(ConfigError::NotAnArray)
        ));
        assert!(matches!(
            parse_document(r#"[["router", {}], ["listener"]]"#),
            Err(ConfigError::MalformedSection { index: 1 })
        ));
        assert!(matches!(
            parse_document(r#"[["listener", {"name": "l", "port": "not-a-number"}]]"#),
            Err(ConfigError::InvalidPayload { index: 0, .. })
        ));
        assert!(matches!(parse_document("[["), Err(ConfigError::Json(_))));
    }

    #[test]
    fn parse_skips_unknown_kinds() {
        let config =
            parse_document(r#"[["router", {"id": "r"}], ["linkRoute", {"prefix": "x"}]]"#).unwrap();
        assert_eq!(config.metadata.id, "r");
    }
}
