//! Process settings from flags and environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use url::Url;

/// Default location of the orchestrator-mounted router configuration.
pub const DEFAULT_CONFIG_PATH: &str = "/tmp/skrouterd.json";

/// Default directory holding one subdirectory per SSL profile.
pub const DEFAULT_SSL_PROFILE_PATH: &str = "/etc/skupper-router-certs";

/// Environment variable whose presence selects the file topology.
const KUBERNETES_ENV: &str = "KUBERNETES_SERVICE_HOST";

/// How the desired configuration reaches the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Topology {
    /// Configuration is a file mounted by the platform.
    File,
    /// Configuration is fetched from the orchestrator on notification.
    Push,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Sidecar settings.
#[derive(Debug, Clone, Parser)]
#[command(name = "router-sync")]
#[command(about = "Keeps a running router synchronized with its desired configuration", long_about = None)]
pub struct Settings {
    /// Router configuration file provided by the orchestrator.
    #[arg(long, env = "QDROUTERD_CONF", default_value = DEFAULT_CONFIG_PATH)]
    pub config_path: PathBuf,

    /// Base directory of SSL profile bundles (`<base>/<profile>/ca.crt`).
    #[arg(long, env = "SSL_PROFILE_PATH", default_value = DEFAULT_SSL_PROFILE_PATH)]
    pub ssl_profile_path: PathBuf,

    /// Where the rendered configuration is written for the router.
    #[arg(
        long,
        env = "ROUTER_CONFIG_OUTPUT",
        default_value = "/etc/skupper-router/skupper-router.json"
    )]
    pub rendered_config_path: PathBuf,

    /// Directory that receives materialized inline certificates.
    #[arg(long, env = "ROUTER_CERTS_DIR", default_value = "/etc/skupper-router/certs")]
    pub certs_dir: PathBuf,

    /// Router management endpoint.
    #[arg(long, env = "ROUTER_MANAGEMENT_URL", default_value = "amqp://localhost:5672")]
    pub management_url: Url,

    /// Router executable.
    #[arg(long, env = "ROUTER_BINARY", default_value = "skrouterd")]
    pub router_binary: PathBuf,

    /// Router management tool.
    #[arg(long, env = "SKMANAGE_BINARY", default_value = "skmanage")]
    pub skmanage_binary: PathBuf,

    /// Deployment topology; detected from the environment when unset.
    #[arg(long, env = "ROUTER_SYNC_MODE", value_enum)]
    pub mode: Option<Topology>,

    /// Orchestrator agent API.
    #[arg(long, env = "IOFOG_AGENT_URL", default_value = "http://iofog:54321")]
    pub iofog_url: Url,

    /// Identity of this element at the orchestrator (push topology).
    #[arg(long, env = "SELFNAME")]
    pub element_id: Option<String>,

    /// Maximum concurrent management connections.
    #[arg(long, env = "MANAGEMENT_POOL_SIZE", default_value_t = 4)]
    pub pool_size: usize,

    /// Prometheus exporter bind address; metrics are disabled when unset.
    #[arg(long, env = "METRICS_ADDRESS")]
    pub metrics_address: Option<SocketAddr>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

impl Settings {
    /// The explicit topology, or the one implied by the environment.
    pub fn topology(&self) -> Topology {
        self.mode.unwrap_or_else(|| {
            if std::env::var_os(KUBERNETES_ENV).is_some() {
                Topology::File
            } else {
                Topology::Push
            }
        })
    }
}
