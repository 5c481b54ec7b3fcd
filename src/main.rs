//! router-sync
//!
//! Sidecar that launches a router and keeps it synchronized with its desired
//! configuration.
//!
//! # Architecture Overview
//!
//! ```text
//!   mounted file ──▶ config file watcher ─┐
//!                                         ├──▶ engine ──▶ render + persist
//!   orchestrator ──▶ notification loop ───┘      │
//!                                                ├──▶ TLS materializer
//!   profile dir ───▶ SSL profile watcher ────────┤
//!                                                ▼
//!                                       bridge reconciler ──▶ management pool ──▶ router
//! ```

use clap::Parser;

use router_sync::config::Settings;
use router_sync::lifecycle;
use router_sync::observability::{logging, metrics};

#[tokio::main]
async fn main() {
    let settings = Settings::parse();
    logging::init_logging(settings.log_format);

    if let Some(addr) = settings.metrics_address {
        metrics::init_metrics(addr);
    }

    let code = match lifecycle::run(settings).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "router-sync failed");
            1
        }
    };
    std::process::exit(code);
}
