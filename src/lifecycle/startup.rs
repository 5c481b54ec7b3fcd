//! Startup orchestration.
//!
//! # Responsibilities
//! - Obtain the first desired configuration for the detected topology
//! - Prepare the rendered document before the router starts
//! - Launch the router, then start delivering changes to it
//! - Exit with the router's exit code, or cleanly on SIGINT/SIGTERM
//!
//! # Design Decisions
//! - Fail fast: nothing after launch is fatal except the router exiting
//! - A watcher that cannot be set up disables its own updates only

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::bridge::BridgeReconciler;
use crate::config::settings::{Settings, Topology};
use crate::engine::source::{ConfigSource, FileBasedSource, PushBasedSource, SourceError};
use crate::engine::{Engine, UpdateError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::management::{ManagementPool, SkmanageConnector};
use crate::orchestrator::iofog::IoFogClient;
use crate::orchestrator::OrchestratorError;
use crate::process::{exit_code, LaunchConfig, RouterProcess, SupervisorError};
use crate::tls::{scan_ssl_profile_dir, TlsMaterializer};
use crate::watch::SslProfileWatcher;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("push topology requires an element id (SELFNAME)")]
    MissingElementId,

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("failed to obtain initial configuration: {0}")]
    Source(#[from] SourceError),

    #[error("failed to prepare initial configuration: {0}")]
    Update(#[from] UpdateError),

    #[error(transparent)]
    Router(#[from] SupervisorError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

fn config_source(settings: &Settings, topology: Topology) -> Result<Box<dyn ConfigSource>, StartupError> {
    match topology {
        Topology::File => Ok(Box::new(FileBasedSource::new(&settings.config_path))),
        Topology::Push => {
            let element_id = settings.element_id.clone().ok_or(StartupError::MissingElementId)?;
            let client = IoFogClient::new(&settings.iofog_url, element_id)?;
            Ok(Box::new(PushBasedSource::new(client)))
        }
    }
}

/// Run the sidecar until the router exits or termination is requested.
///
/// Returns the process exit code.
pub async fn run(settings: Settings) -> Result<i32, StartupError> {
    let topology = settings.topology();
    tracing::info!(
        ?topology,
        config = ?settings.config_path,
        ssl_profiles = ?settings.ssl_profile_path,
        "router-sync v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let source = config_source(&settings, topology)?;
    let initial = source.fetch_initial().await?;

    let disk_profiles = scan_ssl_profile_dir(&settings.ssl_profile_path).unwrap_or_else(|e| {
        tracing::warn!(path = ?settings.ssl_profile_path, error = %e, "Failed to scan SSL profile directory");
        BTreeMap::new()
    });

    let connector = Arc::new(SkmanageConnector::new(&settings.skmanage_binary, &settings.management_url));
    let pool = ManagementPool::new(connector, settings.pool_size);
    let rendered_path = match topology {
        Topology::File => Some(settings.rendered_config_path.clone()),
        Topology::Push => None,
    };
    let engine = Engine::new(
        BridgeReconciler::new(pool.clone()),
        TlsMaterializer::new(&settings.certs_dir),
        rendered_path.clone(),
    );
    let rendered = engine.bootstrap(initial, disk_profiles.clone()).await?;

    let launch = match rendered_path {
        Some(path) => LaunchConfig::File(path),
        None => LaunchConfig::Inline(rendered),
    };
    let router = RouterProcess::new(&settings.router_binary, launch);

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    match source.subscribe(engine.clone(), shutdown.subscribe()) {
        Ok(handle) => tasks.push(handle),
        Err(e) => tracing::error!(error = %e, "Configuration updates disabled"),
    }

    let profile_engine = engine.clone();
    let profiles = SslProfileWatcher::new(&settings.ssl_profile_path)
        .with_initial(&disk_profiles)
        .spawn(
            move |found| {
                let engine = profile_engine.clone();
                async move { engine.on_ssl_profiles_from_disk(found).await }
            },
            shutdown.subscribe(),
        );
    match profiles {
        Ok(Some(handle)) => tasks.push(handle),
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "SSL profile updates disabled"),
    }

    let code = tokio::select! {
        status = router.run() => exit_code(status?),
        signal = signals::wait_for_termination() => {
            let signal = signal.map_err(StartupError::Signals)?;
            tracing::info!(signal, "Termination requested, stopping router");
            0
        }
    };

    shutdown.trigger();
    pool.close();
    for task in tasks {
        let _ = task.await;
    }

    tracing::info!(code, "Shutdown complete");
    Ok(code)
}
