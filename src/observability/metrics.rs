//! Metrics collection and exposition.
//!
//! # Metrics
//! - `router_sync_reconcile_total` (counter): reconciliation cycles by outcome
//! - `router_sync_bridge_changes_total` (counter): bridge operations by kind, op
//! - `router_sync_watch_events_total` (counter): qualifying fs events by watcher
//! - `router_sync_profile_reload_total` (counter): profile reloads by outcome
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::bridge::diff::ChangeSet;

/// Start the Prometheus scrape endpoint on `addr`.
///
/// Must be called from within the tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_reconcile(outcome: &'static str) {
    counter!("router_sync_reconcile_total", "outcome" => outcome).increment(1);
}

pub fn record_bridge_changes(changes: &ChangeSet) {
    let kinds = [
        ("tcpListener", &changes.tcp_listeners),
        ("tcpConnector", &changes.tcp_connectors),
    ];
    for (kind, entity) in kinds {
        if !entity.deleted.is_empty() {
            counter!("router_sync_bridge_changes_total", "kind" => kind, "op" => "delete")
                .increment(entity.deleted.len() as u64);
        }
        if !entity.added.is_empty() {
            counter!("router_sync_bridge_changes_total", "kind" => kind, "op" => "create")
                .increment(entity.added.len() as u64);
        }
    }
}

pub fn record_watch_event(watcher: &'static str) {
    counter!("router_sync_watch_events_total", "watcher" => watcher).increment(1);
}

pub fn record_profile_reload(ok: bool) {
    let outcome = if ok { "success" } else { "failure" };
    counter!("router_sync_profile_reload_total", "outcome" => outcome).increment(1);
}
