//! End-to-end update flow against an in-memory router.

mod common;

use std::collections::BTreeMap;

use common::{bridges, endpoint, engine, FakeRouter};
use router_sync::config::{parse_document, DesiredConfig, SslProfile, SslProfileFiles};
use router_sync::config::schema::InlineSslProfile;
use router_sync::engine::UpdateError;
use tempfile::TempDir;

fn desired(id: &str) -> DesiredConfig {
    let mut config = DesiredConfig::default();
    config.metadata.id = id.into();
    config.metadata.mode = "interior".into();
    config
}

fn profile_files(dir: &std::path::Path, name: &str) -> SslProfileFiles {
    SslProfileFiles {
        name: name.into(),
        ca_cert_file: Some(dir.join(name).join("ca.crt").to_string_lossy().into_owned()),
        ..Default::default()
    }
}

#[tokio::test]
async fn bootstrap_writes_document_without_touching_router() {
    let dir = TempDir::new().unwrap();
    let router = FakeRouter::new();
    let engine = engine(&router, dir.path());

    let mut initial = desired("r1");
    initial.bridges = bridges(&[endpoint("l1", "9090", "backend")], &[]);

    let rendered = engine.bootstrap(initial, BTreeMap::new()).await.unwrap();

    let on_disk = std::fs::read_to_string(dir.path().join("skupper-router.json")).unwrap();
    assert_eq!(on_disk, rendered);
    assert!(router.ops().is_empty());
    assert_eq!(engine.current().bridges.tcp_listeners.len(), 1);
}

#[tokio::test]
async fn update_converges_router_bridges() {
    let dir = TempDir::new().unwrap();
    let router = FakeRouter::with_bridges(bridges(&[endpoint("l1", "9090", "old")], &[]));
    let engine = engine(&router, dir.path());

    let mut next = desired("r1");
    next.bridges = bridges(
        &[endpoint("l2", "9091", "web")],
        &[endpoint("c1", "8080", "web")],
    );

    let changes = engine.update_router(next.clone()).await.unwrap();
    assert_eq!(changes.counts(), (1, 2));
    assert_eq!(
        router.ops(),
        vec![
            "delete tcpListener l1",
            "create tcpListener l2",
            "create tcpConnector c1",
        ]
    );
    assert_eq!(router.bridges(), next.bridges);

    let on_disk = std::fs::read_to_string(dir.path().join("skupper-router.json")).unwrap();
    let parsed = parse_document(&on_disk).unwrap();
    assert_eq!(parsed.bridges, next.bridges);
    assert_eq!(engine.current().bridges, next.bridges);
}

#[tokio::test]
async fn converged_router_receives_no_operations() {
    let dir = TempDir::new().unwrap();
    let live = bridges(&[endpoint("l1", "9090", "backend")], &[]);
    let router = FakeRouter::with_bridges(live.clone());
    let engine = engine(&router, dir.path());

    let mut next = desired("r1");
    next.bridges = live;

    let changes = engine.update_router(next).await.unwrap();
    assert!(changes.is_empty());
    assert!(router.ops().is_empty());
}

#[tokio::test]
async fn identical_document_is_not_rewritten() {
    let dir = TempDir::new().unwrap();
    let router = FakeRouter::new();
    let engine = engine(&router, dir.path());
    let path = dir.path().join("skupper-router.json");

    engine.update_router(desired("r1")).await.unwrap();
    std::fs::remove_file(&path).unwrap();

    engine.update_router(desired("r1")).await.unwrap();
    assert!(!path.exists());

    engine.update_router(desired("r2")).await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn rejected_update_keeps_previous_state() {
    let dir = TempDir::new().unwrap();
    let router = FakeRouter::new();
    let engine = engine(&router, dir.path());
    let path = dir.path().join("skupper-router.json");

    let mut first = desired("r1");
    first.bridges = bridges(&[endpoint("l1", "9090", "backend")], &[]);
    engine.update_router(first.clone()).await.unwrap();
    let written = std::fs::read_to_string(&path).unwrap();

    router.reject_updates(true);
    let mut second = desired("r1");
    second.bridges = bridges(&[endpoint("l2", "9091", "backend")], &[]);

    let err = engine.update_router(second).await.unwrap_err();
    assert!(matches!(err, UpdateError::Reconcile(_)));
    assert_eq!(engine.current().bridges, first.bridges);
    assert_eq!(router.bridges(), first.bridges);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), written);
}

#[tokio::test]
async fn unreachable_router_fails_the_update() {
    let dir = TempDir::new().unwrap();
    let router = FakeRouter::new();
    router.set_unreachable(true);
    let engine = engine(&router, dir.path());

    let err = engine.update_router(desired("r1")).await.unwrap_err();
    assert!(matches!(err, UpdateError::Reconcile(_)));
    assert!(!dir.path().join("skupper-router.json").exists());
}

#[tokio::test]
async fn unusable_profile_is_rejected_before_router_is_contacted() {
    let dir = TempDir::new().unwrap();
    let router = FakeRouter::with_bridges(bridges(&[endpoint("l1", "9090", "old")], &[]));
    let engine = engine(&router, dir.path());

    let mut next = desired("r1");
    next.ssl_profiles.insert(
        "empty".into(),
        SslProfile::Files(SslProfileFiles {
            name: "empty".into(),
            ..Default::default()
        }),
    );

    let err = engine.update_router(next).await.unwrap_err();
    match err {
        UpdateError::Invalid(errors) => assert_eq!(errors.len(), 1),
        other => panic!("unexpected error: {other}"),
    }
    assert!(router.ops().is_empty());
}

#[tokio::test]
async fn inline_profiles_are_materialized_before_rendering() {
    let dir = TempDir::new().unwrap();
    let router = FakeRouter::new();
    let engine = engine(&router, dir.path());

    let mut next = desired("r1");
    next.ssl_profiles.insert(
        "site".into(),
        SslProfile::Inline(InlineSslProfile {
            name: "site".into(),
            ca_cert: Some("Y2EtYnl0ZXM=".into()),
            ..Default::default()
        }),
    );

    engine.update_router(next).await.unwrap();

    let ca = dir.path().join("certs").join("site").join("ca.crt");
    assert_eq!(std::fs::read(&ca).unwrap(), b"ca-bytes");

    let current = engine.current();
    let files = current.ssl_profiles["site"].files().unwrap();
    assert_eq!(files.ca_cert_file.as_deref(), Some(ca.to_string_lossy().as_ref()));
}

#[tokio::test]
async fn malformed_document_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let router = FakeRouter::new();
    let engine = engine(&router, dir.path());

    let err = engine.apply_document("{\"router\": {}}").await.unwrap_err();
    assert!(matches!(err, UpdateError::Parse(_)));
}

#[tokio::test]
async fn disk_profiles_reload_known_and_adopt_new() {
    let dir = TempDir::new().unwrap();
    let certs = dir.path().join("profiles");
    let router = FakeRouter::new();
    let engine = engine(&router, dir.path());

    let known = profile_files(&certs, "p1");
    let initial_disk = BTreeMap::from([("p1".to_string(), known.clone())]);
    engine.bootstrap(desired("r1"), initial_disk).await.unwrap();

    let found = BTreeMap::from([
        ("p1".to_string(), known),
        ("p2".to_string(), profile_files(&certs, "p2")),
    ]);
    engine.on_ssl_profiles_from_disk(found).await.unwrap();

    assert_eq!(router.reloads(), vec!["p1"]);
    let current = engine.current();
    assert!(current.ssl_profiles.contains_key("p2"));

    let on_disk = std::fs::read_to_string(dir.path().join("skupper-router.json")).unwrap();
    assert!(parse_document(&on_disk).unwrap().ssl_profiles.contains_key("p2"));

    // Later updates keep profiles that only exist on disk.
    engine.update_router(desired("r1")).await.unwrap();
    assert!(engine.current().ssl_profiles.contains_key("p2"));
}

#[tokio::test]
async fn configured_profile_wins_over_disk_profile_of_same_name() {
    let dir = TempDir::new().unwrap();
    let router = FakeRouter::new();
    let engine = engine(&router, dir.path());

    let configured = profile_files(std::path::Path::new("/configured"), "site");
    let mut initial = desired("r1");
    initial
        .ssl_profiles
        .insert("site".into(), SslProfile::Files(configured.clone()));
    engine.bootstrap(initial.clone(), BTreeMap::new()).await.unwrap();

    let on_disk = profile_files(std::path::Path::new("/disk"), "site");
    engine
        .on_ssl_profiles_from_disk(BTreeMap::from([("site".to_string(), on_disk)]))
        .await
        .unwrap();
    assert_eq!(engine.current().ssl_profiles["site"].files(), Some(&configured));
    assert_eq!(router.reloads(), vec!["site"]);

    engine.update_router(initial).await.unwrap();
    assert_eq!(engine.current().ssl_profiles["site"].files(), Some(&configured));

    let written = std::fs::read_to_string(dir.path().join("skupper-router.json")).unwrap();
    let parsed = parse_document(&written).unwrap();
    assert_eq!(parsed.ssl_profiles["site"].files(), Some(&configured));
}

#[tokio::test]
async fn disk_only_profile_follows_later_scans() {
    let dir = TempDir::new().unwrap();
    let router = FakeRouter::new();
    let engine = engine(&router, dir.path());

    let first = profile_files(std::path::Path::new("/disk/v1"), "p2");
    engine
        .bootstrap(desired("r1"), BTreeMap::from([("p2".to_string(), first)]))
        .await
        .unwrap();

    let moved = profile_files(std::path::Path::new("/disk/v2"), "p2");
    engine
        .on_ssl_profiles_from_disk(BTreeMap::from([("p2".to_string(), moved.clone())]))
        .await
        .unwrap();
    assert_eq!(engine.current().ssl_profiles["p2"].files(), Some(&moved));

    engine.update_router(desired("r1")).await.unwrap();
    assert_eq!(engine.current().ssl_profiles["p2"].files(), Some(&moved));
}
