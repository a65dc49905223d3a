//! Start-up against fresh and already-provisioned clusters.

use std::time::Duration;

use docbus::{BusError, ProvisionState, StartError};
use serde_json::json;

use crate::common::*;

#[tokio::test]
async fn provisioning_twice_converges() {
    let cluster = MemoryCluster::new();
    let first = Running::start(config_with_views(), cluster.clone()).await;
    first.save("kept", json!({"name": "zed"})).await;
    let design = cluster.design_document("users", "dev_users").unwrap();
    first.persistor.stop().await;

    let second = Running::start(config_with_views(), cluster.clone()).await;
    assert_eq!(cluster.create_calls(), 1);
    assert_eq!(cluster.update_calls(), 1);
    assert_eq!(cluster.design_document("users", "dev_users").unwrap(), design);

    let found = second.send(json!({"action": "find_by_id", "id": "kept"})).await;
    assert_eq!(found["document"]["name"], "zed");
}

#[tokio::test]
async fn open_only_start_needs_bucket() {
    let config = PersistorConfig {
        init: false,
        ..config_with_views()
    };
    let bus = EventBus::new();
    let err = Persistor::start(&config, &MemoryCluster::new(), &bus)
        .await
        .err()
        .expect("start should fail");
    match err {
        StartError::Provision(e) => assert_eq!(e.state, ProvisionState::OpeningClient),
        other => panic!("unexpected error: {}", other),
    }
    assert!(!bus.is_registered(&config.address));
}

#[tokio::test]
async fn failed_provisioning_registers_nothing() {
    let cluster = MemoryCluster::new().with_admin("admin", "secret");
    let bus = EventBus::new();
    let config = config_with_views();
    let err = Persistor::start(&config, &cluster, &bus)
        .await
        .err()
        .expect("start should fail");
    assert!(err.to_string().starts_with("provisioning failed while connecting"));
    assert!(!bus.is_registered(&config.address));
    assert!(cluster.bucket_names().is_empty());
}

#[tokio::test]
async fn admin_credentials_accepted() {
    let cluster = MemoryCluster::new().with_admin("admin", "secret");
    let config = PersistorConfig {
        username: Some("admin".into()),
        password: Some("secret".into()),
        ..config_with_views()
    };
    let run = Running::start(config, cluster).await;
    assert_eq!(run.cluster.bucket_names(), vec!["users".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn slow_bucket_warmup_is_awaited() {
    let cluster = MemoryCluster::new().with_warmup(Duration::from_secs(3));
    let run = Running::start(config_with_views(), cluster).await;
    run.save("a", json!({"name": "a"})).await;
}

#[tokio::test]
async fn address_conflict_is_reported() {
    let run = Running::with_views().await;
    let err = Persistor::start(&config_with_views(), &run.cluster, &run.bus)
        .await
        .err()
        .expect("second start on same address should fail");
    assert!(matches!(err, StartError::Bus(BusError::AddressInUse { .. })));
    // The first persistor keeps serving.
    run.save("still", json!({})).await;
}
