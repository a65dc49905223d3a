//! Stop and restart on the same bus.

use docbus::BusError;
use serde_json::json;

use crate::common::*;

#[tokio::test]
async fn stop_unregisters_address() {
    let run = Running::with_views().await;
    let address = run.persistor.address().to_string();
    let bus = run.bus.clone();
    run.persistor.stop().await;

    assert!(!bus.is_registered(&address));
    let err = bus
        .send(&address, json!({"action": "find_by_id", "id": "a"}))
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::NoHandler { .. }));
}

#[tokio::test]
async fn restart_after_stop_reuses_address() {
    let cluster = MemoryCluster::new();
    let bus = EventBus::new();
    let config = config_with_views();

    let first = Persistor::start(&config, &cluster, &bus).await.unwrap();
    first.stop().await;
    let second = Persistor::start(&config, &cluster, &bus).await.unwrap();
    let reply = bus
        .send(second.address(), json!({"action": "insert", "document": {}}))
        .await
        .unwrap();
    assert_eq!(reply["status"], "ok");
}

#[tokio::test]
async fn dispatcher_available_in_process() {
    let run = Running::with_views().await;
    let reply = run
        .persistor
        .dispatcher()
        .dispatch(json!({"action": "save", "document": {"id": "direct"}}))
        .await;
    assert!(reply.is_ok());
    let found = run.send(json!({"action": "find_by_id", "id": "direct"})).await;
    assert_eq!(found["status"], "ok");
}
