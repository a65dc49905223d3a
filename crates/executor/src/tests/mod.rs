//! Scenario tests for the executor crate.
//!
//! Every test runs against a fresh in-process cluster.

pub mod lookups;

use std::sync::Arc;

use serde_json::Value;

use docbus_core::BucketDescriptor;
use docbus_engine::{open_client, ActionSet, PersistorConfig};
use docbus_storage::MemoryCluster;

use crate::Dispatcher;

/// Cluster with the default bucket, and a dispatcher on it.
pub(crate) async fn setup_with(cluster: MemoryCluster, actions: ActionSet) -> (MemoryCluster, Dispatcher) {
    let cluster = cluster.with_bucket(BucketDescriptor::new("default", 512, None));
    let adapter = open_client(&cluster, &PersistorConfig::default())
        .await
        .unwrap();
    (cluster, Dispatcher::new(Arc::new(adapter), actions))
}

pub(crate) async fn setup() -> (MemoryCluster, Dispatcher) {
    setup_with(MemoryCluster::new(), ActionSet::Extended).await
}

/// Dispatch and return the wire reply.
pub(crate) async fn call(d: &Dispatcher, request: Value) -> Value {
    d.dispatch(request).await.to_json()
}

pub(crate) fn assert_ok(reply: &Value) {
    assert_eq!(reply["status"], "ok", "unexpected reply: {}", reply);
}

pub(crate) fn assert_error(reply: &Value, message: &str) {
    assert_eq!(reply["status"], "error", "unexpected reply: {}", reply);
    assert_eq!(reply["message"], message);
}
