//! Shared helpers for the persistor suite.

#![allow(dead_code)]

use serde_json::{json, Value};

pub use docbus::{EventBus, MemoryCluster, Persistor, PersistorConfig, ViewConfig};

/// Config that provisions a `users` bucket with two development views.
pub fn config_with_views() -> PersistorConfig {
    PersistorConfig {
        init: true,
        address: "test.persistor".into(),
        bucket_name: "users".into(),
        views: vec![
            ViewConfig {
                name: Some("by_name".into()),
                design_doc: Some("users".into()),
                function: Some("function (doc) { emit(doc.name, null); }".into()),
                ..ViewConfig::default()
            },
            ViewConfig {
                name: Some("by_age".into()),
                design_doc: Some("users".into()),
                function: Some("function (doc) { emit(doc.age, doc.name); }".into()),
                ..ViewConfig::default()
            },
        ],
        ..PersistorConfig::default()
    }
}

/// Started persistor plus the bus it listens on.
pub struct Running {
    pub bus: EventBus,
    pub cluster: MemoryCluster,
    pub persistor: Persistor,
}

impl Running {
    pub async fn start(config: PersistorConfig, cluster: MemoryCluster) -> Self {
        let bus = EventBus::new();
        let persistor = Persistor::start(&config, &cluster, &bus)
            .await
            .expect("persistor should start");
        Running {
            bus,
            cluster,
            persistor,
        }
    }

    pub async fn with_views() -> Self {
        Self::start(config_with_views(), MemoryCluster::new()).await
    }

    /// Request/reply over the bus.
    pub async fn send(&self, request: Value) -> Value {
        self.bus
            .send(self.persistor.address(), request)
            .await
            .expect("bus delivery")
    }

    pub async fn save(&self, id: &str, body: Value) -> Value {
        let mut document = body;
        document["id"] = json!(id);
        let reply = self
            .send(json!({"action": "save", "document": document}))
            .await;
        assert_eq!(reply["status"], "ok", "save failed: {}", reply);
        reply
    }
}
