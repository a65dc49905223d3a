//! Persistor module: provisioning, dispatcher and bus registration.
//!
//! Registration strictly follows successful setup. If provisioning fails
//! nothing is registered and the error is returned to the caller.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use docbus_core::Cluster;
use docbus_engine::{open_client, provision, PersistorConfig, ProvisionError, StoreAdapter};

use crate::bus::{BusError, EventBus, MessageHandler};
use crate::dispatcher::Dispatcher;

/// Start-up failures.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// Bucket, views or client could not be set up
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// Address could not be registered
    #[error(transparent)]
    Bus(#[from] BusError),
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle(&self, message: Value) -> Value {
        self.dispatch(message).await.to_json()
    }
}

/// A running persistor registered on the bus.
pub struct Persistor {
    address: String,
    bus: EventBus,
    store: Arc<StoreAdapter>,
    dispatcher: Dispatcher,
}

impl Persistor {
    /// Provision (when `init`) or open the bucket, then register on
    /// `config.address`.
    pub async fn start(
        config: &PersistorConfig,
        cluster: &dyn Cluster,
        bus: &EventBus,
    ) -> Result<Self, StartError> {
        let adapter = if config.init {
            provision(cluster, config).await?
        } else {
            open_client(cluster, config).await?
        };
        let store = Arc::new(adapter);
        let dispatcher = Dispatcher::new(Arc::clone(&store), config.actions);

        if let Err(e) = bus.register(&config.address, Arc::new(dispatcher.clone())) {
            store.shutdown().await;
            return Err(e.into());
        }
        info!(
            target: "docbus::bus",
            address = %config.address,
            bucket = %config.bucket_name,
            actions = ?config.actions,
            "Persistor started"
        );
        Ok(Persistor {
            address: config.address.clone(),
            bus: bus.clone(),
            store,
            dispatcher,
        })
    }

    /// Bus address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Dispatcher serving the address, for direct in-process calls.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Unregister and close the store client.
    pub async fn stop(self) {
        self.bus.unregister(&self.address);
        self.store.shutdown().await;
        info!(target: "docbus::bus", address = %self.address, "Persistor stopped");
    }
}
