//! In-process message bus.
//!
//! Addresses map to consumer tasks. Each registered address gets a bounded
//! channel; the consumer spawns one task per message and answers through the
//! message's oneshot reply channel, so a slow request never blocks the next.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Pending messages per address before `send` waits.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Consumer of request messages.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Produce the reply for one message.
    async fn handle(&self, message: Value) -> Value;
}

/// Bus delivery failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// Nothing is registered on the address
    #[error("no handler registered on address: {address}")]
    NoHandler {
        /// Target address
        address: String,
    },

    /// The handler went away before replying
    #[error("handler on address {address} closed before replying")]
    Closed {
        /// Target address
        address: String,
    },

    /// Another handler already owns the address
    #[error("address already in use: {address}")]
    AddressInUse {
        /// Target address
        address: String,
    },
}

struct Envelope {
    body: Value,
    reply: oneshot::Sender<Value>,
}

/// Address registry shared by senders and consumers.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct EventBus {
    routes: Arc<RwLock<HashMap<String, mpsc::Sender<Envelope>>>>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Bus with the default queue capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Bus with `capacity` pending messages per address.
    pub fn with_capacity(capacity: usize) -> Self {
        EventBus {
            routes: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Start consuming `address` with `handler`. Must run inside a tokio runtime.
    pub fn register(&self, address: &str, handler: Arc<dyn MessageHandler>) -> Result<(), BusError> {
        let mut routes = self.routes.write();
        if routes.contains_key(address) {
            return Err(BusError::AddressInUse {
                address: address.to_string(),
            });
        }
        let (tx, mut rx) = mpsc::channel::<Envelope>(self.capacity);
        routes.insert(address.to_string(), tx);

        let name = address.to_string();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let reply = handler.handle(envelope.body).await;
                    // requester may have given up
                    let _ = envelope.reply.send(reply);
                });
            }
            debug!(target: "docbus::bus", address = %name, "Consumer stopped");
        });
        debug!(target: "docbus::bus", address, "Handler registered");
        Ok(())
    }

    /// Stop routing to `address`. Returns false when nothing was registered.
    pub fn unregister(&self, address: &str) -> bool {
        let removed = self.routes.write().remove(address).is_some();
        if removed {
            debug!(target: "docbus::bus", address, "Handler unregistered");
        }
        removed
    }

    /// Whether a handler is registered on `address`.
    pub fn is_registered(&self, address: &str) -> bool {
        self.routes.read().contains_key(address)
    }

    /// Deliver `message` and wait for the reply.
    pub async fn send(&self, address: &str, message: Value) -> Result<Value, BusError> {
        let tx = self
            .routes
            .read()
            .get(address)
            .cloned()
            .ok_or_else(|| BusError::NoHandler {
                address: address.to_string(),
            })?;
        let closed = || BusError::Closed {
            address: address.to_string(),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Envelope {
            body: message,
            reply: reply_tx,
        })
        .await
        .map_err(|_| closed())?;
        reply_rx.await.map_err(|_| {
            warn!(target: "docbus::bus", address, "Reply channel dropped");
            closed()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl MessageHandler for Echo {
        async fn handle(&self, message: Value) -> Value {
            json!({"echo": message})
        }
    }

    struct Panics;

    #[async_trait]
    impl MessageHandler for Panics {
        async fn handle(&self, _message: Value) -> Value {
            panic!("boom")
        }
    }

    #[tokio::test]
    async fn test_round_trip_and_unregister() {
        let bus = EventBus::new();
        bus.register("echo", Arc::new(Echo)).unwrap();
        assert_eq!(
            bus.send("echo", json!(1)).await.unwrap(),
            json!({"echo": 1})
        );
        assert!(matches!(
            bus.register("echo", Arc::new(Echo)),
            Err(BusError::AddressInUse { .. })
        ));

        assert!(bus.unregister("echo"));
        assert!(!bus.is_registered("echo"));
        assert!(matches!(
            bus.send("echo", json!(1)).await,
            Err(BusError::NoHandler { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_reply_is_closed() {
        let bus = EventBus::new();
        bus.register("bad", Arc::new(Panics)).unwrap();
        assert!(matches!(
            bus.send("bad", json!({})).await,
            Err(BusError::Closed { .. })
        ));
        // consumer survives the failed message
        assert!(matches!(
            bus.send("bad", json!({})).await,
            Err(BusError::Closed { .. })
        ));
    }
}
