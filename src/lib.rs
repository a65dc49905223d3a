//! docbus - a message-bus persistor for a document store with views
//!
//! A persistor listens on one bus address and turns JSON request messages
//! into document-store operations: inserts and conditional writes, lookups
//! by id, view queries and counters. On start it can provision the bucket
//! and publish the configured views.
//!
//! # Quick Start
//!
//! ```ignore
//! use docbus::{EventBus, MemoryCluster, Persistor, PersistorConfig};
//! use serde_json::json;
//!
//! let config = PersistorConfig { init: true, ..PersistorConfig::default() };
//! let bus = EventBus::new();
//! let persistor = Persistor::start(&config, &MemoryCluster::new(), &bus).await?;
//!
//! let reply = bus
//!     .send(persistor.address(), json!({"action": "insert", "document": {"name": "ada"}}))
//!     .await?;
//! assert_eq!(reply["status"], "ok");
//! ```
//!
//! # Architecture
//!
//! | Layer | Crate | Role |
//! |-------|-------|------|
//! | request | `docbus-executor` | decode, dispatch, reply, bus |
//! | start-up | `docbus-engine` | config, provisioning, timeout-bounded adapter |
//! | store | `docbus-storage` | in-process cluster with views |
//! | contracts | `docbus-core` | store traits, value types, view queries |

pub use docbus_executor::*;

pub use docbus_engine::{
    open_client, provision, ConfigError, PersistorConfig, ProvisionError, ProvisionState,
    StoreAdapter, Timeouts, ViewConfig, CONFIG_FILE_NAME, DEFAULT_ADDRESS,
};
pub use docbus_storage::MemoryCluster;

/// Store contracts, for plugging in another cluster implementation.
pub mod store {
    pub use docbus_core::*;
}
