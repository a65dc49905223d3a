//! Persistor engine for docbus
//!
//! This crate sits between the request layer and a store:
//! - Configuration: `docbus.toml` / JSON module config
//! - StoreAdapter: timeout-bounded access to one bucket
//! - Provisioning: bucket create-or-update, readiness poll, view publishing
//!
//! The engine is the only component that talks to the cluster admin API.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod config;
pub mod provision;

pub use adapter::{StoreAdapter, Timeouts};
pub use config::{
    ActionSet, ConfigError, ConfigResult, PersistorConfig, ViewConfig, CONFIG_FILE_NAME,
    DEFAULT_ADDRESS,
};
pub use provision::{open_client, provision, ProvisionError, ProvisionResult, ProvisionState};
