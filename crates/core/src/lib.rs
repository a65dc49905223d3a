//! Core types and traits for docbus
//!
//! This crate defines the foundational types shared by every layer:
//! - Cas / CasValue: optimistic-concurrency tokens and versioned reads
//! - Durability: persist/replicate acknowledgment requirements
//! - Expiration: memcached-style relative/absolute expiry
//! - View definitions, design documents and the design registry
//! - ViewQuery: typed view-query builder with an explicit parameter table
//! - StoreError: the store's failure taxonomy
//! - Traits: the store capability seams (StoreClient, ClusterManager, Cluster)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cluster;
pub mod error;
pub mod query;
pub mod traits;
pub mod types;
pub mod view;

pub use cluster::{
    AuthType, BucketDescriptor, BucketType, ClientTuning, Credentials, Endpoint,
    DEFAULT_PROXY_PORT, MIN_BUCKET_QUOTA_MB,
};
pub use error::{StoreError, StoreResult};
pub use query::{collate, OnError, Stale, ViewQuery, ViewResponse, ViewRow};
pub use traits::{Cluster, ClusterManager, StoreClient};
pub use types::{Cas, CasValue, CounterOp, Durability, Expiration, PersistTo, ReplicateTo};
pub use view::{DesignDocument, DesignRegistry, ViewDefinition, ViewDesign, ViewMode, DEV_PREFIX};
