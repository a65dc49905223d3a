//! Store capability traits
//!
//! These traits are the seam between the persistor and a concrete store.
//! Upper layers depend only on them; the in-process memory cluster and any
//! remote client implement them.
//!
//! Thread safety: every method may be called concurrently from many tasks
//! (requires Send + Sync). Implementations multiplex their own connections.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cluster::{BucketDescriptor, ClientTuning, Credentials, Endpoint};
use crate::error::StoreResult;
use crate::query::{ViewQuery, ViewResponse};
use crate::types::{Cas, CasValue, CounterOp, Durability, Expiration};
use crate::view::DesignDocument;

/// Data operations against one bucket.
///
/// Every write blocks until its [`Durability`] requirement is satisfied or
/// fails. Writes return the CAS token of the new value.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Store only if the key is absent.
    async fn add(
        &self,
        key: &str,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas>;

    /// Store unconditionally.
    async fn set(
        &self,
        key: &str,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas>;

    /// Store only if the key is present.
    async fn replace(
        &self,
        key: &str,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas>;

    /// Store only if the current CAS equals `cas`.
    async fn cas(
        &self,
        key: &str,
        cas: Cas,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas>;

    /// Remove a key, optionally only at a given CAS.
    async fn delete(&self, key: &str, cas: Option<Cas>, durability: Durability)
        -> StoreResult<()>;

    /// Versioned read.
    async fn gets(&self, key: &str) -> StoreResult<Option<CasValue>>;

    /// Read and take a pessimistic lock for `lock_time` seconds. The returned
    /// CAS is the lock token.
    async fn get_and_lock(&self, key: &str, lock_time: Expiration)
        -> StoreResult<Option<CasValue>>;

    /// Read and reset the expiry in one step.
    async fn get_and_touch(&self, key: &str, expiration: Expiration)
        -> StoreResult<Option<CasValue>>;

    /// Multi-get. Only hits appear in the result.
    async fn get_bulk(&self, keys: &[String]) -> StoreResult<HashMap<String, String>>;

    /// Increment or decrement a decimal counter, seeding it with `default`
    /// when absent. Returns the resulting value.
    async fn counter(
        &self,
        key: &str,
        op: CounterOp,
        by: u64,
        default: u64,
        expiration: Expiration,
    ) -> StoreResult<u64>;

    /// Release a lock taken by [`StoreClient::get_and_lock`].
    async fn unlock(&self, key: &str, cas: Cas) -> StoreResult<()>;

    /// Reset the expiry without touching the value.
    async fn touch(&self, key: &str, expiration: Expiration) -> StoreResult<()>;

    /// Run a view query.
    async fn query_view(
        &self,
        design_document: &str,
        view: &str,
        query: &ViewQuery,
    ) -> StoreResult<ViewResponse>;

    /// Create or replace a design document.
    async fn create_design_doc(&self, document: &DesignDocument) -> StoreResult<()>;

    /// Close connections. Later operations fail with `Shutdown`.
    async fn shutdown(&self);
}

/// Cluster administration used during provisioning.
#[async_trait]
pub trait ClusterManager: Send + Sync {
    /// Names of all buckets.
    async fn list_buckets(&self) -> StoreResult<Vec<String>>;

    /// Create a bucket.
    async fn create_bucket(&self, bucket: &BucketDescriptor) -> StoreResult<()>;

    /// Update an existing bucket in place.
    async fn update_bucket(&self, bucket: &BucketDescriptor) -> StoreResult<()>;

    /// Whether a bucket has finished warming up and accepts clients.
    async fn bucket_ready(&self, name: &str) -> StoreResult<bool>;

    /// Close the admin connection.
    async fn shutdown(&self);
}

/// Entry point to a cluster: admin sessions and bucket clients.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Open an admin session.
    async fn connect_admin(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> StoreResult<Box<dyn ClusterManager>>;

    /// Open a data client on a bucket.
    async fn open_bucket(
        &self,
        endpoint: &Endpoint,
        bucket: &str,
        password: Option<&str>,
        tuning: &ClientTuning,
    ) -> StoreResult<Arc<dyn StoreClient>>;
}
