//! Store client adapter
//!
//! Wraps a [`StoreClient`] and bounds every call by the timeout of its
//! category. An elapsed timeout is reported as [`StoreError::Timeout`] and
//! handled like any other failed operation.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use docbus_core::{
    Cas, CasValue, ClientTuning, CounterOp, DesignDocument, Durability, Expiration, StoreClient,
    StoreError, StoreResult, ViewQuery, ViewResponse,
};

/// Per-category deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Basic key-value operations
    pub operation: Duration,
    /// View queries and design document pushes
    pub view: Duration,
    /// Extra time granted to durable writes and lock reads
    pub observer: Duration,
}

impl Timeouts {
    /// Deadline for a write at `durability`.
    pub fn write(&self, durability: Durability) -> Duration {
        if durability.requires_observe() {
            self.operation + self.observer
        } else {
            self.operation
        }
    }

    /// Deadline for `get_and_lock`.
    pub fn lock(&self) -> Duration {
        self.operation + self.observer
    }
}

impl From<&ClientTuning> for Timeouts {
    fn from(tuning: &ClientTuning) -> Self {
        Timeouts {
            operation: tuning.operation_timeout,
            view: tuning.view_timeout,
            observer: tuning.observer_timeout,
        }
    }
}

async fn bounded<T>(
    operation: &str,
    limit: Duration,
    fut: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::timeout(
            operation,
            u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}

/// Typed, timeout-bounded access to one bucket.
///
/// Created once per process and shared through `Arc`. Holds no mutable state.
pub struct StoreAdapter {
    client: Arc<dyn StoreClient>,
    timeouts: Timeouts,
}

impl fmt::Debug for StoreAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreAdapter")
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl StoreAdapter {
    /// Wrap an open client.
    pub fn new(client: Arc<dyn StoreClient>, timeouts: Timeouts) -> Self {
        StoreAdapter { client, timeouts }
    }

    /// Configured deadlines
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store if absent.
    pub async fn add(
        &self,
        key: &str,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas> {
        bounded(
            "add",
            self.timeouts.write(durability),
            self.client.add(key, expiration, value, durability),
        )
        .await
    }

    /// Store unconditionally.
    pub async fn set(
        &self,
        key: &str,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas> {
        bounded(
            "set",
            self.timeouts.write(durability),
            self.client.set(key, expiration, value, durability),
        )
        .await
    }

    /// Store if present.
    pub async fn replace(
        &self,
        key: &str,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas> {
        bounded(
            "replace",
            self.timeouts.write(durability),
            self.client.replace(key, expiration, value, durability),
        )
        .await
    }

    /// Store if the token still matches.
    pub async fn cas(
        &self,
        key: &str,
        cas: Cas,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas> {
        bounded(
            "cas",
            self.timeouts.write(durability),
            self.client.cas(key, cas, expiration, value, durability),
        )
        .await
    }

    /// Remove a key.
    pub async fn delete(
        &self,
        key: &str,
        cas: Option<Cas>,
        durability: Durability,
    ) -> StoreResult<()> {
        bounded(
            "delete",
            self.timeouts.write(durability),
            self.client.delete(key, cas, durability),
        )
        .await
    }

    /// Increment or decrement a counter.
    pub async fn counter(
        &self,
        key: &str,
        op: CounterOp,
        by: u64,
        default: u64,
        expiration: Expiration,
    ) -> StoreResult<u64> {
        bounded(
            "counter",
            self.timeouts.operation,
            self.client.counter(key, op, by, default, expiration),
        )
        .await
    }

    /// Release a lock.
    pub async fn unlock(&self, key: &str, cas: Cas) -> StoreResult<()> {
        bounded("unlock", self.timeouts.operation, self.client.unlock(key, cas)).await
    }

    /// Reset expiry.
    pub async fn touch(&self, key: &str, expiration: Expiration) -> StoreResult<()> {
        bounded(
            "touch",
            self.timeouts.operation,
            self.client.touch(key, expiration),
        )
        .await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Versioned read.
    pub async fn gets(&self, key: &str) -> StoreResult<Option<CasValue>> {
        bounded("gets", self.timeouts.operation, self.client.gets(key)).await
    }

    /// Read and lock.
    pub async fn get_and_lock(
        &self,
        key: &str,
        lock_time: Expiration,
    ) -> StoreResult<Option<CasValue>> {
        bounded(
            "get_and_lock",
            self.timeouts.lock(),
            self.client.get_and_lock(key, lock_time),
        )
        .await
    }

    /// Read and reset expiry.
    pub async fn get_and_touch(
        &self,
        key: &str,
        expiration: Expiration,
    ) -> StoreResult<Option<CasValue>> {
        bounded(
            "get_and_touch",
            self.timeouts.operation,
            self.client.get_and_touch(key, expiration),
        )
        .await
    }

    /// Multi-get.
    pub async fn get_bulk(&self, keys: &[String]) -> StoreResult<HashMap<String, String>> {
        bounded("get_bulk", self.timeouts.operation, self.client.get_bulk(keys)).await
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Query a view.
    pub async fn query_view(
        &self,
        design_document: &str,
        view: &str,
        query: &ViewQuery,
    ) -> StoreResult<ViewResponse> {
        bounded(
            "view query",
            self.timeouts.view,
            self.client.query_view(design_document, view, query),
        )
        .await
    }

    /// Create or replace a design document.
    pub async fn create_design_doc(&self, document: &DesignDocument) -> StoreResult<()> {
        bounded(
            "design document push",
            self.timeouts.view,
            self.client.create_design_doc(document),
        )
        .await
    }

    /// Close the underlying client.
    pub async fn shutdown(&self) {
        self.client.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbus_core::{BucketDescriptor, Cluster, Endpoint, PersistTo, ReplicateTo};
    use docbus_storage::MemoryCluster;

    async fn adapter(latency: Duration, timeouts: Timeouts) -> StoreAdapter {
        let cluster = MemoryCluster::new()
            .with_latency(latency)
            .with_bucket(BucketDescriptor::new("b", 200, None));
        let client = cluster
            .open_bucket(
                &Endpoint::new("localhost", 8091),
                "b",
                None,
                &ClientTuning::default(),
            )
            .await
            .unwrap();
        StoreAdapter::new(client, timeouts)
    }

    fn timeouts(operation: u64, view: u64, observer: u64) -> Timeouts {
        Timeouts {
            operation: Duration::from_millis(operation),
            view: Duration::from_millis(view),
            observer: Duration::from_millis(observer),
        }
    }

    #[test]
    fn durable_writes_get_observer_time() {
        let t = timeouts(100, 1000, 50);
        assert_eq!(t.write(Durability::NONE), Duration::from_millis(100));
        let durable = Durability::new(PersistTo::Master, ReplicateTo::Zero);
        assert_eq!(t.write(durable), Duration::from_millis(150));
        assert_eq!(t.lock(), Duration::from_millis(150));
    }

    #[tokio::test]
    async fn debug_shows_timeouts_only() {
        let a = adapter(Duration::ZERO, timeouts(100, 1000, 50)).await;
        let shown = format!("{:?}", a);
        assert!(shown.starts_with("StoreAdapter { timeouts: Timeouts { operation: 100ms"));
        assert!(shown.ends_with(".. }"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_operation_times_out() {
        let a = adapter(Duration::from_millis(500), timeouts(100, 1000, 50)).await;
        let err = a.gets("k").await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Timeout {
                operation: "gets".into(),
                millis: 100
            }
        );
        assert_eq!(err.to_string(), "gets timed out after 100ms");

        // views have their own, longer budget
        let err = a
            .query_view("d", "v", &ViewQuery::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ViewNotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn durable_write_uses_extended_deadline() {
        let a = adapter(Duration::from_millis(120), timeouts(100, 1000, 50)).await;
        let plain = a
            .set("k", Expiration::NEVER, "1".into(), Durability::NONE)
            .await;
        assert!(matches!(plain, Err(StoreError::Timeout { .. })));

        let durable = Durability::new(PersistTo::Master, ReplicateTo::Zero);
        assert!(a
            .set("k", Expiration::NEVER, "1".into(), durable)
            .await
            .is_ok());
    }
}
