//! Process-local cluster
//!
//! [`MemoryCluster`] implements [`Cluster`], [`ClusterManager`] and
//! [`StoreClient`] over [`BucketData`]. It is the backend of the CLI and of
//! every test.
//!
//! The cluster is cheap to clone; clones share buckets and call counters, so
//! a test can keep a handle for inspection while the persistor owns another.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use docbus_core::{
    BucketDescriptor, Cas, CasValue, ClientTuning, Cluster, ClusterManager, CounterOp,
    Credentials, DesignDocument, Durability, Endpoint, Expiration, StoreClient, StoreError,
    StoreResult, ViewQuery, ViewResponse, MIN_BUCKET_QUOTA_MB,
};

use crate::bucket::BucketData;
use crate::index::Indexer;

/// Highest replica count a bucket accepts.
pub const MAX_REPLICAS: u32 = 3;

/// Default cluster RAM available to buckets
pub const DEFAULT_RAM_QUOTA_MB: u32 = 4096;

struct BucketSlot {
    descriptor: BucketDescriptor,
    data: Arc<BucketData>,
    ready_at: Instant,
}

// =============================================================================
// MemoryCluster
// =============================================================================

/// In-process cluster with configurable topology.
///
/// ```ignore
/// let cluster = MemoryCluster::new()
///     .with_nodes(3)
///     .with_admin("Administrator", "password")
///     .with_warmup(Duration::from_millis(200));
/// ```
#[derive(Clone)]
pub struct MemoryCluster {
    nodes: u32,
    admin: Option<Credentials>,
    ram_quota_mb: u32,
    warmup: Duration,
    latency: Option<Duration>,
    buckets: Arc<RwLock<BTreeMap<String, BucketSlot>>>,
    create_calls: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCluster {
    /// Single node, open admin, no warm-up, no latency.
    pub fn new() -> Self {
        MemoryCluster {
            nodes: 1,
            admin: None,
            ram_quota_mb: DEFAULT_RAM_QUOTA_MB,
            warmup: Duration::ZERO,
            latency: None,
            buckets: Arc::new(RwLock::new(BTreeMap::new())),
            create_calls: Arc::new(AtomicUsize::new(0)),
            update_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of data nodes (at least one).
    pub fn with_nodes(mut self, nodes: u32) -> Self {
        self.nodes = nodes.max(1);
        self
    }

    /// Require these admin credentials.
    pub fn with_admin(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.admin = Some(Credentials {
            username: Some(username.into()),
            password: Some(password.into()),
        });
        self
    }

    /// Total RAM buckets may claim.
    pub fn with_ram_quota(mut self, megabytes: u32) -> Self {
        self.ram_quota_mb = megabytes;
        self
    }

    /// How long a new bucket reports not-ready.
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Delay injected before every data operation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Pre-create a bucket that is immediately ready.
    pub fn with_bucket(self, descriptor: BucketDescriptor) -> Self {
        let data = Arc::new(BucketData::new(
            descriptor.name.clone(),
            descriptor.replicas,
            self.nodes,
        ));
        self.buckets.write().insert(
            descriptor.name.clone(),
            BucketSlot {
                descriptor,
                data,
                ready_at: Instant::now(),
            },
        );
        self
    }

    /// Node count
    pub fn nodes(&self) -> u32 {
        self.nodes
    }

    /// Bucket names
    pub fn bucket_names(&self) -> Vec<String> {
        self.buckets.read().keys().cloned().collect()
    }

    /// Current descriptor of a bucket.
    pub fn descriptor(&self, bucket: &str) -> Option<BucketDescriptor> {
        self.buckets.read().get(bucket).map(|s| s.descriptor.clone())
    }

    /// Shared data of a bucket.
    pub fn bucket(&self, bucket: &str) -> Option<Arc<BucketData>> {
        self.buckets.read().get(bucket).map(|s| Arc::clone(&s.data))
    }

    /// Design document stored in a bucket.
    pub fn design_document(&self, bucket: &str, name: &str) -> Option<DesignDocument> {
        self.bucket(bucket).and_then(|b| b.design_doc(name))
    }

    /// Register a native map function for a view of an existing bucket.
    pub fn register_indexer(
        &self,
        bucket: &str,
        design: &str,
        view: &str,
        indexer: Indexer,
    ) -> StoreResult<()> {
        let data = self.bucket(bucket).ok_or_else(|| StoreError::BucketNotFound {
            bucket: bucket.to_string(),
        })?;
        data.register_indexer(design, view, indexer);
        Ok(())
    }

    /// Number of `create_bucket` calls that succeeded
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `update_bucket` calls that succeeded
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Check a descriptor against the cluster limits and the quota already
    /// claimed in `buckets`. Callers hold the write guard across check and
    /// insert.
    fn validate(
        &self,
        buckets: &BTreeMap<String, BucketSlot>,
        bucket: &BucketDescriptor,
        replacing: Option<&str>,
    ) -> StoreResult<()> {
        if bucket.name.is_empty() {
            return Err(StoreError::InvalidBucket {
                reason: "bucket name is empty".to_string(),
            });
        }
        if bucket.memory_quota_mb < MIN_BUCKET_QUOTA_MB {
            return Err(StoreError::InvalidBucket {
                reason: format!(
                    "ram quota {}MB is below the minimum of {}MB",
                    bucket.memory_quota_mb, MIN_BUCKET_QUOTA_MB
                ),
            });
        }
        if bucket.replicas > MAX_REPLICAS {
            return Err(StoreError::InvalidBucket {
                reason: format!(
                    "replica count {} exceeds the maximum of {}",
                    bucket.replicas, MAX_REPLICAS
                ),
            });
        }
        let claimed: u64 = buckets
            .values()
            .filter(|s| Some(s.descriptor.name.as_str()) != replacing)
            .map(|s| u64::from(s.descriptor.memory_quota_mb))
            .sum();
        let available = u64::from(self.ram_quota_mb);
        if claimed + u64::from(bucket.memory_quota_mb) > available {
            return Err(StoreError::InvalidBucket {
                reason: format!(
                    "ram quota {}MB exceeds the {}MB left on the cluster",
                    bucket.memory_quota_mb,
                    available.saturating_sub(claimed)
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Cluster for MemoryCluster {
    async fn connect_admin(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> StoreResult<Box<dyn ClusterManager>> {
        if let Some(expected) = &self.admin {
            if expected != credentials {
                return Err(StoreError::Authentication {
                    reason: format!("admin credentials rejected by {}", endpoint.url()),
                });
            }
        }
        debug!(target: "docbus::storage", url = %endpoint.url(), "Admin session opened");
        Ok(Box::new(MemoryAdmin {
            cluster: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn open_bucket(
        &self,
        _endpoint: &Endpoint,
        bucket: &str,
        password: Option<&str>,
        tuning: &ClientTuning,
    ) -> StoreResult<Arc<dyn StoreClient>> {
        let buckets = self.buckets.read();
        let slot = buckets.get(bucket).ok_or_else(|| StoreError::BucketNotFound {
            bucket: bucket.to_string(),
        })?;
        if Instant::now() < slot.ready_at {
            return Err(StoreError::BucketNotReady {
                bucket: bucket.to_string(),
            });
        }
        if slot.descriptor.password.as_deref().unwrap_or("") != password.unwrap_or("") {
            return Err(StoreError::Authentication {
                reason: format!("bucket password rejected for {}", bucket),
            });
        }
        debug!(
            target: "docbus::storage",
            bucket,
            view_conns_per_node = tuning.view_conns_per_node,
            "Bucket client opened"
        );
        Ok(Arc::new(MemoryClient {
            data: Arc::clone(&slot.data),
            latency: self.latency,
            closed: AtomicBool::new(false),
        }))
    }
}

// =============================================================================
// MemoryAdmin
// =============================================================================

/// Admin session on a [`MemoryCluster`].
pub struct MemoryAdmin {
    cluster: MemoryCluster,
    closed: AtomicBool,
}

impl MemoryAdmin {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Shutdown);
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterManager for MemoryAdmin {
    async fn list_buckets(&self) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.cluster.bucket_names())
    }

    async fn create_bucket(&self, bucket: &BucketDescriptor) -> StoreResult<()> {
        self.ensure_open()?;
        let mut buckets = self.cluster.buckets.write();
        if buckets.contains_key(&bucket.name) {
            return Err(StoreError::BucketExists {
                bucket: bucket.name.clone(),
            });
        }
        self.cluster.validate(&buckets, bucket, None)?;

        let data = Arc::new(BucketData::new(
            bucket.name.clone(),
            bucket.replicas,
            self.cluster.nodes,
        ));
        buckets.insert(
            bucket.name.clone(),
            BucketSlot {
                descriptor: bucket.clone(),
                data,
                ready_at: Instant::now() + self.cluster.warmup,
            },
        );
        self.cluster.create_calls.fetch_add(1, Ordering::SeqCst);
        info!(
            target: "docbus::storage",
            bucket = %bucket.name,
            quota_mb = bucket.memory_quota_mb,
            replicas = bucket.replicas,
            "Bucket created"
        );
        Ok(())
    }

    async fn update_bucket(&self, bucket: &BucketDescriptor) -> StoreResult<()> {
        self.ensure_open()?;
        let mut buckets = self.cluster.buckets.write();
        if !buckets.contains_key(&bucket.name) {
            return Err(StoreError::BucketNotFound {
                bucket: bucket.name.clone(),
            });
        }
        self.cluster.validate(&buckets, bucket, Some(bucket.name.as_str()))?;

        let slot = buckets
            .get_mut(&bucket.name)
            .ok_or_else(|| StoreError::BucketNotFound {
                bucket: bucket.name.clone(),
            })?;
        slot.descriptor = bucket.clone();
        slot.data.set_replicas(bucket.replicas);
        self.cluster.update_calls.fetch_add(1, Ordering::SeqCst);
        info!(
            target: "docbus::storage",
            bucket = %bucket.name,
            quota_mb = bucket.memory_quota_mb,
            "Bucket updated"
        );
        Ok(())
    }

    async fn bucket_ready(&self, name: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        let buckets = self.cluster.buckets.read();
        let slot = buckets.get(name).ok_or_else(|| StoreError::BucketNotFound {
            bucket: name.to_string(),
        })?;
        Ok(Instant::now() >= slot.ready_at)
    }

    async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// =============================================================================
// MemoryClient
// =============================================================================

/// Data client on one bucket of a [`MemoryCluster`].
pub struct MemoryClient {
    data: Arc<BucketData>,
    latency: Option<Duration>,
    closed: AtomicBool,
}

impl MemoryClient {
    /// Simulate the network hop and refuse work after shutdown.
    async fn enter(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Shutdown);
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

#[async_trait]
impl StoreClient for MemoryClient {
    async fn add(
        &self,
        key: &str,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas> {
        self.enter().await?;
        self.data.add(key, expiration, value, durability)
    }

    async fn set(
        &self,
        key: &str,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas> {
        self.enter().await?;
        self.data.set(key, expiration, value, durability)
    }

    async fn replace(
        &self,
        key: &str,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas> {
        self.enter().await?;
        self.data.replace(key, expiration, value, durability)
    }

    async fn cas(
        &self,
        key: &str,
        cas: Cas,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas> {
        self.enter().await?;
        self.data.cas(key, cas, expiration, value, durability)
    }

    async fn delete(
        &self,
        key: &str,
        cas: Option<Cas>,
        durability: Durability,
    ) -> StoreResult<()> {
        self.enter().await?;
        self.data.delete(key, cas, durability)
    }

    async fn gets(&self, key: &str) -> StoreResult<Option<CasValue>> {
        self.enter().await?;
        Ok(self.data.gets(key))
    }

    async fn get_and_lock(
        &self,
        key: &str,
        lock_time: Expiration,
    ) -> StoreResult<Option<CasValue>> {
        self.enter().await?;
        self.data.get_and_lock(key, lock_time)
    }

    async fn get_and_touch(
        &self,
        key: &str,
        expiration: Expiration,
    ) -> StoreResult<Option<CasValue>> {
        self.enter().await?;
        match self.data.touch(key, expiration) {
            Ok(value) => Ok(Some(value)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_bulk(&self, keys: &[String]) -> StoreResult<HashMap<String, String>> {
        self.enter().await?;
        Ok(self.data.get_bulk(keys))
    }

    async fn counter(
        &self,
        key: &str,
        op: CounterOp,
        by: u64,
        default: u64,
        expiration: Expiration,
    ) -> StoreResult<u64> {
        self.enter().await?;
        self.data.counter(key, op, by, default, expiration)
    }

    async fn unlock(&self, key: &str, cas: Cas) -> StoreResult<()> {
        self.enter().await?;
        self.data.unlock(key, cas)
    }

    async fn touch(&self, key: &str, expiration: Expiration) -> StoreResult<()> {
        self.enter().await?;
        self.data.touch(key, expiration).map(|_| ())
    }

    async fn query_view(
        &self,
        design_document: &str,
        view: &str,
        query: &ViewQuery,
    ) -> StoreResult<ViewResponse> {
        self.enter().await?;
        self.data.query_view(design_document, view, query)
    }

    async fn create_design_doc(&self, document: &DesignDocument) -> StoreResult<()> {
        self.enter().await?;
        self.data.put_design_doc(document)
    }

    async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        debug!(target: "docbus::storage", bucket = %self.data.name(), "Bucket client closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new("localhost", 8091)
    }

    #[tokio::test]
    async fn test_admin_credentials_checked() {
        let cluster = MemoryCluster::new().with_admin("admin", "secret");
        let wrong = Credentials {
            username: Some("admin".into()),
            password: Some("nope".into()),
        };
        assert!(matches!(
            cluster.connect_admin(&endpoint(), &wrong).await,
            Err(StoreError::Authentication { .. })
        ));
        let right = Credentials {
            username: Some("admin".into()),
            password: Some("secret".into()),
        };
        assert!(cluster.connect_admin(&endpoint(), &right).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_validates_and_counts() {
        let cluster = MemoryCluster::new().with_ram_quota(1000);
        let admin = cluster
            .connect_admin(&endpoint(), &Credentials::default())
            .await
            .unwrap();

        let tiny = BucketDescriptor::new("tiny", 50, None);
        assert!(matches!(
            admin.create_bucket(&tiny).await,
            Err(StoreError::InvalidBucket { .. })
        ));

        let b = BucketDescriptor::new("b", 600, None);
        admin.create_bucket(&b).await.unwrap();
        assert!(matches!(
            admin.create_bucket(&b).await,
            Err(StoreError::BucketExists { .. })
        ));

        let too_big = BucketDescriptor::new("c", 600, None);
        assert!(matches!(
            admin.create_bucket(&too_big).await,
            Err(StoreError::InvalidBucket { .. })
        ));

        // updating in place may reuse its own quota
        admin.update_bucket(&b).await.unwrap();
        assert_eq!(cluster.create_calls(), 1);
        assert_eq!(cluster.update_calls(), 1);
        assert_eq!(admin.list_buckets().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_huge_quota_rejected_without_overflow() {
        let cluster = MemoryCluster::new().with_bucket(BucketDescriptor::new("other", 512, None));
        let admin = cluster
            .connect_admin(&endpoint(), &Credentials::default())
            .await
            .unwrap();

        let huge = BucketDescriptor::new("huge", u32::MAX, None);
        match admin.create_bucket(&huge).await {
            Err(StoreError::InvalidBucket { reason }) => {
                assert!(reason.starts_with(&format!("ram quota {}MB exceeds", u32::MAX)));
            }
            other => panic!("Expected InvalidBucket, got {:?}", other),
        }
        let other = BucketDescriptor::new("other", u32::MAX, None);
        assert!(matches!(
            admin.update_bucket(&other).await,
            Err(StoreError::InvalidBucket { .. })
        ));
        assert_eq!(cluster.bucket_names(), vec!["other".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_share_quota() {
        let cluster = MemoryCluster::new().with_ram_quota(1000);
        let mut handles = Vec::new();
        for i in 0..8 {
            let cluster = cluster.clone();
            handles.push(tokio::spawn(async move {
                let admin = cluster
                    .connect_admin(&endpoint(), &Credentials::default())
                    .await
                    .unwrap();
                admin
                    .create_bucket(&BucketDescriptor::new(format!("b{}", i), 600, None))
                    .await
            }));
        }
        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => created += 1,
                Err(StoreError::InvalidBucket { .. }) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(cluster.create_calls(), 1);
        assert_eq!(cluster.bucket_names().len(), 1);
    }

    #[tokio::test]
    async fn test_update_requires_existing_bucket() {
        let cluster = MemoryCluster::new();
        let admin = cluster
            .connect_admin(&endpoint(), &Credentials::default())
            .await
            .unwrap();
        let b = BucketDescriptor::new("b", 200, None);
        assert!(matches!(
            admin.update_bucket(&b).await,
            Err(StoreError::BucketNotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_warmup_gates_open() {
        let cluster = MemoryCluster::new().with_warmup(Duration::from_secs(2));
        let admin = cluster
            .connect_admin(&endpoint(), &Credentials::default())
            .await
            .unwrap();
        admin
            .create_bucket(&BucketDescriptor::new("b", 200, None))
            .await
            .unwrap();

        assert!(!admin.bucket_ready("b").await.unwrap());
        assert!(matches!(
            cluster
                .open_bucket(&endpoint(), "b", None, &ClientTuning::default())
                .await,
            Err(StoreError::BucketNotReady { .. })
        ));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(admin.bucket_ready("b").await.unwrap());
        assert!(cluster
            .open_bucket(&endpoint(), "b", None, &ClientTuning::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_bucket_password_and_shutdown() {
        let cluster =
            MemoryCluster::new().with_bucket(BucketDescriptor::new("b", 200, Some("pw".into())));
        assert!(matches!(
            cluster
                .open_bucket(&endpoint(), "b", None, &ClientTuning::default())
                .await,
            Err(StoreError::Authentication { .. })
        ));

        let client = cluster
            .open_bucket(&endpoint(), "b", Some("pw"), &ClientTuning::default())
            .await
            .unwrap();
        client
            .set("k", Expiration::NEVER, "1".into(), Durability::NONE)
            .await
            .unwrap();
        client.shutdown().await;
        assert_eq!(client.gets("k").await, Err(StoreError::Shutdown));
    }

    #[tokio::test]
    async fn test_get_and_touch_absent_is_none() {
        let cluster = MemoryCluster::new().with_bucket(BucketDescriptor::new("b", 200, None));
        let client = cluster
            .open_bucket(&endpoint(), "b", None, &ClientTuning::default())
            .await
            .unwrap();
        assert_eq!(client.get_and_touch("nope", Expiration(5)).await, Ok(None));
    }
}
