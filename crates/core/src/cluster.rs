//! Cluster addressing, credentials and bucket descriptors

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Proxy port used when updating a SASL bucket.
pub const DEFAULT_PROXY_PORT: u16 = 11212;

/// Smallest RAM quota a bucket may be created with.
pub const MIN_BUCKET_QUOTA_MB: u32 = 100;

/// Cluster admin endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address
    pub host: String,
    /// Admin port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }

    /// Bootstrap URL for the pools API.
    pub fn url(&self) -> String {
        format!("http://{}:{}/pools", self.host, self.port)
    }
}

/// Admin credentials. Either half may be absent for an open cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Admin user
    pub username: Option<String>,
    /// Admin password
    pub password: Option<String>,
}

/// Bucket storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketType {
    /// Persistent, replicated bucket with views
    Couchbase,
    /// Cache-only bucket
    Memcached,
}

/// Bucket authentication scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// No authentication
    None,
    /// SASL password authentication
    Sasl,
}

/// Server-side bucket parameters the provisioning step ensures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDescriptor {
    /// Bucket name
    pub name: String,
    /// Storage engine
    pub bucket_type: BucketType,
    /// RAM quota in megabytes
    pub memory_quota_mb: u32,
    /// Replica count
    pub replicas: u32,
    /// Authentication scheme
    pub auth: AuthType,
    /// Proxy port (used by updates)
    pub proxy_port: u16,
    /// SASL password
    pub password: Option<String>,
    /// Whether the bucket may be flushed
    pub flush_enabled: bool,
}

impl BucketDescriptor {
    /// Descriptor with the fixed provisioning parameters: couchbase type,
    /// one replica, SASL auth on the default proxy port, flush enabled.
    pub fn new(name: impl Into<String>, memory_quota_mb: u32, password: Option<String>) -> Self {
        BucketDescriptor {
            name: name.into(),
            bucket_type: BucketType::Couchbase,
            memory_quota_mb,
            replicas: 1,
            auth: AuthType::Sasl,
            proxy_port: DEFAULT_PROXY_PORT,
            password,
            flush_enabled: true,
        }
    }
}

/// Connection tuning handed to the store client when a bucket is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTuning {
    /// Basic operation timeout
    pub operation_timeout: Duration,
    /// View query timeout
    pub view_timeout: Duration,
    /// Durability observe timeout
    pub observer_timeout: Duration,
    /// Concurrent view connections per node
    pub view_conns_per_node: u32,
    /// View worker threads
    pub view_worker_size: usize,
}

impl Default for ClientTuning {
    fn default() -> Self {
        ClientTuning {
            operation_timeout: Duration::from_millis(5000),
            view_timeout: Duration::from_millis(75000),
            observer_timeout: Duration::from_millis(5000),
            view_conns_per_node: 10,
            view_worker_size: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        let ep = Endpoint::new("db1", 8091);
        assert_eq!(ep.url(), "http://db1:8091/pools");
    }

    #[test]
    fn test_descriptor_fixed_parameters() {
        let b = BucketDescriptor::new("default", 512, Some("secret".into()));
        assert_eq!(b.replicas, 1);
        assert_eq!(b.auth, AuthType::Sasl);
        assert_eq!(b.proxy_port, DEFAULT_PROXY_PORT);
        assert!(b.flush_enabled);
    }
}
