//! In-process storage backend for docbus
//!
//! This crate implements the store capability traits of `docbus-core` with:
//! - MemoryCluster: admin API, bucket quota and replica validation, warm-up
//! - MemoryClient: CAS writes, locks, expiry, counters, bulk reads
//! - BucketData: DashMap-sharded entries with per-key atomic updates
//! - View evaluation over `emit(doc.path, ...)` map rules or native indexers
//!
//! # Durability
//!
//! Nothing is persisted. Durability requirements are checked against the
//! configured topology so that an unattainable requirement fails exactly as
//! it would on a real cluster.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bucket;
pub mod index;
pub mod memory;
pub mod stored_value;

pub use bucket::BucketData;
pub use index::{evaluate, Indexer, MapRule, Reducer, UnsupportedPath};
pub use memory::{MemoryAdmin, MemoryClient, MemoryCluster, DEFAULT_RAM_QUOTA_MB, MAX_REPLICAS};
pub use stored_value::{StoredValue, DEFAULT_LOCK_SECS, LOCKED_CAS, MAX_LOCK_SECS};
