//! Bucket data: entries, design documents and view indexers
//!
//! # Design
//!
//! - DashMap: sharded map, per-key entry locking
//! - Every mutation runs inside one `entry()` guard, so the CAS check and the
//!   write are atomic for that key; two writers with the same token cannot
//!   both win
//! - CAS tokens come from one per-bucket AtomicU64 and never repeat
//! - Expired entries are treated as absent and replaced lazily

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use docbus_core::{
    Cas, CasValue, CounterOp, DesignDocument, Durability, Expiration, StoreError, StoreResult,
    ViewQuery, ViewResponse, ViewRow,
};

use crate::index::{evaluate, Indexer, MapRule, Reducer};
use crate::stored_value::StoredValue;

/// Outcome of a mutation closure
enum Write {
    Store(StoredValue),
    Remove,
    Keep,
}

/// Contents of one bucket, shared by every client opened on it
pub struct BucketData {
    name: String,
    entries: DashMap<String, StoredValue>,
    design_docs: RwLock<HashMap<String, DesignDocument>>,
    indexers: RwLock<HashMap<(String, String), Indexer>>,
    next_cas: AtomicU64,
    replicas: AtomicU32,
    nodes: u32,
}

impl BucketData {
    /// Create an empty bucket on a cluster of `nodes` nodes.
    pub fn new(name: impl Into<String>, replicas: u32, nodes: u32) -> Self {
        BucketData {
            name: name.into(),
            entries: DashMap::new(),
            design_docs: RwLock::new(HashMap::new()),
            indexers: RwLock::new(HashMap::new()),
            next_cas: AtomicU64::new(1),
            replicas: AtomicU32::new(replicas),
            nodes,
        }
    }

    /// Bucket name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Live (non-expired) entry count
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// True when no live entries exist
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn set_replicas(&self, replicas: u32) {
        self.replicas.store(replicas, Ordering::SeqCst);
    }

    fn next_cas(&self) -> Cas {
        Cas(self.next_cas.fetch_add(1, Ordering::SeqCst))
    }

    /// Reject requirements the topology cannot satisfy.
    fn check_durability(&self, durability: Durability) -> StoreResult<()> {
        let replicas = self.replicas.load(Ordering::SeqCst);
        let persist_capacity = self.nodes.min(replicas + 1);
        let replicate_capacity = self.nodes.saturating_sub(1).min(replicas);

        let persist = durability.persist_to.nodes();
        if persist > persist_capacity {
            return Err(StoreError::DurabilityUnattainable {
                reason: format!(
                    "persistTo needs {} nodes but only {} can persist",
                    persist, persist_capacity
                ),
            });
        }
        let replicate = durability.replicate_to.replicas();
        if replicate > replicate_capacity {
            return Err(StoreError::DurabilityUnattainable {
                reason: format!(
                    "replicateTo needs {} replicas but only {} are available",
                    replicate, replicate_capacity
                ),
            });
        }
        Ok(())
    }

    /// Run `f` on the live entry for `key` under that key's shard lock.
    fn update<R>(
        &self,
        key: &str,
        now: DateTime<Utc>,
        f: impl FnOnce(Option<&StoredValue>) -> StoreResult<(Write, R)>,
    ) -> StoreResult<R> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let live = Some(occupied.get()).filter(|v| !v.is_expired(now));
                let (write, out) = f(live)?;
                match write {
                    Write::Store(v) => {
                        occupied.insert(v);
                    }
                    Write::Remove => {
                        occupied.remove();
                    }
                    Write::Keep => {}
                }
                Ok(out)
            }
            Entry::Vacant(vacant) => {
                let (write, out) = f(None)?;
                if let Write::Store(v) = write {
                    vacant.insert(v);
                }
                Ok(out)
            }
        }
    }

    /// Fail with `Locked` unless the entry is unlocked or `token` is its lock token.
    fn check_lock(
        key: &str,
        current: &StoredValue,
        token: Option<Cas>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        match current.active_lock(now) {
            Some(lock) if Some(lock) != token => Err(StoreError::Locked {
                key: key.to_string(),
            }),
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store only if absent.
    pub fn add(
        &self,
        key: &str,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas> {
        self.check_durability(durability)?;
        let now = Utc::now();
        self.update(key, now, |current| match current {
            Some(_) => Err(StoreError::Exists {
                key: key.to_string(),
            }),
            None => {
                let cas = self.next_cas();
                Ok((
                    Write::Store(StoredValue::new(value, cas, expiration.deadline(now))),
                    cas,
                ))
            }
        })
    }

    /// Store unconditionally (still refused while someone else holds a lock).
    pub fn set(
        &self,
        key: &str,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas> {
        self.check_durability(durability)?;
        let now = Utc::now();
        self.update(key, now, |current| {
            if let Some(current) = current {
                Self::check_lock(key, current, None, now)?;
            }
            let cas = self.next_cas();
            Ok((
                Write::Store(StoredValue::new(value, cas, expiration.deadline(now))),
                cas,
            ))
        })
    }

    /// Store only if present.
    pub fn replace(
        &self,
        key: &str,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas> {
        self.check_durability(durability)?;
        let now = Utc::now();
        self.update(key, now, |current| {
            let current = current.ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })?;
            Self::check_lock(key, current, None, now)?;
            let cas = self.next_cas();
            Ok((
                Write::Store(StoredValue::new(value, cas, expiration.deadline(now))),
                cas,
            ))
        })
    }

    /// Store only if the current CAS equals `expected`. A matching lock token
    /// also releases the lock.
    pub fn cas(
        &self,
        key: &str,
        expected: Cas,
        expiration: Expiration,
        value: String,
        durability: Durability,
    ) -> StoreResult<Cas> {
        self.check_durability(durability)?;
        let now = Utc::now();
        self.update(key, now, |current| {
            let current = current.ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })?;
            Self::check_lock(key, current, Some(expected), now)?;
            if current.cas() != expected {
                return Err(StoreError::CasMismatch {
                    key: key.to_string(),
                });
            }
            let cas = self.next_cas();
            Ok((
                Write::Store(StoredValue::new(value, cas, expiration.deadline(now))),
                cas,
            ))
        })
    }

    /// Remove a key, optionally only at `expected`.
    pub fn delete(&self, key: &str, expected: Option<Cas>, durability: Durability) -> StoreResult<()> {
        self.check_durability(durability)?;
        let now = Utc::now();
        self.update(key, now, |current| {
            let current = current.ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })?;
            Self::check_lock(key, current, expected, now)?;
            if let Some(expected) = expected {
                if current.cas() != expected {
                    return Err(StoreError::CasMismatch {
                        key: key.to_string(),
                    });
                }
            }
            Ok((Write::Remove, ()))
        })
    }

    /// Increment or decrement a decimal counter.
    pub fn counter(
        &self,
        key: &str,
        op: CounterOp,
        by: u64,
        default: u64,
        expiration: Expiration,
    ) -> StoreResult<u64> {
        let now = Utc::now();
        self.update(key, now, |current| {
            let (next, expires_at) = match current {
                None => (default, expiration.deadline(now)),
                Some(current) => {
                    Self::check_lock(key, current, None, now)?;
                    let value: u64 = current.value().trim().parse().map_err(|_| {
                        StoreError::NonNumeric {
                            key: key.to_string(),
                        }
                    })?;
                    (op.apply(value, by), current.expires_at())
                }
            };
            let cas = self.next_cas();
            Ok((
                Write::Store(StoredValue::new(next.to_string(), cas, expires_at)),
                next,
            ))
        })
    }

    /// Reset a key's expiry. Fails with `Locked` while another caller holds
    /// the lock.
    pub fn touch(&self, key: &str, expiration: Expiration) -> StoreResult<CasValue> {
        let now = Utc::now();
        self.update(key, now, |current| {
            let current = current.ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })?;
            Self::check_lock(key, current, None, now)?;
            let touched = current.with_expiration(expiration, now);
            let read = touched.read(now);
            Ok((Write::Store(touched), read))
        })
    }

    // =========================================================================
    // Reads and locks
    // =========================================================================

    /// Versioned read.
    pub fn gets(&self, key: &str) -> Option<CasValue> {
        let now = Utc::now();
        self.entries
            .get(key)
            .filter(|v| !v.is_expired(now))
            .map(|v| v.read(now))
    }

    /// Read and lock. Fails with `Locked` when a lock is already held.
    pub fn get_and_lock(&self, key: &str, lock_time: Expiration) -> StoreResult<Option<CasValue>> {
        let now = Utc::now();
        self.update(key, now, |current| match current {
            None => Ok((Write::Keep, None)),
            Some(current) => {
                Self::check_lock(key, current, None, now)?;
                let token = self.next_cas();
                let locked = current.locked(token, lock_time, now);
                let read = CasValue {
                    value: locked.value().to_string(),
                    cas: token,
                };
                Ok((Write::Store(locked), Some(read)))
            }
        })
    }

    /// Release a lock.
    pub fn unlock(&self, key: &str, token: Cas) -> StoreResult<()> {
        let now = Utc::now();
        self.update(key, now, |current| {
            let current = current.ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })?;
            match current.active_lock(now) {
                None => Err(StoreError::NotLocked {
                    key: key.to_string(),
                }),
                Some(lock) if lock != token => Err(StoreError::LockMismatch {
                    key: key.to_string(),
                }),
                Some(_) => Ok((Write::Store(current.unlocked()), ())),
            }
        })
    }

    /// Multi-get of live entries.
    pub fn get_bulk(&self, keys: &[String]) -> HashMap<String, String> {
        keys.iter()
            .filter_map(|k| self.gets(k).map(|v| (k.clone(), v.value)))
            .collect()
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Create or replace a design document.
    pub fn put_design_doc(&self, doc: &DesignDocument) -> StoreResult<()> {
        if doc.name.is_empty() {
            return Err(StoreError::DesignDocument {
                reason: "design document name is empty".to_string(),
            });
        }
        if let Some(view) = doc.views.values().find(|v| !v.map.contains("emit(")) {
            return Err(StoreError::DesignDocument {
                reason: format!("view '{}' in '{}' never emits", view.name, doc.name),
            });
        }
        self.design_docs.write().insert(doc.name.clone(), doc.clone());
        Ok(())
    }

    /// Stored design document by name.
    pub fn design_doc(&self, name: &str) -> Option<DesignDocument> {
        self.design_docs.read().get(name).cloned()
    }

    /// Register a native map function for a view.
    pub fn register_indexer(&self, design: &str, view: &str, indexer: Indexer) {
        self.indexers
            .write()
            .insert((design.to_string(), view.to_string()), indexer);
    }

    /// Build the view's rows and apply the query.
    pub fn query_view(
        &self,
        design: &str,
        view: &str,
        query: &ViewQuery,
    ) -> StoreResult<ViewResponse> {
        let not_found = || StoreError::ViewNotFound {
            design: design.to_string(),
            view: view.to_string(),
        };
        let definition = self
            .design_docs
            .read()
            .get(design)
            .and_then(|d| d.view(view).cloned())
            .ok_or_else(not_found)?;

        let native = self
            .indexers
            .read()
            .get(&(design.to_string(), view.to_string()))
            .cloned();
        let unsupported = |detail: String| {
            StoreError::invalid_query(format!(
                "map function of {}/{} is not supported by the memory store{}",
                design, view, detail
            ))
        };
        let source = match native {
            Some(indexer) => MapSource::Native(indexer),
            None => MapSource::Rule(
                MapRule::parse(&definition.map).ok_or_else(|| unsupported(String::new()))?,
            ),
        };
        let reducer = definition
            .reduce
            .as_deref()
            .map(Reducer::parse)
            .transpose()?;

        let now = Utc::now();
        let mut rows = Vec::new();
        for entry in self.entries.iter() {
            let stored = entry.value();
            if stored.is_expired(now) {
                continue;
            }
            let Ok(doc) = serde_json::from_str::<Value>(stored.value()) else {
                continue;
            };
            let emitted = match &source {
                MapSource::Native(indexer) => indexer(entry.key(), &doc),
                MapSource::Rule(rule) => rule
                    .emit(entry.key(), &doc)
                    .map_err(|e| unsupported(format!(": {}", e)))?,
            };
            for (key, value) in emitted {
                rows.push(ViewRow {
                    id: Some(entry.key().clone()),
                    key,
                    value,
                });
            }
        }
        evaluate(rows, reducer, query)
    }
}

/// Where a view's rows come from.
enum MapSource {
    Native(Indexer),
    Rule(MapRule),
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbus_core::{PersistTo, ReplicateTo};
    use std::sync::Arc;

    fn bucket() -> BucketData {
        BucketData::new("test", 1, 1)
    }

    #[test]
    fn test_add_then_add_fails() {
        let b = bucket();
        b.add("k", Expiration::NEVER, "1".into(), Durability::NONE).unwrap();
        let err = b.add("k", Expiration::NEVER, "2".into(), Durability::NONE).unwrap_err();
        assert!(matches!(err, StoreError::Exists { .. }));
    }

    #[test]
    fn test_replace_absent_fails() {
        let b = bucket();
        let err = b
            .replace("k", Expiration::NEVER, "1".into(), Durability::NONE)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_cas_advances_token() {
        let b = bucket();
        let c1 = b.set("k", Expiration::NEVER, "1".into(), Durability::NONE).unwrap();
        let c2 = b.cas("k", c1, Expiration::NEVER, "2".into(), Durability::NONE).unwrap();
        assert_ne!(c1, c2);
        let err = b.cas("k", c1, Expiration::NEVER, "3".into(), Durability::NONE).unwrap_err();
        assert!(matches!(err, StoreError::CasMismatch { .. }));
        assert_eq!(b.gets("k").unwrap().value, "2");
    }

    #[test]
    fn test_durability_limited_by_topology() {
        let single = BucketData::new("b", 1, 1);
        let d = Durability::new(PersistTo::Master, ReplicateTo::Zero);
        assert!(single.set("k", Expiration::NEVER, "1".into(), d).is_ok());
        let d = Durability::new(PersistTo::Zero, ReplicateTo::One);
        assert!(matches!(
            single.set("k", Expiration::NEVER, "1".into(), d),
            Err(StoreError::DurabilityUnattainable { .. })
        ));

        let three = BucketData::new("b", 1, 3);
        let d = Durability::new(PersistTo::Two, ReplicateTo::One);
        assert!(three.set("k", Expiration::NEVER, "1".into(), d).is_ok());
        let d = Durability::new(PersistTo::Three, ReplicateTo::Zero);
        assert!(three.set("k", Expiration::NEVER, "1".into(), d).is_err());
    }

    #[test]
    fn test_lock_blocks_writers_until_token_used() {
        let b = bucket();
        b.set("k", Expiration::NEVER, "1".into(), Durability::NONE).unwrap();
        let locked = b.get_and_lock("k", Expiration(10)).unwrap().unwrap();

        assert!(matches!(
            b.set("k", Expiration::NEVER, "2".into(), Durability::NONE),
            Err(StoreError::Locked { .. })
        ));
        assert!(matches!(
            b.get_and_lock("k", Expiration(10)),
            Err(StoreError::Locked { .. })
        ));

        b.cas("k", locked.cas, Expiration::NEVER, "3".into(), Durability::NONE)
            .unwrap();
        b.set("k", Expiration::NEVER, "4".into(), Durability::NONE).unwrap();
        assert_eq!(b.gets("k").unwrap().value, "4");
    }

    #[test]
    fn test_touch_respects_lock() {
        let b = bucket();
        b.set("k", Expiration::NEVER, "1".into(), Durability::NONE).unwrap();
        let locked = b.get_and_lock("k", Expiration(10)).unwrap().unwrap();

        assert!(matches!(
            b.touch("k", Expiration(60)),
            Err(StoreError::Locked { .. })
        ));
        assert!(b.entries.get("k").unwrap().expires_at().is_none());

        b.unlock("k", locked.cas).unwrap();
        let touched = b.touch("k", Expiration(60)).unwrap();
        assert_eq!(touched.value, "1");
        assert!(b.entries.get("k").unwrap().expires_at().is_some());
    }

    #[test]
    fn test_unlock_checks_token() {
        let b = bucket();
        b.set("k", Expiration::NEVER, "1".into(), Durability::NONE).unwrap();
        assert!(matches!(b.unlock("k", Cas(1)), Err(StoreError::NotLocked { .. })));

        let locked = b.get_and_lock("k", Expiration(10)).unwrap().unwrap();
        assert!(matches!(
            b.unlock("k", Cas(locked.cas.0 + 100)),
            Err(StoreError::LockMismatch { .. })
        ));
        b.unlock("k", locked.cas).unwrap();
        b.set("k", Expiration::NEVER, "2".into(), Durability::NONE).unwrap();
    }

    #[test]
    fn test_counter_seed_then_increment() {
        let b = bucket();
        let v = b.counter("c", CounterOp::Increment, 5, 10, Expiration::NEVER).unwrap();
        assert_eq!(v, 10);
        let v = b.counter("c", CounterOp::Increment, 5, 10, Expiration::NEVER).unwrap();
        assert_eq!(v, 15);
        let v = b.counter("c", CounterOp::Decrement, 100, 10, Expiration::NEVER).unwrap();
        assert_eq!(v, 0);

        b.set("j", Expiration::NEVER, "{\"a\":1}".into(), Durability::NONE).unwrap();
        assert!(matches!(
            b.counter("j", CounterOp::Increment, 1, 0, Expiration::NEVER),
            Err(StoreError::NonNumeric { .. })
        ));
    }

    #[test]
    fn test_native_indexer_overrides_map_source() {
        let b = bucket();
        let mut doc = DesignDocument::new("dev_users");
        doc.add_view(docbus_core::ViewDesign {
            name: "by_len".into(),
            map: "function (doc) { emit(doc.name.length, null); }".into(),
            reduce: None,
        });
        b.put_design_doc(&doc).unwrap();
        b.set("u1", Expiration::NEVER, r#"{"name":"abc"}"#.into(), Durability::NONE)
            .unwrap();

        match b.query_view("dev_users", "by_len", &ViewQuery::new()) {
            Err(StoreError::InvalidQuery { reason }) => {
                assert!(reason.starts_with("map function of dev_users/by_len is not supported"));
                assert!(reason.contains("'length'"));
            }
            other => panic!("Expected InvalidQuery, got {:?}", other),
        }

        b.register_indexer(
            "dev_users",
            "by_len",
            Arc::new(|_, doc| {
                let len = doc["name"].as_str().map(|s| s.len()).unwrap_or(0);
                vec![(Value::from(len as u64), Value::Null)]
            }),
        );
        let resp = b.query_view("dev_users", "by_len", &ViewQuery::new()).unwrap();
        assert_eq!(resp.rows.len(), 1);
        assert_eq!(resp.rows[0].key, Value::from(3u64));
    }

    #[test]
    fn test_unknown_view() {
        let b = bucket();
        assert!(matches!(
            b.query_view("d", "v", &ViewQuery::new()),
            Err(StoreError::ViewNotFound { .. })
        ));
    }
}
