//! Value types shared by the store traits and the request layer
//!
//! - [`Cas`]: opaque version token for optimistic concurrency
//! - [`CasValue`]: a raw value read together with its token
//! - [`Durability`]: persist/replicate acknowledgment requirement
//! - [`Expiration`]: memcached expiry seconds (relative or absolute)
//! - [`CounterOp`]: increment/decrement selector

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// CAS
// =============================================================================

/// Compare-and-swap token.
///
/// Returned by every read and every successful mutation. A conditional write
/// only succeeds while the stored token still equals the one supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cas(pub u64);

impl Cas {
    /// Raw token value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Cas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Cas {
    fn from(v: u64) -> Self {
        Cas(v)
    }
}

/// A raw stored value together with the CAS token it was read at.
///
/// For lock reads the token is the lock token needed to write or unlock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasValue {
    /// Serialized document body
    pub value: String,
    /// Token observed with this value
    pub cas: Cas,
}

// =============================================================================
// Durability
// =============================================================================

/// Number of nodes that must have persisted a write before it is acknowledged.
///
/// `Master` and `One` are equivalent: only the active copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PersistTo {
    /// No persistence guarantee
    #[default]
    #[serde(alias = "zero")]
    Zero,
    /// Persisted on the active node
    #[serde(alias = "master")]
    Master,
    /// Persisted on one node (the active node)
    #[serde(alias = "one")]
    One,
    /// Persisted on two nodes
    #[serde(alias = "two")]
    Two,
    /// Persisted on three nodes
    #[serde(alias = "three")]
    Three,
    /// Persisted on four nodes
    #[serde(alias = "four")]
    Four,
}

impl PersistTo {
    /// Node count this level requires.
    pub const fn nodes(self) -> u32 {
        match self {
            PersistTo::Zero => 0,
            PersistTo::Master | PersistTo::One => 1,
            PersistTo::Two => 2,
            PersistTo::Three => 3,
            PersistTo::Four => 4,
        }
    }
}

/// Number of replicas that must hold a write in memory before it is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplicateTo {
    /// No replication guarantee
    #[default]
    #[serde(alias = "zero")]
    Zero,
    /// One replica
    #[serde(alias = "one")]
    One,
    /// Two replicas
    #[serde(alias = "two")]
    Two,
    /// Three replicas
    #[serde(alias = "three")]
    Three,
}

impl ReplicateTo {
    /// Replica count this level requires.
    pub const fn replicas(self) -> u32 {
        match self {
            ReplicateTo::Zero => 0,
            ReplicateTo::One => 1,
            ReplicateTo::Two => 2,
            ReplicateTo::Three => 3,
        }
    }
}

/// Durability requirement for a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Durability {
    /// Persistence requirement
    pub persist_to: PersistTo,
    /// Replication requirement
    pub replicate_to: ReplicateTo,
}

impl Durability {
    /// Fire-and-forget visibility: acknowledged once the active node accepts it.
    pub const NONE: Durability = Durability {
        persist_to: PersistTo::Zero,
        replicate_to: ReplicateTo::Zero,
    };

    /// Create a durability requirement.
    pub const fn new(persist_to: PersistTo, replicate_to: ReplicateTo) -> Self {
        Durability {
            persist_to,
            replicate_to,
        }
    }

    /// True when the write must be observed on disk or on replicas.
    pub const fn requires_observe(&self) -> bool {
        self.persist_to.nodes() > 0 || self.replicate_to.replicas() > 0
    }
}

// =============================================================================
// Expiration
// =============================================================================

/// Largest value treated as a relative offset (30 days). Anything above is an
/// absolute unix timestamp.
pub const MAX_RELATIVE_EXPIRATION: u32 = 30 * 24 * 60 * 60;

/// Expiry in seconds, `0` meaning never.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expiration(pub u32);

impl Expiration {
    /// Never expires.
    pub const NEVER: Expiration = Expiration(0);

    /// Raw seconds value
    #[inline]
    pub const fn secs(self) -> u32 {
        self.0
    }

    /// True for the "never expires" value.
    #[inline]
    pub const fn is_never(self) -> bool {
        self.0 == 0
    }

    /// Absolute deadline relative to `now`, or `None` when the value never expires.
    pub fn deadline(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.0 {
            0 => None,
            secs if secs <= MAX_RELATIVE_EXPIRATION => {
                Some(now + ChronoDuration::seconds(i64::from(secs)))
            }
            secs => Utc.timestamp_opt(i64::from(secs), 0).single(),
        }
    }
}

// =============================================================================
// Counters
// =============================================================================

/// Direction of a counter mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterOp {
    /// Add `by`, wrapping at 2^64
    Increment,
    /// Subtract `by`, flooring at zero
    Decrement,
}

impl CounterOp {
    /// Parse the request spelling (`increment` / `decrement`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "increment" => Some(CounterOp::Increment),
            "decrement" => Some(CounterOp::Decrement),
            _ => None,
        }
    }

    /// Apply this operation to `current`.
    pub fn apply(self, current: u64, by: u64) -> u64 {
        match self {
            CounterOp::Increment => current.wrapping_add(by),
            CounterOp::Decrement => current.saturating_sub(by),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durability_levels_parse_both_cases() {
        let p: PersistTo = serde_json::from_str("\"MASTER\"").unwrap();
        assert_eq!(p, PersistTo::Master);
        let p: PersistTo = serde_json::from_str("\"two\"").unwrap();
        assert_eq!(p, PersistTo::Two);
        let r: ReplicateTo = serde_json::from_str("\"THREE\"").unwrap();
        assert_eq!(r, ReplicateTo::Three);
        assert!(serde_json::from_str::<ReplicateTo>("\"FOUR\"").is_err());
    }

    #[test]
    fn test_master_and_one_are_equivalent() {
        assert_eq!(PersistTo::Master.nodes(), PersistTo::One.nodes());
        assert!(PersistTo::Zero < PersistTo::Four);
    }

    #[test]
    fn test_default_durability_needs_no_observe() {
        assert_eq!(Durability::default(), Durability::NONE);
        assert!(!Durability::NONE.requires_observe());
        assert!(Durability::new(PersistTo::Zero, ReplicateTo::One).requires_observe());
    }

    #[test]
    fn test_expiration_relative_and_absolute() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(Expiration::NEVER.deadline(now), None);

        let rel = Expiration(60).deadline(now).unwrap();
        assert_eq!(rel.timestamp(), 1_700_000_060);

        let abs = Expiration(1_800_000_000).deadline(now).unwrap();
        assert_eq!(abs.timestamp(), 1_800_000_000);
    }

    #[test]
    fn test_counter_apply() {
        assert_eq!(CounterOp::Increment.apply(10, 5), 15);
        assert_eq!(CounterOp::Decrement.apply(3, 5), 0);
        assert_eq!(CounterOp::Increment.apply(u64::MAX, 1), 0);
        assert_eq!(CounterOp::parse("increment"), Some(CounterOp::Increment));
        assert_eq!(CounterOp::parse("add"), None);
    }
}
