//! Storage-layer entry with expiry and lock metadata
//!
//! The contract type handed to callers is [`CasValue`]: raw value plus token.
//! Expiry and pessimistic locks are storage concerns, so they live here in
//! `StoredValue` and never leave the crate.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use docbus_core::{Cas, CasValue, Expiration};

/// CAS reported by plain reads of a locked document. No writer can match it.
pub const LOCKED_CAS: Cas = Cas(u64::MAX);

/// Lock duration used when the caller asks for zero seconds.
pub const DEFAULT_LOCK_SECS: u32 = 15;

/// Longest lock a caller may take.
pub const MAX_LOCK_SECS: u32 = 30;

/// Pessimistic lock held on an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lock {
    /// Token required to write or unlock
    pub token: Cas,
    /// Lock release time
    pub until: DateTime<Utc>,
}

/// A stored document with expiry and lock state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    value: String,
    cas: Cas,
    expires_at: Option<DateTime<Utc>>,
    lock: Option<Lock>,
}

impl StoredValue {
    /// Create an unlocked entry
    pub fn new(value: String, cas: Cas, expires_at: Option<DateTime<Utc>>) -> Self {
        StoredValue {
            value,
            cas,
            expires_at,
            lock: None,
        }
    }

    /// Raw value
    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Current CAS (the lock token while locked)
    #[inline]
    pub fn cas(&self) -> Cas {
        self.cas
    }

    /// Absolute expiry, if any
    #[inline]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Check if this value has expired
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// The lock token if a lock is still in force
    pub fn active_lock(&self, now: DateTime<Utc>) -> Option<Cas> {
        self.lock.filter(|l| l.until > now).map(|l| l.token)
    }

    /// Value as a plain versioned read would see it.
    pub fn read(&self, now: DateTime<Utc>) -> CasValue {
        let cas = if self.active_lock(now).is_some() {
            LOCKED_CAS
        } else {
            self.cas
        };
        CasValue {
            value: self.value.clone(),
            cas,
        }
    }

    /// Copy with a new expiry; value, CAS and lock are kept.
    pub fn with_expiration(&self, expiration: Expiration, now: DateTime<Utc>) -> Self {
        StoredValue {
            expires_at: expiration.deadline(now),
            ..self.clone()
        }
    }

    /// Copy holding a lock. The lock token becomes the entry's CAS.
    pub fn locked(&self, token: Cas, lock_time: Expiration, now: DateTime<Utc>) -> Self {
        let secs = match lock_time.secs() {
            0 => DEFAULT_LOCK_SECS,
            s => s.min(MAX_LOCK_SECS),
        };
        StoredValue {
            cas: token,
            lock: Some(Lock {
                token,
                until: now + ChronoDuration::seconds(i64::from(secs)),
            }),
            ..self.clone()
        }
    }

    /// Copy with the lock released.
    pub fn unlocked(&self) -> Self {
        StoredValue {
            lock: None,
            ..self.clone()
        }
    }
}
