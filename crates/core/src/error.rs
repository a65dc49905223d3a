//! Error types for store operations
//!
//! Every failure the store can report is a [`StoreError`] variant. The
//! `Display` output is the status message that is handed back to callers
//! verbatim, so messages stay short and name the key involved.

use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures reported by the store or the cluster admin API.
///
/// # Categories
///
/// | Category | Variants |
/// |----------|----------|
/// | Precondition | `Exists`, `NotFound`, `CasMismatch`, `Locked`, `LockMismatch`, `NotLocked`, `NonNumeric` |
/// | Durability | `DurabilityUnattainable`, `Timeout` |
/// | Views | `ViewNotFound`, `DesignDocument`, `InvalidQuery` |
/// | Admin | `BucketNotFound`, `BucketExists`, `BucketNotReady`, `InvalidBucket`, `Authentication` |
/// | Connection | `Connection`, `Shutdown` |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    // ==================== Precondition ====================
    /// Add on a key that already holds a document
    #[error("document exists: {key}")]
    Exists {
        /// Key that was already present
        key: String,
    },

    /// Replace, touch or conditional write on an absent key
    #[error("document not found: {key}")]
    NotFound {
        /// Key that was absent
        key: String,
    },

    /// The supplied CAS token no longer matches the stored one
    #[error("cas mismatch for key: {key}")]
    CasMismatch {
        /// Key whose version moved on
        key: String,
    },

    /// The document is locked by a pessimistic lock held by someone else
    #[error("document locked: {key}")]
    Locked {
        /// Locked key
        key: String,
    },

    /// Unlock with a token that is not the current lock token
    #[error("lock token mismatch for key: {key}")]
    LockMismatch {
        /// Key whose lock token did not match
        key: String,
    },

    /// Unlock on a document that holds no lock
    #[error("document not locked: {key}")]
    NotLocked {
        /// Key that was not locked
        key: String,
    },

    /// Counter operation on a value that is not a decimal integer
    #[error("cannot increment or decrement non-numeric value: {key}")]
    NonNumeric {
        /// Key holding the non-numeric value
        key: String,
    },

    // ==================== Durability ====================
    /// Requested persist/replicate counts exceed what the topology provides
    #[error("durability requirement cannot be met: {reason}")]
    DurabilityUnattainable {
        /// Which half of the requirement failed and why
        reason: String,
    },

    /// The operation did not complete inside its timeout
    #[error("{operation} timed out after {millis}ms")]
    Timeout {
        /// Operation category that timed out
        operation: String,
        /// Timeout that elapsed
        millis: u64,
    },

    // ==================== Views ====================
    /// Query against a view that no design document defines
    #[error("view not found: {design}/{view}")]
    ViewNotFound {
        /// Design document name
        design: String,
        /// View name
        view: String,
    },

    /// Design document rejected by the store
    #[error("invalid design document: {reason}")]
    DesignDocument {
        /// Rejection reason
        reason: String,
    },

    /// View query parameters could not be bound
    #[error("invalid view query: {reason}")]
    InvalidQuery {
        /// Offending parameter and why
        reason: String,
    },

    // ==================== Admin ====================
    /// Named bucket does not exist
    #[error("bucket not found: {bucket}")]
    BucketNotFound {
        /// Bucket name
        bucket: String,
    },

    /// Bucket creation for a name that is taken
    #[error("bucket already exists: {bucket}")]
    BucketExists {
        /// Bucket name
        bucket: String,
    },

    /// Bucket exists but has not finished warming up
    #[error("bucket not ready: {bucket}")]
    BucketNotReady {
        /// Bucket name
        bucket: String,
    },

    /// Bucket parameters rejected by the cluster
    #[error("invalid bucket parameters: {reason}")]
    InvalidBucket {
        /// Rejection reason
        reason: String,
    },

    /// Credentials rejected
    #[error("authentication failed: {reason}")]
    Authentication {
        /// Rejection reason
        reason: String,
    },

    // ==================== Connection ====================
    /// Transport-level failure
    #[error("connection error: {reason}")]
    Connection {
        /// Failure detail
        reason: String,
    },

    /// Client was shut down before the operation ran
    #[error("client has been shut down")]
    Shutdown,
}

impl StoreError {
    /// Build a `Timeout` for an operation category and duration.
    pub fn timeout(operation: impl Into<String>, millis: u64) -> Self {
        StoreError::Timeout {
            operation: operation.into(),
            millis,
        }
    }

    /// Build an `InvalidQuery` error.
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        StoreError::InvalidQuery {
            reason: reason.into(),
        }
    }

    /// True for failures caused by the document's current state, which a
    /// caller can resolve by re-reading and retrying.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            StoreError::Exists { .. }
                | StoreError::NotFound { .. }
                | StoreError::CasMismatch { .. }
                | StoreError::Locked { .. }
                | StoreError::LockMismatch { .. }
                | StoreError::NotLocked { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_key() {
        let err = StoreError::Exists {
            key: "user::1".to_string(),
        };
        assert_eq!(err.to_string(), "document exists: user::1");

        let err = StoreError::CasMismatch {
            key: "user::1".to_string(),
        };
        assert!(err.to_string().contains("cas mismatch"));
    }

    #[test]
    fn test_timeout_display() {
        let err = StoreError::timeout("view query", 75000);
        assert_eq!(err.to_string(), "view query timed out after 75000ms");
    }

    #[test]
    fn test_precondition_classification() {
        assert!(StoreError::NotFound { key: "k".into() }.is_precondition());
        assert!(StoreError::Locked { key: "k".into() }.is_precondition());
        assert!(!StoreError::timeout("get", 1).is_precondition());
        assert!(!StoreError::Shutdown.is_precondition());
    }
}
