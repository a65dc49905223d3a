//! Error types for request handling.
//!
//! Every failed request ends up as one [`Error`]. The `Display` output is the
//! `message` of the error reply, and [`Error::exception`] supplies the
//! optional detail string.

use serde::{Deserialize, Serialize};

/// Request handling errors.
///
/// # Categories
///
/// | Category | Variants | Store called |
/// |----------|----------|--------------|
/// | Routing | `MissingAction`, `InvalidAction` | no |
/// | Validation | `Validation`, `InvalidInput`, `InvalidQuery` | no |
/// | Lookup | `NotFound` | yes |
/// | Store | `Store`, `Timeout` | yes |
/// | System | `Internal` | maybe |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
    // ==================== Routing ====================
    /// Request carried no usable `action`
    #[error("action must be specified")]
    MissingAction,

    /// Unknown or disabled action
    #[error("Invalid action: {action}")]
    InvalidAction {
        /// The action name as sent
        action: String,
    },

    // ==================== Validation ====================
    /// A required field is missing; the message names the fields
    #[error("{message}")]
    Validation {
        /// Reply message
        message: String,
    },

    /// A field is present with the wrong type or range
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Which field and why
        reason: String,
    },

    /// View query parameters could not be bound
    #[error("invalid view query: {reason}")]
    InvalidQuery {
        /// Offending parameter
        reason: String,
    },

    // ==================== Lookup ====================
    /// Read found nothing
    #[error("not found")]
    NotFound,

    // ==================== Store ====================
    /// The store refused the operation
    #[error("{message}")]
    Store {
        /// Store error message, unchanged
        message: String,
        /// Store error detail
        exception: String,
    },

    /// The operation did not finish inside its deadline
    #[error("{operation} timed out after {millis}ms")]
    Timeout {
        /// Store operation that timed out
        operation: String,
        /// Deadline that elapsed
        millis: u64,
    },

    // ==================== System ====================
    /// Bug or invariant violation, including handler panics
    #[error("internal error: {reason}")]
    Internal {
        /// What went wrong
        reason: String,
    },
}

impl Error {
    /// Validation failure with a fixed message.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Field type failure.
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Detail string attached to the error reply.
    ///
    /// Routing, validation and not-found replies carry only a message.
    pub fn exception(&self) -> Option<String> {
        match self {
            Error::Store { exception, .. } => Some(exception.clone()),
            Error::Timeout { operation, .. } => Some(format!("Timeout {{ operation: {operation:?} }}")),
            Error::Internal { reason } => Some(reason.clone()),
            _ => None,
        }
    }
}
