//! Error conversion from store errors.
//!
//! Store failures keep their message verbatim; the variant and its fields
//! become the reply's `exception` detail.

use docbus_core::StoreError;

use crate::Error;

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout { operation, millis } => Error::Timeout { operation, millis },
            StoreError::InvalidQuery { reason } => Error::InvalidQuery { reason },
            other => Error::Store {
                message: other.to_string(),
                exception: format!("{:?}", other),
            },
        }
    }
}
