//! Output enum for successful requests.
//!
//! Every action produces exactly one output variant:
//!
//! | Action | Output |
//! |--------|--------|
//! | insert, save, update | `Written` |
//! | delete | `Deleted` |
//! | find_by_id | `Document` |
//! | find_by_ids | `Documents` |
//! | find_by_view | `Rows` |
//! | cas | `Cas` |
//! | counter | `Counter` |
//! | unlock, touch | `Key` |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use docbus_core::Cas;

/// Successful action results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Output {
    /// Document write acknowledged at the requested durability
    Written {
        /// Document id
        id: String,
        /// New CAS
        cas: Cas,
    },

    /// Document removed
    Deleted {
        /// Document id
        id: String,
    },

    /// Single document with its CAS (the lock token for lock reads)
    Document {
        /// Document id
        id: String,
        /// CAS or lock token
        cas: Cas,
        /// Body, a string when not JSON
        document: Value,
    },

    /// Bulk read hits keyed by id
    Documents(Map<String, Value>),

    /// View results in row order
    Rows(Vec<Value>),

    /// Raw conditional write acknowledged
    Cas {
        /// Written key
        key: String,
        /// New CAS
        cas: Cas,
    },

    /// Counter value after the operation
    Counter {
        /// Counter key
        key: String,
        /// Current value
        value: u64,
    },

    /// Key-only acknowledgement
    Key {
        /// Affected key
        key: String,
    },
}

impl Output {
    /// Reply fields carried next to `status`.
    pub fn payload(&self) -> Map<String, Value> {
        let mut m = Map::new();
        match self {
            Output::Written { id, cas } => {
                m.insert("id".into(), Value::from(id.as_str()));
                m.insert("cas".into(), Value::from(cas.as_u64()));
            }
            Output::Deleted { id } => {
                m.insert("id".into(), Value::from(id.as_str()));
            }
            Output::Document { id, cas, document } => {
                m.insert("id".into(), Value::from(id.as_str()));
                m.insert("cas".into(), Value::from(cas.as_u64()));
                m.insert("document".into(), document.clone());
            }
            Output::Documents(docs) => {
                m.insert("result".into(), Value::Object(docs.clone()));
            }
            Output::Rows(rows) => {
                m.insert("result".into(), Value::Array(rows.clone()));
            }
            Output::Cas { key, cas } => {
                m.insert("key".into(), Value::from(key.as_str()));
                m.insert("cas".into(), Value::from(cas.as_u64()));
            }
            Output::Counter { key, value } => {
                m.insert("key".into(), Value::from(key.as_str()));
                m.insert("counter".into(), Value::from(*value));
            }
            Output::Key { key } => {
                m.insert("key".into(), Value::from(key.as_str()));
            }
        }
        m
    }
}
