//! Typed actions decoded from request messages.
//!
//! A request is a JSON object with an `action` name and action-specific
//! fields. Decoding checks required fields and field types so that handlers
//! only ever see well-formed input:
//! - a missing required field yields the action's validation message
//! - a present field of the wrong type yields `invalid input: <detail>`

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use docbus_core::{Cas, CounterOp, Durability, Expiration, PersistTo, ReplicateTo, ViewQuery};

use crate::{Error, Result};

/// Action names and their capability class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// `insert`: store a new document
    Insert,
    /// `save`: store unconditionally
    Save,
    /// `update`: replace an existing document
    Update,
    /// `delete`: remove a document
    Delete,
    /// `find_by_id`: read one document
    FindById,
    /// `find_by_ids`: bulk read
    FindByIds,
    /// `find_by_view`: view query with document fan-out
    FindByView,
    /// `cas`: raw conditional write
    Cas,
    /// `counter`: atomic increment or decrement
    Counter,
    /// `unlock`: release a read lock
    Unlock,
    /// `touch`: reset expiry
    Touch,
}

impl ActionKind {
    /// All actions, baseline first.
    pub const ALL: [ActionKind; 11] = [
        ActionKind::Insert,
        ActionKind::Save,
        ActionKind::Update,
        ActionKind::Delete,
        ActionKind::FindById,
        ActionKind::FindByIds,
        ActionKind::FindByView,
        ActionKind::Cas,
        ActionKind::Counter,
        ActionKind::Unlock,
        ActionKind::Touch,
    ];

    /// Look up an action by its request name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Request name
    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Insert => "insert",
            ActionKind::Save => "save",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
            ActionKind::FindById => "find_by_id",
            ActionKind::FindByIds => "find_by_ids",
            ActionKind::FindByView => "find_by_view",
            ActionKind::Cas => "cas",
            ActionKind::Counter => "counter",
            ActionKind::Unlock => "unlock",
            ActionKind::Touch => "touch",
        }
    }

    /// True for the conditional actions outside the baseline set.
    pub fn is_extended(self) -> bool {
        matches!(
            self,
            ActionKind::Cas | ActionKind::Counter | ActionKind::Unlock | ActionKind::Touch
        )
    }
}

/// How `find_by_id` reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindMode {
    /// Plain versioned read
    Standard,
    /// Read and lock for `expiration` seconds
    Lock,
    /// Read and reset expiry to `expiration`
    Touch,
}

/// Which store write a document action maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Add; fails when the id exists
    Insert,
    /// Set
    Save,
    /// Replace; fails when the id is absent
    Update,
    /// Remove
    Delete,
}

/// Decoded document write.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
    /// Store operation
    pub kind: WriteKind,
    /// Document id (generated when the request had none)
    pub id: String,
    /// Document body, `id` included
    pub document: Map<String, Value>,
    /// Durability requirement
    pub durability: Durability,
    /// Expiry
    pub expiration: Expiration,
    /// Conditional write token
    pub cas: Option<Cas>,
}

/// A fully validated request.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// insert / save / update / delete
    Write(DocumentWrite),

    /// Read one document.
    FindById {
        /// Document id
        id: String,
        /// Plain, lock or touch read
        mode: FindMode,
        /// Lock time or new expiry, depending on `mode`
        expiration: Expiration,
    },

    /// Bulk read.
    FindByIds {
        /// Document ids, in request order
        ids: Vec<String>,
    },

    /// View query plus document fan-out.
    FindByView {
        /// Design document name, `dev_` prefix included
        design_doc: String,
        /// View within the design document
        view_name: String,
        /// Bound query parameters
        query: ViewQuery,
    },

    /// Raw conditional write.
    Cas {
        /// Target key
        key: String,
        /// Expected token
        cas: Cas,
        /// Raw value; objects are serialized
        value: String,
        /// Durability requirement
        durability: Durability,
        /// New expiry
        expiration: Expiration,
    },

    /// Increment or decrement.
    Counter {
        /// Counter key
        key: String,
        /// Direction
        op: CounterOp,
        /// Step
        by: u64,
        /// Seed stored when the key is absent
        default: u64,
        /// Expiry applied when seeding
        expiration: Expiration,
    },

    /// Release a lock.
    Unlock {
        /// Locked key
        key: String,
        /// Token returned by the lock read
        cas: Cas,
    },

    /// Reset expiry.
    Touch {
        /// Target key
        key: String,
        /// New expiry
        expiration: Expiration,
    },
}

impl Action {
    /// Action name this was decoded from.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Write(w) => match w.kind {
                WriteKind::Insert => ActionKind::Insert,
                WriteKind::Save => ActionKind::Save,
                WriteKind::Update => ActionKind::Update,
                WriteKind::Delete => ActionKind::Delete,
            },
            Action::FindById { .. } => ActionKind::FindById,
            Action::FindByIds { .. } => ActionKind::FindByIds,
            Action::FindByView { .. } => ActionKind::FindByView,
            Action::Cas { .. } => ActionKind::Cas,
            Action::Counter { .. } => ActionKind::Counter,
            Action::Unlock { .. } => ActionKind::Unlock,
            Action::Touch { .. } => ActionKind::Touch,
        }
    }

    /// Decode the fields of `request` for `kind`.
    pub fn decode(kind: ActionKind, request: &Map<String, Value>) -> Result<Action> {
        let f = Fields(request);
        match kind {
            ActionKind::Insert => f.document_write(WriteKind::Insert),
            ActionKind::Save => f.document_write(WriteKind::Save),
            ActionKind::Update => f.document_write(WriteKind::Update),
            ActionKind::Delete => f.document_write(WriteKind::Delete),

            ActionKind::FindById => {
                let id = f.string("id")?.ok_or_else(|| Error::validation("id must be specified"))?;
                let mode = match request.get("mode") {
                    None | Some(Value::Null) => FindMode::Standard,
                    Some(Value::String(s)) if s == "standard" => FindMode::Standard,
                    Some(Value::String(s)) if s == "lock" => FindMode::Lock,
                    Some(Value::String(s)) if s == "touch" => FindMode::Touch,
                    Some(_) => {
                        return Err(Error::validation(
                            "invalid mode should be standard, lock or touch",
                        ))
                    }
                };
                Ok(Action::FindById {
                    id,
                    mode,
                    expiration: f.expiration()?,
                })
            }

            ActionKind::FindByIds => {
                let ids = match request.get("ids") {
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|v| {
                            v.as_str().map(str::to_string).ok_or_else(|| {
                                Error::invalid_input("'ids' must contain only strings")
                            })
                        })
                        .collect::<Result<Vec<_>>>()?,
                    _ => return Err(Error::validation("ids must be specified")),
                };
                Ok(Action::FindByIds { ids })
            }

            ActionKind::FindByView => {
                let missing = || Error::validation("designDoc and viewName and query must be specified");
                let design_doc = f.string("designDoc")?;
                let view_name = f.string("viewName")?;
                let query = match request.get("query") {
                    Some(Value::Object(q)) => Some(q),
                    _ => None,
                };
                match (design_doc, view_name, query) {
                    (Some(design_doc), Some(view_name), Some(query)) => Ok(Action::FindByView {
                        design_doc,
                        view_name,
                        query: ViewQuery::from_params(query)?,
                    }),
                    _ => Err(missing()),
                }
            }

            ActionKind::Cas => {
                let key = f.string("key")?;
                let cas = f.u64("cas")?;
                let (Some(key), Some(cas)) = (key, cas) else {
                    return Err(Error::validation("key and cas must be specified"));
                };
                let value = match request.get("value") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => Value::Null.to_string(),
                };
                Ok(Action::Cas {
                    key,
                    cas: Cas(cas),
                    value,
                    durability: f.durability()?,
                    expiration: f.expiration()?,
                })
            }

            ActionKind::Counter => {
                let key = f.string("key")?;
                let operation = f.string("operation")?;
                let by = f.u64("by")?;
                let (Some(key), Some(operation), Some(by)) = (key, operation, by) else {
                    return Err(Error::validation(
                        "key and operation and by must be specified",
                    ));
                };
                let op = CounterOp::parse(&operation).ok_or_else(|| {
                    Error::validation("invalid operation should be increment or decrement")
                })?;
                Ok(Action::Counter {
                    key,
                    op,
                    by,
                    default: f.u64("default")?.unwrap_or(0),
                    expiration: f.expiration()?,
                })
            }

            ActionKind::Unlock => {
                let key = f.string("key")?;
                let cas = f.u64("cas")?;
                let (Some(key), Some(cas)) = (key, cas) else {
                    return Err(Error::validation("key and cas must be specified"));
                };
                Ok(Action::Unlock { key, cas: Cas(cas) })
            }

            ActionKind::Touch => {
                let key = f
                    .string("key")?
                    .ok_or_else(|| Error::validation("key must be specified"))?;
                Ok(Action::Touch {
                    key,
                    expiration: f.expiration()?,
                })
            }
        }
    }
}

// =============================================================================
// Field access
// =============================================================================

/// Typed accessors over a request object. Absent and `null` both read as `None`.
struct Fields<'a>(&'a Map<String, Value>);

impl Fields<'_> {
    fn present(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    fn string(&self, name: &str) -> Result<Option<String>> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(Error::invalid_input(format!("'{}' must be a string", name))),
        }
    }

    fn u64(&self, name: &str) -> Result<Option<u64>> {
        match self.present(name) {
            None => Ok(None),
            Some(v) => v.as_u64().map(Some).ok_or_else(|| {
                Error::invalid_input(format!("'{}' must be a non-negative integer", name))
            }),
        }
    }

    fn expiration(&self) -> Result<Expiration> {
        match self.u64("expiration")? {
            None => Ok(Expiration::NEVER),
            Some(secs) => u32::try_from(secs)
                .map(Expiration)
                .map_err(|_| Error::invalid_input("'expiration' is out of range")),
        }
    }

    fn level<T: DeserializeOwned + Default>(&self, names: &[&str]) -> Result<T> {
        let Some((name, value)) = names
            .iter()
            .find_map(|n| self.present(n).map(|v| (*n, v)))
        else {
            return Ok(T::default());
        };
        let text = value
            .as_str()
            .ok_or_else(|| Error::invalid_input(format!("'{}' must be a string", name)))?;
        serde_json::from_value(Value::String(text.to_ascii_uppercase()))
            .map_err(|_| Error::invalid_input(format!("unknown {} level '{}'", name, text)))
    }

    fn durability(&self) -> Result<Durability> {
        let persist_to: PersistTo = self.level(&["persistTo"])?;
        let replicate_to: ReplicateTo = self.level(&["replicateTo", "replicatTo"])?;
        Ok(Durability::new(persist_to, replicate_to))
    }

    fn document_write(&self, kind: WriteKind) -> Result<Action> {
        let mut document = match self.0.get("document") {
            Some(Value::Object(doc)) => doc.clone(),
            _ => return Err(Error::validation("document must be specified")),
        };
        let id = match document.get("id").cloned() {
            Some(Value::String(id)) => id,
            None | Some(Value::Null) if kind == WriteKind::Delete => {
                return Err(Error::validation("document id must be specified"))
            }
            None | Some(Value::Null) => {
                let id = uuid::Uuid::new_v4().to_string();
                document.insert("id".to_string(), Value::String(id.clone()));
                id
            }
            Some(_) => return Err(Error::validation("document id must be a string")),
        };
        Ok(Action::Write(DocumentWrite {
            kind,
            id,
            document,
            durability: self.durability()?,
            expiration: self.expiration()?,
            cas: self.u64("cas")?.map(Cas),
        }))
    }
}
