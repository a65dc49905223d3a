//! View query builder
//!
//! Requests carry view-query parameters as a loose JSON object. [`ViewQuery`]
//! binds them through an explicit name table onto typed setters; unknown
//! names and mistyped values are rejected rather than ignored.
//!
//! Both the couch-style spellings (`startkey`, `group_level`) and the
//! camel-case setter spellings (`rangeStart`, `groupLevel`) are accepted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::{StoreError, StoreResult};

/// Index freshness required by a view query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stale {
    /// Answer from the index as it is
    Ok,
    /// Bring the index up to date before answering
    False,
    /// Answer from the index as it is, then update it
    UpdateAfter,
}

impl Stale {
    /// Parse a staleness name, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ok" => Some(Stale::Ok),
            "false" => Some(Stale::False),
            "update_after" => Some(Stale::UpdateAfter),
            _ => None,
        }
    }
}

/// What the view engine does when a node fails mid-query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Return what was gathered so far
    Continue,
    /// Abort the query
    Stop,
}

/// One row of a view result. Reduced rows carry no document id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    /// Id of the emitting document
    pub id: Option<String>,
    /// Emitted key
    pub key: Value,
    /// Emitted (or reduced) value
    pub value: Value,
}

/// Rows returned by a view query, in index order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewResponse {
    /// Matching rows
    pub rows: Vec<ViewRow>,
    /// Rows in the whole index before filtering
    pub total_rows: u64,
}

/// Typed view query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewQuery {
    /// Exact key match
    pub key: Option<Value>,
    /// Match any of these keys, in this order
    pub keys: Option<Vec<Value>>,
    /// Range start key
    pub start_key: Option<Value>,
    /// Range end key
    pub end_key: Option<Value>,
    /// Document id to start from within `start_key`
    pub start_key_doc_id: Option<String>,
    /// Document id to end at within `end_key`
    pub end_key_doc_id: Option<String>,
    /// Index freshness
    pub stale: Option<Stale>,
    /// Maximum rows returned
    pub limit: Option<u64>,
    /// Rows skipped before returning
    pub skip: Option<u64>,
    /// Reverse row order
    pub descending: Option<bool>,
    /// Apply the reduce function (defaults to true when one exists)
    pub reduce: Option<bool>,
    /// Group reduce results by key
    pub group: Option<bool>,
    /// Group reduce results by array key prefix
    pub group_level: Option<u32>,
    /// Include rows equal to `end_key`
    pub inclusive_end: Option<bool>,
    /// Ask the engine to attach documents to rows
    pub include_docs: Option<bool>,
    /// Request debug output
    pub debug: Option<bool>,
    /// Failure handling
    pub on_error: Option<OnError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Param {
    Key,
    Keys,
    StartKey,
    EndKey,
    StartKeyDocId,
    EndKeyDocId,
    Stale,
    Limit,
    Skip,
    Descending,
    Reduce,
    Group,
    GroupLevel,
    InclusiveEnd,
    IncludeDocs,
    Debug,
    OnError,
}

/// Accepted parameter names.
const PARAMS: &[(&str, Param)] = &[
    ("key", Param::Key),
    ("keys", Param::Keys),
    ("startkey", Param::StartKey),
    ("startKey", Param::StartKey),
    ("rangeStart", Param::StartKey),
    ("endkey", Param::EndKey),
    ("endKey", Param::EndKey),
    ("rangeEnd", Param::EndKey),
    ("startkey_docid", Param::StartKeyDocId),
    ("startkeyDocID", Param::StartKeyDocId),
    ("endkey_docid", Param::EndKeyDocId),
    ("endkeyDocID", Param::EndKeyDocId),
    ("stale", Param::Stale),
    ("limit", Param::Limit),
    ("skip", Param::Skip),
    ("descending", Param::Descending),
    ("reduce", Param::Reduce),
    ("group", Param::Group),
    ("group_level", Param::GroupLevel),
    ("groupLevel", Param::GroupLevel),
    ("inclusive_end", Param::InclusiveEnd),
    ("inclusiveEnd", Param::InclusiveEnd),
    ("include_docs", Param::IncludeDocs),
    ("includeDocs", Param::IncludeDocs),
    ("debug", Param::Debug),
    ("on_error", Param::OnError),
    ("onError", Param::OnError),
];

impl ViewQuery {
    /// Empty query: every row, default ordering.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every entry of a request's `query` object.
    pub fn from_params(params: &Map<String, Value>) -> StoreResult<Self> {
        let mut query = ViewQuery::new();
        for (name, value) in params {
            query.bind(name, value)?;
        }
        Ok(query)
    }

    /// Bind one named parameter onto its typed setter.
    pub fn bind(&mut self, name: &str, value: &Value) -> StoreResult<&mut Self> {
        let param = PARAMS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| *p)
            .ok_or_else(|| StoreError::invalid_query(format!("unknown parameter '{}'", name)))?;

        match param {
            Param::Key => self.set_key(value.clone()),
            Param::Keys => {
                let keys = value
                    .as_array()
                    .ok_or_else(|| expected(name, "an array"))?
                    .clone();
                self.set_keys(keys)
            }
            Param::StartKey => self.set_start_key(value.clone()),
            Param::EndKey => self.set_end_key(value.clone()),
            Param::StartKeyDocId => self.set_start_key_doc_id(as_string(name, value)?),
            Param::EndKeyDocId => self.set_end_key_doc_id(as_string(name, value)?),
            Param::Stale => {
                let stale = match value {
                    Value::Bool(false) => Some(Stale::False),
                    Value::String(s) => Stale::parse(s),
                    _ => None,
                }
                .ok_or_else(|| expected(name, "one of ok, false, update_after"))?;
                self.set_stale(stale)
            }
            Param::Limit => self.set_limit(as_u64(name, value)?),
            Param::Skip => self.set_skip(as_u64(name, value)?),
            Param::Descending => self.set_descending(as_bool(name, value)?),
            Param::Reduce => self.set_reduce(as_bool(name, value)?),
            Param::Group => self.set_group(as_bool(name, value)?),
            Param::GroupLevel => {
                let level = u32::try_from(as_u64(name, value)?)
                    .map_err(|_| expected(name, "a group level that fits in 32 bits"))?;
                self.set_group_level(level)
            }
            Param::InclusiveEnd => self.set_inclusive_end(as_bool(name, value)?),
            Param::IncludeDocs => self.set_include_docs(as_bool(name, value)?),
            Param::Debug => self.set_debug(as_bool(name, value)?),
            Param::OnError => {
                let on_error = match value.as_str().map(str::to_ascii_lowercase).as_deref() {
                    Some("continue") => OnError::Continue,
                    Some("stop") => OnError::Stop,
                    _ => return Err(expected(name, "continue or stop")),
                };
                self.set_on_error(on_error)
            }
        };
        Ok(self)
    }

    // =========================================================================
    // Setters
    // =========================================================================

    /// Match a single key.
    pub fn set_key(&mut self, key: Value) -> &mut Self {
        self.key = Some(key);
        self
    }

    /// Match several keys.
    pub fn set_keys(&mut self, keys: Vec<Value>) -> &mut Self {
        self.keys = Some(keys);
        self
    }

    /// Range start.
    pub fn set_start_key(&mut self, key: Value) -> &mut Self {
        self.start_key = Some(key);
        self
    }

    /// Range end.
    pub fn set_end_key(&mut self, key: Value) -> &mut Self {
        self.end_key = Some(key);
        self
    }

    /// Range start document id.
    pub fn set_start_key_doc_id(&mut self, id: String) -> &mut Self {
        self.start_key_doc_id = Some(id);
        self
    }

    /// Range end document id.
    pub fn set_end_key_doc_id(&mut self, id: String) -> &mut Self {
        self.end_key_doc_id = Some(id);
        self
    }

    /// Index freshness.
    pub fn set_stale(&mut self, stale: Stale) -> &mut Self {
        self.stale = Some(stale);
        self
    }

    /// Row limit.
    pub fn set_limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    /// Rows to skip.
    pub fn set_skip(&mut self, skip: u64) -> &mut Self {
        self.skip = Some(skip);
        self
    }

    /// Reverse order.
    pub fn set_descending(&mut self, descending: bool) -> &mut Self {
        self.descending = Some(descending);
        self
    }

    /// Toggle reduce.
    pub fn set_reduce(&mut self, reduce: bool) -> &mut Self {
        self.reduce = Some(reduce);
        self
    }

    /// Group by key.
    pub fn set_group(&mut self, group: bool) -> &mut Self {
        self.group = Some(group);
        self
    }

    /// Group by array key prefix.
    pub fn set_group_level(&mut self, level: u32) -> &mut Self {
        self.group_level = Some(level);
        self
    }

    /// Include the end key.
    pub fn set_inclusive_end(&mut self, inclusive: bool) -> &mut Self {
        self.inclusive_end = Some(inclusive);
        self
    }

    /// Attach documents.
    pub fn set_include_docs(&mut self, include: bool) -> &mut Self {
        self.include_docs = Some(include);
        self
    }

    /// Debug output.
    pub fn set_debug(&mut self, debug: bool) -> &mut Self {
        self.debug = Some(debug);
        self
    }

    /// Failure handling.
    pub fn set_on_error(&mut self, on_error: OnError) -> &mut Self {
        self.on_error = Some(on_error);
        self
    }
}

fn expected(name: &str, what: &str) -> StoreError {
    StoreError::invalid_query(format!("parameter '{}' must be {}", name, what))
}

fn as_bool(name: &str, value: &Value) -> StoreResult<bool> {
    value.as_bool().ok_or_else(|| expected(name, "a boolean"))
}

fn as_u64(name: &str, value: &Value) -> StoreResult<u64> {
    value
        .as_u64()
        .ok_or_else(|| expected(name, "a non-negative integer"))
}

fn as_string(name: &str, value: &Value) -> StoreResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| expected(name, "a string"))
}

// =============================================================================
// Key collation
// =============================================================================

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// View key ordering: null < false < true < numbers < strings < arrays < objects.
///
/// Arrays compare element-wise, objects entry-wise (key then value), shorter
/// first on a common prefix.
pub fn collate(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = collate(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ord = lk.cmp(rk).then_with(|| collate(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}
