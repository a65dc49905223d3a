//! View indexing and query evaluation
//!
//! The memory store cannot run JavaScript. A map function is understood when
//! its `emit` call has the shape
//!
//! ```text
//! emit(doc.a.b, <value>)         // scalar key from a document path
//! emit([doc.a, doc.b], <value>)  // compound key
//! emit(meta.id, <value>)         // document id as key
//! ```
//!
//! where `<value>` is absent, `null`, a document path, `meta.id` or a JSON
//! literal. Documents missing a key path emit nothing. A path that walks
//! into a string, number or boolean (`doc.name.length`) is a JavaScript
//! property access and fails with [`UnsupportedPath`]. Anything else needs a
//! native [`Indexer`] registered for the view.
//!
//! Reduce supports the built-ins `_count` and `_sum`.
//!
//! Indexes are rebuilt on every query, so every staleness setting observes
//! the latest writes.

use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;

use docbus_core::{collate, StoreError, StoreResult, ViewQuery, ViewResponse, ViewRow};

/// Native map function: `(doc id, document) -> [(key, value)]`
pub type Indexer = Arc<dyn Fn(&str, &Value) -> Vec<(Value, Value)> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Path(Vec<String>),
    MetaId,
    Literal(Value),
    Array(Vec<Expr>),
}

impl Expr {
    fn parse(src: &str) -> Option<Expr> {
        let src = src.trim();
        if src.is_empty() || src == "null" {
            return Some(Expr::Literal(Value::Null));
        }
        if src == "meta.id" {
            return Some(Expr::MetaId);
        }
        if let Some(path) = src.strip_prefix("doc.") {
            let segments: Vec<String> = path.split('.').map(|s| s.trim().to_string()).collect();
            if segments.iter().any(|s| s.is_empty() || !is_identifier(s)) {
                return None;
            }
            return Some(Expr::Path(segments));
        }
        if let Some(inner) = src.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if inner.contains("doc.") || inner.contains("meta.id") {
                let items = split_top_level(inner)
                    .into_iter()
                    .map(Expr::parse)
                    .collect::<Option<Vec<_>>>()?;
                return Some(Expr::Array(items));
            }
        }
        serde_json::from_str(src).ok().map(Expr::Literal)
    }

    /// `Ok(None)` when the document lacks the path.
    fn eval(&self, id: &str, doc: &Value) -> Result<Option<Value>, UnsupportedPath> {
        match self {
            Expr::Path(segments) => {
                let mut current = doc;
                for seg in segments {
                    let next = match current {
                        Value::Object(map) => map.get(seg),
                        Value::Null => None,
                        Value::Array(items) => match seg.parse::<usize>() {
                            Ok(index) => items.get(index),
                            Err(_) => return Err(UnsupportedPath::new(segments, seg)),
                        },
                        _ => return Err(UnsupportedPath::new(segments, seg)),
                    };
                    match next {
                        Some(next) => current = next,
                        None => return Ok(None),
                    }
                }
                Ok(Some(current.clone()))
            }
            Expr::MetaId => Ok(Some(Value::String(id.to_string()))),
            Expr::Literal(v) => Ok(Some(v.clone())),
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match item.eval(id, doc)? {
                        Some(v) => values.push(v),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::Array(values)))
            }
        }
    }
}

/// A document path that reads a property of a scalar value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedPath {
    /// The full path, `doc.`-prefixed
    pub path: String,
    /// The segment that could not be resolved
    pub property: String,
}

impl UnsupportedPath {
    fn new(segments: &[String], property: &str) -> Self {
        UnsupportedPath {
            path: format!("doc.{}", segments.join(".")),
            property: property.to_string(),
        }
    }
}

impl std::fmt::Display for UnsupportedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' reads property '{}' of a scalar", self.path, self.property)
    }
}

fn is_identifier(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Split on commas that are not nested inside brackets, braces or strings.
fn split_top_level(src: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut start = 0;
    for (i, c) in src.char_indices() {
        match (in_string, c) {
            (Some(q), c) if c == q => in_string = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => in_string = Some(c),
            (None, '[') | (None, '{') | (None, '(') => depth += 1,
            (None, ']') | (None, '}') | (None, ')') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(&src[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&src[start..]);
    parts
}

/// Text between `emit(` and its matching `)`.
fn emit_arguments(map: &str) -> Option<&str> {
    let open = map.find("emit(")? + "emit(".len();
    let mut depth = 1i32;
    for (i, c) in map[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&map[open..open + i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// The emit rule extracted from a map function source.
#[derive(Debug, Clone, PartialEq)]
pub struct MapRule {
    key: Expr,
    value: Expr,
}

impl MapRule {
    /// Parse a map function, or `None` when its shape is not understood.
    pub fn parse(map: &str) -> Option<Self> {
        let args = split_top_level(emit_arguments(map)?);
        let key = Expr::parse(args.first()?)?;
        if matches!(key, Expr::Literal(Value::Null)) {
            return None;
        }
        let value = match args.get(1) {
            Some(src) => Expr::parse(src)?,
            None => Expr::Literal(Value::Null),
        };
        Some(MapRule { key, value })
    }

    /// Rows emitted for one document.
    pub fn emit(&self, id: &str, doc: &Value) -> Result<Vec<(Value, Value)>, UnsupportedPath> {
        match self.key.eval(id, doc)? {
            Some(key) => {
                let value = self.value.eval(id, doc)?.unwrap_or(Value::Null);
                Ok(vec![(key, value)])
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Built-in reduce functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// Row count
    Count,
    /// Sum of numeric values
    Sum,
}

impl Reducer {
    /// Recognize a built-in reduce. Custom reduce sources yield an error.
    pub fn parse(source: &str) -> StoreResult<Self> {
        match source.trim() {
            "_count" => Ok(Reducer::Count),
            "_sum" => Ok(Reducer::Sum),
            other => Err(StoreError::invalid_query(format!(
                "reduce function '{}' is not supported; query with reduce=false",
                other
            ))),
        }
    }

    fn apply(self, rows: &[ViewRow]) -> Value {
        match self {
            Reducer::Count => Value::from(rows.len() as u64),
            Reducer::Sum => {
                let sum: f64 = rows.iter().filter_map(|r| r.value.as_f64()).sum();
                if sum.fract() == 0.0 && sum.abs() < i64::MAX as f64 {
                    Value::from(sum as i64)
                } else {
                    Value::from(sum)
                }
            }
        }
    }
}

fn group_key(key: &Value, level: Option<u32>) -> Value {
    match (key, level) {
        (Value::Array(items), Some(level)) => {
            Value::Array(items.iter().take(level as usize).cloned().collect())
        }
        _ => key.clone(),
    }
}

/// Apply a query to freshly emitted rows.
pub fn evaluate(
    mut rows: Vec<ViewRow>,
    reducer: Option<Reducer>,
    query: &ViewQuery,
) -> StoreResult<ViewResponse> {
    rows.sort_by(|a, b| collate(&a.key, &b.key).then_with(|| a.id.cmp(&b.id)));
    let total_rows = rows.len() as u64;

    let descending = query.descending.unwrap_or(false);
    if descending {
        rows.reverse();
    }
    // Order in the direction of iteration
    let dir = |a: &Value, b: &Value| -> Ordering {
        if descending {
            collate(b, a)
        } else {
            collate(a, b)
        }
    };
    let id_dir = |a: &str, b: &str| -> Ordering {
        if descending {
            b.cmp(a)
        } else {
            a.cmp(b)
        }
    };

    let mut selected: Vec<ViewRow> = if let Some(keys) = &query.keys {
        keys.iter()
            .flat_map(|k| {
                rows.iter()
                    .filter(move |r| collate(&r.key, k) == Ordering::Equal)
                    .cloned()
            })
            .collect()
    } else if let Some(key) = &query.key {
        rows.into_iter()
            .filter(|r| collate(&r.key, key) == Ordering::Equal)
            .collect()
    } else {
        let inclusive_end = query.inclusive_end.unwrap_or(true);
        rows.into_iter()
            .filter(|r| {
                let row_id = r.id.as_deref().unwrap_or("");
                let after_start = match &query.start_key {
                    None => true,
                    Some(start) => match dir(&r.key, start) {
                        Ordering::Greater => true,
                        Ordering::Less => false,
                        Ordering::Equal => match &query.start_key_doc_id {
                            Some(doc_id) => id_dir(row_id, doc_id) != Ordering::Less,
                            None => true,
                        },
                    },
                };
                let before_end = match &query.end_key {
                    None => true,
                    Some(end) => match dir(&r.key, end) {
                        Ordering::Less => true,
                        Ordering::Greater => false,
                        Ordering::Equal => match &query.end_key_doc_id {
                            Some(doc_id) => match id_dir(row_id, doc_id) {
                                Ordering::Less => true,
                                Ordering::Equal => inclusive_end,
                                Ordering::Greater => false,
                            },
                            None => inclusive_end,
                        },
                    },
                };
                after_start && before_end
            })
            .collect()
    };

    if let Some(reducer) = reducer.filter(|_| query.reduce.unwrap_or(true)) {
        let grouping = query.group.unwrap_or(false) || query.group_level.is_some();
        selected = if grouping {
            let mut groups: Vec<(Value, Vec<ViewRow>)> = Vec::new();
            for row in selected {
                let key = group_key(&row.key, query.group_level);
                match groups.last_mut() {
                    Some((k, members)) if collate(k, &key) == Ordering::Equal => members.push(row),
                    _ => groups.push((key, vec![row])),
                }
            }
            groups
                .into_iter()
                .map(|(key, members)| ViewRow {
                    id: None,
                    key,
                    value: reducer.apply(&members),
                })
                .collect()
        } else {
            vec![ViewRow {
                id: None,
                key: Value::Null,
                value: reducer.apply(&selected),
            }]
        };
    }

    let skip = query.skip.unwrap_or(0) as usize;
    let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
    let rows = selected.into_iter().skip(skip).take(limit).collect();

    Ok(ViewResponse { rows, total_rows })
}
