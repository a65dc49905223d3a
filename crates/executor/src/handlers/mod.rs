//! Action handlers organized by category.
//!
//! | Module | Actions |
//! |--------|---------|
//! | `document` | insert, save, update, delete |
//! | `lookup` | find_by_id, find_by_ids |
//! | `view` | find_by_view |
//! | `conditional` | cas, counter, unlock, touch |
//!
//! Each handler issues exactly one store operation per request (view
//! queries add a single bulk read) and never retries.

pub mod conditional;
pub mod document;
pub mod lookup;
pub mod view;

use serde_json::Value;

/// Stored bodies are JSON; anything else is handed back as a JSON string.
pub(crate) fn decode_body(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}
