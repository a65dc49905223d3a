//! find_by_view: view query followed by one bulk read.
//!
//! Rows are materialized in row order. A document emitted by several rows
//! appears once per row. Reduced rows carry no id and are skipped, as are
//! rows whose document was removed between the two reads.

use std::collections::HashSet;
use std::sync::Arc;

use docbus_core::ViewQuery;
use docbus_engine::StoreAdapter;

use super::decode_body;
use crate::{Output, Result};

/// Handle find_by_view.
pub async fn find_by_view(
    store: &Arc<StoreAdapter>,
    design_doc: String,
    view_name: String,
    query: ViewQuery,
) -> Result<Output> {
    let response = store.query_view(&design_doc, &view_name, &query).await?;

    let mut seen = HashSet::new();
    let ids: Vec<String> = response
        .rows
        .iter()
        .filter_map(|row| row.id.clone())
        .filter(|id| seen.insert(id.clone()))
        .collect();
    if ids.is_empty() {
        return Ok(Output::Rows(Vec::new()));
    }

    let docs = store.get_bulk(&ids).await?;
    let rows = response
        .rows
        .iter()
        .filter_map(|row| row.id.as_ref().and_then(|id| docs.get(id)))
        .map(|raw| decode_body(raw.clone()))
        .collect();
    Ok(Output::Rows(rows))
}
