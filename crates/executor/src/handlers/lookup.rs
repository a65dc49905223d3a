//! Key lookups: find_by_id and find_by_ids.

use std::sync::Arc;

use docbus_core::Expiration;
use docbus_engine::StoreAdapter;
use serde_json::Map;

use super::decode_body;
use crate::action::FindMode;
use crate::{Error, Output, Result};

/// Handle find_by_id.
///
/// For `lock` the returned CAS is the lock token.
pub async fn find_by_id(
    store: &Arc<StoreAdapter>,
    id: String,
    mode: FindMode,
    expiration: Expiration,
) -> Result<Output> {
    let found = match mode {
        FindMode::Standard => store.gets(&id).await?,
        FindMode::Lock => store.get_and_lock(&id, expiration).await?,
        FindMode::Touch => store.get_and_touch(&id, expiration).await?,
    };
    let found = found.ok_or(Error::NotFound)?;
    Ok(Output::Document {
        id,
        cas: found.cas,
        document: decode_body(found.value),
    })
}

/// Handle find_by_ids. Misses are dropped; no hits at all is `not found`.
pub async fn find_by_ids(store: &Arc<StoreAdapter>, ids: Vec<String>) -> Result<Output> {
    let hits = store.get_bulk(&ids).await?;
    if hits.is_empty() {
        return Err(Error::NotFound);
    }
    let docs: Map<_, _> = hits
        .into_iter()
        .map(|(id, raw)| (id, decode_body(raw)))
        .collect();
    Ok(Output::Documents(docs))
}
