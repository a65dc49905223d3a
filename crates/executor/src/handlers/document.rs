//! Document write handlers.
//!
//! - insert: add, fails when the id exists
//! - save: set, or a CAS write when `cas` is given
//! - update: replace, or a CAS write when `cas` is given
//! - delete: remove, conditional on `cas` when given

use std::sync::Arc;

use docbus_engine::StoreAdapter;
use serde_json::Value;

use crate::action::{DocumentWrite, WriteKind};
use crate::{Output, Result};

/// Handle insert, save, update and delete.
pub async fn write(store: &Arc<StoreAdapter>, w: DocumentWrite) -> Result<Output> {
    let DocumentWrite {
        kind,
        id,
        document,
        durability,
        expiration,
        cas,
    } = w;
    let body = Value::Object(document).to_string();

    let new_cas = match (kind, cas) {
        (WriteKind::Insert, _) => store.add(&id, expiration, body, durability).await?,
        (WriteKind::Save, None) => store.set(&id, expiration, body, durability).await?,
        (WriteKind::Update, None) => store.replace(&id, expiration, body, durability).await?,
        (WriteKind::Save | WriteKind::Update, Some(cas)) => {
            store.cas(&id, cas, expiration, body, durability).await?
        }
        (WriteKind::Delete, cas) => {
            store.delete(&id, cas, durability).await?;
            return Ok(Output::Deleted { id });
        }
    };
    Ok(Output::Written { id, cas: new_cas })
}
