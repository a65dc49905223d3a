//! Conditional and counter actions: cas, counter, unlock, touch.
//!
//! These are only routed when the dispatcher runs the extended action set.

use std::sync::Arc;

use docbus_core::{Cas, CounterOp, Durability, Expiration};
use docbus_engine::StoreAdapter;

use crate::{Output, Result};

/// Handle cas. The raw value is stored as given.
pub async fn cas(
    store: &Arc<StoreAdapter>,
    key: String,
    cas: Cas,
    value: String,
    durability: Durability,
    expiration: Expiration,
) -> Result<Output> {
    let cas = store.cas(&key, cas, expiration, value, durability).await?;
    Ok(Output::Cas { key, cas })
}

/// Handle counter.
pub async fn counter(
    store: &Arc<StoreAdapter>,
    key: String,
    op: CounterOp,
    by: u64,
    default: u64,
    expiration: Expiration,
) -> Result<Output> {
    let value = store.counter(&key, op, by, default, expiration).await?;
    Ok(Output::Counter { key, value })
}

/// Handle unlock.
pub async fn unlock(store: &Arc<StoreAdapter>, key: String, cas: Cas) -> Result<Output> {
    store.unlock(&key, cas).await?;
    Ok(Output::Key { key })
}

/// Handle touch.
pub async fn touch(store: &Arc<StoreAdapter>, key: String, expiration: Expiration) -> Result<Output> {
    store.touch(&key, expiration).await?;
    Ok(Output::Key { key })
}
