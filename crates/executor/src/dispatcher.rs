//! The Dispatcher - single entry point for request messages.
//!
//! Routing order:
//! 1. `action` missing or not a string: `action must be specified`
//! 2. unknown or disabled action: `Invalid action: <action>`
//! 3. field validation (see [`Action::decode`])
//! 4. handler, run on its own task
//!
//! A handler that panics only loses its own task; the dispatcher turns the
//! join failure into an error reply and keeps serving.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use docbus_engine::{ActionSet, StoreAdapter};

use crate::action::{Action, ActionKind};
use crate::handlers::{conditional, document, lookup, view};
use crate::{Error, Output, Reply, Result};

/// Routes decoded actions to their handlers.
///
/// # Thread Safety
///
/// Cheap to clone and safe to share; every clone uses the same adapter.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<StoreAdapter>,
    actions: ActionSet,
}

impl Dispatcher {
    /// Create a dispatcher over a provisioned adapter.
    pub fn new(store: Arc<StoreAdapter>, actions: ActionSet) -> Self {
        Self { store, actions }
    }

    /// Enabled action set
    pub fn actions(&self) -> ActionSet {
        self.actions
    }

    /// Whether `kind` is routed under the current action set.
    pub fn is_enabled(&self, kind: ActionKind) -> bool {
        match self.actions {
            ActionSet::Extended => true,
            ActionSet::Baseline => !kind.is_extended(),
        }
    }

    /// Route and validate a request without running it.
    pub fn decode(&self, request: &Value) -> Result<Action> {
        let fields = request.as_object().ok_or(Error::MissingAction)?;
        let name = fields
            .get("action")
            .and_then(Value::as_str)
            .ok_or(Error::MissingAction)?;
        let kind = ActionKind::from_name(name)
            .filter(|k| self.is_enabled(*k))
            .ok_or_else(|| Error::InvalidAction {
                action: name.to_string(),
            })?;
        Action::decode(kind, fields)
    }

    /// Handle one request. Always yields exactly one reply.
    pub async fn dispatch(&self, request: Value) -> Reply {
        let action = match self.decode(&request) {
            Ok(action) => action,
            Err(e) => {
                debug!(target: "docbus::dispatch", error = %e, "Request rejected");
                return Reply::error(&e);
            }
        };
        let name = action.kind().name();
        debug!(target: "docbus::dispatch", action = name, "Dispatching");

        let task = tokio::spawn(execute(Arc::clone(&self.store), action));
        match task.await {
            Ok(result) => {
                if let Err(e) = &result {
                    debug!(target: "docbus::dispatch", action = name, error = %e, "Action failed");
                }
                Reply::from(result)
            }
            Err(join) => {
                let reason = if join.is_panic() {
                    "handler panicked"
                } else {
                    "handler cancelled"
                };
                error!(target: "docbus::dispatch", action = name, reason, "Handler task aborted");
                Reply::error(&Error::Internal {
                    reason: reason.to_string(),
                })
            }
        }
    }
}

/// Run a decoded action against the store.
pub async fn execute(store: Arc<StoreAdapter>, action: Action) -> Result<Output> {
    match action {
        Action::Write(w) => document::write(&store, w).await,
        Action::FindById {
            id,
            mode,
            expiration,
        } => lookup::find_by_id(&store, id, mode, expiration).await,
        Action::FindByIds { ids } => lookup::find_by_ids(&store, ids).await,
        Action::FindByView {
            design_doc,
            view_name,
            query,
        } => view::find_by_view(&store, design_doc, view_name, query).await,
        Action::Cas {
            key,
            cas,
            value,
            durability,
            expiration,
        } => conditional::cas(&store, key, cas, value, durability, expiration).await,
        Action::Counter {
            key,
            op,
            by,
            default,
            expiration,
        } => conditional::counter(&store, key, op, by, default, expiration).await,
        Action::Unlock { key, cas } => conditional::unlock(&store, key, cas).await,
        Action::Touch { key, expiration } => conditional::touch(&store, key, expiration).await,
    }
}
