//! # docbus executor
//!
//! Request layer of the docbus persistor. It provides:
//! - [`Dispatcher`] - decodes request messages and routes them to handlers
//! - [`Action`]/[`Output`]/[`Reply`] - typed request, result and envelope
//! - [`EventBus`] - in-process address registry with request/reply
//! - [`Persistor`] - provisioning plus bus registration
//!
//! ## Quick Start
//!
//! ```text
//! let bus = EventBus::new();
//! let persistor = Persistor::start(&config, &cluster, &bus).await?;
//! let reply = bus.send(persistor.address(), json!({
//!     "action": "insert",
//!     "document": {"name": "ada"}
//! })).await?;
//! ```
//!
//! ## Actions
//!
//! | Set | Actions |
//! |-----|---------|
//! | baseline | insert, save, update, delete, find_by_id, find_by_ids, find_by_view |
//! | extended | baseline plus cas, counter, unlock, touch |

#![warn(missing_docs)]

pub mod action;
pub mod bus;
mod convert;
pub mod dispatcher;
mod error;
mod handlers;
mod output;
pub mod persistor;
mod reply;

#[cfg(test)]
mod tests;

pub use action::{Action, ActionKind, DocumentWrite, FindMode, WriteKind};
pub use bus::{BusError, EventBus, MessageHandler};
pub use dispatcher::Dispatcher;
pub use docbus_engine::ActionSet;
pub use error::Error;
pub use output::Output;
pub use persistor::{Persistor, StartError};
pub use reply::Reply;

/// Result type for request handling
pub type Result<T> = std::result::Result<T, Error>;
