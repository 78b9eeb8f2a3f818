//! Public API facade for remtx.
//!
//! Re-exports the workspace crates and adds [`RuntimeConfig`] and
//! [`Session`], which wire a transaction manager to a set of dispatch
//! collaborators.

pub mod config;
pub mod session;

pub use config::{KEY_EVENT_LOG_CAPACITY, ObservabilityConfig, RuntimeConfig};
pub use session::Session;

pub use remtx_dispatch as dispatch;
pub use remtx_error::{ErrorKind, RemtxError, Result};
pub use remtx_memory as memory;
pub use remtx_observability as observability;
pub use remtx_txn as txn;
pub use remtx_types as types;

pub use remtx_dispatch::{ActionDispatcher, DispatchConfig, DispatchContext};
pub use remtx_txn::{TransactionManager, TransactionState, TransactionalClosure};
pub use remtx_types::{
    ActionDescriptor, ActionId, ActionValue, AuthContext, ExecutionLocale, ObjectHandle, ObjectId,
};
