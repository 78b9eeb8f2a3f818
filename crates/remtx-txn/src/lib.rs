//! Transaction management for remtx sessions.
//!
//! A [`TransactionManager`] owns at most one in-progress [`Transaction`] and
//! flattens nested [`TransactionManager::run_within_transaction`] calls into
//! it: only the outermost call begins and ends the transaction. Each
//! transaction carries a [`MessageSink`] and an [`UpdateNotifier`] that work
//! running inside it writes to.

pub mod closure;
pub mod config;
pub mod hooks;
pub mod manager;
pub mod messages;
pub mod notifier;
pub mod transaction;

pub use closure::{FnClosure, TransactionalClosure};
pub use config::{DEFAULT_MAX_NESTING_DEPTH, KEY_MAX_NESTING_DEPTH, ManagerConfig};
pub use hooks::{NoopHooks, TransactionHooks};
pub use manager::{ManagerStats, TransactionManager, TransactionSnapshot};
pub use messages::MessageSink;
pub use notifier::UpdateNotifier;
pub use transaction::{Transaction, TransactionState};
