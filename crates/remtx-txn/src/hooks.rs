//! Participant callbacks the storage layer plugs into the manager.

use remtx_error::Result;

use crate::transaction::Transaction;

/// Called by the manager at each lifecycle edge of a transaction.
///
/// A storage adapter implements this to flush on commit and discard on abort.
/// An `on_commit` failure fails the unit of work (the manager aborts next);
/// an `on_abort` failure is reported as the abort failure, and the
/// transaction is marked aborted regardless.
pub trait TransactionHooks {
    fn on_begin(&mut self, _txn: &Transaction) -> Result<()> {
        Ok(())
    }

    fn on_commit(&mut self, _txn: &Transaction) -> Result<()> {
        Ok(())
    }

    fn on_abort(&mut self, _txn: &Transaction) -> Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing; the default for managers without storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl TransactionHooks for NoopHooks {}
