//! The unit-of-work abstraction run by [`TransactionManager`].

use remtx_error::{RemtxError, Result};

use crate::manager::TransactionManager;

/// A unit of work with lifecycle hooks.
///
/// `pre_execute` and `execute` always run; exactly one of `on_success` and
/// `on_failure` runs afterwards. `on_failure` runs before any abort.
///
/// Both executing hooks receive the manager, so the body can reach the
/// transaction's sinks and make nested transactional calls.
pub trait TransactionalClosure {
    type Output;

    fn pre_execute(&mut self, _tm: &mut TransactionManager) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, tm: &mut TransactionManager) -> Result<Self::Output>;

    fn on_success(&mut self) {}

    fn on_failure(&mut self) {}
}

/// Adapts a plain `FnOnce` into a [`TransactionalClosure`] with no-op hooks.
pub struct FnClosure<F> {
    body: Option<F>,
}

impl<F> FnClosure<F> {
    pub fn new(body: F) -> Self {
        Self { body: Some(body) }
    }
}

impl<T, F> TransactionalClosure for FnClosure<F>
where
    F: FnOnce(&mut TransactionManager) -> Result<T>,
{
    type Output = T;

    fn execute(&mut self, tm: &mut TransactionManager) -> Result<T> {
        let body = self
            .body
            .take()
            .ok_or_else(|| RemtxError::action("closure already executed"))?;
        body(tm)
    }
}
