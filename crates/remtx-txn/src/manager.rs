//! Transaction manager: begin/commit/abort with nested-call flattening.
//!
//! One manager serves one logical session. It holds at most one
//! non-terminal [`Transaction`] and an explicit depth counter of active
//! [`TransactionManager::run_within_transaction`] frames. Only the frame that
//! began the transaction ends it, so every outermost call produces exactly
//! one begin and exactly one commit-or-abort regardless of nesting.

use remtx_error::{RemtxError, Result};
use remtx_types::{AuthContext, TxnId};
use serde::Serialize;

use crate::closure::{FnClosure, TransactionalClosure};
use crate::config::ManagerConfig;
use crate::hooks::{NoopHooks, TransactionHooks};
use crate::messages::MessageSink;
use crate::notifier::UpdateNotifier;
use crate::transaction::{Transaction, TransactionState};

// ---------------------------------------------------------------------------
// Statistics / debug snapshot
// ---------------------------------------------------------------------------

/// Lifetime counters of one manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub begun: u64,
    pub committed: u64,
    pub aborted: u64,
    /// Aborts whose participant hook failed.
    pub abort_failures: u64,
}

/// Serializable view of a manager for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionSnapshot {
    pub txn_id: Option<TxnId>,
    pub state: Option<TransactionState>,
    pub depth: usize,
    pub messages: usize,
    pub warnings: usize,
    pub changed_objects: usize,
    pub disposed_objects: usize,
    pub abort_cause: Option<String>,
    pub session_user: Option<String>,
    pub stats: ManagerStats,
}

// ---------------------------------------------------------------------------
// TransactionManager
// ---------------------------------------------------------------------------

/// Owns the current transaction's lifecycle for one session.
pub struct TransactionManager {
    config: ManagerConfig,
    hooks: Box<dyn TransactionHooks>,
    /// Current or most recently completed transaction.
    transaction: Option<Transaction>,
    /// Number of active `run_within_transaction` frames.
    depth: usize,
    /// `None` once the id space is exhausted.
    next_txn_id: Option<TxnId>,
    session: Option<AuthContext>,
    stats: ManagerStats,
}

impl TransactionManager {
    /// Create a manager with no storage participant.
    #[must_use]
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_hooks(config, Box::new(NoopHooks))
    }

    /// Create a manager whose transactions drive `hooks`.
    #[must_use]
    pub fn with_hooks(config: ManagerConfig, hooks: Box<dyn TransactionHooks>) -> Self {
        Self {
            config,
            hooks,
            transaction: None,
            depth: 0,
            next_txn_id: Some(TxnId::FIRST),
            session: None,
            stats: ManagerStats::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // -- session association ------------------------------------------------

    /// Associate the manager with a session.
    pub fn open(&mut self, session: AuthContext) {
        tracing::debug!(
            user = %session.user,
            session_id = %session.session_id,
            "transaction manager opened"
        );
        self.session = Some(session);
    }

    #[must_use]
    pub fn session(&self) -> Option<&AuthContext> {
        self.session.as_ref()
    }

    /// Abort any in-progress transaction and drop the session association.
    ///
    /// Never fails: an abort failure here is logged and suppressed so that
    /// teardown always completes.
    pub fn close(&mut self) {
        if self.is_in_transaction() {
            if let Err(err) = self.abort_transaction() {
                tracing::error!(error = %err, "failure during abort on close");
            }
        }
        self.session = None;
    }

    // -- inspection ---------------------------------------------------------

    /// The in-progress or most recently completed transaction.
    #[must_use]
    pub fn current_transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    /// True iff a transaction exists and has not completed.
    #[must_use]
    pub fn is_in_transaction(&self) -> bool {
        self.transaction
            .as_ref()
            .is_some_and(|txn| !txn.is_complete())
    }

    /// Number of active `run_within_transaction` frames.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        self.stats
    }

    /// The in-progress transaction, mutably.
    pub fn active_transaction_mut(&mut self) -> Result<&mut Transaction> {
        match self.transaction.as_mut() {
            Some(txn) if !txn.is_complete() => Ok(txn),
            _ => Err(RemtxError::NoActiveTransaction),
        }
    }

    /// Message sink of the in-progress transaction.
    pub fn message_sink_mut(&mut self) -> Result<&mut MessageSink> {
        Ok(self.active_transaction_mut()?.messages_mut())
    }

    /// Update notifier of the in-progress transaction.
    pub fn update_notifier_mut(&mut self) -> Result<&mut UpdateNotifier> {
        Ok(self.active_transaction_mut()?.updates_mut())
    }

    #[must_use]
    pub fn debug_snapshot(&self) -> TransactionSnapshot {
        let txn = self.transaction.as_ref();
        TransactionSnapshot {
            txn_id: txn.map(Transaction::id),
            state: txn.map(Transaction::state),
            depth: self.depth,
            messages: txn.map_or(0, |t| t.messages().messages().len()),
            warnings: txn.map_or(0, |t| t.messages().warnings().len()),
            changed_objects: txn.map_or(0, |t| t.updates().changed().len()),
            disposed_objects: txn.map_or(0, |t| t.updates().disposed().len()),
            abort_cause: txn.and_then(|t| t.abort_cause().map(str::to_owned)),
            session_user: self.session.as_ref().map(|s| s.user.clone()),
            stats: self.stats,
        }
    }

    // -- explicit lifecycle -------------------------------------------------

    /// Begin a new transaction.
    ///
    /// # Errors
    ///
    /// [`RemtxError::TransactionAlreadyActive`] if one is in progress; the
    /// `on_begin` hook's error if it fails (the transaction is then aborted).
    pub fn start_transaction(&mut self) -> Result<TxnId> {
        if self.is_in_transaction() {
            return Err(RemtxError::TransactionAlreadyActive);
        }
        let id = self
            .next_txn_id
            .ok_or_else(|| RemtxError::action("transaction id space exhausted"))?;
        self.next_txn_id = id.checked_next();

        let mut txn = Transaction::new(id);
        txn.begin();
        self.stats.begun += 1;

        if let Err(err) = self.hooks.on_begin(&txn) {
            txn.abort();
            self.stats.aborted += 1;
            self.transaction = Some(txn);
            tracing::warn!(txn_id = %id, error = %err, "transaction begin hook failed");
            return Err(err);
        }

        tracing::info!(txn_id = %id, "transaction begun");
        self.transaction = Some(txn);
        Ok(id)
    }

    /// Commit the in-progress transaction.
    ///
    /// If the commit cannot happen (flagged must-abort, or the commit hook
    /// fails) the transaction is aborted and the reason returned.
    pub fn end_transaction(&mut self) -> Result<()> {
        if !self.is_in_transaction() {
            return Err(RemtxError::NoActiveTransaction);
        }
        self.commit_current()
            .map_err(|err| self.abort_after_failure(err))
    }

    /// Abort the in-progress transaction.
    ///
    /// The transaction ends `Aborted` even if the abort hook fails; the hook
    /// failure is returned.
    pub fn abort_transaction(&mut self) -> Result<()> {
        let Some(txn) = self.transaction.as_mut().filter(|t| !t.is_complete()) else {
            return Err(RemtxError::NoActiveTransaction);
        };
        let id = txn.id();
        let hook_result = self.hooks.on_abort(txn);
        txn.abort();
        self.stats.aborted += 1;
        match hook_result {
            Ok(()) => {
                tracing::info!(txn_id = %id, "transaction aborted");
                Ok(())
            }
            Err(err) => {
                self.stats.abort_failures += 1;
                tracing::error!(txn_id = %id, error = %err, "transaction abort hook failed");
                Err(err)
            }
        }
    }

    /// Flag the in-progress transaction so that it can only end by aborting.
    pub fn mark_must_abort(&mut self, reason: impl Into<String>) -> Result<()> {
        let txn = self.active_transaction_mut()?;
        let reason = reason.into();
        tracing::info!(txn_id = %txn.id(), %reason, "transaction flagged must-abort");
        txn.mark_must_abort(reason);
        Ok(())
    }

    // -- transactional execution --------------------------------------------

    /// Run `closure` inside a transaction.
    ///
    /// If no transaction is in progress one is begun first and ended when
    /// this call returns: committed on success, aborted on failure. If one is
    /// in progress the call joins it and does no begin/end bookkeeping.
    ///
    /// On failure `on_failure` runs first; then, only in the frame that began
    /// the transaction, exactly one abort is attempted. If that abort fails
    /// the result is [`RemtxError::AbortFailure`] with the original failure
    /// as its source; otherwise the original failure is returned unchanged.
    pub fn run_within_transaction<C>(&mut self, closure: &mut C) -> Result<C::Output>
    where
        C: TransactionalClosure + ?Sized,
    {
        let in_txn = self.is_in_transaction();
        if self.depth > 0 && !in_txn {
            // An inner frame already ended the transaction.
            return Err(RemtxError::NoActiveTransaction);
        }
        if self.depth >= self.config.max_nesting_depth {
            return Err(RemtxError::NestingTooDeep {
                max: self.config.max_nesting_depth,
            });
        }

        let owns = !in_txn;
        if owns {
            self.start_transaction()?;
        } else {
            tracing::debug!(depth = self.depth, "joining transaction in progress");
        }

        self.depth += 1;
        let outcome = match closure.pre_execute(self) {
            Ok(()) => closure.execute(self),
            Err(err) => Err(err),
        };
        self.depth -= 1;

        match outcome {
            Ok(value) => {
                if owns {
                    if let Err(err) = self.commit_owned() {
                        closure.on_failure();
                        return Err(self.abort_after_failure(err));
                    }
                }
                closure.on_success();
                Ok(value)
            }
            Err(err) => {
                closure.on_failure();
                if owns {
                    Err(self.abort_after_failure(err))
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Run a plain closure inside a transaction.
    pub fn run<T, F>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.run_within_transaction(&mut FnClosure::new(body))
    }

    // -- internals ----------------------------------------------------------

    /// End the transaction owned by the returning outermost frame.
    fn commit_owned(&mut self) -> Result<()> {
        match self.transaction.as_ref().map(Transaction::state) {
            Some(TransactionState::Committed) => Ok(()),
            Some(TransactionState::Aborted) | None => Err(RemtxError::TransactionRolledBack {
                reason: "aborted within the unit of work".to_owned(),
            }),
            Some(_) => self.commit_current(),
        }
    }

    /// Commit without aborting on failure; the caller decides what follows.
    fn commit_current(&mut self) -> Result<()> {
        let Some(txn) = self.transaction.as_mut() else {
            return Err(RemtxError::NoActiveTransaction);
        };
        if txn.state() == TransactionState::MustAbort {
            return Err(RemtxError::TransactionRolledBack {
                reason: txn.abort_cause().unwrap_or("flagged must-abort").to_owned(),
            });
        }
        self.hooks.on_commit(txn)?;
        txn.commit();
        self.stats.committed += 1;
        tracing::info!(txn_id = %txn.id(), "transaction committed");
        Ok(())
    }

    /// Attempt the single abort that follows `original`.
    fn abort_after_failure(&mut self, original: RemtxError) -> RemtxError {
        if !self.is_in_transaction() {
            return original;
        }
        match self.abort_transaction() {
            Ok(()) => original,
            Err(abort) => {
                tracing::error!(
                    error = %abort,
                    original = %original,
                    "abort failure after exception"
                );
                RemtxError::abort_failure(abort, original)
            }
        }
    }
}

impl Drop for TransactionManager {
    fn drop(&mut self) {
        if self.is_in_transaction() {
            self.close();
        }
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("transaction", &self.transaction)
            .field("depth", &self.depth)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::error::Error as _;
    use std::rc::Rc;

    use proptest::prelude::*;

    use super::*;

    type Log = Rc<RefCell<Vec<String>>>;

    fn mgr() -> TransactionManager {
        TransactionManager::new(ManagerConfig::default())
    }

    #[derive(Default)]
    struct RecordingHooks {
        log: Log,
        fail_begin: bool,
        fail_commit: bool,
        fail_abort: bool,
    }

    impl TransactionHooks for RecordingHooks {
        fn on_begin(&mut self, txn: &Transaction) -> Result<()> {
            self.log.borrow_mut().push(format!("begin {}", txn.id()));
            if self.fail_begin {
                return Err(RemtxError::hook("begin refused"));
            }
            Ok(())
        }

        fn on_commit(&mut self, txn: &Transaction) -> Result<()> {
            self.log.borrow_mut().push(format!("commit {}", txn.id()));
            if self.fail_commit {
                return Err(RemtxError::hook("flush failed"));
            }
            Ok(())
        }

        fn on_abort(&mut self, txn: &Transaction) -> Result<()> {
            self.log.borrow_mut().push(format!("abort {}", txn.id()));
            if self.fail_abort {
                return Err(RemtxError::hook("rollback failed"));
            }
            Ok(())
        }
    }

    fn recording(hooks: RecordingHooks) -> (TransactionManager, Log) {
        let log = Rc::clone(&hooks.log);
        (
            TransactionManager::with_hooks(ManagerConfig::default(), Box::new(hooks)),
            log,
        )
    }

    /// Closure that logs its hooks and optionally nests another one.
    struct Traced {
        name: &'static str,
        log: Log,
        fail: bool,
        inner: Option<Box<Traced>>,
    }

    impl Traced {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                log: Rc::clone(log),
                fail: false,
                inner: None,
            }
        }

        fn push(&self, event: &str) {
            self.log.borrow_mut().push(format!("{} {event}", self.name));
        }
    }

    impl TransactionalClosure for Traced {
        type Output = ();

        fn pre_execute(&mut self, _tm: &mut TransactionManager) -> Result<()> {
            self.push("pre");
            Ok(())
        }

        fn execute(&mut self, tm: &mut TransactionManager) -> Result<()> {
            self.push("execute");
            if let Some(inner) = self.inner.as_mut() {
                tm.run_within_transaction(inner.as_mut())?;
            }
            if self.fail {
                return Err(RemtxError::action(format!("{} failed", self.name)));
            }
            Ok(())
        }

        fn on_success(&mut self) {
            self.push("success");
        }

        fn on_failure(&mut self) {
            self.push("failure");
        }
    }

    fn nest(tm: &mut TransactionManager, remaining: usize, fail_at: Option<usize>) -> Result<()> {
        if fail_at == Some(remaining) {
            return Err(RemtxError::action("X"));
        }
        if remaining == 0 {
            return Ok(());
        }
        tm.run(|tm| nest(tm, remaining - 1, fail_at))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[test]
    fn fresh_manager_has_no_transaction() {
        let m = mgr();
        assert!(m.current_transaction().is_none());
        assert!(!m.is_in_transaction());
        assert_eq!(m.depth(), 0);
    }

    #[test]
    fn run_commits_and_retains_completed_transaction() {
        let mut m = mgr();
        let value = m
            .run(|tm| {
                assert!(tm.is_in_transaction());
                tm.message_sink_mut()?.add_message("done");
                Ok(42)
            })
            .unwrap();
        assert_eq!(value, 42);
        assert!(!m.is_in_transaction());
        let txn = m.current_transaction().expect("retained");
        assert_eq!(txn.state(), TransactionState::Committed);
        assert_eq!(txn.messages().messages(), ["done"]);
        assert_eq!(
            m.stats(),
            ManagerStats {
                begun: 1,
                committed: 1,
                aborted: 0,
                abort_failures: 0
            }
        );
    }

    #[test]
    fn run_failure_aborts_and_returns_original_error() {
        let mut m = mgr();
        let err = m
            .run(|_tm| -> Result<()> { Err(RemtxError::action("X")) })
            .unwrap_err();
        assert!(matches!(&err, RemtxError::Action { detail } if detail == "X"));
        assert_eq!(
            m.current_transaction().unwrap().state(),
            TransactionState::Aborted
        );
        assert_eq!(m.stats().aborted, 1);
        assert_eq!(m.stats().committed, 0);
    }

    #[test]
    fn transaction_ids_are_unique_and_increasing() {
        let mut m = mgr();
        let mut ids = Vec::new();
        for _ in 0..5 {
            m.run(|tm| {
                ids.push(tm.current_transaction().unwrap().id().get());
                Ok(())
            })
            .unwrap();
        }
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut m = mgr();
        m.start_transaction().unwrap();
        assert!(matches!(
            m.start_transaction(),
            Err(RemtxError::TransactionAlreadyActive)
        ));
    }

    fn no_active_transaction<T>(result: &Result<T>) -> bool {
        matches!(result, Err(RemtxError::NoActiveTransaction))
    }

    #[test]
    fn end_and_abort_require_active_transaction() {
        let mut m = mgr();
        assert!(no_active_transaction(&m.end_transaction()));
        assert!(no_active_transaction(&m.abort_transaction()));
        assert!(no_active_transaction(&m.mark_must_abort("x")));
        assert!(no_active_transaction(&m.message_sink_mut()));

        m.start_transaction().unwrap();
        m.end_transaction().unwrap();
        assert!(no_active_transaction(&m.end_transaction()));
    }

    #[test]
    fn explicit_start_is_joined_by_run() {
        let (mut m, log) = recording(RecordingHooks::default());
        m.start_transaction().unwrap();
        m.run(|_tm| Ok(())).unwrap();
        // The run call did not own the transaction, so nothing was committed.
        assert!(m.is_in_transaction());
        m.end_transaction().unwrap();
        assert_eq!(*log.borrow(), ["begin txn#1", "commit txn#1"]);
    }

    // -----------------------------------------------------------------------
    // Closure hook ordering
    // -----------------------------------------------------------------------

    #[test]
    fn success_hooks_run_in_order() {
        let (mut m, log) = recording(RecordingHooks::default());
        let mut c = Traced::new("A", &log);
        m.run_within_transaction(&mut c).unwrap();
        assert_eq!(
            *log.borrow(),
            [
                "begin txn#1",
                "A pre",
                "A execute",
                "commit txn#1",
                "A success"
            ]
        );
    }

    #[test]
    fn on_failure_runs_before_abort() {
        let (mut m, log) = recording(RecordingHooks::default());
        let mut c = Traced::new("A", &log);
        c.fail = true;
        let err = m.run_within_transaction(&mut c).unwrap_err();
        assert_eq!(err.to_string(), "A failed");
        assert_eq!(
            *log.borrow(),
            [
                "begin txn#1",
                "A pre",
                "A execute",
                "A failure",
                "abort txn#1"
            ]
        );
    }

    #[test]
    fn pre_execute_failure_is_a_failure() {
        struct FailsEarly(Log);
        impl TransactionalClosure for FailsEarly {
            type Output = ();
            fn pre_execute(&mut self, _tm: &mut TransactionManager) -> Result<()> {
                Err(RemtxError::action("not ready"))
            }
            fn execute(&mut self, _tm: &mut TransactionManager) -> Result<()> {
                self.0.borrow_mut().push("execute".to_owned());
                Ok(())
            }
            fn on_failure(&mut self) {
                self.0.borrow_mut().push("failure".to_owned());
            }
        }

        let (mut m, log) = recording(RecordingHooks::default());
        let mut c = FailsEarly(Rc::clone(&log));
        assert!(m.run_within_transaction(&mut c).is_err());
        assert_eq!(*log.borrow(), ["begin txn#1", "failure", "abort txn#1"]);
    }

    // -----------------------------------------------------------------------
    // Nesting
    // -----------------------------------------------------------------------

    #[test]
    fn nested_failure_scenario() {
        // A nests B; B throws X.
        let (mut m, log) = recording(RecordingHooks::default());
        let mut b = Traced::new("B", &log);
        b.fail = true;
        let mut a = Traced::new("A", &log);
        a.inner = Some(Box::new(b));

        let err = m.run_within_transaction(&mut a).unwrap_err();
        assert_eq!(err.to_string(), "B failed");
        assert_eq!(
            *log.borrow(),
            [
                "begin txn#1",
                "A pre",
                "A execute",
                "B pre",
                "B execute",
                "B failure",
                "A failure",
                "abort txn#1",
            ]
        );
        assert_eq!(m.stats().begun, 1);
        assert_eq!(m.stats().aborted, 1);
        assert_eq!(m.stats().committed, 0);
        assert_eq!(m.depth(), 0);
    }

    #[test]
    fn nested_success_commits_once() {
        let (mut m, log) = recording(RecordingHooks::default());
        let mut a = Traced::new("A", &log);
        a.inner = Some(Box::new(Traced::new("B", &log)));
        m.run_within_transaction(&mut a).unwrap();
        assert_eq!(
            *log.borrow(),
            [
                "begin txn#1",
                "A pre",
                "A execute",
                "B pre",
                "B execute",
                "B success",
                "commit txn#1",
                "A success",
            ]
        );
    }

    #[test]
    fn inner_failure_caught_by_outer_still_commits() {
        let mut m = mgr();
        m.run(|tm| {
            let inner = tm.run(|_tm| -> Result<()> { Err(RemtxError::action("inner")) });
            assert!(inner.is_err());
            assert!(tm.is_in_transaction(), "inner frame must not abort");
            Ok(())
        })
        .unwrap();
        assert_eq!(
            m.current_transaction().unwrap().state(),
            TransactionState::Committed
        );
    }

    #[test]
    fn nesting_limit_is_enforced() {
        let mut config = ManagerConfig::default();
        config.set_max_nesting_depth(3);
        let mut m = TransactionManager::new(config);
        nest(&mut m, 3, None).unwrap();
        let err = nest(&mut m, 4, None).unwrap_err();
        assert!(matches!(err, RemtxError::NestingTooDeep { max: 3 }));
        assert_eq!(m.stats().aborted, 1);
        assert_eq!(m.depth(), 0);
    }

    #[test]
    fn inner_explicit_abort_blocks_further_nesting_and_fails_outer() {
        let mut m = mgr();
        let err = m
            .run(|tm| {
                tm.abort_transaction()?;
                let nested = tm.run(|_tm| Ok(()));
                assert!(matches!(nested, Err(RemtxError::NoActiveTransaction)));
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, RemtxError::TransactionRolledBack { .. }));
        assert_eq!(m.stats().aborted, 1);
    }

    // -----------------------------------------------------------------------
    // Must-abort / commit failure / abort failure
    // -----------------------------------------------------------------------

    #[test]
    fn must_abort_rolls_back_at_outer_end() {
        let (mut m, log) = recording(RecordingHooks::default());
        let err = m
            .run(|tm| {
                tm.run(|tm| tm.mark_must_abort("validation failed"))?;
                Ok(())
            })
            .unwrap_err();
        let RemtxError::TransactionRolledBack { reason } = &err else {
            panic!("expected a rollback, got {err:?}");
        };
        assert_eq!(reason, "validation failed");
        assert_eq!(*log.borrow(), ["begin txn#1", "abort txn#1"]);
        let txn = m.current_transaction().unwrap();
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert_eq!(txn.abort_cause(), Some("validation failed"));
    }

    #[test]
    fn commit_hook_failure_reports_failure_then_aborts() {
        let (mut m, log) = recording(RecordingHooks {
            fail_commit: true,
            ..RecordingHooks::default()
        });
        let mut c = Traced::new("A", &log);
        let err = m.run_within_transaction(&mut c).unwrap_err();
        assert!(matches!(err, RemtxError::Hook { .. }));
        assert_eq!(
            *log.borrow(),
            [
                "begin txn#1",
                "A pre",
                "A execute",
                "commit txn#1",
                "A failure",
                "abort txn#1",
            ]
        );
    }

    #[test]
    fn abort_failure_wraps_original_as_source() {
        let (mut m, _log) = recording(RecordingHooks {
            fail_abort: true,
            ..RecordingHooks::default()
        });
        let err = m
            .run(|_tm| -> Result<u32> { Err(RemtxError::action("X")) })
            .unwrap_err();
        let RemtxError::AbortFailure { detail, abort, .. } = &err else {
            panic!("expected AbortFailure, got {err:?}");
        };
        assert_eq!(detail, "transaction hook failed: rollback failed");
        assert!(matches!(**abort, RemtxError::Hook { .. }));
        assert!(err.to_string().contains("(after: X)"));
        assert_eq!(err.source().unwrap().to_string(), "X");
        // The transaction still ends aborted.
        assert!(!m.is_in_transaction());
        assert_eq!(m.stats().abort_failures, 1);
    }

    #[test]
    fn abort_failure_policy_is_the_same_for_unit_closures() {
        let (mut m, _log) = recording(RecordingHooks {
            fail_abort: true,
            ..RecordingHooks::default()
        });
        let err = m
            .run(|_tm| -> Result<()> { Err(RemtxError::action("X")) })
            .unwrap_err();
        assert!(matches!(err, RemtxError::AbortFailure { .. }));
        assert_eq!(err.source().unwrap().to_string(), "X");
    }

    #[test]
    fn begin_hook_failure_propagates_without_running_closure() {
        let (mut m, log) = recording(RecordingHooks {
            fail_begin: true,
            ..RecordingHooks::default()
        });
        let mut c = Traced::new("A", &log);
        let err = m.run_within_transaction(&mut c).unwrap_err();
        assert!(matches!(err, RemtxError::Hook { .. }));
        assert_eq!(*log.borrow(), ["begin txn#1"]);
        assert!(!m.is_in_transaction());
    }

    // -----------------------------------------------------------------------
    // close / session
    // -----------------------------------------------------------------------

    #[test]
    fn close_aborts_and_clears_session() {
        let (mut m, log) = recording(RecordingHooks::default());
        m.open(AuthContext::new("ada", "s-1"));
        m.start_transaction().unwrap();
        m.close();
        assert!(m.session().is_none());
        assert!(!m.is_in_transaction());
        assert_eq!(*log.borrow(), ["begin txn#1", "abort txn#1"]);
    }

    #[test]
    fn close_swallows_abort_failure() {
        let (mut m, _log) = recording(RecordingHooks {
            fail_abort: true,
            ..RecordingHooks::default()
        });
        m.open(AuthContext::new("ada", "s-1"));
        m.start_transaction().unwrap();
        m.close();
        assert!(m.session().is_none());
        assert_eq!(
            m.current_transaction().unwrap().state(),
            TransactionState::Aborted
        );
    }

    #[test]
    fn close_without_transaction_is_noop() {
        let (mut m, log) = recording(RecordingHooks::default());
        m.close();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn debug_snapshot_serializes() {
        let mut m = mgr();
        m.open(AuthContext::new("ada", "s-1"));
        m.start_transaction().unwrap();
        m.message_sink_mut().unwrap().add_warning("w");
        let snap = m.debug_snapshot();
        assert_eq!(snap.warnings, 1);
        assert_eq!(snap.state, Some(TransactionState::InProgress));
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"session_user\":\"ada\""));
        assert!(json.contains("\"InProgress\""));
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn exactly_one_begin_and_one_outcome_per_outer_call(
            depth in 1_usize..12,
            fail_at in proptest::option::of(0_usize..12),
        ) {
            let mut m = mgr();
            let result = m.run(|tm| nest(tm, depth, fail_at));
            let stats = m.stats();
            prop_assert_eq!(stats.begun, 1);
            prop_assert_eq!(stats.committed + stats.aborted, 1);
            let failed = fail_at.is_some_and(|f| f <= depth);
            prop_assert_eq!(result.is_err(), failed);
            prop_assert_eq!(stats.aborted == 1, failed);
            prop_assert_eq!(m.depth(), 0);
            prop_assert!(!m.is_in_transaction());
        }

        #[test]
        fn sequential_outer_calls_never_share_a_transaction(
            outcomes in proptest::collection::vec(any::<bool>(), 1..20),
        ) {
            let mut m = mgr();
            for ok in &outcomes {
                let ok = *ok;
                let _ = m.run(|tm| nest(tm, 2, if ok { None } else { Some(1) }));
            }
            let stats = m.stats();
            prop_assert_eq!(stats.begun, outcomes.len() as u64);
            prop_assert_eq!(stats.committed, outcomes.iter().filter(|ok| **ok).count() as u64);
            prop_assert_eq!(stats.aborted, outcomes.iter().filter(|ok| !**ok).count() as u64);
        }
    }
}
