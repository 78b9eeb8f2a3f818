//! The unit-of-work record.

use remtx_types::TxnId;
use serde::Serialize;

use crate::messages::MessageSink;
use crate::notifier::UpdateNotifier;

/// Transaction state machine states.
///
/// ```text
/// None ──begin──▶ InProgress ──commit──▶ Committed
///                   │    │
///       mark_must_abort  └──abort──▶ Aborted
///                   ▼                  ▲
///               MustAbort ───abort─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransactionState {
    /// Created, not yet begun.
    None,
    /// Work may be performed.
    InProgress,
    /// Work may continue but the transaction can only end by aborting.
    MustAbort,
    /// Terminal: committed.
    Committed,
    /// Terminal: aborted.
    Aborted,
}

impl TransactionState {
    /// Terminal states are `Committed` and `Aborted`.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }

    #[must_use]
    pub const fn can_commit(self) -> bool {
        matches!(self, Self::InProgress)
    }

    #[must_use]
    pub const fn can_abort(self) -> bool {
        !self.is_complete()
    }
}

/// A unit of work: identity, state and the sinks nested work writes to.
#[derive(Debug)]
pub struct Transaction {
    id: TxnId,
    state: TransactionState,
    messages: MessageSink,
    updates: UpdateNotifier,
    abort_cause: Option<String>,
}

impl Transaction {
    /// Create a transaction in state `None`.
    #[must_use]
    pub fn new(id: TxnId) -> Self {
        Self {
            id,
            state: TransactionState::None,
            messages: MessageSink::new(),
            updates: UpdateNotifier::new(),
            abort_cause: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> TxnId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    #[must_use]
    pub fn messages(&self) -> &MessageSink {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut MessageSink {
        &mut self.messages
    }

    #[must_use]
    pub fn updates(&self) -> &UpdateNotifier {
        &self.updates
    }

    pub fn updates_mut(&mut self) -> &mut UpdateNotifier {
        &mut self.updates
    }

    /// Why the transaction was flagged must-abort, if it was.
    #[must_use]
    pub fn abort_cause(&self) -> Option<&str> {
        self.abort_cause.as_deref()
    }

    /// Transition `None` → `InProgress`. Panics in any other state.
    pub(crate) fn begin(&mut self) {
        assert_eq!(
            self.state,
            TransactionState::None,
            "can only begin a fresh transaction"
        );
        self.state = TransactionState::InProgress;
    }

    /// Transition `InProgress` → `MustAbort`. The first cause wins.
    pub(crate) fn mark_must_abort(&mut self, cause: String) {
        assert!(
            !self.state.is_complete(),
            "cannot flag a completed transaction"
        );
        self.state = TransactionState::MustAbort;
        self.abort_cause.get_or_insert(cause);
    }

    /// Transition to `Committed`. Panics unless `InProgress`.
    pub(crate) fn commit(&mut self) {
        assert!(
            self.state.can_commit(),
            "can only commit in-progress transactions"
        );
        self.state = TransactionState::Committed;
    }

    /// Transition to `Aborted`. Panics if already complete.
    pub(crate) fn abort(&mut self) {
        assert!(
            self.state.can_abort(),
            "cannot abort a completed transaction"
        );
        self.state = TransactionState::Aborted;
    }
}
