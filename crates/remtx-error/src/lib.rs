use remtx_types::ObjectId;
use thiserror::Error;

/// Primary error type for remtx operations.
///
/// Structured variants for the transaction manager preconditions, the remote
/// execution failures and the conflict-recovery outcome, plus a handful of
/// ambient variants (I/O, JSON, configuration).
#[derive(Error, Debug)]
pub enum RemtxError {
    // === Transaction Errors ===
    /// An operation needs an in-progress transaction and there is none.
    #[error("no transaction in progress")]
    NoActiveTransaction,

    /// An operation needs no transaction but one is in progress.
    #[error("transaction already in progress")]
    TransactionAlreadyActive,

    /// The transaction was flagged must-abort and has been rolled back.
    #[error("transaction rolled back: {reason}")]
    TransactionRolledBack { reason: String },

    /// Nested transactional calls exceeded the configured depth.
    #[error("transactional calls nested deeper than {max}")]
    NestingTooDeep { max: usize },

    /// Aborting after a failure failed too.
    ///
    /// The failure that triggered the abort is the `source()`; the abort's
    /// own error is kept in `abort`.
    #[error("abort failure: {detail} (after: {original})")]
    AbortFailure {
        detail: String,
        abort: Box<RemtxError>,
        #[source]
        original: Box<RemtxError>,
    },

    /// A transaction hook (begin/commit/abort participant) failed.
    #[error("transaction hook failed: {detail}")]
    Hook { detail: String },

    // === Remote Execution Errors ===
    /// The remote call could not be completed.
    #[error("transport failure: {detail}")]
    Transport { detail: String },

    /// The remote side detected a stale version.
    ///
    /// `oid` is the object whose version disagreed, when the server could
    /// identify it. After automatic reload the original conflict is `cause`.
    #[error("concurrency conflict: {detail}")]
    ConcurrencyConflict {
        oid: Option<ObjectId>,
        detail: String,
        #[source]
        cause: Option<Box<RemtxError>>,
    },

    /// Any other failure reported by the remote execution service.
    #[error("remote failure: {detail}")]
    Remote { detail: String },

    /// The remote response was inconsistent with the request.
    #[error("protocol violation: {detail}")]
    Protocol { detail: String },

    /// No local object is known under this identity.
    #[error("unknown object: {oid}")]
    UnknownObject { oid: ObjectId },

    // === Application Errors ===
    /// An action body or transactional closure failed.
    #[error("{detail}")]
    Action { detail: String },

    // === Configuration / Ambient ===
    #[error("invalid configuration value for '{key}': {value}")]
    InvalidConfig { key: String, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification, used by callers deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Manager precondition violated by the caller.
    Precondition,
    /// Optimistic-concurrency conflict.
    Conflict,
    /// Remote call never completed.
    Transport,
    /// Remote side completed the call with a failure.
    Remote,
    /// Failure inside the unit of work itself.
    Application,
    /// Transaction teardown or backend failure.
    Internal,
}

impl RemtxError {
    /// Classify this error.
    #[allow(clippy::match_same_arms)]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NoActiveTransaction
            | Self::TransactionAlreadyActive
            | Self::NestingTooDeep { .. }
            | Self::InvalidConfig { .. } => ErrorKind::Precondition,
            Self::ConcurrencyConflict { .. } => ErrorKind::Conflict,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Remote { .. } | Self::Protocol { .. } => ErrorKind::Remote,
            Self::Action { .. } | Self::TransactionRolledBack { .. } => ErrorKind::Application,
            Self::AbortFailure { .. }
            | Self::Hook { .. }
            | Self::UnknownObject { .. }
            | Self::Io(_)
            | Self::Json(_) => ErrorKind::Internal,
        }
    }

    /// Whether this is an optimistic-concurrency conflict.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Whether the conflict left the local object freshly reloaded, so that
    /// re-attempting the higher-level operation is meaningful.
    pub const fn is_reloaded_conflict(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict {
                oid: Some(_),
                cause: Some(_),
                ..
            }
        )
    }

    /// Whether the caller may succeed by re-attempting the unit of work.
    ///
    /// Nothing in remtx retries on its own; this only informs the caller.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::Transport { .. }
        )
    }

    /// The object a conflict was detected on, if any.
    pub fn conflict_source(&self) -> Option<&ObjectId> {
        match self {
            Self::ConcurrencyConflict { oid, .. } => oid.as_ref(),
            _ => None,
        }
    }

    /// Human-friendly suggestion for resolving this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ConcurrencyConflict { oid: Some(_), .. } => {
                Some("The object was reloaded; re-attempt the operation on the fresh state")
            }
            Self::ConcurrencyConflict { oid: None, .. } => {
                Some("Reload the affected objects and re-attempt the operation")
            }
            Self::Transport { .. } => Some("Check connectivity to the remote execution service"),
            Self::NoActiveTransaction => Some("Run the operation inside run_within_transaction"),
            Self::TransactionAlreadyActive => Some("End or abort the current transaction first"),
            Self::NestingTooDeep { .. } => {
                Some("Raise remtx.txn.max_nesting_depth or flatten the call chain")
            }
            _ => None,
        }
    }

    /// Create an application (action/closure) error.
    pub fn action(detail: impl Into<String>) -> Self {
        Self::Action {
            detail: detail.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transport {
            detail: detail.into(),
        }
    }

    /// Create a remote-failure error.
    pub fn remote(detail: impl Into<String>) -> Self {
        Self::Remote {
            detail: detail.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }

    /// Create a hook error.
    pub fn hook(detail: impl Into<String>) -> Self {
        Self::Hook {
            detail: detail.into(),
        }
    }

    /// Create an unwrapped conflict error.
    pub fn conflict(oid: Option<ObjectId>, detail: impl Into<String>) -> Self {
        Self::ConcurrencyConflict {
            oid,
            detail: detail.into(),
            cause: None,
        }
    }

    /// Combine a failed abort with the failure that triggered it.
    pub fn abort_failure(abort: Self, original: Self) -> Self {
        Self::AbortFailure {
            detail: abort.to_string(),
            abort: Box::new(abort),
            original: Box::new(original),
        }
    }
}

/// Result type alias using `RemtxError`.
pub type Result<T> = std::result::Result<T, RemtxError>;
