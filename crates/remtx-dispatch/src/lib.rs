//! Action dispatch with remote delegation and optimistic-conflict recovery.
//!
//! An [`ActionDispatcher`] decides per invocation whether an action runs
//! in-process or on the remote execution service. A remote invocation is a
//! single attempt: encode the target and parameters, submit them through a
//! [`RemoteExecutionFacade`], then apply the returned identities, updates,
//! disposals and messages to the current transaction. A conflict naming a
//! stale object reloads that object before the conflict is re-raised.

pub mod config;
pub mod dispatcher;
pub mod encoding;
pub mod placement;
pub mod protocol;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DispatchConfig, KEY_DEFAULT_LOCALE, KEY_LOG_PAYLOADS};
pub use dispatcher::{ActionDispatcher, DispatchContext};
pub use encoding::GraphEncoder;
pub use placement::{TargetFacts, execute_remotely};
pub use protocol::{
    ConflictSignal, EncodedData, ExecuteRequest, ExecuteResponse, IdentityAssignment,
    KnownObjects, ObjectData, ReferenceData, RemoteFailure,
};
pub use traits::{
    AuthenticationProvider, LocalAction, ObjectEncoder, PersistenceResolver,
    RemoteExecutionFacade, RemoteOnly,
};
