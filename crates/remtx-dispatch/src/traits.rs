//! Collaborator contracts the dispatcher is wired with.

use remtx_error::{RemtxError, Result};
use remtx_txn::TransactionManager;
use remtx_types::{ActionValue, AuthContext, Lifecycle, ObjectHandle, ObjectId};

use crate::protocol::{
    EncodedData, ExecuteRequest, ExecuteResponse, IdentityAssignment, KnownObjects, ObjectData,
    ReferenceData, RemoteFailure,
};

/// Maps identities to local objects and refreshes them from storage.
pub trait PersistenceResolver: Send + Sync {
    /// The local object for `oid`.
    ///
    /// # Errors
    ///
    /// [`RemtxError::UnknownObject`] if nothing local has that identity.
    fn resolve(&self, oid: &ObjectId) -> Result<ObjectHandle>;

    /// The local object for `reference`, created as an empty placeholder if
    /// it has not been seen before.
    fn adopt(&self, reference: &ReferenceData) -> ObjectHandle;

    fn is_persistent(&self, object: &ObjectHandle) -> bool {
        object.lifecycle() == Lifecycle::Persistent
    }

    /// Replace `object`'s state with the authoritative stored state.
    fn reload(&self, object: &ObjectHandle) -> Result<()>;

    /// Called after `object` changed identity from `previous`.
    fn identity_changed(&self, _previous: &ObjectId, _object: &ObjectHandle) {}
}

/// Converts between local values and their transport representation.
///
/// Every method takes the per-request [`KnownObjects`], so an object is sent
/// in full at most once per request and never re-sent after it was decoded.
pub trait ObjectEncoder: Send + Sync {
    fn encode_target(
        &self,
        target: &ObjectHandle,
        known_objects: &mut KnownObjects,
    ) -> Result<EncodedData>;

    fn encode_parameter(
        &self,
        value: &ActionValue,
        known_objects: &mut KnownObjects,
    ) -> Result<EncodedData>;

    /// Apply a server-assigned identity to a previously transient object.
    fn made_persistent(&self, object: &ObjectHandle, identity: &IdentityAssignment) -> Result<()>;

    /// Decode a returned value. The null marker decodes to
    /// [`ActionValue::Null`].
    fn decode(&self, data: &EncodedData, known: &mut KnownObjects) -> Result<ActionValue>;

    /// Apply one updated object's state to the local graph.
    fn decode_update(&self, data: &ObjectData, known: &mut KnownObjects) -> Result<ObjectHandle>;
}

/// Boundary to the remote execution service.
pub trait RemoteExecutionFacade: Send + Sync {
    fn execute_server_action(
        &self,
        request: ExecuteRequest,
    ) -> std::result::Result<ExecuteResponse, RemoteFailure>;
}

/// Supplies the authentication context sent with each request.
pub trait AuthenticationProvider: Send + Sync {
    fn authentication(&self) -> Result<AuthContext>;
}

/// The in-process implementation of an action.
pub trait LocalAction: Send + Sync {
    fn invoke(
        &self,
        tm: &mut TransactionManager,
        target: Option<&ObjectHandle>,
        parameters: &[ActionValue],
    ) -> Result<ActionValue>;
}

impl<F> LocalAction for F
where
    F: Fn(&mut TransactionManager, Option<&ObjectHandle>, &[ActionValue]) -> Result<ActionValue>
        + Send
        + Sync,
{
    fn invoke(
        &self,
        tm: &mut TransactionManager,
        target: Option<&ObjectHandle>,
        parameters: &[ActionValue],
    ) -> Result<ActionValue> {
        self(tm, target, parameters)
    }
}

/// Local action for members that only exist on the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteOnly;

impl LocalAction for RemoteOnly {
    fn invoke(
        &self,
        _tm: &mut TransactionManager,
        _target: Option<&ObjectHandle>,
        _parameters: &[ActionValue],
    ) -> Result<ActionValue> {
        Err(RemtxError::action("action has no local implementation"))
    }
}
