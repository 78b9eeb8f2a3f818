//! Remote execution request/response shapes.
//!
//! These are the values exchanged with a [`crate::RemoteExecutionFacade`].
//! They derive serde so a transport can carry them, but no wire encoding is
//! defined here.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use remtx_error::RemtxError;
use remtx_types::{ActionId, ActionType, AuthContext, ObjectHandle, ObjectId, Version};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Encoded object graph
// ---------------------------------------------------------------------------

/// Identity of an object as seen by the remote party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub oid: ObjectId,
    pub type_name: String,
    /// Version the sender last saw; `None` for transient objects and services.
    pub version: Option<Version>,
}

impl ReferenceData {
    /// Reference to `object` as it currently stands.
    #[must_use]
    pub fn of(object: &ObjectHandle) -> Self {
        Self {
            oid: object.oid(),
            type_name: object.type_name().to_owned(),
            version: object.version(),
        }
    }
}

/// Full state of one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectData {
    pub reference: ReferenceData,
    /// True if the object has never been persisted.
    pub transient: bool,
    pub fields: BTreeMap<String, String>,
}

impl ObjectData {
    #[must_use]
    pub fn oid(&self) -> &ObjectId {
        &self.reference.oid
    }
}

/// Transport representation of an [`remtx_types::ActionValue`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncodedData {
    /// Explicit null marker.
    #[default]
    Null,
    Scalar(String),
    /// An object already transmitted in this request, sent by identity.
    Reference(ReferenceData),
    /// An object transmitted in full.
    Object(ObjectData),
    Collection(Vec<EncodedData>),
}

impl EncodedData {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Identity of the encoded object, if this encodes one.
    #[must_use]
    pub fn oid(&self) -> Option<&ObjectId> {
        match self {
            Self::Reference(reference) => Some(&reference.oid),
            Self::Object(object) => Some(object.oid()),
            _ => None,
        }
    }
}

/// Persistent identity assigned by the server to a previously transient
/// object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAssignment {
    pub oid: ObjectId,
    pub version: Version,
}

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub auth: AuthContext,
    pub action_type: ActionType,
    pub action_id: ActionId,
    /// `None` when the action has no instance target.
    pub target: Option<EncodedData>,
    pub parameters: Vec<EncodedData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub result: EncodedData,
    pub persisted_target: Option<IdentityAssignment>,
    /// Indexed like the request parameters; `None` where nothing changed.
    pub persisted_parameters: Vec<Option<IdentityAssignment>>,
    pub updates: Vec<ObjectData>,
    pub disposed: Vec<ReferenceData>,
    pub messages: Vec<String>,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// A staleness conflict detected by the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSignal {
    /// The object whose version was stale, when the server could tell.
    pub source: Option<ObjectId>,
    pub cause: String,
}

impl ConflictSignal {
    pub fn new(source: Option<ObjectId>, cause: impl Into<String>) -> Self {
        Self {
            source,
            cause: cause.into(),
        }
    }
}

impl fmt::Display for ConflictSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(oid) => write!(f, "{} (source {oid})", self.cause),
            None => f.write_str(&self.cause),
        }
    }
}

/// Ways a remote call can fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteFailure {
    Conflict(ConflictSignal),
    /// The call never completed.
    Transport(String),
    /// The server ran the action and it failed.
    Server(String),
}

impl From<ConflictSignal> for RemtxError {
    fn from(signal: ConflictSignal) -> Self {
        Self::conflict(signal.source, signal.cause)
    }
}

impl From<RemoteFailure> for RemtxError {
    fn from(failure: RemoteFailure) -> Self {
        match failure {
            RemoteFailure::Conflict(signal) => signal.into(),
            RemoteFailure::Transport(detail) => Self::transport(detail),
            RemoteFailure::Server(detail) => Self::remote(detail),
        }
    }
}

// ---------------------------------------------------------------------------
// KnownObjects
// ---------------------------------------------------------------------------

/// Identities already transmitted to, or received from, the remote party
/// during one request.
///
/// Created fresh for each remote attempt and dropped when it ends.
#[derive(Debug, Default)]
pub struct KnownObjects {
    seen: HashSet<ObjectId>,
}

impl KnownObjects {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `oid`. Returns true the first time it is seen.
    pub fn mark_known(&mut self, oid: ObjectId) -> bool {
        self.seen.insert(oid)
    }

    #[must_use]
    pub fn is_known(&self, oid: &ObjectId) -> bool {
        self.seen.contains(oid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_failures_map_to_error_taxonomy() {
        let err: RemtxError = RemoteFailure::Transport("connection reset".into()).into();
        assert!(matches!(err, RemtxError::Transport { .. }));

        let err: RemtxError = RemoteFailure::Server("boom".into()).into();
        assert_eq!(err.to_string(), "remote failure: boom");

        let err: RemtxError =
            RemoteFailure::Conflict(ConflictSignal::new(Some(ObjectId::new("A")), "stale")).into();
        assert!(err.is_conflict());
        assert_eq!(err.conflict_source(), Some(&ObjectId::new("A")));
        assert!(!err.is_reloaded_conflict());
    }

    #[test]
    fn known_objects_marks_once() {
        let mut known = KnownObjects::new();
        assert!(known.is_empty());
        assert!(known.mark_known(ObjectId::new("A")));
        assert!(!known.mark_known(ObjectId::new("A")));
        assert!(known.is_known(&ObjectId::new("A")));
        assert!(!known.is_known(&ObjectId::new("B")));
        assert_eq!(known.len(), 1);
    }

    #[test]
    fn conflict_signal_display() {
        assert_eq!(
            ConflictSignal::new(Some(ObjectId::new("ORD-1")), "stale v1").to_string(),
            "stale v1 (source ORD-1)"
        );
        assert_eq!(ConflictSignal::new(None, "stale").to_string(), "stale");
    }

    #[test]
    fn response_serializes_null_marker() {
        let response = ExecuteResponse::default();
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"result\":\"Null\""));
        let back: ExecuteResponse = serde_json::from_str(&json).unwrap();
        assert!(back.result.is_null());
    }
}
