//! Local in-memory representation of domain objects.
//!
//! An [`ObjectHandle`] is a shared, cheaply clonable adapter around one domain
//! object. Identity and state are interior-mutable because the remote protocol
//! rewrites them in place: a transient object becomes persistent when the
//! server assigns it an identity, and decoded updates overwrite its fields.
//! Every clone observes those changes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::glossary::{ObjectId, Version};

/// What kind of thing a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// A domain entity instance.
    Entity,
    /// A singleton service; has no persistence lifecycle of its own.
    Service,
}

/// Persistence lifecycle of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Exists only in memory; identity is local.
    Transient,
    /// Previously saved and addressable by identity.
    Persistent,
}

#[derive(Debug)]
struct HandleState {
    oid: ObjectId,
    lifecycle: Lifecycle,
    version: Option<Version>,
    fields: BTreeMap<String, String>,
}

#[derive(Debug)]
struct HandleInner {
    type_name: String,
    kind: ObjectKind,
    state: RwLock<HandleState>,
}

/// Shared handle to one local domain object.
#[derive(Clone)]
pub struct ObjectHandle {
    inner: Arc<HandleInner>,
}

impl ObjectHandle {
    fn build(
        type_name: impl Into<String>,
        kind: ObjectKind,
        oid: ObjectId,
        lifecycle: Lifecycle,
        version: Option<Version>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                type_name: type_name.into(),
                kind,
                state: RwLock::new(HandleState {
                    oid,
                    lifecycle,
                    version,
                    fields: BTreeMap::new(),
                }),
            }),
        }
    }

    /// A new, unsaved entity with a locally minted identity.
    pub fn transient(type_name: impl Into<String>, oid: ObjectId) -> Self {
        Self::build(
            type_name,
            ObjectKind::Entity,
            oid,
            Lifecycle::Transient,
            None,
        )
    }

    /// An entity loaded from the backing store at `version`.
    pub fn persistent(type_name: impl Into<String>, oid: ObjectId, version: Version) -> Self {
        Self::build(
            type_name,
            ObjectKind::Entity,
            oid,
            Lifecycle::Persistent,
            Some(version),
        )
    }

    /// A service singleton.
    pub fn service(type_name: impl Into<String>, oid: ObjectId) -> Self {
        Self::build(
            type_name,
            ObjectKind::Service,
            oid,
            Lifecycle::Persistent,
            None,
        )
    }

    /// Builder-style field initialisation.
    #[must_use]
    pub fn with_field(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_field(name, value);
        self
    }

    #[must_use]
    pub fn oid(&self) -> ObjectId {
        self.inner.state.read().oid.clone()
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.inner.type_name
    }

    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        self.inner.kind
    }

    #[must_use]
    pub fn is_service(&self) -> bool {
        self.inner.kind == ObjectKind::Service
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.state.read().lifecycle
    }

    #[must_use]
    pub fn version(&self) -> Option<Version> {
        self.inner.state.read().version
    }

    pub fn set_version(&self, version: Version) {
        self.inner.state.write().version = Some(version);
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<String> {
        self.inner.state.read().fields.get(name).cloned()
    }

    pub fn set_field(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner
            .state
            .write()
            .fields
            .insert(name.into(), value.into());
    }

    /// Snapshot of all fields in name order.
    #[must_use]
    pub fn fields(&self) -> BTreeMap<String, String> {
        self.inner.state.read().fields.clone()
    }

    /// Overwrite the object's state with an authoritative copy.
    pub fn replace_state(&self, fields: BTreeMap<String, String>, version: Option<Version>) {
        let mut state = self.inner.state.write();
        state.fields = fields;
        if version.is_some() {
            state.version = version;
        }
    }

    /// Apply a store-assigned persistent identity.
    ///
    /// Returns the identity the object had before.
    pub fn make_persistent(&self, oid: ObjectId, version: Version) -> ObjectId {
        let mut state = self.inner.state.write();
        state.lifecycle = Lifecycle::Persistent;
        state.version = Some(version);
        std::mem::replace(&mut state.oid, oid)
    }

    /// Whether both handles adapt the same object.
    #[must_use]
    pub fn same_object(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Human-readable title used in log lines and error messages.
    #[must_use]
    pub fn title(&self) -> String {
        let state = self.inner.state.read();
        match state.fields.get("title") {
            Some(title) => format!("{} '{}'", self.inner.type_name, title),
            None => format!("{} {}", self.inner.type_name, state.oid),
        }
    }
}

impl PartialEq for ObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_object(other)
    }
}

impl Eq for ObjectHandle {}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("ObjectHandle")
            .field("type_name", &self.inner.type_name)
            .field("oid", &state.oid)
            .field("lifecycle", &state.lifecycle)
            .field("version", &state.version)
            .finish()
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.inner.type_name, self.oid())
    }
}

/// An action argument or return value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActionValue {
    /// Explicit "no value".
    #[default]
    Null,
    /// A value type rendered as text.
    Scalar(String),
    /// A reference to a domain object.
    Object(ObjectHandle),
    /// An ordered collection of domain objects.
    Collection(Vec<ObjectHandle>),
}

impl ActionValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            Self::Object(handle) => Some(handle),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(text) => Some(text),
            _ => None,
        }
    }
}

impl From<ObjectHandle> for ActionValue {
    fn from(value: ObjectHandle) -> Self {
        Self::Object(value)
    }
}

impl fmt::Display for ActionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Scalar(text) => write!(f, "{text:?}"),
            Self::Object(handle) => write!(f, "{handle}"),
            Self::Collection(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}
