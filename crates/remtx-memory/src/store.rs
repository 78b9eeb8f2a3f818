//! Client-side identity map backed by a [`LoopbackServer`].

use std::collections::HashMap;

use parking_lot::Mutex;
use remtx_dispatch::{AuthenticationProvider, PersistenceResolver, ReferenceData};
use remtx_error::{RemtxError, Result};
use remtx_types::{AuthContext, ObjectHandle, ObjectId, Version};

use crate::server::LoopbackServer;

#[derive(Default)]
struct StoreState {
    objects: HashMap<ObjectId, ObjectHandle>,
    next_transient: u64,
}

/// Local objects of one client session, keyed by identity.
///
/// Loads and reloads read the server's authoritative copies directly.
pub struct MemoryObjectStore {
    server: LoopbackServer,
    state: Mutex<StoreState>,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new(server: LoopbackServer) -> Self {
        Self {
            server,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// The local handle for `oid`, loading it from the server if needed.
    pub fn load(&self, oid: &ObjectId) -> Result<ObjectHandle> {
        if let Some(found) = self.state.lock().objects.get(oid) {
            return Ok(found.clone());
        }
        let stored = self
            .server
            .stored(oid)
            .ok_or_else(|| RemtxError::UnknownObject { oid: oid.clone() })?;
        let object = ObjectHandle::persistent(stored.type_name, oid.clone(), stored.version);
        object.replace_state(stored.fields, None);
        self.register(&object);
        Ok(object)
    }

    /// A new transient object with a locally minted identity.
    pub fn create_transient(&self, type_name: &str) -> ObjectHandle {
        let mut state = self.state.lock();
        state.next_transient += 1;
        let oid = ObjectId::new(format!("tmp-{}", state.next_transient));
        let object = ObjectHandle::transient(type_name, oid.clone());
        state.objects.insert(oid, object.clone());
        object
    }

    /// Make `object` resolvable by its current identity.
    pub fn register(&self, object: &ObjectHandle) {
        let mut state = self.state.lock();
        state.objects.insert(object.oid(), object.clone());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistenceResolver for MemoryObjectStore {
    fn resolve(&self, oid: &ObjectId) -> Result<ObjectHandle> {
        self.state
            .lock()
            .objects
            .get(oid)
            .cloned()
            .ok_or_else(|| RemtxError::UnknownObject { oid: oid.clone() })
    }

    fn adopt(&self, reference: &ReferenceData) -> ObjectHandle {
        let mut state = self.state.lock();
        state
            .objects
            .entry(reference.oid.clone())
            .or_insert_with(|| {
                tracing::debug!(oid = %reference.oid, "adopting object first seen remotely");
                ObjectHandle::persistent(
                    reference.type_name.clone(),
                    reference.oid.clone(),
                    reference.version.unwrap_or(Version::INITIAL),
                )
            })
            .clone()
    }

    fn reload(&self, object: &ObjectHandle) -> Result<()> {
        let oid = object.oid();
        let stored = self
            .server
            .stored(&oid)
            .ok_or_else(|| RemtxError::UnknownObject { oid: oid.clone() })?;
        object.replace_state(stored.fields, Some(stored.version));
        tracing::info!(%oid, version = %stored.version, "object reloaded");
        Ok(())
    }

    fn identity_changed(&self, previous: &ObjectId, object: &ObjectHandle) {
        let mut state = self.state.lock();
        state.objects.remove(previous);
        state.objects.insert(object.oid(), object.clone());
    }
}

/// Authentication provider that always answers with the same context.
#[derive(Debug, Clone)]
pub struct StaticAuthentication {
    context: AuthContext,
}

impl StaticAuthentication {
    #[must_use]
    pub fn new(context: AuthContext) -> Self {
        Self { context }
    }
}

impl AuthenticationProvider for StaticAuthentication {
    fn authentication(&self) -> Result<AuthContext> {
        Ok(self.context.clone())
    }
}
