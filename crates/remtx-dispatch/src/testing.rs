//! Test doubles shared by the unit tests of this crate.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use remtx_error::{RemtxError, Result};
use remtx_types::{AuthContext, ObjectHandle, ObjectId};

use crate::protocol::{ExecuteRequest, ExecuteResponse, ReferenceData, RemoteFailure};
use crate::traits::{AuthenticationProvider, PersistenceResolver, RemoteExecutionFacade};

/// Identity map with scripted reload contents.
#[derive(Default)]
pub(crate) struct MapResolver {
    pub objects: Mutex<HashMap<ObjectId, ObjectHandle>>,
    pub reloaded: Mutex<Vec<ObjectId>>,
    pub renamed: Mutex<Vec<(ObjectId, ObjectId)>>,
    pub fail_reload: bool,
}

impl MapResolver {
    pub fn with(objects: &[&ObjectHandle]) -> Self {
        let resolver = Self::default();
        for object in objects {
            resolver.insert(object);
        }
        resolver
    }

    pub fn insert(&self, object: &ObjectHandle) {
        self.objects.lock().insert(object.oid(), object.clone());
    }
}

impl PersistenceResolver for MapResolver {
    fn resolve(&self, oid: &ObjectId) -> Result<ObjectHandle> {
        self.objects
            .lock()
            .get(oid)
            .cloned()
            .ok_or_else(|| RemtxError::UnknownObject { oid: oid.clone() })
    }

    fn adopt(&self, reference: &ReferenceData) -> ObjectHandle {
        if let Some(found) = self.objects.lock().get(&reference.oid) {
            return found.clone();
        }
        let created = ObjectHandle::persistent(
            reference.type_name.clone(),
            reference.oid.clone(),
            reference.version.unwrap_or_default(),
        );
        self.insert(&created);
        created
    }

    fn reload(&self, object: &ObjectHandle) -> Result<()> {
        if self.fail_reload {
            return Err(RemtxError::hook("store offline"));
        }
        self.reloaded.lock().push(object.oid());
        object.set_field("reloaded", "yes");
        Ok(())
    }

    fn identity_changed(&self, previous: &ObjectId, object: &ObjectHandle) {
        self.renamed.lock().push((previous.clone(), object.oid()));
        let mut objects = self.objects.lock();
        objects.remove(previous);
        objects.insert(object.oid(), object.clone());
    }
}

/// Facade that replays scripted outcomes and records every request.
#[derive(Default)]
pub(crate) struct ScriptedFacade {
    pub outcomes: Mutex<VecDeque<std::result::Result<ExecuteResponse, RemoteFailure>>>,
    pub requests: Mutex<Vec<ExecuteRequest>>,
}

impl ScriptedFacade {
    pub fn replying(outcome: std::result::Result<ExecuteResponse, RemoteFailure>) -> Arc<Self> {
        let facade = Self::default();
        facade.outcomes.lock().push_back(outcome);
        Arc::new(facade)
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

impl RemoteExecutionFacade for ScriptedFacade {
    fn execute_server_action(
        &self,
        request: ExecuteRequest,
    ) -> std::result::Result<ExecuteResponse, RemoteFailure> {
        self.requests.lock().push(request);
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(RemoteFailure::Transport("no scripted reply".into())))
    }
}

pub(crate) struct FixedAuth;

impl AuthenticationProvider for FixedAuth {
    fn authentication(&self) -> Result<AuthContext> {
        Ok(AuthContext::new("tester", "session-1"))
    }
}
