//! Loopback remote execution service over an in-memory authoritative store.
//!
//! Requests and responses are pushed through `serde_json` so that every
//! payload crossing the facade is proven transport-safe. Versions are checked
//! optimistically: any object sent with a version older than the stored one
//! fails the call with a conflict naming that object.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use remtx_dispatch::{
    ConflictSignal, EncodedData, ExecuteRequest, ExecuteResponse, IdentityAssignment, ObjectData,
    ReferenceData, RemoteExecutionFacade, RemoteFailure,
};
use remtx_types::{ActionId, AuthContext, ObjectId, Version};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Outcome of a server action or of the whole server call.
pub type RemoteResult<T> = std::result::Result<T, RemoteFailure>;

/// Authoritative copy of one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub type_name: String,
    pub version: Version,
    pub fields: BTreeMap<String, String>,
}

impl StoredObject {
    fn title(&self, oid: &ObjectId) -> String {
        match self.fields.get("title") {
            Some(title) => format!("{} '{title}'", self.type_name),
            None => format!("{} {oid}", self.type_name),
        }
    }

    fn to_data(&self, oid: &ObjectId) -> ObjectData {
        ObjectData {
            reference: self.reference(oid),
            transient: false,
            fields: self.fields.clone(),
        }
    }

    fn reference(&self, oid: &ObjectId) -> ReferenceData {
        ReferenceData {
            oid: oid.clone(),
            type_name: self.type_name.clone(),
            version: Some(self.version),
        }
    }
}

/// What a server action returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ServerReturn {
    #[default]
    Null,
    Scalar(String),
    Object(ObjectId),
}

/// Server-side implementation of an action.
///
/// Actions run without the server lock held, so they may call back into the
/// [`LoopbackServer`]. A write another caller commits to an object the action
/// touched while it ran turns the call into a conflict.
pub trait ServerAction: Send + Sync {
    fn execute(&self, call: &mut ServerCall<'_>) -> RemoteResult<ServerReturn>;
}

impl<F> ServerAction for F
where
    F: Fn(&mut ServerCall<'_>) -> RemoteResult<ServerReturn> + Send + Sync,
{
    fn execute(&self, call: &mut ServerCall<'_>) -> RemoteResult<ServerReturn> {
        self(call)
    }
}

// ---------------------------------------------------------------------------
// ServerCall
// ---------------------------------------------------------------------------

/// One action execution against a working copy of the store.
///
/// Changes become authoritative only if the action returns `Ok`.
pub struct ServerCall<'a> {
    auth: &'a AuthContext,
    objects: &'a mut HashMap<ObjectId, StoredObject>,
    next_id: &'a mut u64,
    target: Option<ObjectId>,
    parameters: Vec<EncodedData>,
    changed: Vec<ObjectId>,
    disposed: Vec<ReferenceData>,
    messages: Vec<String>,
    warnings: Vec<String>,
}

impl ServerCall<'_> {
    #[must_use]
    pub fn user(&self) -> &str {
        &self.auth.user
    }

    /// Server identity of the target, if the action has one.
    #[must_use]
    pub fn target(&self) -> Option<&ObjectId> {
        self.target.as_ref()
    }

    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Server identity of an object parameter.
    #[must_use]
    pub fn parameter_oid(&self, index: usize) -> Option<&ObjectId> {
        self.parameters.get(index).and_then(EncodedData::oid)
    }

    #[must_use]
    pub fn parameter_scalar(&self, index: usize) -> Option<&str> {
        match self.parameters.get(index) {
            Some(EncodedData::Scalar(text)) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn field(&self, oid: &ObjectId, name: &str) -> Option<&str> {
        self.objects
            .get(oid)
            .and_then(|object| object.fields.get(name))
            .map(String::as_str)
    }

    /// Change a field; the object's version advances once per call.
    pub fn set_field(
        &mut self,
        oid: &ObjectId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> RemoteResult<()> {
        let object = self
            .objects
            .get_mut(oid)
            .ok_or_else(|| RemoteFailure::Server(format!("unknown object {oid}")))?;
        object.fields.insert(name.into(), value.into());
        if !self.changed.contains(oid) {
            object.version = object.version.next();
            self.changed.push(oid.clone());
        }
        Ok(())
    }

    /// Create a persistent object; it is reported back as an update.
    pub fn create(&mut self, type_name: &str, fields: BTreeMap<String, String>) -> ObjectId {
        let oid = mint_oid(self.next_id, type_name);
        self.objects.insert(
            oid.clone(),
            StoredObject {
                type_name: type_name.to_owned(),
                version: Version::INITIAL,
                fields,
            },
        );
        self.changed.push(oid.clone());
        oid
    }

    pub fn dispose(&mut self, oid: &ObjectId) -> RemoteResult<()> {
        let object = self
            .objects
            .remove(oid)
            .ok_or_else(|| RemoteFailure::Server(format!("unknown object {oid}")))?;
        self.changed.retain(|changed| changed != oid);
        self.disposed.push(object.reference(oid));
        Ok(())
    }

    pub fn message(&mut self, text: impl Into<String>) {
        self.messages.push(text.into());
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.warnings.push(text.into());
    }
}

fn mint_oid(next_id: &mut u64, type_name: &str) -> ObjectId {
    *next_id += 1;
    ObjectId::new(format!("{}-{}", type_name.to_ascii_uppercase(), *next_id))
}

// ---------------------------------------------------------------------------
// LoopbackServer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ServerState {
    objects: HashMap<ObjectId, StoredObject>,
    actions: HashMap<ActionId, Arc<dyn ServerAction>>,
    next_id: u64,
    transport_down: bool,
    calls: u64,
}

/// In-process [`RemoteExecutionFacade`] with versioned authoritative state.
#[derive(Clone, Default)]
pub struct LoopbackServer {
    state: Arc<Mutex<ServerState>>,
}

impl LoopbackServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object directly, at [`Version::INITIAL`].
    pub fn seed<I, K, V>(&self, type_name: &str, oid: ObjectId, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.state.lock().objects.insert(
            oid,
            StoredObject {
                type_name: type_name.to_owned(),
                version: Version::INITIAL,
                fields,
            },
        );
    }

    pub fn register_action(&self, id: ActionId, action: impl ServerAction + 'static) {
        self.state.lock().actions.insert(id, Arc::new(action));
    }

    /// Simulate another user's committed write to `oid`.
    ///
    /// Returns the new version, or `None` if the object does not exist.
    pub fn concurrent_write(&self, oid: &ObjectId, field: &str, value: &str) -> Option<Version> {
        let mut state = self.state.lock();
        let object = state.objects.get_mut(oid)?;
        object.fields.insert(field.to_owned(), value.to_owned());
        object.version = object.version.next();
        Some(object.version)
    }

    #[must_use]
    pub fn stored(&self, oid: &ObjectId) -> Option<StoredObject> {
        self.state.lock().objects.get(oid).cloned()
    }

    /// Make every subsequent call fail at the transport level.
    pub fn set_transport_down(&self, down: bool) {
        self.state.lock().transport_down = down;
    }

    /// Number of calls that reached the server.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.state.lock().calls
    }

    fn handle(&self, request: &ExecuteRequest) -> RemoteResult<ExecuteResponse> {
        let (action, base, base_next_id, read) = {
            let mut state = self.state.lock();
            state.calls += 1;
            let action = state
                .actions
                .get(&request.action_id)
                .cloned()
                .ok_or_else(|| {
                    RemoteFailure::Server(format!("no such action {}", request.action_id))
                })?;
            let read = check_versions(&state.objects, request)?;
            (action, state.objects.clone(), state.next_id, read)
        };

        let mut objects = base.clone();
        let mut next_id = base_next_id;

        // Persist transient objects sent by the client.
        let mut aliases: HashMap<ObjectId, ObjectId> = HashMap::new();
        let mut persist = |data: &EncodedData| -> Option<IdentityAssignment> {
            let EncodedData::Object(object) = data else {
                return None;
            };
            if !object.transient || aliases.contains_key(object.oid()) {
                return None;
            }
            let oid = mint_oid(&mut next_id, &object.reference.type_name);
            objects.insert(
                oid.clone(),
                StoredObject {
                    type_name: object.reference.type_name.clone(),
                    version: Version::INITIAL,
                    fields: object.fields.clone(),
                },
            );
            aliases.insert(object.oid().clone(), oid.clone());
            Some(IdentityAssignment {
                oid,
                version: Version::INITIAL,
            })
        };
        let persisted_parameters: Vec<_> = request.parameters.iter().map(&mut persist).collect();
        let persisted_target = request.target.as_ref().and_then(&mut persist);
        for data in &request.parameters {
            if let EncodedData::Collection(items) = data {
                for item in items {
                    persist(item);
                }
            }
        }

        let server_oid = |oid: &ObjectId| aliases.get(oid).cloned().unwrap_or_else(|| oid.clone());
        let target = request
            .target
            .as_ref()
            .and_then(EncodedData::oid)
            .map(server_oid);
        let parameters = request
            .parameters
            .iter()
            .map(|data| rewrite_identities(data, &server_oid))
            .collect();

        let mut call = ServerCall {
            auth: &request.auth,
            objects: &mut objects,
            next_id: &mut next_id,
            target,
            parameters,
            changed: Vec::new(),
            disposed: Vec::new(),
            messages: Vec::new(),
            warnings: Vec::new(),
        };
        let returned = action.execute(&mut call)?;
        let ServerCall {
            changed,
            disposed,
            messages,
            warnings,
            ..
        } = call;

        let result = match returned {
            ServerReturn::Null => EncodedData::Null,
            ServerReturn::Scalar(text) => EncodedData::Scalar(text),
            ServerReturn::Object(oid) => {
                let stored = objects.get(&oid).ok_or_else(|| {
                    RemoteFailure::Server(format!("returned unknown object {oid}"))
                })?;
                EncodedData::Reference(stored.reference(&oid))
            }
        };
        let updates = changed
            .iter()
            .filter_map(|oid| objects.get(oid).map(|stored| stored.to_data(oid)))
            .collect();

        let mut touched = read;
        touched.extend(changed);
        touched.extend(aliases.into_values());
        touched.extend(disposed.iter().map(|reference| reference.oid.clone()));
        let work = WorkingCopy {
            base: &base,
            base_next_id,
            objects: &objects,
            next_id,
        };
        work.commit(&mut self.state.lock(), &touched)?;

        Ok(ExecuteResponse {
            result,
            persisted_target,
            persisted_parameters,
            updates,
            disposed,
            messages,
            warnings,
        })
    }
}

/// A call's private copy of the store next to the snapshot it was taken from.
struct WorkingCopy<'a> {
    base: &'a HashMap<ObjectId, StoredObject>,
    base_next_id: u64,
    objects: &'a HashMap<ObjectId, StoredObject>,
    next_id: u64,
}

impl WorkingCopy<'_> {
    /// Publish the `touched` objects, unless another call changed one of
    /// them or minted identities since the snapshot.
    fn commit(&self, state: &mut ServerState, touched: &[ObjectId]) -> RemoteResult<()> {
        if self.next_id != self.base_next_id && state.next_id != self.base_next_id {
            return Err(RemoteFailure::Conflict(ConflictSignal::new(
                None,
                "identities were allocated by another call",
            )));
        }
        for oid in touched {
            let Some(before) = self.base.get(oid) else {
                continue;
            };
            match state.objects.get(oid) {
                Some(now) if now.version == before.version => {}
                Some(now) => {
                    return Err(RemoteFailure::Conflict(ConflictSignal::new(
                        Some(oid.clone()),
                        format!(
                            "{} was changed by another user during the call",
                            now.title(oid)
                        ),
                    )));
                }
                None => {
                    return Err(RemoteFailure::Conflict(ConflictSignal::new(
                        None,
                        format!("{} was deleted during the call", before.title(oid)),
                    )));
                }
            }
        }
        for oid in touched {
            match self.objects.get(oid) {
                Some(stored) => {
                    state.objects.insert(oid.clone(), stored.clone());
                }
                None => {
                    state.objects.remove(oid);
                }
            }
        }
        state.next_id = state.next_id.max(self.next_id);
        Ok(())
    }
}

impl RemoteExecutionFacade for LoopbackServer {
    fn execute_server_action(&self, request: ExecuteRequest) -> RemoteResult<ExecuteResponse> {
        if self.state.lock().transport_down {
            return Err(RemoteFailure::Transport("loopback transport is down".into()));
        }
        let request: ExecuteRequest = round_trip(&request)?;
        tracing::debug!(
            action = %request.action_id,
            user = %request.auth.user,
            "loopback request"
        );
        let response = self.handle(&request)?;
        round_trip(&response)
    }
}

fn round_trip<T: Serialize + DeserializeOwned>(value: &T) -> RemoteResult<T> {
    let json = serde_json::to_string(value)
        .map_err(|err| RemoteFailure::Transport(format!("encode failed: {err}")))?;
    serde_json::from_str(&json)
        .map_err(|err| RemoteFailure::Transport(format!("decode failed: {err}")))
}

/// Fail with a conflict on the first object sent with a stale version.
///
/// Returns the identities of every referenced object.
fn check_versions(
    objects: &HashMap<ObjectId, StoredObject>,
    request: &ExecuteRequest,
) -> RemoteResult<Vec<ObjectId>> {
    let mut seen = HashSet::new();
    let mut pending: Vec<&EncodedData> = request.target.iter().collect();
    pending.extend(request.parameters.iter());
    while let Some(data) = pending.pop() {
        let reference = match data {
            EncodedData::Reference(reference) => reference,
            EncodedData::Object(object) if !object.transient => &object.reference,
            EncodedData::Collection(items) => {
                pending.extend(items.iter());
                continue;
            }
            _ => continue,
        };
        let (Some(sent), true) = (reference.version, seen.insert(&reference.oid)) else {
            continue;
        };
        let stored = objects.get(&reference.oid).ok_or_else(|| {
            RemoteFailure::Conflict(ConflictSignal::new(
                None,
                format!("{} {} no longer exists", reference.type_name, reference.oid),
            ))
        })?;
        if stored.version != sent {
            return Err(RemoteFailure::Conflict(ConflictSignal::new(
                Some(reference.oid.clone()),
                format!(
                    "{} was changed by another user ({sent} < {})",
                    stored.title(&reference.oid),
                    stored.version
                ),
            )));
        }
    }
    Ok(seen.into_iter().cloned().collect())
}

fn rewrite_identities(
    data: &EncodedData,
    server_oid: &impl Fn(&ObjectId) -> ObjectId,
) -> EncodedData {
    match data {
        EncodedData::Reference(reference) => EncodedData::Reference(ReferenceData {
            oid: server_oid(&reference.oid),
            ..reference.clone()
        }),
        EncodedData::Object(object) => EncodedData::Object(ObjectData {
            reference: ReferenceData {
                oid: server_oid(object.oid()),
                ..object.reference.clone()
            },
            ..object.clone()
        }),
        EncodedData::Collection(items) => EncodedData::Collection(
            items
                .iter()
                .map(|item| rewrite_identities(item, server_oid))
                .collect(),
        ),
        other => other.clone(),
    }
}
