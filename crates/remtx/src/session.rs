//! A session: one transaction manager plus the dispatch collaborators its
//! actions share.

use std::sync::Arc;

use remtx_dispatch::{
    ActionDispatcher, DispatchContext, LocalAction, PersistenceResolver, RemoteExecutionFacade,
};
use remtx_error::Result;
use remtx_memory::{LoopbackServer, MemoryObjectStore, StaticAuthentication};
use remtx_observability::{DispatchEvent, DispatchMetricsSnapshot, MetricsObserver};
use remtx_txn::{TransactionHooks, TransactionManager};
use remtx_types::{ActionDescriptor, ActionValue, AuthContext, ObjectHandle};

use crate::config::RuntimeConfig;

/// One client's unit-of-work boundary.
///
/// Owns the [`TransactionManager`] and the collaborators every dispatcher it
/// hands out shares, and records each dispatch decision in a metrics observer.
pub struct Session {
    manager: TransactionManager,
    context: DispatchContext,
    observer: Arc<MetricsObserver>,
}

impl Session {
    /// Open a session for `auth` against the given resolver and facade.
    pub fn open(
        config: &RuntimeConfig,
        auth: AuthContext,
        resolver: Arc<dyn PersistenceResolver>,
        facade: Arc<dyn RemoteExecutionFacade>,
    ) -> Self {
        Self::open_with_hooks(config, auth, resolver, facade, None)
    }

    /// As [`Session::open`], with storage hooks driven by every transaction.
    pub fn open_with_hooks(
        config: &RuntimeConfig,
        auth: AuthContext,
        resolver: Arc<dyn PersistenceResolver>,
        facade: Arc<dyn RemoteExecutionFacade>,
        hooks: Option<Box<dyn TransactionHooks>>,
    ) -> Self {
        let mut manager = match hooks {
            Some(hooks) => TransactionManager::with_hooks(config.txn.clone(), hooks),
            None => TransactionManager::new(config.txn.clone()),
        };
        let capacity = config.observability.event_log_capacity;
        let observer = Arc::new(MetricsObserver::new(capacity));
        let context = DispatchContext::new(
            resolver,
            facade,
            Arc::new(StaticAuthentication::new(auth.clone())),
        )
        .with_observer(observer.clone())
        .with_config(config.dispatch.clone());
        tracing::info!(user = %auth.user, session_id = %auth.session_id, "session opened");
        manager.open(auth);
        Self {
            manager,
            context,
            observer,
        }
    }

    /// Session over a fresh [`MemoryObjectStore`] talking to `server`.
    pub fn in_memory(
        config: &RuntimeConfig,
        auth: AuthContext,
        server: &LoopbackServer,
    ) -> (Self, Arc<MemoryObjectStore>) {
        let store = Arc::new(MemoryObjectStore::new(server.clone()));
        let session = Self::open(config, auth, store.clone(), Arc::new(server.clone()));
        (session, store)
    }

    /// Dispatcher for one action, sharing this session's collaborators.
    pub fn dispatcher(
        &self,
        descriptor: ActionDescriptor,
        local: Arc<dyn LocalAction>,
    ) -> ActionDispatcher {
        ActionDispatcher::new(descriptor, local, self.context.clone())
    }

    pub fn manager(&mut self) -> &mut TransactionManager {
        &mut self.manager
    }

    #[must_use]
    pub fn context(&self) -> &DispatchContext {
        &self.context
    }

    /// Run `body` as a unit of work (or within the one in progress).
    pub fn run<T, F>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&mut TransactionManager) -> Result<T>,
    {
        self.manager.run(body)
    }

    /// Invoke one action as its own unit of work.
    pub fn invoke(
        &mut self,
        dispatcher: &ActionDispatcher,
        target: Option<&ObjectHandle>,
        parameters: &[ActionValue],
    ) -> Result<ActionValue> {
        dispatcher.invoke_transactional(&mut self.manager, target, parameters)
    }

    #[must_use]
    pub fn metrics(&self) -> DispatchMetricsSnapshot {
        self.observer.metrics().snapshot()
    }

    #[must_use]
    pub fn recent_events(&self) -> Vec<DispatchEvent> {
        self.observer.log().snapshot()
    }

    /// Abort anything in progress and detach the session.
    pub fn close(&mut self) {
        self.manager.close();
        tracing::info!("session closed");
    }
}
