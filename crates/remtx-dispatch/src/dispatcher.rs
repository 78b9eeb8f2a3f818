//! Per-action dispatch: run locally, or delegate to the remote service and
//! fold its results back into the current transaction.

use std::sync::Arc;

use remtx_error::{RemtxError, Result};
use remtx_observability::{DispatchEvent, DispatchObserver, FailureCategory, NoOpObserver};
use remtx_txn::TransactionManager;
use remtx_types::{ActionDescriptor, ActionId, ActionValue, Lifecycle, ObjectHandle};

use crate::config::DispatchConfig;
use crate::encoding::GraphEncoder;
use crate::placement::{TargetFacts, execute_remotely};
use crate::protocol::{ConflictSignal, ExecuteRequest, ExecuteResponse, KnownObjects, RemoteFailure};
use crate::traits::{
    AuthenticationProvider, LocalAction, ObjectEncoder, PersistenceResolver,
    RemoteExecutionFacade,
};

// ---------------------------------------------------------------------------
// DispatchContext
// ---------------------------------------------------------------------------

/// Collaborators shared by every dispatcher of one session.
#[derive(Clone)]
pub struct DispatchContext {
    pub resolver: Arc<dyn PersistenceResolver>,
    pub encoder: Arc<dyn ObjectEncoder>,
    pub facade: Arc<dyn RemoteExecutionFacade>,
    pub auth: Arc<dyn AuthenticationProvider>,
    pub observer: Arc<dyn DispatchObserver>,
    pub config: DispatchConfig,
}

impl DispatchContext {
    /// Context using a [`GraphEncoder`] over `resolver` and no observer.
    pub fn new(
        resolver: Arc<dyn PersistenceResolver>,
        facade: Arc<dyn RemoteExecutionFacade>,
        auth: Arc<dyn AuthenticationProvider>,
    ) -> Self {
        Self {
            encoder: Arc::new(GraphEncoder::new(Arc::clone(&resolver))),
            resolver,
            facade,
            auth,
            observer: Arc::new(NoOpObserver),
            config: DispatchConfig::default(),
        }
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: Arc<dyn ObjectEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }
}

// ---------------------------------------------------------------------------
// ActionDispatcher
// ---------------------------------------------------------------------------

/// Wraps one action's local implementation with remote delegation.
pub struct ActionDispatcher {
    descriptor: ActionDescriptor,
    local: Arc<dyn LocalAction>,
    ctx: DispatchContext,
}

impl ActionDispatcher {
    pub fn new(
        descriptor: ActionDescriptor,
        local: Arc<dyn LocalAction>,
        ctx: DispatchContext,
    ) -> Self {
        Self {
            descriptor,
            local,
            ctx,
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    fn action_id(&self) -> &ActionId {
        &self.descriptor.id
    }

    fn emit(&self, event: impl FnOnce(u64) -> DispatchEvent) {
        let observer = &self.ctx.observer;
        observer.on_event(&event(observer.now_ns()));
    }

    /// Whether this invocation would be delegated to the remote service.
    #[must_use]
    pub fn executes_remotely(&self, target: Option<&ObjectHandle>) -> bool {
        let locale = self.ctx.config.effective_locale(self.descriptor.locale);
        let facts = target.map(|object| TargetFacts {
            is_service: object.is_service(),
            is_persistent: self.ctx.resolver.is_persistent(object),
        });
        execute_remotely(locale, facts)
    }

    /// Invoke the action within the transaction in progress on `tm`.
    ///
    /// Remote execution requires a transaction in progress because the
    /// response is applied to its sinks.
    pub fn invoke(
        &self,
        tm: &mut TransactionManager,
        target: Option<&ObjectHandle>,
        parameters: &[ActionValue],
    ) -> Result<ActionValue> {
        if self.executes_remotely(target) {
            return self.execute_remote(tm, target, parameters);
        }
        tracing::debug!(
            action = %self.action_id(),
            target = %describe_target(target),
            parameters = parameters.len(),
            "execute locally"
        );
        self.emit(|timestamp_ns| DispatchEvent::LocalExecution {
            action: self.action_id().clone(),
            timestamp_ns,
        });
        self.local.invoke(tm, target, parameters)
    }

    /// Invoke as its own unit of work, or as part of the one in progress.
    pub fn invoke_transactional(
        &self,
        tm: &mut TransactionManager,
        target: Option<&ObjectHandle>,
        parameters: &[ActionValue],
    ) -> Result<ActionValue> {
        tm.run(|tm| self.invoke(tm, target, parameters))
    }

    // -- remote path --------------------------------------------------------

    fn execute_remote(
        &self,
        tm: &mut TransactionManager,
        target: Option<&ObjectHandle>,
        parameters: &[ActionValue],
    ) -> Result<ActionValue> {
        if !tm.is_in_transaction() {
            return Err(RemtxError::NoActiveTransaction);
        }
        let action = self.action_id();
        tracing::debug!(
            action = %action,
            target = %describe_target(target),
            parameters = parameters.len(),
            "execute remotely"
        );

        let mut known = KnownObjects::new();
        let encoded_parameters = parameters
            .iter()
            .map(|value| self.ctx.encoder.encode_parameter(value, &mut known))
            .collect::<Result<Vec<_>>>()?;
        let encoded_target = target
            .map(|object| self.ctx.encoder.encode_target(object, &mut known))
            .transpose()?;

        let request = ExecuteRequest {
            auth: self.ctx.auth.authentication()?,
            action_type: self.descriptor.action_type,
            action_id: action.clone(),
            target: encoded_target,
            parameters: encoded_parameters,
        };
        if self.ctx.config.log_payloads {
            tracing::debug!(action = %action, request = ?request, "remote request payload");
        }
        self.emit(|timestamp_ns| DispatchEvent::RemoteSubmitted {
            action: action.clone(),
            target: target.map(ObjectHandle::oid),
            parameters: parameters.len(),
            timestamp_ns,
        });

        match self.ctx.facade.execute_server_action(request) {
            Ok(response) => self.apply_response(tm, target, parameters, &response, &mut known),
            Err(RemoteFailure::Conflict(signal)) => Err(self.recover_conflict(signal)),
            Err(failure) => {
                let category = match failure {
                    RemoteFailure::Transport(_) => FailureCategory::Transport,
                    _ => FailureCategory::Server,
                };
                let err = RemtxError::from(failure);
                tracing::error!(action = %action, error = %err, "remoting exception");
                self.emit(|timestamp_ns| DispatchEvent::RemoteFailed {
                    action: action.clone(),
                    category,
                    timestamp_ns,
                });
                Err(err)
            }
        }
    }

    fn apply_response(
        &self,
        tm: &mut TransactionManager,
        target: Option<&ObjectHandle>,
        parameters: &[ActionValue],
        response: &ExecuteResponse,
        known: &mut KnownObjects,
    ) -> Result<ActionValue> {
        let action = self.action_id();
        if self.ctx.config.log_payloads {
            tracing::debug!(action = %action, response = ?response, "remote response payload");
        }
        let encoder = &self.ctx.encoder;

        // Transient-now-persistent objects first: later decoding resolves by
        // the new identities.
        if let Some(object) = target.filter(|t| t.lifecycle() == Lifecycle::Transient) {
            if let Some(assignment) = &response.persisted_target {
                encoder.made_persistent(object, assignment)?;
            }
        }
        for (index, value) in parameters.iter().enumerate() {
            if self.descriptor.parameter_is_collection(index) {
                continue;
            }
            let ActionValue::Object(object) = value else {
                continue;
            };
            if let Some(Some(assignment)) = response.persisted_parameters.get(index) {
                encoder.made_persistent(object, assignment)?;
            }
        }

        let result = if response.result.is_null() {
            ActionValue::Null
        } else {
            encoder.decode(&response.result, known)?
        };

        for update in &response.updates {
            tracing::debug!(oid = %update.oid(), "update");
            let object = encoder.decode_update(update, known)?;
            tm.update_notifier_mut()?.add_changed(object);
        }

        for reference in &response.disposed {
            tracing::debug!(oid = %reference.oid, "disposed");
            let object = self.ctx.resolver.resolve(&reference.oid)?;
            tm.update_notifier_mut()?.add_disposed(object);
        }

        let sink = tm.message_sink_mut()?;
        sink.extend_messages(response.messages.iter().cloned());
        sink.extend_warnings(response.warnings.iter().cloned());

        self.emit(|timestamp_ns| DispatchEvent::RemoteApplied {
            action: action.clone(),
            updates: response.updates.len(),
            disposed: response.disposed.len(),
            messages: response.messages.len(),
            warnings: response.warnings.len(),
            timestamp_ns,
        });
        Ok(result)
    }

    /// Reload the stale object named by `signal` and build the error to
    /// raise. A conflict without a source is returned unchanged.
    fn recover_conflict(&self, signal: ConflictSignal) -> RemtxError {
        let action = self.action_id();
        let Some(oid) = signal.source.clone() else {
            tracing::info!(
                action = %action,
                cause = %signal.cause,
                "concurrency conflict without source"
            );
            self.emit(|timestamp_ns| DispatchEvent::ConflictUnrecoverable {
                action: action.clone(),
                timestamp_ns,
            });
            return signal.into();
        };
        let original = Box::new(RemtxError::from(signal));

        let reloaded = self
            .ctx
            .resolver
            .resolve(&oid)
            .and_then(|object| self.ctx.resolver.reload(&object).map(|()| object));
        match reloaded {
            Ok(object) => {
                tracing::info!(action = %action, %oid, "concurrency conflict: {original}");
                self.emit(|timestamp_ns| DispatchEvent::ConflictReloaded {
                    action: action.clone(),
                    oid: oid.clone(),
                    timestamp_ns,
                });
                RemtxError::ConcurrencyConflict {
                    detail: format!("object automatically reloaded: {}", object.title()),
                    oid: Some(oid),
                    cause: Some(original),
                }
            }
            Err(err) => {
                tracing::error!(
                    action = %action,
                    %oid,
                    error = %err,
                    "could not reload stale object"
                );
                self.emit(|timestamp_ns| DispatchEvent::ConflictUnrecoverable {
                    action: action.clone(),
                    timestamp_ns,
                });
                RemtxError::ConcurrencyConflict {
                    detail: format!("stale object {oid} could not be reloaded: {err}"),
                    oid: Some(oid),
                    cause: Some(original),
                }
            }
        }
    }
}

fn describe_target(target: Option<&ObjectHandle>) -> String {
    target.map_or_else(|| "<none>".to_owned(), ToString::to_string)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
