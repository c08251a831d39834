//! Dispatcher: runs one named action end to end.
//!
//! Coordinates the pipeline from registry lookup through authorization,
//! handler resolution and bounded execution, and classifies every failure.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use mob_core::config::ActionsConfig;

use crate::error::{ConfigError, DispatchError, ExecutionError, FailureKind, HandlerError};
use crate::executor::ExecutionAdapter;
use crate::lifecycle::{DispatchState, DispatchTrace};
use crate::registry::{HandlerRegistry, Resolver};
use crate::store::{ConfigSnapshot, ConfigStore};
use crate::types::{DispatchRequest, ExecutionOutcome, OutcomeStatus, OutputMode};

/// Resolves action names and runs their handlers.
pub struct Dispatcher {
    store: Arc<ConfigStore>,
    registry: Arc<HandlerRegistry>,
    adapter: ExecutionAdapter,
}

impl Dispatcher {
    pub fn new(
        store: Arc<ConfigStore>,
        registry: Arc<HandlerRegistry>,
        adapter: ExecutionAdapter,
    ) -> Self {
        Self {
            store,
            registry,
            adapter,
        }
    }

    /// Build a dispatcher for the configured registry file and `resolver`.
    pub fn from_config(config: &ActionsConfig, resolver: impl Resolver + 'static) -> Self {
        Self::new(
            Arc::new(ConfigStore::new(config.registry_path.clone())),
            Arc::new(HandlerRegistry::new(resolver)),
            ExecutionAdapter::from_config(config),
        )
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn adapter(&self) -> &ExecutionAdapter {
        &self.adapter
    }

    /// Run the action named in `request`.
    ///
    /// The passkey is checked before the handler is resolved, so an
    /// unauthorized caller cannot learn which handlers exist.
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
    ) -> Result<ExecutionOutcome, DispatchError> {
        let loaded = self.snapshot().await;
        self.run(loaded, request).await
    }

    /// Run `request` against a snapshot the caller already holds, so every
    /// registry lookup made for one order sees the same document version.
    pub async fn dispatch_with(
        &self,
        snapshot: Arc<ConfigSnapshot>,
        request: DispatchRequest,
    ) -> Result<ExecutionOutcome, DispatchError> {
        self.run(Ok(snapshot), request).await
    }

    /// The current registry snapshot, read off the runtime workers.
    pub async fn snapshot(&self) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        Arc::clone(&self.store).snapshot().await
    }

    async fn run(
        &self,
        loaded: Result<Arc<ConfigSnapshot>, ConfigError>,
        request: DispatchRequest,
    ) -> Result<ExecutionOutcome, DispatchError> {
        let mut trace = DispatchTrace::new(request.action.clone());
        let action = request.action.as_str();

        let snapshot = match loaded {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(fail(&mut trace, DispatchError::from_config(action, &e))),
        };
        transition(&mut trace, DispatchState::ConfigLoaded);

        let Some(descriptor) = snapshot.get(action) else {
            return Err(fail(&mut trace, DispatchError::unknown_action(action)));
        };
        if !descriptor.accepts_passkey(request.passkey.as_deref()) {
            return Err(fail(&mut trace, DispatchError::unauthorized(action)));
        }

        let handler = match self.registry.resolve(&descriptor.handler_reference) {
            Ok(handler) => handler,
            Err(e) => return Err(fail(&mut trace, DispatchError::from_resolution(action, &e))),
        };
        transition(&mut trace, DispatchState::Resolved);

        let environment = merged_environment(&descriptor.environment, request.extra_environment);
        let timeout = self
            .adapter
            .effective_timeout(descriptor.resolved_timeout(self.adapter.default_timeout()));
        drop(snapshot);

        transition(&mut trace, DispatchState::Executing);
        let started = Instant::now();
        let result = self
            .adapter
            .invoke(&handler, environment, request.payload, timeout)
            .await;
        let duration = started.elapsed();

        match result {
            Ok(value) => {
                transition(&mut trace, DispatchState::Succeeded);
                let outcome = ExecutionOutcome {
                    request_id: trace.request_id(),
                    action: action.to_string(),
                    status: OutcomeStatus::Success,
                    result: value,
                    duration,
                    output_mode: handler.output_mode,
                };
                info!(
                    request_id = %outcome.request_id,
                    action = %outcome.action,
                    handler = %handler.reference,
                    duration_ms = outcome.duration_ms(),
                    "Action executed"
                );
                Ok(outcome)
            }
            Err(ExecutionError::Timeout { after }) => {
                Err(fail(&mut trace, DispatchError::timeout(action, after)))
            }
            Err(ExecutionError::Handler(HandlerError::InvalidInput(msg))) => Err(fail(
                &mut trace,
                DispatchError::new(FailureKind::InvalidInput, action, msg),
            )),
            Err(e @ (ExecutionError::Handler(HandlerError::Failed(_))
            | ExecutionError::WorkerLost(_))) => {
                error!(
                    request_id = %trace.request_id(),
                    action = %action,
                    handler = %handler.reference,
                    error = %e,
                    "Action raised an unexpected error"
                );
                Err(fail(&mut trace, DispatchError::unexpected(action)))
            }
        }
    }

    /// The registry as it may be shown to an LLM.
    pub async fn catalogue(&self) -> Result<Value, ConfigError> {
        Ok(self.snapshot().await?.public_catalogue())
    }

    /// Configured action names, sorted.
    pub async fn action_names(&self) -> Result<Vec<String>, ConfigError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.names().into_iter().map(str::to_string).collect())
    }

    /// Output mode of the handler behind `action` in `snapshot`, if it
    /// resolves.
    pub fn output_mode(&self, snapshot: &ConfigSnapshot, action: &str) -> Option<OutputMode> {
        let descriptor = snapshot.get(action)?;
        self.registry
            .resolve(&descriptor.handler_reference)
            .ok()
            .map(|handler| handler.output_mode)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("store", &self.store)
            .field("registry", &self.registry)
            .finish()
    }
}

fn transition(trace: &mut DispatchTrace, to: DispatchState) {
    if let Err(e) = trace.advance(to) {
        warn!(request_id = %trace.request_id(), error = %e, "Dispatch lifecycle violation");
    }
}

/// Move `trace` to the failure's terminal state and hand the error back.
fn fail(trace: &mut DispatchTrace, err: DispatchError) -> DispatchError {
    transition(trace, err.state());
    if err.kind != FailureKind::UnexpectedFailure {
        warn!(
            request_id = %trace.request_id(),
            action = %err.action,
            kind = %err.kind,
            elapsed_ms = trace.started().elapsed().as_secs_f64() * 1000.0,
            "{}",
            err.message
        );
    }
    err
}

/// Merge `extra` over `base`, returning a new map.
pub fn merged_environment(base: &Map<String, Value>, extra: Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    merged.extend(extra);
    merged
}
