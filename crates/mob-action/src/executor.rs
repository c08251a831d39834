//! Runs resolved handlers under a wall-clock bound.
//!
//! Async handlers run as their own task so a panic surfaces as an error
//! instead of tearing down the caller. The task is aborted when the
//! invocation is dropped, whether by the timeout or by a caller that stopped
//! waiting. Blocking handlers run on tokio's
//! blocking pool behind a semaphore. In both cases the timeout covers the
//! whole invocation, including the wait for a blocking worker.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio_util::task::AbortOnDropHandle;
use tracing::debug;

use mob_core::config::ActionsConfig;

use crate::error::ExecutionError;
use crate::handler::{HandlerArgs, HandlerKind, ResolvedHandler};
use crate::types::Parameters;

/// Invokes handlers with normalized arguments and a timeout.
#[derive(Debug, Clone)]
pub struct ExecutionAdapter {
    default_timeout: Duration,
    blocking_permits: Arc<Semaphore>,
}

impl ExecutionAdapter {
    /// A zero `default_timeout` or zero workers is bumped to the smallest
    /// usable value.
    pub fn new(default_timeout: Duration, max_blocking_workers: usize) -> Self {
        let default_timeout = if default_timeout.is_zero() {
            Duration::from_millis(1)
        } else {
            default_timeout
        };
        Self {
            default_timeout,
            blocking_permits: Arc::new(Semaphore::new(max_blocking_workers.max(1))),
        }
    }

    pub fn from_config(config: &ActionsConfig) -> Self {
        Self::new(config.default_timeout(), config.max_blocking_workers)
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// `timeout`, or the process default when it is zero.
    pub fn effective_timeout(&self, timeout: Duration) -> Duration {
        if timeout.is_zero() {
            self.default_timeout
        } else {
            timeout
        }
    }

    /// Blocking workers that could start right now.
    pub fn available_workers(&self) -> usize {
        self.blocking_permits.available_permits()
    }

    /// Run `handler` with the given buckets, giving up after `timeout`.
    ///
    /// On expiry an async handler is cancelled at its next suspension point;
    /// a blocking worker is left to finish on its own. Side effects either
    /// may already have produced are not undone.
    pub async fn invoke(
        &self,
        handler: &ResolvedHandler,
        environment: Map<String, Value>,
        payload: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, ExecutionError> {
        let timeout = self.effective_timeout(timeout);
        let args = build_arguments(handler.parameters, environment, payload);
        debug!(
            reference = %handler.reference,
            parameters = %handler.parameters,
            timeout_secs = timeout.as_secs_f64(),
            "Invoking handler"
        );

        match &handler.kind {
            HandlerKind::Async(body) => {
                let body = Arc::clone(body);
                let task =
                    AbortOnDropHandle::new(tokio::spawn(async move { body.run(args).await }));
                match tokio::time::timeout(timeout, task).await {
                    Ok(Ok(result)) => result.map_err(ExecutionError::from),
                    Ok(Err(join_err)) => Err(ExecutionError::WorkerLost(join_err.to_string())),
                    Err(_) => Err(ExecutionError::Timeout { after: timeout }),
                }
            }
            HandlerKind::Blocking(body) => {
                let body = Arc::clone(body);
                let permits = Arc::clone(&self.blocking_permits);
                let work = async move {
                    let permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| ExecutionError::WorkerLost(e.to_string()))?;
                    tokio::task::spawn_blocking(move || {
                        // Held until the body returns, even after a timeout.
                        let _permit = permit;
                        body.run(args)
                    })
                    .await
                    .map_err(|e| ExecutionError::WorkerLost(e.to_string()))?
                    .map_err(ExecutionError::from)
                };
                tokio::time::timeout(timeout, work)
                    .await
                    .unwrap_or(Err(ExecutionError::Timeout { after: timeout }))
            }
        }
    }
}

/// Shape the argument mapping for a handler's declared parameters.
///
/// `Bag` handlers get the same combined mapping as `Both`, as one value.
pub fn build_arguments(
    parameters: Parameters,
    environment: Map<String, Value>,
    payload: Map<String, Value>,
) -> HandlerArgs {
    let mut args = Map::new();
    match parameters {
        Parameters::Environment => {
            args.insert("environment".to_string(), Value::Object(environment));
        }
        Parameters::Payload => {
            args.insert("payload".to_string(), Value::Object(payload));
        }
        Parameters::Both | Parameters::Bag => {
            args.insert("environment".to_string(), Value::Object(environment));
            args.insert("payload".to_string(), Value::Object(payload));
        }
    }
    HandlerArgs::new(args)
}
