//! Handler traits and registration metadata.
//!
//! Handlers come in two shapes: `ActionHandler` for async bodies that are
//! awaited on the runtime, and `BlockingHandler` for synchronous bodies that
//! must run on the blocking pool. Each is registered together with the
//! argument shape it expects and how its output should be presented.

pub mod builtin;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::HandlerError;
use crate::types::{OutputMode, Parameters};

/// Argument mapping handed to a handler.
///
/// Holds `environment` and/or `payload` depending on the handler's declared
/// `Parameters`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerArgs(Map<String, Value>);

impl HandlerArgs {
    pub fn new(args: Map<String, Value>) -> Self {
        Self(args)
    }

    pub fn environment(&self) -> Option<&Map<String, Value>> {
        self.0.get("environment").and_then(Value::as_object)
    }

    pub fn payload(&self) -> Option<&Map<String, Value>> {
        self.0.get("payload").and_then(Value::as_object)
    }

    /// Look `key` up in the payload first, then the environment.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        self.payload()
            .and_then(|p| p.get(key))
            .or_else(|| self.environment().and_then(|e| e.get(key)))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// An action body that runs on the async runtime.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn run(&self, args: HandlerArgs) -> Result<Value, HandlerError>;
}

/// An action body that blocks the calling thread.
pub trait BlockingHandler: Send + Sync {
    fn run(&self, args: HandlerArgs) -> Result<Value, HandlerError>;
}

/// How a handler must be driven.
#[derive(Clone)]
pub enum HandlerKind {
    Async(Arc<dyn ActionHandler>),
    Blocking(Arc<dyn BlockingHandler>),
}

impl HandlerKind {
    pub fn is_blocking(&self) -> bool {
        matches!(self, HandlerKind::Blocking(_))
    }
}

impl std::fmt::Debug for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerKind::Async(_) => write!(f, "Async"),
            HandlerKind::Blocking(_) => write!(f, "Blocking"),
        }
    }
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn run(&self, args: HandlerArgs) -> Result<Value, HandlerError> {
        (self.0)(args).await
    }
}

struct BlockingFn<F>(F);

impl<F> BlockingHandler for BlockingFn<F>
where
    F: Fn(HandlerArgs) -> Result<Value, HandlerError> + Send + Sync,
{
    fn run(&self, args: HandlerArgs) -> Result<Value, HandlerError> {
        (self.0)(args)
    }
}

/// A handler plus the metadata declared when it was registered.
#[derive(Debug, Clone)]
pub struct Registration {
    pub kind: HandlerKind,
    pub parameters: Parameters,
    pub output_mode: OutputMode,
}

impl Registration {
    pub fn asynchronous(handler: impl ActionHandler + 'static) -> Self {
        Self::from_kind(HandlerKind::Async(Arc::new(handler)))
    }

    pub fn blocking(handler: impl BlockingHandler + 'static) -> Self {
        Self::from_kind(HandlerKind::Blocking(Arc::new(handler)))
    }

    /// Register an async closure.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        Self::asynchronous(FnHandler(f))
    }

    /// Register a synchronous closure.
    pub fn blocking_fn<F>(f: F) -> Self
    where
        F: Fn(HandlerArgs) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        Self::blocking(BlockingFn(f))
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_output_mode(mut self, output_mode: OutputMode) -> Self {
        self.output_mode = output_mode;
        self
    }

    fn from_kind(kind: HandlerKind) -> Self {
        Self {
            kind,
            parameters: Parameters::Both,
            output_mode: OutputMode::default(),
        }
    }
}

/// A registration bound to the reference it was resolved from.
#[derive(Debug, Clone)]
pub struct ResolvedHandler {
    pub reference: String,
    pub kind: HandlerKind,
    pub parameters: Parameters,
    pub output_mode: OutputMode,
}

impl ResolvedHandler {
    pub fn new(reference: impl Into<String>, registration: Registration) -> Self {
        Self {
            reference: reference.into(),
            kind: registration.kind,
            parameters: registration.parameters,
            output_mode: registration.output_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> HandlerArgs {
        match value {
            Value::Object(map) => HandlerArgs::new(map),
            _ => panic!("args must be an object"),
        }
    }

    #[test]
    fn test_handler_args_accessors() {
        let args = args(json!({
            "environment": {"container": "proxy", "mode": "env"},
            "payload": {"ip": "10.0.0.1", "mode": "payload"}
        }));
        assert_eq!(args.environment().unwrap()["container"], json!("proxy"));
        assert_eq!(args.payload().unwrap()["ip"], json!("10.0.0.1"));
        assert_eq!(args.lookup("mode"), Some(&json!("payload")));
        assert_eq!(args.lookup("container"), Some(&json!("proxy")));
        assert_eq!(args.lookup("missing"), None);
    }

    #[test]
    fn test_handler_args_without_buckets() {
        let args = args(json!({"payload": "not an object"}));
        assert!(args.payload().is_none());
        assert!(args.environment().is_none());
        assert_eq!(args.get("payload"), Some(&json!("not an object")));
    }

    #[test]
    fn test_registration_defaults() {
        let registration = Registration::blocking_fn(|_| Ok(Value::Null));
        assert!(registration.kind.is_blocking());
        assert_eq!(registration.parameters, Parameters::Both);
        assert_eq!(registration.output_mode, OutputMode::Assistant);
    }

    #[test]
    fn test_registration_builders() {
        let registration = Registration::from_fn(|_| async { Ok::<_, HandlerError>(json!("done")) })
            .with_parameters(Parameters::Payload)
            .with_output_mode(OutputMode::Execution);
        assert!(!registration.kind.is_blocking());
        assert_eq!(registration.parameters, Parameters::Payload);
        assert_eq!(registration.output_mode, OutputMode::Execution);

        let resolved = ResolvedHandler::new("testing.done", registration);
        assert_eq!(resolved.reference, "testing.done");
        assert_eq!(resolved.parameters, Parameters::Payload);
        assert_eq!(format!("{:?}", resolved.kind), "Async");
    }

    #[tokio::test]
    async fn test_fn_handlers_run() {
        let registration = Registration::from_fn(|args: HandlerArgs| async move {
            Ok::<_, HandlerError>(json!({"echo": args.lookup("word").cloned()}))
        });
        let HandlerKind::Async(handler) = registration.kind else {
            panic!("expected async handler");
        };
        let result = handler
            .run(args(json!({"payload": {"word": "hi"}})))
            .await
            .unwrap();
        assert_eq!(result, json!({"echo": "hi"}));

        let registration =
            Registration::blocking_fn(|_| Err(HandlerError::invalid("word is required")));
        let HandlerKind::Blocking(handler) = registration.kind else {
            panic!("expected blocking handler");
        };
        let err = handler.run(HandlerArgs::default()).unwrap_err();
        assert_eq!(err, HandlerError::InvalidInput("word is required".to_string()));
    }
}
