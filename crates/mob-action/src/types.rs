//! Core types and value objects for the action engine.
//!
//! Defines descriptors, dispatch requests, execution outcomes and the
//! enumerations handlers declare at registration time.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Which argument buckets a handler wants to receive.
///
/// Declared once at registration so the adapter never has to inspect a
/// handler at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameters {
    /// Only the static, configuration-time environment.
    Environment,
    /// Only the dynamic request payload.
    Payload,
    /// Both named buckets.
    Both,
    /// Declares neither; receives the combined mapping as a single bag.
    Bag,
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameters::Environment => write!(f, "environment"),
            Parameters::Payload => write!(f, "payload"),
            Parameters::Both => write!(f, "both"),
            Parameters::Bag => write!(f, "bag"),
        }
    }
}

/// How a caller should present a handler's result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// The handler's own `message` is the whole reply.
    #[default]
    Assistant,
    /// The handler reports command output; announce the decision first.
    Execution,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Assistant => write!(f, "assistant"),
            OutputMode::Execution => write!(f, "execution"),
        }
    }
}

/// Terminal status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Timeout,
    InvalidInput,
    ResolutionFailure,
    UnexpectedFailure,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::Timeout => write!(f, "timeout"),
            OutcomeStatus::InvalidInput => write!(f, "invalid_input"),
            OutcomeStatus::ResolutionFailure => write!(f, "resolution_failure"),
            OutcomeStatus::UnexpectedFailure => write!(f, "unexpected_failure"),
        }
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// How to locate and run one configured action.
///
/// Immutable once it belongs to a loaded snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDescriptor {
    /// `module.path[:attribute]`, resolved by the handler registry.
    pub handler_reference: String,
    /// Static parameters bound at configuration time.
    pub environment: Map<String, Value>,
    pub passkey: Option<String>,
    pub timeout: Option<Duration>,
}

impl ActionDescriptor {
    pub fn new(handler_reference: impl Into<String>) -> Self {
        Self {
            handler_reference: handler_reference.into(),
            environment: Map::new(),
            passkey: None,
            timeout: None,
        }
    }

    /// The action's own timeout, or `fallback` when it declares none.
    pub fn resolved_timeout(&self, fallback: Duration) -> Duration {
        self.timeout.unwrap_or(fallback)
    }

    /// Whether `presented` satisfies this action's passkey.
    ///
    /// Actions without a passkey accept anything.
    pub fn accepts_passkey(&self, presented: Option<&str>) -> bool {
        match self.passkey.as_deref() {
            None => true,
            Some(expected) => presented == Some(expected),
        }
    }
}

/// One inbound request to run a named action.
#[derive(Debug, Clone, Default)]
pub struct DispatchRequest {
    pub action: String,
    pub payload: Map<String, Value>,
    pub passkey: Option<String>,
    /// Merged over the descriptor's environment for this call only.
    pub extra_environment: Map<String, Value>,
}

impl DispatchRequest {
    pub fn new(action: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            action: action.into(),
            payload,
            ..Self::default()
        }
    }

    pub fn with_passkey(mut self, passkey: impl Into<String>) -> Self {
        self.passkey = Some(passkey.into());
        self
    }

    pub fn with_extra_environment(mut self, extra: Map<String, Value>) -> Self {
        self.extra_environment = extra;
        self
    }
}

/// Result of a successful dispatch.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub request_id: Uuid,
    pub action: String,
    pub status: OutcomeStatus,
    pub result: Value,
    pub duration: Duration,
    pub output_mode: OutputMode,
}

impl ExecutionOutcome {
    /// Wall-clock duration in milliseconds, rounded to three decimals.
    pub fn duration_ms(&self) -> f64 {
        (self.duration.as_secs_f64() * 1_000_000.0).round() / 1000.0
    }

    /// The `message` field of an object result, if any.
    pub fn message(&self) -> Option<&str> {
        self.result.get("message").and_then(Value::as_str)
    }
}

// =============================================================================
// Tests
// =============================================================================
