//! Error types for the action engine.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use mob_core::error::MobError;

use crate::lifecycle::DispatchState;
use crate::types::OutcomeStatus;

/// Errors from loading the action registry document.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Action registry not found at {}", .path.display())]
    NotFound { path: PathBuf },
    #[error("Action registry at {} is malformed: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
}

impl From<ConfigError> for MobError {
    fn from(err: ConfigError) -> Self {
        MobError::Registry(err.to_string())
    }
}

/// Errors from turning a handler reference into a handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("Invalid handler reference: '{0}'")]
    InvalidReference(String),
    #[error("Cannot import module '{module}'")]
    ModuleNotFound { module: String },
    #[error("Callable '{attribute}' not found in module '{module}'")]
    AttributeNotFound { module: String, attribute: String },
}

/// Errors a handler raises from its own body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// The payload or environment failed the handler's validation.
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        HandlerError::InvalidInput(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        HandlerError::Failed(msg.into())
    }
}

/// Errors from running a resolved handler.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Action execution timed out after {} seconds", .after.as_secs_f64())]
    Timeout { after: Duration },
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error("Handler worker was lost: {0}")]
    WorkerLost(String),
}

/// Stable classification of a failed dispatch.
///
/// Callers map this to their own surface (status codes, chat copy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ConfigNotFound,
    ConfigMalformed,
    UnknownAction,
    Unauthorized,
    ResolutionError,
    InvalidInput,
    Timeout,
    UnexpectedFailure,
}

impl FailureKind {
    /// Terminal lifecycle state a dispatch ends in for this failure.
    pub fn terminal_state(self) -> DispatchState {
        match self {
            FailureKind::UnknownAction | FailureKind::Unauthorized | FailureKind::InvalidInput => {
                DispatchState::Rejected
            }
            FailureKind::Timeout => DispatchState::TimedOut,
            FailureKind::ConfigNotFound
            | FailureKind::ConfigMalformed
            | FailureKind::ResolutionError
            | FailureKind::UnexpectedFailure => DispatchState::Failed,
        }
    }

    /// Execution status, for failures that happen once a handler is known.
    pub fn outcome_status(self) -> Option<OutcomeStatus> {
        match self {
            FailureKind::Timeout => Some(OutcomeStatus::Timeout),
            FailureKind::InvalidInput => Some(OutcomeStatus::InvalidInput),
            FailureKind::ResolutionError => Some(OutcomeStatus::ResolutionFailure),
            FailureKind::UnexpectedFailure => Some(OutcomeStatus::UnexpectedFailure),
            FailureKind::ConfigNotFound
            | FailureKind::ConfigMalformed
            | FailureKind::UnknownAction
            | FailureKind::Unauthorized => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ConfigNotFound => write!(f, "config_not_found"),
            FailureKind::ConfigMalformed => write!(f, "config_malformed"),
            FailureKind::UnknownAction => write!(f, "unknown_action"),
            FailureKind::Unauthorized => write!(f, "unauthorized"),
            FailureKind::ResolutionError => write!(f, "resolution_error"),
            FailureKind::InvalidInput => write!(f, "invalid_input"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::UnexpectedFailure => write!(f, "unexpected_failure"),
        }
    }
}

/// A classified dispatch failure.
///
/// `message` is safe to show to the caller; unexpected handler failures
/// carry an opaque message and their details only reach the logs.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct DispatchError {
    pub kind: FailureKind,
    pub action: String,
    pub message: String,
    /// Configured timeout, set for `Timeout` failures.
    pub timeout: Option<Duration>,
}

impl DispatchError {
    pub fn new(kind: FailureKind, action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            action: action.into(),
            message: message.into(),
            timeout: None,
        }
    }

    pub fn unknown_action(action: &str) -> Self {
        Self::new(
            FailureKind::UnknownAction,
            action,
            format!("Action '{}' is not configured.", action),
        )
    }

    pub fn unauthorized(action: &str) -> Self {
        Self::new(FailureKind::Unauthorized, action, "Invalid passkey.")
    }

    pub fn timeout(action: &str, after: Duration) -> Self {
        let mut err = Self::new(
            FailureKind::Timeout,
            action,
            format!(
                "Action '{}' timed out after {} seconds.",
                action,
                after.as_secs_f64()
            ),
        );
        err.timeout = Some(after);
        err
    }

    pub fn unexpected(action: &str) -> Self {
        Self::new(
            FailureKind::UnexpectedFailure,
            action,
            "Action failed to execute.",
        )
    }

    pub fn from_config(action: &str, err: &ConfigError) -> Self {
        let kind = match err {
            ConfigError::NotFound { .. } => FailureKind::ConfigNotFound,
            ConfigError::Malformed { .. } => FailureKind::ConfigMalformed,
        };
        Self::new(kind, action, err.to_string())
    }

    pub fn from_resolution(action: &str, err: &ResolutionError) -> Self {
        Self::new(FailureKind::ResolutionError, action, err.to_string())
    }

    pub fn state(&self) -> DispatchState {
        self.kind.terminal_state()
    }
}
