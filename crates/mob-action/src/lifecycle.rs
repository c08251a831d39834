//! Dispatch lifecycle with validated transitions.
//!
//! Received -> ConfigLoaded -> Resolved -> Executing -> Succeeded/TimedOut
//! Rejected and Failed are reachable from every non-terminal stage that can
//! produce them.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Stage of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Received,
    ConfigLoaded,
    Resolved,
    Executing,
    Succeeded,
    TimedOut,
    Rejected,
    Failed,
}

impl DispatchState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DispatchState::Succeeded
                | DispatchState::TimedOut
                | DispatchState::Rejected
                | DispatchState::Failed
        )
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchState::Received => write!(f, "received"),
            DispatchState::ConfigLoaded => write!(f, "config_loaded"),
            DispatchState::Resolved => write!(f, "resolved"),
            DispatchState::Executing => write!(f, "executing"),
            DispatchState::Succeeded => write!(f, "succeeded"),
            DispatchState::TimedOut => write!(f, "timed_out"),
            DispatchState::Rejected => write!(f, "rejected"),
            DispatchState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid dispatch transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: DispatchState,
    pub to: DispatchState,
}

/// Validate that a lifecycle transition is allowed.
///
/// Valid transitions:
/// - Received -> ConfigLoaded | Failed
/// - ConfigLoaded -> Resolved | Rejected | Failed
/// - Resolved -> Executing
/// - Executing -> Succeeded | TimedOut | Rejected | Failed
pub fn validate_transition(
    from: DispatchState,
    to: DispatchState,
) -> Result<(), InvalidTransition> {
    use DispatchState::*;

    let valid = matches!(
        (from, to),
        (Received, ConfigLoaded)
            | (Received, Failed)
            | (ConfigLoaded, Resolved)
            | (ConfigLoaded, Rejected)
            | (ConfigLoaded, Failed)
            | (Resolved, Executing)
            | (Executing, Succeeded)
            | (Executing, TimedOut)
            | (Executing, Rejected)
            | (Executing, Failed)
    );

    if valid {
        Ok(())
    } else {
        Err(InvalidTransition { from, to })
    }
}

/// Tracks one dispatch through its lifecycle.
#[derive(Debug)]
pub struct DispatchTrace {
    request_id: Uuid,
    action: String,
    state: DispatchState,
    started: Instant,
}

impl DispatchTrace {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            action: action.into(),
            state: DispatchState::Received,
            started: Instant::now(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Move to `to`, refusing transitions the table does not allow.
    pub fn advance(&mut self, to: DispatchState) -> Result<(), InvalidTransition> {
        validate_transition(self.state, to)?;
        debug!(
            request_id = %self.request_id,
            action = %self.action,
            from = %self.state,
            to = %to,
            "Dispatch state changed"
        );
        self.state = to;
        Ok(())
    }
}
