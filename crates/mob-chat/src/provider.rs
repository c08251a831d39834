//! Seam to whatever model picks actions.

use async_trait::async_trait;

use crate::error::ChatError;
use crate::prompt::ActionSelectionRequest;

/// Produces raw model text for an action-selection request.
///
/// Implementations only talk to the model; recovering a decision from the
/// text is done by the caller.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    async fn complete(&self, request: ActionSelectionRequest) -> Result<String, ChatError>;
}
