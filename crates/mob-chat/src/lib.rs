//! Chat front end for MOB.
//!
//! Recovers structured decisions from free-form model output, applies the
//! chat trigger rules and turns dispatch outcomes into reply copy.

pub mod command;
pub mod decision;
pub mod error;
pub mod extract;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod trigger;

pub use command::parse_command;
pub use decision::{DecisionExtractor, DecisionResult};
pub use error::{ChatError, ParseError};
pub use extract::parse_lenient;
pub use orchestrator::{ChatOrchestrator, ChatReply};
pub use prompt::{render_selection_prompt, ActionSelectionRequest};
pub use provider::DecisionProvider;
pub use trigger::{ChatTrigger, HistoryEntry, IncomingMessage};
