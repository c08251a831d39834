//! Prompt text for asking a model to pick an action.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SELECTION_TEMPLATE: &str = "\
Today is {date} and the time is {time}.
You are Matthew, an assistant in a group chat. Assign one action to each message users send you.
You may only choose among the actions defined in this configuration:

{catalogue}

Always answer with a single valid JSON object of this shape:

{\"action\": \"<action_name>\",
 \"payload\": {...},
 \"confidence\": 0.X,
 \"message\": \"Short note to the user before the result is shown. Leave it empty when the action is plain conversation, such as \\\"talk\\\".\"}

Pick the action that best fits the request and fill every payload field it needs.
Do not write anything outside the JSON object.
";

/// Everything a provider needs to choose an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSelectionRequest {
    /// The user's message with any trigger prefix removed.
    pub message: String,
    pub system_prompt: Option<String>,
    /// Provider-specific model override.
    pub model: Option<String>,
}

impl ActionSelectionRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            system_prompt: None,
            model: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Render the action-selection system prompt for `catalogue` at `now`.
pub fn render_selection_prompt<Tz>(catalogue: &Value, now: DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let catalogue =
        serde_json::to_string_pretty(catalogue).unwrap_or_else(|_| catalogue.to_string());
    SELECTION_TEMPLATE
        .replace("{date}", &now.format("%d-%m-%Y").to_string())
        .replace("{time}", &now.format("%H:%M").to_string())
        .replace("{catalogue}", &catalogue)
}
