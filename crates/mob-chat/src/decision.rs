//! Structured decisions recovered from model output.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ParseError;
use crate::extract::parse_lenient;

/// The action a model picked for a message, with its arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub action: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub message: String,
}

impl DecisionResult {
    pub fn new(action: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            action: action.into(),
            payload,
            ..Default::default()
        }
    }

    /// `{confidence, message}`, merged into the action's environment before
    /// dispatch.
    pub fn extras(&self) -> Map<String, Value> {
        let mut extras = Map::new();
        extras.insert("confidence".to_string(), Value::from(self.confidence));
        extras.insert("message".to_string(), Value::String(self.message.clone()));
        extras
    }

    /// Validate a parsed value into a decision.
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        let Value::Object(mut object) = value else {
            return Err(ParseError::NotAnObject);
        };

        let action = object
            .get("action")
            .and_then(scalar_text)
            .filter(|action| !action.trim().is_empty())
            .ok_or(ParseError::MissingAction)?;

        let payload = match object.remove("payload") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(payload)) => payload,
            Some(_) => return Err(ParseError::InvalidPayload),
        };

        let confidence = object
            .get("confidence")
            .and_then(confidence_from)
            .unwrap_or(0.0)
            .max(0.0);

        let message = object
            .get("message")
            .and_then(scalar_text)
            .unwrap_or_default();

        Ok(Self {
            action,
            payload,
            confidence,
            message,
        })
    }
}

fn confidence_from(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Text of a set scalar. Empty strings, zero, `false`, `null` and
/// containers count as unset.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// Turns raw model text into a [`DecisionResult`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionExtractor;

impl DecisionExtractor {
    /// Recover and validate a decision.
    ///
    /// With `strict` unset, text with no recoverable JSON yields an empty
    /// decision. Text that parses but fails validation is always an error.
    pub fn extract(&self, text: &str, strict: bool) -> Result<DecisionResult, ParseError> {
        let value = parse_lenient(text, strict)?;
        if !strict && value.as_object().is_some_and(Map::is_empty) {
            debug!("Nothing recovered from model output");
            return Ok(DecisionResult::default());
        }
        DecisionResult::from_value(value)
    }
}
