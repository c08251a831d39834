//! Error types for the chat layer.

/// Longest slice of the input quoted back in a parse error.
pub const PREVIEW_CHARS: usize = 100;

/// Errors from recovering a decision out of model text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("input is empty")]
    Empty,
    #[error("could not extract valid JSON from input: {preview}...")]
    NoStructure { preview: String },
    #[error("decision must be a JSON object")]
    NotAnObject,
    #[error("decision is missing 'action'")]
    MissingAction,
    #[error("decision 'payload' must be a JSON object")]
    InvalidPayload,
}

impl ParseError {
    pub fn no_structure(input: &str) -> Self {
        ParseError::NoStructure {
            preview: input.chars().take(PREVIEW_CHARS).collect(),
        }
    }
}

/// Errors from the chat engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat is disabled")]
    Disabled,
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("provider error: {0}")]
    Provider(String),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
}
