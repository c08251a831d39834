//! Literal `action key value ...` commands.

use serde_json::{Map, Value};

use crate::decision::DecisionResult;
use crate::error::ChatError;

/// Parse `action k1 v1 k2 v2`. A trailing key with no value maps to `""`.
pub fn parse_command(text: &str) -> Result<DecisionResult, ChatError> {
    let mut words = text.split_whitespace();
    let action = words.next().ok_or(ChatError::EmptyMessage)?;

    let mut payload = Map::new();
    while let Some(key) = words.next() {
        let value = words.next().unwrap_or_default();
        payload.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(DecisionResult::new(action, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pairs_become_payload() {
        let decision = parse_command("whitelist ip 10.0.0.1 user steve").unwrap();
        assert_eq!(decision.action, "whitelist");
        assert_eq!(
            Value::Object(decision.payload),
            json!({"ip": "10.0.0.1", "user": "steve"})
        );
    }

    #[test]
    fn test_missing_last_value() {
        let decision = parse_command("slow_echo delay").unwrap();
        assert_eq!(Value::Object(decision.payload), json!({"delay": ""}));
    }

    #[test]
    fn test_action_only() {
        let decision = parse_command("  version  ").unwrap();
        assert_eq!(decision.action, "version");
        assert!(decision.payload.is_empty());
        assert_eq!(decision.confidence, 0.0);
        assert_eq!(decision.message, "");
    }

    #[test]
    fn test_blank_command() {
        assert!(matches!(parse_command(" \t "), Err(ChatError::EmptyMessage)));
    }
}
