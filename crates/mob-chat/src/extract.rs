//! Tolerant JSON recovery for model output.
//!
//! Model replies wrap JSON in prose and code fences, and often bend the
//! grammar (trailing commas, single quotes, bare keys, comments). The
//! extractor runs an ordered list of strategies and returns the first value
//! that parses. Every strategy and repair is a plain function over text.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::error::ParseError;

/// One way of finding a JSON value in text.
pub type Strategy = fn(&str) -> Option<Value>;
/// One textual fix applied before re-parsing.
pub type Repair = fn(&str) -> String;

/// Strategies in the order they are tried.
pub static STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", parse_direct),
    ("fenced", parse_fenced),
    ("outermost", parse_outermost),
    ("repaired", parse_repaired),
    ("balanced", parse_balanced),
    ("key_value", parse_key_values),
];

/// Repairs in the order they are applied. Each works on the output of the
/// previous one, and the text is re-parsed after every step.
pub static REPAIRS: &[(&str, Repair)] = &[
    ("strip_leading_text", strip_leading_text),
    ("strip_trailing_text", strip_trailing_text),
    ("drop_trailing_commas", drop_trailing_commas),
    ("quote_single_quoted_keys", quote_single_quoted_keys),
    ("quote_single_quoted_values", quote_single_quoted_values),
    ("quote_bare_keys", quote_bare_keys),
    ("unquote_literals", unquote_literals),
    ("strip_line_comments", strip_line_comments),
    ("strip_block_comments", strip_block_comments),
    ("unescape_quotes", unescape_quotes),
    ("collapse_whitespace", collapse_whitespace),
];

// =============================================================================
// Compiled patterns
// =============================================================================

static FENCE_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?is)```json\s*\n?(.*?)\n?\s*```").unwrap(),
        Regex::new(r"(?is)```\s*\n?(.*?)\n?\s*```").unwrap(),
        Regex::new(r"(?is)`(.*?)`").unwrap(),
    ]
});

static OUTERMOST_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?s)\{.*\}").unwrap(),
        Regex::new(r"(?s)\[.*\]").unwrap(),
    ]
});

static LEADING_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^{\[]*").unwrap());
static TRAILING_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^}\]]*$").unwrap());
static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").unwrap());
static SINGLE_QUOTED_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^a-zA-Z])'([^']*?)'(\s*:)").unwrap());
static SINGLE_QUOTED_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\s*'([^']*?)'").unwrap());
static BARE_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([{,]\s*)([a-zA-Z_][a-zA-Z0-9_]*)\s*:").unwrap());
static QUOTED_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i):\s*"(true|false|null)""#).unwrap());
static LINE_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)//.*?$").unwrap());
static BLOCK_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static KEY_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']?(\w+)["']?\s*:\s*["']?([^,}\]]+)["']?"#).unwrap()
});
static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\d+$").unwrap());

// =============================================================================
// Entry point
// =============================================================================

/// Recover a JSON value from `text`.
///
/// When nothing can be recovered, returns an empty object unless `strict`
/// is set, in which case the failure is an error.
pub fn parse_lenient(text: &str, strict: bool) -> Result<Value, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return if strict {
            Err(ParseError::Empty)
        } else {
            Ok(Value::Object(Map::new()))
        };
    }

    for (name, strategy) in STRATEGIES {
        if let Some(value) = strategy(trimmed) {
            debug!(strategy = name, "Recovered JSON from text");
            return Ok(value);
        }
    }

    debug!(chars = text.chars().count(), "No JSON structure found");
    if strict {
        Err(ParseError::no_structure(text))
    } else {
        Ok(Value::Object(Map::new()))
    }
}

fn parse_json(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    serde_json::from_str(text).ok()
}

// =============================================================================
// Strategies
// =============================================================================

fn parse_direct(text: &str) -> Option<Value> {
    parse_json(text)
}

fn parse_fenced(text: &str) -> Option<Value> {
    FENCE_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .find_map(|m| parse_json(m.as_str()))
    })
}

fn parse_outermost(text: &str) -> Option<Value> {
    OUTERMOST_PATTERNS
        .iter()
        .find_map(|pattern| pattern.find_iter(text).find_map(|m| parse_json(m.as_str())))
}

fn parse_repaired(text: &str) -> Option<Value> {
    let mut current = text.to_string();
    for (name, repair) in REPAIRS {
        current = repair(&current);
        if let Some(value) = parse_json(&current) {
            debug!(repair = name, "JSON parsed after repair");
            return Some(value);
        }
    }
    None
}

/// Parse each top-level balanced `{...}` span in turn.
fn parse_balanced(text: &str) -> Option<Value> {
    let mut depth: i64 = 0;
    let mut start: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        match ch {
            '{' => {
                if depth == 0 {
                    start = Some(idx);
                }
                depth += 1;
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(begin) = start {
                        if let Some(value) = parse_json(&text[begin..=idx]) {
                            return Some(value);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Last resort: collect loose `key: value` pairs into an object.
fn parse_key_values(text: &str) -> Option<Value> {
    let mut object = Map::new();
    for caps in KEY_VALUE_RE.captures_iter(text) {
        let key = caps[1].to_string();
        let raw = caps[2].trim().trim_matches(|c| c == '"' || c == '\'');
        object.insert(key, coerce_scalar(raw));
    }
    if object.is_empty() {
        None
    } else {
        Some(Value::Object(object))
    }
}

fn coerce_scalar(raw: &str) -> Value {
    match raw.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = raw.parse::<u64>() {
            return Value::Number(n.into());
        }
        // Too wide for u64: keep it numeric at reduced precision.
        if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    if DECIMAL_RE.is_match(raw) {
        if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

// =============================================================================
// Repairs
// =============================================================================

fn strip_leading_text(text: &str) -> String {
    LEADING_TEXT_RE.replace(text, "").into_owned()
}

fn strip_trailing_text(text: &str) -> String {
    TRAILING_TEXT_RE.replace(text, "").into_owned()
}

fn drop_trailing_commas(text: &str) -> String {
    TRAILING_COMMA_RE.replace_all(text, "${1}").into_owned()
}

fn quote_single_quoted_keys(text: &str) -> String {
    SINGLE_QUOTED_KEY_RE
        .replace_all(text, "${1}\"${2}\"${3}")
        .into_owned()
}

fn quote_single_quoted_values(text: &str) -> String {
    SINGLE_QUOTED_VALUE_RE
        .replace_all(text, ": \"${1}\"")
        .into_owned()
}

fn quote_bare_keys(text: &str) -> String {
    BARE_KEY_RE.replace_all(text, "${1}\"${2}\":").into_owned()
}

fn unquote_literals(text: &str) -> String {
    QUOTED_LITERAL_RE
        .replace_all(text, |caps: &regex::Captures| {
            format!(": {}", caps[1].to_ascii_lowercase())
        })
        .into_owned()
}

fn strip_line_comments(text: &str) -> String {
    LINE_COMMENT_RE.replace_all(text, "").into_owned()
}

fn strip_block_comments(text: &str) -> String {
    BLOCK_COMMENT_RE.replace_all(text, "").into_owned()
}

fn unescape_quotes(text: &str) -> String {
    text.replace("\\\"", "\"").replace("\\'", "'")
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}
