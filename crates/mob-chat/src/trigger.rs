//! Which chat messages are orders, and what they say once unwrapped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use mob_core::config::ChatConfig;

/// Separates the header of a relayed history line from its text.
pub const METADATA_TAG: &str = "$$$";

/// A message seen by the chat transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub content: String,
    /// Channel name, when the transport has channels.
    #[serde(default)]
    pub channel: Option<String>,
    /// Sent by this bot.
    #[serde(default)]
    pub from_self: bool,
    /// Earlier channel messages, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl IncomingMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn in_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }
}

/// One earlier message in a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub author: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub from_self: bool,
}

impl HistoryEntry {
    /// `{role, content}` with the author and timestamp folded into a tagged
    /// header.
    pub fn to_turn(&self) -> Value {
        let role = if self.from_self { "assistant" } else { "user" };
        json!({
            "role": role,
            "content": format!(
                "{tag}{} {}{tag} {}",
                self.sent_at.format("%Y-%m-%d %H:%M:%S"),
                self.author,
                self.content,
                tag = METADATA_TAG,
            ),
        })
    }
}

/// Prefix and channel rules deciding which messages are orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTrigger {
    prefix: String,
    channel: String,
}

impl ChatTrigger {
    pub fn new(prefix: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            channel: channel.into(),
        }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.trigger_prefix.clone(), config.channel.clone())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether `message` arrived on the dedicated order channel.
    pub fn is_order_channel(&self, message: &IncomingMessage) -> bool {
        !self.channel.is_empty() && message.channel.as_deref() == Some(self.channel.as_str())
    }

    /// Whether `message` should be handled. The bot's own messages never are.
    pub fn accepts(&self, message: &IncomingMessage) -> bool {
        if message.from_self {
            return false;
        }
        let prefixed = !self.prefix.is_empty() && message.content.starts_with(&self.prefix);
        prefixed || self.is_order_channel(message)
    }

    /// Text of the order with every leading prefix and surrounding
    /// whitespace removed.
    pub fn strip<'a>(&self, content: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            return content.trim();
        }
        content
            .trim_start()
            .trim_start_matches(self.prefix.as_str())
            .trim()
    }
}

impl Default for ChatTrigger {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}
