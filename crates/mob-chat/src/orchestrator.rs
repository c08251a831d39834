//! Chat orchestrator: turns a chat message into a dispatched action and a
//! reply.
//!
//! A decision comes from the model provider when one is configured, or from
//! the literal `action key value` form otherwise. Every failure becomes
//! reply copy; only disabled chat and empty messages are errors.

use std::sync::Arc;

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use mob_action::{
    ConfigSnapshot, DispatchError, DispatchRequest, Dispatcher, ExecutionOutcome, FailureKind,
    OutputMode,
};
use mob_core::config::ChatConfig;

use crate::command::parse_command;
use crate::decision::{DecisionExtractor, DecisionResult};
use crate::error::ChatError;
use crate::prompt::{render_selection_prompt, ActionSelectionRequest};
use crate::provider::DecisionProvider;
use crate::trigger::{ChatTrigger, HistoryEntry, IncomingMessage, METADATA_TAG};

/// Environment flag enabling channel history for an action.
pub const CONVERSATION_FLAG: &str = "enable_conversation_context";
/// Environment key bounding how many history entries are relayed.
pub const HISTORY_LIMIT_KEY: &str = "maximum_message_history";
const DEFAULT_HISTORY_LIMIT: usize = 5;

// =============================================================================
// Reply copy
// =============================================================================

const CONFIG_BROKEN: &str =
    "There is a problem with my configuration. Talk to me again once it is fixed.";
const REPHRASE: &str = "I think I misunderstood your message. Could you say it again?";
const UNAVAILABLE: &str =
    "I'm asleep right now... Talk to me tomorrow or bother a human if it's urgent.";
const UNKNOWN_ACTION: &str = "I have no idea what you're asking for. If you're sure I can do it, could you rephrase your message?";
const UNRESOLVED: &str = "Something is still missing in my code. Let the developers know there is an action without a handler.";
const UNAUTHORIZED: &str = "That action is locked and I can't run it from here.";

/// What to send back for one handled message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Announcement sent before the result of an execution-style action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl ChatReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.intro.is_none() && self.content.is_none() && self.files.is_empty()
    }
}

/// Coordinates decision selection, dispatch and reply rendering.
pub struct ChatOrchestrator {
    dispatcher: Arc<Dispatcher>,
    provider: Option<Arc<dyn DecisionProvider>>,
    extractor: DecisionExtractor,
    trigger: ChatTrigger,
    enabled: bool,
}

impl ChatOrchestrator {
    pub fn new(dispatcher: Arc<Dispatcher>, config: &ChatConfig) -> Self {
        Self {
            dispatcher,
            provider: None,
            extractor: DecisionExtractor,
            trigger: ChatTrigger::from_config(config),
            enabled: config.enabled,
        }
    }

    /// Let a model choose actions instead of parsing literal commands.
    pub fn with_provider(mut self, provider: Arc<dyn DecisionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn trigger(&self) -> &ChatTrigger {
        &self.trigger
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Handle a message from a chat transport.
    ///
    /// Returns `Ok(None)` when the trigger rules say the message is not an
    /// order.
    pub async fn handle(&self, message: &IncomingMessage) -> Result<Option<ChatReply>, ChatError> {
        if !self.trigger.accepts(message) {
            return Ok(None);
        }
        let history = if self.trigger.is_order_channel(message) {
            message.history.as_slice()
        } else {
            &[]
        };
        self.respond(&message.content, history).await.map(Some)
    }

    /// Handle one order given directly as text.
    pub async fn handle_message(&self, text: &str) -> Result<ChatReply, ChatError> {
        self.respond(text, &[]).await
    }

    async fn respond(&self, raw: &str, history: &[HistoryEntry]) -> Result<ChatReply, ChatError> {
        if !self.enabled {
            return Err(ChatError::Disabled);
        }
        let text = self.trigger.strip(raw);
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        // One registry version serves the whole order.
        let snapshot = match self.dispatcher.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Configuration error while handling a chat order");
                return Ok(ChatReply::text(CONFIG_BROKEN));
            }
        };

        let (decision, extras) = match self.select(text, &snapshot).await {
            Ok(selected) => selected,
            Err(reply) => return Ok(reply),
        };
        debug!(
            action = %decision.action,
            confidence = decision.confidence,
            "Decision selected"
        );

        let mut payload = decision.payload.clone();
        if let Some(turns) = conversation_for(&snapshot, &decision.action, history) {
            payload.insert("conversation".to_string(), Value::Array(turns));
        }

        let intro = match self.dispatcher.output_mode(&snapshot, &decision.action) {
            Some(OutputMode::Execution) if !decision.message.is_empty() => {
                Some(decision.message.clone())
            }
            _ => None,
        };

        let request =
            DispatchRequest::new(decision.action.clone(), payload).with_extra_environment(extras);
        match self.dispatcher.dispatch_with(snapshot, request).await {
            Ok(outcome) => {
                info!(
                    action = %outcome.action,
                    duration_ms = outcome.duration_ms(),
                    "Chat order executed"
                );
                let mut reply = render_outcome(&outcome);
                reply.intro = intro;
                Ok(reply)
            }
            Err(err) => {
                let mut reply = ChatReply::text(failure_copy(&err));
                if executed(err.kind) {
                    reply.intro = intro;
                }
                Ok(reply)
            }
        }
    }

    /// Pick a decision for `text`. Failures come back as the reply to send.
    async fn select(
        &self,
        text: &str,
        snapshot: &ConfigSnapshot,
    ) -> Result<(DecisionResult, Map<String, Value>), ChatReply> {
        let Some(provider) = &self.provider else {
            return parse_command(text)
                .map(|decision| (decision, Map::new()))
                .map_err(|_| ChatReply::text(REPHRASE));
        };

        let catalogue = snapshot.public_catalogue();
        let request = ActionSelectionRequest::new(text)
            .with_system_prompt(render_selection_prompt(&catalogue, Local::now()));

        let raw = provider.complete(request).await.map_err(|e| {
            error!(error = %e, "Decision provider failed");
            ChatReply::text(UNAVAILABLE)
        })?;

        let decision = self.extractor.extract(&raw, true).map_err(|e| {
            warn!(error = %e, "Could not read a decision from the provider reply");
            ChatReply::text(REPHRASE)
        })?;
        let extras = decision.extras();
        Ok((decision, extras))
    }
}

impl std::fmt::Debug for ChatOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOrchestrator")
            .field("trigger", &self.trigger)
            .field("enabled", &self.enabled)
            .field("provider", &self.provider.is_some())
            .finish()
    }
}

/// History turns for `action`, when its environment asks for them.
fn conversation_for(
    snapshot: &ConfigSnapshot,
    action: &str,
    history: &[HistoryEntry],
) -> Option<Vec<Value>> {
    if history.is_empty() {
        return None;
    }
    let environment = &snapshot.get(action)?.environment;
    if !environment.get(CONVERSATION_FLAG).and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    let limit = environment
        .get(HISTORY_LIMIT_KEY)
        .and_then(Value::as_u64)
        .map_or(DEFAULT_HISTORY_LIMIT, |n| n as usize);
    let skip = history.len().saturating_sub(limit);
    Some(history[skip..].iter().map(HistoryEntry::to_turn).collect())
}

/// Whether the handler had started when the dispatch failed.
fn executed(kind: FailureKind) -> bool {
    matches!(
        kind,
        FailureKind::Timeout | FailureKind::InvalidInput | FailureKind::UnexpectedFailure
    )
}

fn failure_copy(err: &DispatchError) -> String {
    match err.kind {
        FailureKind::ConfigNotFound | FailureKind::ConfigMalformed => CONFIG_BROKEN.to_string(),
        FailureKind::UnknownAction => UNKNOWN_ACTION.to_string(),
        FailureKind::Unauthorized => UNAUTHORIZED.to_string(),
        FailureKind::ResolutionError => UNRESOLVED.to_string(),
        FailureKind::Timeout => format!(
            "The action '{}' took too long and I cancelled it. Try again if you like, but there may be an internal error.",
            err.action
        ),
        FailureKind::InvalidInput => format!(
            "Sorry. I'm not sure what went wrong, but the handler for '{}' received invalid data.",
            err.action
        ),
        FailureKind::UnexpectedFailure => format!(
            "I don't know what went wrong, but running the handler for '{}' raised an error.",
            err.action
        ),
    }
}

/// Reply content and attachments from a successful outcome.
fn render_outcome(outcome: &ExecutionOutcome) -> ChatReply {
    let content = outcome.message().map(strip_metadata);
    let files = outcome
        .result
        .get("files")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    ChatReply {
        intro: None,
        content,
        files,
    }
}

/// Drop everything up to the last metadata tag.
pub fn strip_metadata(message: &str) -> String {
    match message.rsplit_once(METADATA_TAG) {
        Some((_, tail)) => tail.trim().to_string(),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use mob_action::{HandlerError, Parameters, Registration, StaticResolver};
    use mob_core::config::ActionsConfig;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    const REGISTRY: &str = r#"{
        "slow_echo": {"function": "testing.slow_echo", "timeout": 0.2},
        "echo": {"function": "testing.echo"},
        "talk": {"function": "assistant.talk", "environment": {"message": "configured"}},
        "report": {"function": "custom.report"},
        "strict": {"function": "custom.strict"},
        "locked": {"function": "testing.echo", "passkey": "secret"},
        "ghost": {"function": "nowhere.to.be.found"},
        "chatty": {
            "function": "custom.turns",
            "environment": {"enable_conversation_context": true, "maximum_message_history": 2}
        },
        "__internal": {"function": "testing.echo"}
    }"#;

    struct FixedProvider {
        reply: Result<String, String>,
        seen: Mutex<Vec<ActionSelectionRequest>>,
    }

    impl FixedProvider {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(reason.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DecisionProvider for FixedProvider {
        async fn complete(&self, request: ActionSelectionRequest) -> Result<String, ChatError> {
            self.seen.lock().unwrap().push(request);
            self.reply.clone().map_err(ChatError::Provider)
        }
    }

    fn resolver() -> StaticResolver {
        let mut resolver = StaticResolver::with_builtins();
        resolver.register_run(
            "custom.report",
            Registration::from_fn(|_| async {
                Ok::<_, HandlerError>(json!({
                    "message": "$$$2024-01-01 10:00:00 matthew$$$ Report ready",
                    "files": ["/tmp/report.csv", 7, "/tmp/chart.png"]
                }))
            })
            .with_output_mode(OutputMode::Execution),
        );
        resolver.register_run(
            "custom.turns",
            Registration::blocking_fn(|args| {
                let turns = args
                    .payload()
                    .and_then(|p| p.get("conversation"))
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                Ok(json!({ "message": format!("{turns} turns") }))
            })
            .with_parameters(Parameters::Payload),
        );
        resolver.register_run(
            "custom.strict",
            Registration::blocking_fn(|_| Err(HandlerError::invalid("ip is required"))),
        );
        resolver
    }

    fn setup(content: &str) -> (TempDir, Arc<Dispatcher>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api_config.json");
        std::fs::write(&path, content).unwrap();
        let config = ActionsConfig {
            registry_path: path,
            default_timeout_secs: 5.0,
            max_blocking_workers: 2,
        };
        (dir, Arc::new(Dispatcher::from_config(&config, resolver())))
    }

    fn literal(dispatcher: Arc<Dispatcher>) -> ChatOrchestrator {
        ChatOrchestrator::new(dispatcher, &ChatConfig::default())
    }

    #[tokio::test]
    async fn test_literal_command_runs_action() {
        let (_dir, dispatcher) = setup(REGISTRY);
        let chat = literal(dispatcher);
        let reply = chat.handle_message("!slow_echo delay 0").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some("Echo returned after 0 seconds."));
        assert_eq!(reply.intro, None);
        assert!(reply.files.is_empty());
    }

    #[tokio::test]
    async fn test_literal_command_does_not_override_environment() {
        let (_dir, dispatcher) = setup(REGISTRY);
        let reply = literal(dispatcher).handle_message("talk").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some("configured"));
    }

    #[tokio::test]
    async fn test_failures_become_copy() {
        let (_dir, dispatcher) = setup(REGISTRY);
        let chat = literal(dispatcher);

        let reply = chat.handle_message("nope").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some(UNKNOWN_ACTION));

        let reply = chat.handle_message("ghost").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some(UNRESOLVED));

        let reply = chat.handle_message("locked").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some(UNAUTHORIZED));

        let reply = chat.handle_message("strict").await.unwrap();
        assert!(reply.content.unwrap().contains("'strict' received invalid data"));

        let reply = chat.handle_message("slow_echo delay 5").await.unwrap();
        assert!(reply.content.unwrap().starts_with("The action 'slow_echo' took too long"));
    }

    #[tokio::test]
    async fn test_missing_registry_reports_configuration_problem() {
        let dir = TempDir::new().unwrap();
        let config = ActionsConfig {
            registry_path: dir.path().join("missing.json"),
            ..ActionsConfig::default()
        };
        let dispatcher = Arc::new(Dispatcher::from_config(&config, resolver()));
        let reply = literal(dispatcher.clone()).handle_message("echo").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some(CONFIG_BROKEN));

        let chat = literal(dispatcher).with_provider(FixedProvider::replying("{}"));
        let reply = chat.handle_message("echo").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some(CONFIG_BROKEN));
    }

    #[tokio::test]
    async fn test_disabled_and_empty() {
        let (_dir, dispatcher) = setup(REGISTRY);
        let config = ChatConfig {
            enabled: false,
            ..ChatConfig::default()
        };
        let chat = ChatOrchestrator::new(dispatcher.clone(), &config);
        assert!(matches!(chat.handle_message("echo").await, Err(ChatError::Disabled)));

        let chat = literal(dispatcher);
        assert!(matches!(chat.handle_message("  !!  ").await, Err(ChatError::EmptyMessage)));
    }

    #[tokio::test]
    async fn test_provider_decision_is_dispatched_with_extras() {
        let (_dir, dispatcher) = setup(REGISTRY);
        let provider = FixedProvider::replying(
            "Sure!\n```json\n{\"action\": \"talk\", \"payload\": {}, \"confidence\": 0.9, \"message\": \"Hello there\"}\n```",
        );
        let chat = literal(dispatcher).with_provider(provider.clone());
        let reply = chat.handle_message("!hi matthew").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some("Hello there"));
        assert_eq!(reply.intro, None);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message, "hi matthew");
        let prompt = seen[0].system_prompt.as_deref().unwrap();
        assert!(prompt.contains("\"slow_echo\""));
        assert!(!prompt.contains("__internal"));
        assert!(!prompt.contains("secret"));
    }

    #[tokio::test]
    async fn test_execution_mode_announces_decision_message() {
        let (_dir, dispatcher) = setup(REGISTRY);
        let provider = FixedProvider::replying(
            r#"{"action": "report", "message": "Crunching the numbers"}"#,
        );
        let chat = literal(dispatcher).with_provider(provider);
        let reply = chat.handle_message("make me a report").await.unwrap();
        assert_eq!(reply.intro.as_deref(), Some("Crunching the numbers"));
        assert_eq!(reply.content.as_deref(), Some("Report ready"));
        assert_eq!(reply.files, vec!["/tmp/report.csv", "/tmp/chart.png"]);
    }

    /// Rewrites the registry while the model is "thinking".
    struct EditingProvider {
        path: PathBuf,
        document: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl DecisionProvider for EditingProvider {
        async fn complete(&self, _request: ActionSelectionRequest) -> Result<String, ChatError> {
            std::fs::write(&self.path, self.document).unwrap();
            let file = std::fs::File::options().write(true).open(&self.path).unwrap();
            file.set_modified(SystemTime::now() + Duration::from_secs(5))
                .unwrap();
            Ok(self.reply.to_string())
        }
    }

    #[tokio::test]
    async fn test_one_registry_version_serves_the_whole_order() {
        let (dir, dispatcher) = setup(REGISTRY);
        let provider = Arc::new(EditingProvider {
            path: dir.path().join("api_config.json"),
            document: r#"{"report": {"function": "testing.echo"}}"#,
            reply: r#"{"action": "report", "message": "Crunching the numbers"}"#,
        });
        let chat = literal(Arc::clone(&dispatcher)).with_provider(provider);

        let reply = chat.handle_message("make me a report").await.unwrap();
        assert_eq!(reply.intro.as_deref(), Some("Crunching the numbers"));
        assert_eq!(reply.content.as_deref(), Some("Report ready"));

        // The edit is picked up by the next order.
        let snapshot = dispatcher.snapshot().await.unwrap();
        assert_eq!(snapshot.names(), vec!["report"]);
    }

    #[tokio::test]
    async fn test_intro_is_kept_when_execution_times_out() {
        let (_dir, dispatcher) = setup(REGISTRY);
        let provider = FixedProvider::replying(
            r#"{"action": "slow_echo", "payload": {"delay": 3}, "message": "Hold on"}"#,
        );
        let chat = literal(dispatcher).with_provider(provider);
        let reply = chat.handle_message("wait a bit").await.unwrap();
        assert_eq!(reply.intro.as_deref(), Some("Hold on"));
        assert!(reply.content.unwrap().contains("took too long"));
    }

    #[tokio::test]
    async fn test_provider_failures() {
        let (_dir, dispatcher) = setup(REGISTRY);

        let chat = literal(dispatcher.clone()).with_provider(FixedProvider::failing("quota"));
        let reply = chat.handle_message("hello").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some(UNAVAILABLE));

        let chat = literal(dispatcher.clone())
            .with_provider(FixedProvider::replying("I would rather not say"));
        let reply = chat.handle_message("hello").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some(REPHRASE));

        let chat = literal(dispatcher)
            .with_provider(FixedProvider::replying(r#"{"payload": {"a": 1}}"#));
        let reply = chat.handle_message("hello").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some(REPHRASE));
    }

    fn history(count: u32) -> Vec<HistoryEntry> {
        (0..count)
            .map(|i| HistoryEntry {
                author: "sam".to_string(),
                content: format!("message {i}"),
                sent_at: Utc.with_ymd_and_hms(2024, 5, 1, 18, i, 0).unwrap(),
                from_self: i % 2 == 1,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_trigger_rules_and_channel_history() {
        let (_dir, dispatcher) = setup(REGISTRY);
        let chat = literal(dispatcher);

        assert_eq!(chat.handle(&IncomingMessage::new("chatty")).await.unwrap(), None);

        let in_channel = IncomingMessage::new("chatty")
            .in_channel("matthew")
            .with_history(history(3));
        let reply = chat.handle(&in_channel).await.unwrap().unwrap();
        assert_eq!(reply.content.as_deref(), Some("2 turns"));

        // Prefixed orders outside the channel carry no history.
        let prefixed = IncomingMessage::new("!chatty")
            .in_channel("general")
            .with_history(history(3));
        let reply = chat.handle(&prefixed).await.unwrap().unwrap();
        assert_eq!(reply.content.as_deref(), Some("0 turns"));
    }

    #[tokio::test]
    async fn test_conversation_is_limited_and_gated() {
        let (_dir, dispatcher) = setup(REGISTRY);
        let snapshot = dispatcher.snapshot().await.unwrap();
        let history = history(4);

        let turns = conversation_for(&snapshot, "chatty", &history).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0]["content"], json!("$$$2024-05-01 18:02:00 sam$$$ message 2"));
        assert_eq!(turns[0]["role"], json!("user"));
        assert_eq!(turns[1]["role"], json!("assistant"));

        assert!(conversation_for(&snapshot, "echo", &history).is_none());
        assert!(conversation_for(&snapshot, "chatty", &[]).is_none());
        assert!(conversation_for(&snapshot, "nope", &history).is_none());
    }

    #[test]
    fn test_strip_metadata() {
        assert_eq!(strip_metadata("$$$2024 sam$$$  hello "), "hello");
        assert_eq!(strip_metadata("a$$$b$$$c"), "c");
        assert_eq!(strip_metadata("plain text"), "plain text");
    }

    #[test]
    fn test_reply_serialization_skips_empty_parts() {
        let reply = ChatReply::text("done");
        assert_eq!(serde_json::to_value(&reply).unwrap(), json!({"content": "done"}));
        assert!(ChatReply::default().is_empty());
    }
}
