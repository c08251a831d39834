//! Integration tests for the MOB API.
//!
//! Each test builds its own registry file and router and drives it with
//! `oneshot`, covering happy paths and every error mapping.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use mob_action::{Dispatcher, HandlerError, Parameters, Registration, StaticResolver};
use mob_api::create_router;
use mob_api::handlers::{HealthResponse, OrderResponse};
use mob_api::state::AppState;
use mob_chat::{ChatOrchestrator, ChatReply};
use mob_core::config::{ActionsConfig, ChatConfig};

// =============================================================================
// Helpers
// =============================================================================

const REGISTRY: &str = r#"{
    "slow_echo": {"function": "testing.slow_echo", "timeout": 0.1},
    "echo": {"function": "testing.echo", "environment": {"origin": "config"}},
    "vault": {"function": "testing.echo", "passkey": "secret"},
    "whitelist": {"function": "custom.whitelist"},
    "explode": {"function": "custom.explode"},
    "ghost": {"function": "minecraft.server.ghost"},
    "__hidden": {"function": "testing.echo"}
}"#;

fn resolver() -> StaticResolver {
    let mut resolver = StaticResolver::with_builtins();
    resolver.register_run(
        "custom.whitelist",
        Registration::blocking_fn(|args| {
            let ip = args
                .payload()
                .and_then(|p| p.get("ip"))
                .and_then(Value::as_str)
                .ok_or_else(|| HandlerError::invalid("payload.ip is required"))?;
            Ok(json!({ "message": format!("{} whitelisted", ip) }))
        })
        .with_parameters(Parameters::Payload),
    );
    resolver.register_run(
        "custom.explode",
        Registration::from_fn(|_| async {
            Err::<Value, _>(HandlerError::failed("disk /dev/sda1 is full"))
        }),
    );
    resolver
}

struct TestApp {
    _dir: TempDir,
    router: axum::Router,
}

fn make_app_with(registry: Option<&str>, chat: ChatConfig) -> TestApp {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("api_config.json");
    if let Some(content) = registry {
        std::fs::write(&path, content).unwrap();
    }
    let config = ActionsConfig {
        registry_path: path,
        default_timeout_secs: 5.0,
        max_blocking_workers: 2,
    };
    let dispatcher = Arc::new(Dispatcher::from_config(&config, resolver()));
    let orchestrator = ChatOrchestrator::new(Arc::clone(&dispatcher), &chat);
    TestApp {
        _dir: dir,
        router: create_router(AppState::new(dispatcher, orchestrator)),
    }
}

fn make_app() -> TestApp {
    make_app_with(Some(REGISTRY), ChatConfig::default())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let resp = app.router.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    (status, body_json(resp).await)
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_healthz() {
    let app = make_app();
    let (status, body) = send(&app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_value(body).unwrap();
    assert_eq!(health.status, "ok");
}

// =============================================================================
// POST /order
// =============================================================================

#[tokio::test]
async fn test_order_success() {
    let app = make_app();
    let (status, body) = send(
        &app,
        post_json("/order", r#"{"action": "slow_echo", "payload": {"delay": 0}}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("success"));
    let order: OrderResponse = serde_json::from_value(body).unwrap();
    assert_eq!(order.action, "slow_echo");
    assert_eq!(order.result, json!({"message": "Echo returned after 0 seconds."}));
    assert!(order.duration_ms >= 0.0);
}

#[tokio::test]
async fn test_order_without_payload() {
    let app = make_app();
    let (status, body) = send(&app, post_json("/order", r#"{"action": "echo", "payload": null}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["result"],
        json!({"environment": {"origin": "config"}, "payload": {}})
    );
}

#[tokio::test]
async fn test_order_unknown_action() {
    let app = make_app();
    let (status, body) = send(&app, post_json("/order", r#"{"action": "nope"}"#)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({"error": "unknown_action", "message": "Action 'nope' is not configured."})
    );
}

#[tokio::test]
async fn test_order_passkey() {
    let app = make_app();

    let (status, body) = send(&app, post_json("/order", r#"{"action": "vault"}"#)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], json!("Invalid passkey."));

    let (status, _) = send(
        &app,
        post_json("/order", r#"{"action": "vault", "passkey": "guess"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        post_json("/order", r#"{"action": "vault", "passkey": "secret"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_order_invalid_input() {
    let app = make_app();
    let (status, body) = send(&app, post_json("/order", r#"{"action": "whitelist"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "error": "invalid_input",
            "message": "payload.ip is required",
            "status": "invalid_input"
        })
    );

    let (status, body) = send(
        &app,
        post_json("/order", r#"{"action": "whitelist", "payload": {"ip": "10.0.0.9"}}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["message"], json!("10.0.0.9 whitelisted"));
}

#[tokio::test]
async fn test_order_timeout() {
    let app = make_app();
    let started = std::time::Instant::now();
    let (status, body) = send(
        &app,
        post_json("/order", r#"{"action": "slow_echo", "payload": {"delay": 5}}"#),
    )
    .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"], json!("timeout"));
    assert_eq!(body["status"], json!("timeout"));
    assert_eq!(
        body["message"],
        json!("Action 'slow_echo' timed out after 0.1 seconds.")
    );
    assert!(started.elapsed() < std::time::Duration::from_secs(2));
}

#[tokio::test]
async fn test_order_unexpected_failure_is_opaque() {
    let app = make_app();
    let (status, body) = send(&app, post_json("/order", r#"{"action": "explode"}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({
            "error": "unexpected_failure",
            "message": "Action failed to execute.",
            "status": "unexpected_failure"
        })
    );
}

#[tokio::test]
async fn test_order_resolution_error() {
    let app = make_app();
    let (status, body) = send(&app, post_json("/order", r#"{"action": "ghost"}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("resolution_error"));
    assert_eq!(body["status"], json!("resolution_failure"));
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("minecraft.server.ghost"));
}

#[tokio::test]
async fn test_order_missing_registry() {
    let app = make_app_with(None, ChatConfig::default());
    let (status, body) = send(&app, post_json("/order", r#"{"action": "echo"}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("config_not_found"));
    assert!(body.get("status").is_none());
}

#[tokio::test]
async fn test_order_malformed_registry() {
    let app = make_app_with(Some("{not json"), ChatConfig::default());
    let (status, body) = send(&app, post_json("/order", r#"{"action": "echo"}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("config_malformed"));
}

#[tokio::test]
async fn test_order_bad_body() {
    let app = make_app();
    let (status, body) = send(&app, post_json("/order", r#"{"payload": {}}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));

    let (status, _) = send(&app, post_json("/order", "not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_order_body_limit() {
    let app = make_app();
    let big = format!(
        r#"{{"action": "echo", "payload": {{"blob": "{}"}}}}"#,
        "x".repeat(2 * 1024 * 1024)
    );
    let resp = app
        .router
        .clone()
        .oneshot(post_json("/order", &big))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// =============================================================================
// GET /actions
// =============================================================================

#[tokio::test]
async fn test_actions_catalogue_is_sanitized() {
    let app = make_app();
    let (status, body) = send(&app, get("/actions")).await;
    assert_eq!(status, StatusCode::OK);

    let actions = body.as_object().unwrap();
    assert!(actions.contains_key("slow_echo"));
    assert!(actions.contains_key("vault"));
    assert!(!actions.contains_key("__hidden"));
    assert!(body["vault"].get("passkey").is_none());
    assert_eq!(body["vault"]["function"], json!("testing.echo"));
}

#[tokio::test]
async fn test_actions_missing_registry() {
    let app = make_app_with(None, ChatConfig::default());
    let (status, body) = send(&app, get("/actions")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("internal_error"));
}

// =============================================================================
// POST /chat
// =============================================================================

#[tokio::test]
async fn test_chat_literal_command() {
    let app = make_app();
    let (status, body) = send(
        &app,
        post_json("/chat", r#"{"message": "!whitelist ip 192.168.1.20"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let reply: ChatReply = serde_json::from_value(body).unwrap();
    assert_eq!(reply.content.as_deref(), Some("192.168.1.20 whitelisted"));
    assert!(reply.intro.is_none());
}

#[tokio::test]
async fn test_chat_failure_is_a_reply() {
    let app = make_app();
    let (status, body) = send(&app, post_json("/chat", r#"{"message": "!dance"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["content"]
        .as_str()
        .unwrap()
        .starts_with("I have no idea what you're asking for."));
}

#[tokio::test]
async fn test_chat_empty_message() {
    let app = make_app();
    let (status, body) = send(&app, post_json("/chat", r#"{"message": "  ! "}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], json!("message cannot be empty"));
}

#[tokio::test]
async fn test_chat_disabled() {
    let chat = ChatConfig {
        enabled: false,
        ..ChatConfig::default()
    };
    let app = make_app_with(Some(REGISTRY), chat);
    let (status, body) = send(&app, post_json("/chat", r#"{"message": "!echo"}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], json!("service_unavailable"));
}

#[tokio::test]
async fn test_unknown_route() {
    let app = make_app();
    let resp = app.router.clone().oneshot(get("/nowhere")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
