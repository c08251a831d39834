//! Handlers that ship with the engine.
//!
//! `testing.*` exists to exercise timeouts and argument shapes;
//! `assistant.talk` relays a message the decision already carries.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::HandlerError;
use crate::handler::{ActionHandler, BlockingHandler, HandlerArgs, Registration};
use crate::registry::StaticResolver;
use crate::types::{OutputMode, Parameters};

const TALK_FALLBACK: &str = "Sorry, I can't talk that freely yet...";

/// Register every built-in handler on `resolver`.
pub fn register_all(resolver: &mut StaticResolver) {
    resolver.register_run(
        "testing.slow_echo",
        Registration::asynchronous(SlowEcho)
            .with_parameters(Parameters::Both)
            .with_output_mode(OutputMode::Execution),
    );
    resolver.register_run(
        "testing.echo",
        Registration::blocking(Echo).with_parameters(Parameters::Bag),
    );
    resolver.register_run(
        "assistant.talk",
        Registration::asynchronous(Talk).with_parameters(Parameters::Environment),
    );
}

/// Reads `payload.delay` in seconds. Absent or non-positive means no delay.
fn delay_from(args: &HandlerArgs) -> Result<Duration, HandlerError> {
    let raw = match args.payload().and_then(|p| p.get("delay")) {
        None | Some(Value::Null) => return Ok(Duration::ZERO),
        Some(value) => value,
    };
    let secs = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| HandlerError::invalid(format!("payload.delay must be a number, got {}", raw)))?;

    if !(secs > 0.0) {
        return Ok(Duration::ZERO);
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|_| HandlerError::invalid(format!("payload.delay is out of range: {}", secs)))
}

/// Sleeps for `payload.delay` seconds, then reports how long it waited.
pub struct SlowEcho;

#[async_trait]
impl ActionHandler for SlowEcho {
    async fn run(&self, args: HandlerArgs) -> Result<Value, HandlerError> {
        let delay = delay_from(&args)?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(json!({
            "message": format!("Echo returned after {} seconds.", delay.as_secs_f64()),
        }))
    }
}

/// Returns its whole argument bag, optionally after blocking for
/// `payload.delay` seconds.
pub struct Echo;

impl BlockingHandler for Echo {
    fn run(&self, args: HandlerArgs) -> Result<Value, HandlerError> {
        let delay = delay_from(&args)?;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok(Value::Object(args.into_inner()))
    }
}

/// Echoes `environment.message`, which the decision step fills in.
pub struct Talk;

#[async_trait]
impl ActionHandler for Talk {
    async fn run(&self, args: HandlerArgs) -> Result<Value, HandlerError> {
        let message = args
            .environment()
            .and_then(|env| env.get("message"))
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(TALK_FALLBACK);
        Ok(json!({ "message": message }))
    }
}
