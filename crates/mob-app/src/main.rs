//! MOB application binary - composition root.
//!
//! Ties the MOB crates into a single executable:
//! 1. Resolve configuration (defaults, TOML file, environment, flags)
//! 2. Build the dispatcher over the built-in handler table
//! 3. Serve the REST API, or run one action / one extraction and exit

mod cli;

use std::io::Read;
use std::sync::Arc;

use clap::Parser;
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;

use mob_action::{DispatchRequest, Dispatcher, StaticResolver};
use mob_api::routes;
use mob_api::state::AppState;
use mob_chat::{ChatOrchestrator, DecisionExtractor};
use mob_core::MobConfig;

use cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = MobConfig::load_or_default(&config_file);
    config.apply_env()?;
    args.apply(&mut config);
    config.validate()?;

    // Tracing. RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting MOB v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        path = %config_file.display(),
        registry = %config.actions.registry_path.display(),
        default_timeout_secs = config.actions.default_timeout_secs,
        "Configuration resolved"
    );

    let dispatcher = Arc::new(Dispatcher::from_config(
        &config.actions,
        StaticResolver::with_builtins(),
    ));

    match args.command() {
        Command::Serve => serve(&config, dispatcher).await,
        Command::Dispatch {
            action,
            payload,
            passkey,
        } => dispatch_once(&dispatcher, action, payload, passkey).await,
        Command::Extract { text, strict } => extract(text, strict),
    }
}

async fn serve(
    config: &MobConfig,
    dispatcher: Arc<Dispatcher>,
) -> Result<(), Box<dyn std::error::Error>> {
    match dispatcher.action_names().await {
        Ok(names) => tracing::info!(actions = names.len(), "Action registry loaded"),
        Err(e) => tracing::warn!(error = %e, "Action registry not available yet"),
    }

    let chat = ChatOrchestrator::new(Arc::clone(&dispatcher), &config.chat);
    tracing::info!(
        enabled = chat.is_enabled(),
        prefix = %chat.trigger().prefix(),
        channel = %chat.trigger().channel(),
        model_selection = chat.has_provider(),
        "Chat front end ready"
    );

    let state = AppState::new(dispatcher, chat);
    routes::start_server(config, state).await?;
    Ok(())
}

async fn dispatch_once(
    dispatcher: &Dispatcher,
    action: String,
    payload: Option<String>,
    passkey: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = match payload {
        Some(raw) => serde_json::from_str::<Map<String, Value>>(&raw)
            .map_err(|e| format!("--payload must be a JSON object: {}", e))?,
        None => Map::new(),
    };
    let mut request = DispatchRequest::new(action, payload);
    if let Some(passkey) = passkey {
        request = request.with_passkey(passkey);
    }

    match dispatcher.dispatch(request).await {
        Ok(outcome) => {
            let duration_ms = outcome.duration_ms();
            let body = json!({
                "action": outcome.action,
                "status": outcome.status,
                "result": outcome.result,
                "duration_ms": duration_ms,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Err(err) => {
            let body = json!({ "error": err.kind, "message": &err.message });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Err(err.into())
        }
    }
}

fn extract(text: Option<String>, strict: bool) -> Result<(), Box<dyn std::error::Error>> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let decision = DecisionExtractor.extract(&text, strict)?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}
