//! Command line for the `mob` binary.
//!
//! Subcommands:
//! - `serve` (default): run the REST API
//! - `dispatch`: run one action and print its outcome
//! - `extract`: read a decision out of model text
//!
//! Global flags sit on top of the environment and the TOML file. `--config`
//! names the file itself and wins over `MOB_CONFIG`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mob_core::config::{DEFAULT_CONFIG_FILE, ENV_CONFIG_PATH};
use mob_core::MobConfig;

/// MOB - runs configured actions on behalf of REST callers and chat users.
#[derive(Parser, Debug)]
#[command(name = "mob", version, about)]
pub struct CliArgs {
    /// Path to the TOML configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Path to the JSON action registry.
    #[arg(short = 'r', long = "registry")]
    pub registry: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Serve the REST API (default).
    Serve,
    /// Run one action and print its outcome as JSON.
    Dispatch {
        /// Configured action name.
        action: String,
        /// Payload as a JSON object.
        #[arg(long)]
        payload: Option<String>,
        #[arg(long)]
        passkey: Option<String>,
    },
    /// Recover a decision from model output read from the argument or stdin.
    Extract {
        text: Option<String>,
        /// Fail instead of returning an empty decision when no JSON is found.
        #[arg(long)]
        strict: bool,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > MOB_CONFIG env var > ./mob.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.resolve_config_path_from(|key| std::env::var(key).ok())
    }

    pub fn resolve_config_path_from<F>(&self, lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = lookup(ENV_CONFIG_PATH).filter(|p| !p.trim().is_empty()) {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// Overlay flags on an already env-resolved configuration.
    pub fn apply(&self, config: &mut MobConfig) {
        if let Some(ref path) = self.registry {
            config.actions.registry_path = path.clone();
        }
        if let Some(port) = self.port {
            config.general.port = port;
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.trim().to_lowercase();
        }
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}
