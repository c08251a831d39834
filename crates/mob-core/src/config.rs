use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MobError, Result};

/// Environment variable naming the action registry document.
pub const ENV_REGISTRY_PATH: &str = "API_CONFIG_PATH";
/// Environment variable holding the fallback action timeout in seconds.
pub const ENV_DEFAULT_TIMEOUT: &str = "DEFAULT_TIMEOUT";
/// Environment variable holding the log verbosity.
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
/// Environment variable naming the TOML configuration file.
pub const ENV_CONFIG_PATH: &str = "MOB_CONFIG";
/// Configuration file used when neither a flag nor `MOB_CONFIG` names one.
pub const DEFAULT_CONFIG_FILE: &str = "mob.toml";
/// Timeout applied when neither the file nor the environment sets one.
pub const DEFAULT_TIMEOUT_SECS: f64 = 15.0;
pub const ENV_HOST: &str = "MOB_HOST";
pub const ENV_PORT: &str = "MOB_PORT";

/// Top-level configuration for the MOB process.
///
/// Loaded from `mob.toml` (or `MOB_CONFIG`) when present, then overlaid with
/// the process environment. Each section corresponds to one subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MobConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl MobConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MobConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(MobError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup.
    ///
    /// Unset or blank variables leave the current value untouched. A value
    /// that is present but unparsable is an error rather than silently
    /// ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get(ENV_REGISTRY_PATH) {
            self.actions.registry_path = PathBuf::from(path);
        }
        if let Some(raw) = get(ENV_DEFAULT_TIMEOUT) {
            self.actions.default_timeout_secs = raw.trim().parse::<f64>().map_err(|_| {
                MobError::Config(format!("{} must be a number, got '{}'", ENV_DEFAULT_TIMEOUT, raw))
            })?;
        }
        if let Some(level) = get(ENV_LOG_LEVEL) {
            self.general.log_level = level.trim().to_lowercase();
        }
        if let Some(host) = get(ENV_HOST) {
            self.general.host = host;
        }
        if let Some(raw) = get(ENV_PORT) {
            self.general.port = raw.trim().parse::<u16>().map_err(|_| {
                MobError::Config(format!("{} must be a port number, got '{}'", ENV_PORT, raw))
            })?;
        }
        Ok(())
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let timeout = self.actions.default_timeout_secs;
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(MobError::Config(format!(
                "default timeout must be a positive number of seconds, got {}",
                timeout
            )));
        }
        if let Err(e) = Duration::try_from_secs_f64(timeout) {
            return Err(MobError::Config(format!(
                "default timeout out of range: {} ({})",
                timeout, e
            )));
        }
        if self.actions.max_blocking_workers == 0 {
            return Err(MobError::Config(
                "max_blocking_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// General process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Address the REST server binds to.
    pub host: String,
    /// REST server port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Action registry and execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Path to the JSON action registry.
    pub registry_path: PathBuf,
    /// Timeout applied when an action does not declare its own (seconds).
    pub default_timeout_secs: f64,
    /// Upper bound on blocking handlers running at the same time.
    pub max_blocking_workers: usize,
}

impl ActionsConfig {
    /// The default timeout as a `Duration`.
    ///
    /// Values `validate` would reject fall back to the built-in default.
    pub fn default_timeout(&self) -> Duration {
        match Duration::try_from_secs_f64(self.default_timeout_secs) {
            Ok(timeout) if !timeout.is_zero() => timeout,
            _ => Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            registry_path: PathBuf::from("api_config.json"),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_blocking_workers: 8,
        }
    }
}

/// Chat trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Whether the chat entry point is served at all.
    pub enabled: bool,
    /// Messages starting with this prefix are treated as orders.
    pub trigger_prefix: String,
    /// Every message in this channel is treated as an order.
    pub channel: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_prefix: "!".to_string(),
            channel: "matthew".to_string(),
        }
    }
}
