//! Versioned, cache-coherent view of the action registry document.
//!
//! The store stats the registry file on every read and only re-parses it
//! when the modification marker moves. Readers load the published snapshot
//! without locking; reloads are serialized behind a narrow mutex so a burst
//! of readers after an edit parses the file once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwapOption;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::types::ActionDescriptor;

/// Keys with this prefix are internal and never shown to prompts.
const INTERNAL_KEY_PREFIX: &str = "__";

/// Identity of one version of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMarker {
    pub modified: SystemTime,
    pub len: u64,
}

impl SourceMarker {
    fn from_metadata(meta: &std::fs::Metadata) -> std::io::Result<Self> {
        Ok(Self {
            modified: meta.modified()?,
            len: meta.len(),
        })
    }
}

/// All descriptors from one parse of the registry document.
#[derive(Debug)]
pub struct ConfigSnapshot {
    actions: HashMap<String, ActionDescriptor>,
    marker: SourceMarker,
    epoch: u64,
    raw: Map<String, Value>,
}

impl ConfigSnapshot {
    pub fn get(&self, name: &str) -> Option<&ActionDescriptor> {
        self.actions.get(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Action names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn marker(&self) -> SourceMarker {
        self.marker
    }

    /// Load counter within the owning store, starting at 1.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The registry as shown to an LLM: internal `__` keys removed at every
    /// level and passkeys dropped.
    pub fn public_catalogue(&self) -> Value {
        let mut catalogue = Map::new();
        for (name, entry) in &self.raw {
            if name.starts_with(INTERNAL_KEY_PREFIX) {
                continue;
            }
            let mut entry = strip_internal_keys(entry);
            if let Value::Object(fields) = &mut entry {
                fields.remove("passkey");
            }
            catalogue.insert(name.clone(), entry);
        }
        Value::Object(catalogue)
    }
}

fn strip_internal_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !k.starts_with(INTERNAL_KEY_PREFIX))
                .map(|(k, v)| (k.clone(), strip_internal_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_internal_keys).collect()),
        other => other.clone(),
    }
}

/// One action entry as written in the document.
#[derive(Debug, Deserialize)]
struct RawDescriptor {
    function: String,
    #[serde(default, alias = "parameters")]
    environment: Option<Map<String, Value>>,
    #[serde(default)]
    passkey: Option<String>,
    #[serde(default)]
    timeout: Option<f64>,
}

impl RawDescriptor {
    fn into_descriptor(self) -> Result<ActionDescriptor, String> {
        if self.function.trim().is_empty() {
            return Err("'function' must not be empty".to_string());
        }
        let timeout = match self.timeout {
            None => None,
            Some(secs) if secs.is_finite() && secs > 0.0 => Some(
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| format!("'timeout' out of range: {}", e))?,
            ),
            Some(secs) => {
                return Err(format!(
                    "'timeout' must be a positive number of seconds, got {}",
                    secs
                ))
            }
        };
        Ok(ActionDescriptor {
            handler_reference: self.function.trim().to_string(),
            environment: self.environment.unwrap_or_default(),
            passkey: self.passkey.filter(|p| !p.is_empty()),
            timeout,
        })
    }
}

/// Owns the registry path and the currently published snapshot.
pub struct ConfigStore {
    path: PathBuf,
    published: ArcSwapOption<ConfigSnapshot>,
    reload_lock: Mutex<()>,
    epoch: AtomicU64,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            published: ArcSwapOption::empty(),
            reload_lock: Mutex::new(()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot, reloading first if the source changed.
    ///
    /// A failed reload keeps the previous snapshot published but still
    /// returns the error to this caller.
    pub fn get_actions(&self) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        let marker = self.stat()?;
        if let Some(current) = self.published.load_full() {
            if current.marker == marker {
                return Ok(current);
            }
        }

        let _guard = self
            .reload_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Another caller may have reloaded while we waited.
        let marker = self.stat()?;
        if let Some(current) = self.published.load_full() {
            if current.marker == marker {
                debug!(epoch = current.epoch, "Registry reloaded by another caller");
                return Ok(current);
            }
        }

        let snapshot = match self.load(marker) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Registry reload failed");
                return Err(e);
            }
        };
        info!(
            path = %self.path.display(),
            epoch = snapshot.epoch,
            actions = snapshot.len(),
            "Action registry loaded"
        );
        self.published.store(Some(Arc::clone(&snapshot)));
        Ok(snapshot)
    }

    /// [`get_actions`](Self::get_actions) on the blocking pool.
    ///
    /// Async callers go through here so the stat and any reload never run
    /// on a runtime worker.
    pub async fn snapshot(self: Arc<Self>) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || self.get_actions())
            .await
            .unwrap_or_else(|e| {
                Err(ConfigError::Malformed {
                    path,
                    reason: format!("registry load aborted: {}", e),
                })
            })
    }

    /// Drop the published snapshot so the next read parses the file again.
    pub fn reset(&self) {
        self.published.store(None);
    }

    fn stat(&self) -> Result<SourceMarker, ConfigError> {
        std::fs::metadata(&self.path)
            .and_then(|meta| SourceMarker::from_metadata(&meta))
            .map_err(|e| self.io_error(e))
    }

    fn io_error(&self, err: std::io::Error) -> ConfigError {
        if err.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: self.path.clone(),
            }
        } else {
            self.malformed(format!("cannot read file: {}", err))
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::Malformed {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn load(&self, marker: SourceMarker) -> Result<ConfigSnapshot, ConfigError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let root: Value = serde_json::from_str(&content)
            .map_err(|e| self.malformed(format!("invalid JSON: {}", e)))?;
        let Value::Object(raw) = root else {
            return Err(self.malformed("root must be a JSON object"));
        };

        let mut actions = HashMap::with_capacity(raw.len());
        for (name, entry) in &raw {
            if name.trim().is_empty() {
                return Err(self.malformed("action names must not be empty"));
            }
            if !entry.is_object() {
                return Err(self.malformed(format!("action '{}' must be an object", name)));
            }
            let descriptor = RawDescriptor::deserialize(entry)
                .map_err(|e| e.to_string())
                .and_then(RawDescriptor::into_descriptor)
                .map_err(|reason| self.malformed(format!("action '{}': {}", name, reason)))?;
            actions.insert(name.clone(), descriptor);
        }

        Ok(ConfigSnapshot {
            actions,
            marker,
            epoch: self.epoch.fetch_add(1, Ordering::SeqCst) + 1,
            raw,
        })
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("path", &self.path)
            .field("epoch", &self.epoch.load(Ordering::SeqCst))
            .finish()
    }
}
