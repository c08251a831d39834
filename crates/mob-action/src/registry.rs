//! Handler registry: turns handler references into runnable handlers.
//!
//! A reference has the form `module.path[:attribute]` with the attribute
//! defaulting to `run`. Lookup goes through a `Resolver`, and successful
//! resolutions are cached for the lifetime of the registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::error::ResolutionError;
use crate::handler::{builtin, Registration, ResolvedHandler};

/// Namespace every handler module lives under.
pub const ROOT_NAMESPACE: &str = "functions";
/// Attribute used when a reference names only a module.
pub const DEFAULT_ATTRIBUTE: &str = "run";

/// Split `reference` at its last `:` into module path and attribute.
pub fn split_reference(reference: &str) -> Result<(&str, &str), ResolutionError> {
    let (module, attribute) = match reference.rsplit_once(':') {
        Some((module, attribute)) => (module.trim(), attribute.trim()),
        None => (reference.trim(), DEFAULT_ATTRIBUTE),
    };
    if module.is_empty() || attribute.is_empty() {
        return Err(ResolutionError::InvalidReference(reference.to_string()));
    }
    Ok((module, attribute))
}

/// Looks up a handler by module path and attribute.
pub trait Resolver: Send + Sync {
    fn load(&self, module: &str, attribute: &str) -> Result<ResolvedHandler, ResolutionError>;
}

/// Resolver backed by a table filled at startup.
#[derive(Debug, Default)]
pub struct StaticResolver {
    modules: HashMap<String, HashMap<String, Registration>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A resolver preloaded with the built-in handlers.
    pub fn with_builtins() -> Self {
        let mut resolver = Self::new();
        builtin::register_all(&mut resolver);
        resolver
    }

    /// Register `registration` as `module:attribute`.
    ///
    /// `module` is relative to the root namespace. Registering the same pair
    /// twice replaces the earlier handler.
    pub fn register(&mut self, module: &str, attribute: &str, registration: Registration) {
        self.modules
            .entry(qualify(module))
            .or_default()
            .insert(attribute.to_string(), registration);
    }

    /// Register `registration` under the default attribute.
    pub fn register_run(&mut self, module: &str, registration: Registration) {
        self.register(module, DEFAULT_ATTRIBUTE, registration);
    }

    /// Qualified module names, sorted.
    pub fn modules(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn qualify(module: &str) -> String {
    format!("{}.{}", ROOT_NAMESPACE, module)
}

impl Resolver for StaticResolver {
    fn load(&self, module: &str, attribute: &str) -> Result<ResolvedHandler, ResolutionError> {
        let qualified = qualify(module);
        let attributes = self
            .modules
            .get(&qualified)
            .ok_or_else(|| ResolutionError::ModuleNotFound {
                module: qualified.clone(),
            })?;
        let registration =
            attributes
                .get(attribute)
                .ok_or_else(|| ResolutionError::AttributeNotFound {
                    module: qualified.clone(),
                    attribute: attribute.to_string(),
                })?;
        Ok(ResolvedHandler::new(
            format!("{}:{}", module, attribute),
            registration.clone(),
        ))
    }
}

/// Caching front for a `Resolver`.
pub struct HandlerRegistry {
    resolver: Box<dyn Resolver>,
    cache: RwLock<HashMap<String, ResolvedHandler>>,
    loads: AtomicUsize,
}

impl HandlerRegistry {
    pub fn new(resolver: impl Resolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
            cache: RwLock::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Resolve `reference`, consulting the cache first.
    ///
    /// Only successes are cached; a failing reference is retried on every
    /// call.
    pub fn resolve(&self, reference: &str) -> Result<ResolvedHandler, ResolutionError> {
        {
            let cache = self.cache.read().unwrap_or_else(|p| p.into_inner());
            if let Some(handler) = cache.get(reference) {
                debug!(reference, "Handler cache hit");
                return Ok(handler.clone());
            }
        }

        let (module, attribute) = split_reference(reference)?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        let handler = match self.resolver.load(module, attribute) {
            Ok(handler) => handler,
            Err(e) => {
                warn!(reference, error = %e, "Handler resolution failed");
                return Err(e);
            }
        };

        let mut cache = self.cache.write().unwrap_or_else(|p| p.into_inner());
        let cached = cache
            .entry(reference.to_string())
            .or_insert(handler)
            .clone();
        debug!(reference, blocking = cached.kind.is_blocking(), "Handler resolved");
        Ok(cached)
    }

    /// Forget every cached resolution.
    pub fn clear(&self) {
        self.cache
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    pub fn cached(&self) -> usize {
        self.cache.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Number of times the underlying resolver has been consulted.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("cached", &self.cached())
            .field("loads", &self.load_count())
            .finish()
    }
}
