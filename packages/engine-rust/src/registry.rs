//! Component registry: factories by qualified name, plus importable
//! modules that register more components on demand.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use summon_core::Namespace;
use tracing::{debug, info};

use crate::component::{Component, Kind};
use crate::error::EngineError;

/// Builds a fresh component behavior.
pub type Factory = Arc<dyn Fn() -> Box<dyn Component> + Send + Sync>;

/// Registers a bundle of components.
pub type ModuleLoader = Arc<dyn Fn(&ComponentRegistry) + Send + Sync>;

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Name-keyed registry of constructible component types.
///
/// Entries are added by explicit registration, directly or through named
/// modules. A module's loader runs at most once, on its first `import`.
/// Names registered in a namespace are keyed by their qualified form
/// (`"::a:b:Name"`); names in the root namespace stay bare.
pub struct ComponentRegistry {
    factories: DashMap<String, Factory>,
    modules: DashMap<String, ModuleLoader>,
    imported: Mutex<BTreeSet<String>>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
            modules: DashMap::new(),
            imported: Mutex::new(BTreeSet::new()),
        }
    }

    /// Registers `name` in the root namespace. Re-registering replaces the
    /// previous factory.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Component> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(component = %name, "registered");
        self.factories.insert(name, Arc::new(factory));
    }

    /// Registers `name` inside `namespace`.
    pub fn register_in<F>(&self, namespace: &Namespace, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Component> + Send + Sync + 'static,
    {
        self.register(namespace.qualify(name), factory);
    }

    /// Registers a [`Kind`] under its own name.
    pub fn register_kind(&self, kind: Kind) {
        let name = kind.name().to_string();
        self.register(name, move || Box::new(kind.clone()));
    }

    /// Finds the factory for `name` in `namespace` (root when `None`).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RegistryLookupFailed`] if nothing is registered
    /// under that name.
    pub fn lookup(&self, name: &str, namespace: Option<&Namespace>) -> Result<Factory, EngineError> {
        let key = qualified(name, namespace);
        self.factories
            .get(&key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::RegistryLookupFailed {
                name: name.to_string(),
                namespace: namespace.cloned(),
            })
    }

    #[must_use]
    pub fn contains(&self, name: &str, namespace: Option<&Namespace>) -> bool {
        self.factories.contains_key(&qualified(name, namespace))
    }

    /// Registered keys, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    // -----------------------------------------------------------------------
    // Modules
    // -----------------------------------------------------------------------

    /// Makes a module available for [`import`](Self::import).
    pub fn provide_module<F>(&self, name: impl Into<String>, loader: F)
    where
        F: Fn(&ComponentRegistry) + Send + Sync + 'static,
    {
        self.modules.insert(name.into(), Arc::new(loader));
    }

    #[must_use]
    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    #[must_use]
    pub fn is_imported(&self, name: &str) -> bool {
        self.imported.lock().contains(name)
    }

    /// Runs the loader of module `name`. Returns `false` if it was already
    /// imported.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingModule`] if no such module was provided.
    pub fn import(&self, name: &str) -> Result<bool, EngineError> {
        let loader = self
            .modules
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::MissingModule {
                name: name.to_string(),
            })?;
        if !self.imported.lock().insert(name.to_string()) {
            return Ok(false);
        }
        // The loader registers into `self`; no map guard may be held here.
        loader(self);
        info!(module = name, "imported module");
        Ok(true)
    }

    /// Module that would provide `name` in `namespace`: the qualified name,
    /// then the bare name, then the namespace itself.
    #[must_use]
    pub fn module_for(&self, name: &str, namespace: Option<&Namespace>) -> Option<String> {
        let mut candidates = vec![qualified(name, namespace), name.to_string()];
        if let Some(ns) = namespace.filter(|ns| !ns.is_root()) {
            candidates.push(ns.to_string());
        }
        candidates.into_iter().find(|c| self.has_module(c))
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.names())
            .field("imported", &*self.imported.lock())
            .finish_non_exhaustive()
    }
}

fn qualified(name: &str, namespace: Option<&Namespace>) -> String {
    match namespace {
        Some(ns) => ns.qualify(name),
        None => name.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
