//! The root orchestrator.
//!
//! An [`Executor`] owns the registry, the per-run [`Context`], the
//! configuration sources and the error-resolution pipeline. It resolves
//! component names, caches instances and runs every call with itself
//! injected as the executor.

pub mod config;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::RwLock;
use summon_core::{
    try_fetch, ConfigSource, Environment, FetchId, FetchObserver, Fetchable, JsonConfig,
    Namespace, ProcessEnvironment, Search, SourceKey, SourceOrder, Value,
};
use tracing::{debug, info};

pub use config::{parse_extra, ExecutorArgs, ExecutorConfig, DEFAULT_STRATEGIES};

use crate::component::{CallArgs, ComponentInstance, Outcome};
use crate::context::Context;
use crate::error::EngineError;
use crate::logging::init_logging;
use crate::registry::ComponentRegistry;
use crate::resolution::{ResolutionPipeline, ResolutionStrategy};
use crate::traits::PackageInstaller;

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// What [`Executor::execute`] runs.
#[derive(Debug, Clone)]
pub enum Target {
    /// A registered component, looked up by name.
    Named {
        name: String,
        namespace: Option<Namespace>,
        /// Reuse the executor's cached instance for this name.
        cached: bool,
    },
    /// An instance the caller already holds.
    Instance(Arc<ComponentInstance>),
}

impl Target {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named {
            name: name.into(),
            namespace: None,
            cached: true,
        }
    }

    pub fn in_namespace(name: impl Into<String>, namespace: Namespace) -> Self {
        Self::Named {
            name: name.into(),
            namespace: Some(namespace),
            cached: true,
        }
    }

    /// Builds a fresh instance instead of reusing the cached one.
    #[must_use]
    pub fn uncached(self) -> Self {
        match self {
            Self::Named {
                name, namespace, ..
            } => Self::Named {
                name,
                namespace,
                cached: false,
            },
            other => other,
        }
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

impl From<Arc<ComponentInstance>> for Target {
    fn from(instance: Arc<ComponentInstance>) -> Self {
        Self::Instance(instance)
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub(crate) struct ExecutorInner {
    id: FetchId,
    name: String,
    attributes: RwLock<BTreeMap<String, Value>>,
    arguments: RwLock<BTreeMap<String, Value>>,
    config: RwLock<Option<Arc<dyn ConfigSource>>>,
    environment: Arc<dyn Environment>,
    registry: Arc<ComponentRegistry>,
    cache: DashMap<String, Arc<ComponentInstance>>,
    context: Arc<Context>,
    resolution: ResolutionPipeline,
    settings: RwLock<ExecutorConfig>,
    settings_explicit: bool,
    repository: Option<Arc<dyn PackageInstaller>>,
    package_manager: Option<Arc<dyn PackageInstaller>>,
    observer: Option<Arc<dyn FetchObserver>>,
    args: Option<ExecutorArgs>,
}

/// Shared handle to an executor. Clones refer to the same executor.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

/// Non-owning handle held by component instances.
#[derive(Clone)]
pub struct WeakExecutor(Weak<ExecutorInner>);

impl WeakExecutor {
    #[must_use]
    pub fn upgrade(&self) -> Option<Executor> {
        self.0.upgrade().map(|inner| Executor { inner })
    }
}

impl fmt::Debug for WeakExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakExecutor")
            .field(&(self.0.strong_count() > 0))
            .finish()
    }
}

impl Executor {
    #[must_use]
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn registry(&self) -> Arc<ComponentRegistry> {
        Arc::clone(&self.inner.registry)
    }

    /// Call tracker and global bindings of this executor's run.
    #[must_use]
    pub fn context(&self) -> Arc<Context> {
        Arc::clone(&self.inner.context)
    }

    /// Snapshot of the current settings.
    #[must_use]
    pub fn settings(&self) -> ExecutorConfig {
        self.inner.settings.read().clone()
    }

    #[must_use]
    pub fn environment(&self) -> Arc<dyn Environment> {
        Arc::clone(&self.inner.environment)
    }

    #[must_use]
    pub fn observer(&self) -> Option<Arc<dyn FetchObserver>> {
        self.inner.observer.clone()
    }

    #[must_use]
    pub fn repository(&self) -> Option<Arc<dyn PackageInstaller>> {
        self.inner.repository.clone()
    }

    #[must_use]
    pub fn package_manager(&self) -> Option<Arc<dyn PackageInstaller>> {
        self.inner.package_manager.clone()
    }

    #[must_use]
    pub fn resolution(&self) -> &ResolutionPipeline {
        &self.inner.resolution
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakExecutor {
        WeakExecutor(Arc::downgrade(&self.inner))
    }

    // -----------------------------------------------------------------------
    // Fetch
    // -----------------------------------------------------------------------

    /// Resolves `name` through `self → arguments → config → globals →
    /// environment`, returning `default` when nothing has it.
    pub fn fetch(&self, name: &str, default: impl Into<Value>) -> Value {
        self.try_fetch(name).unwrap_or_else(|| default.into())
    }

    #[must_use]
    pub fn try_fetch(&self, name: &str) -> Option<Value> {
        self.try_fetch_from(name, &self.inner.preferred_sources())
    }

    fn try_fetch_from(&self, name: &str, sources: &SourceOrder) -> Option<Value> {
        try_fetch(&*self.inner, name, Some(sources), self.inner.observer.as_deref())
    }

    /// The `executor` source of a component: continues `search` here,
    /// leaving the environment to the component's own source.
    pub(crate) fn delegate_fetch(&self, name: &str, search: &mut Search<'_>) -> Option<Value> {
        let order = self
            .inner
            .preferred_sources()
            .without(&[SourceKey::ENVIRONMENT]);
        search.delegate(&*self.inner, name, &order)
    }

    /// Value a global named `name` should be bound to: the active config
    /// context's subtree first, then every source except the globals
    /// themselves.
    pub(crate) fn lookup_for_global(&self, name: &str) -> Option<Value> {
        if let Some(key) = self.inner.context.globals.context_key() {
            let section = self.config().and_then(|config| config.get_value(&key));
            if let Some(value) = section.as_ref().and_then(|s| s.get(name)) {
                return Some(value.clone());
            }
        }
        let order = self.inner.preferred_sources().without(&[SourceKey::GLOBALS]);
        self.try_fetch_from(name, &order)
    }

    /// Adds or replaces a call-time argument.
    pub fn set_argument(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner.arguments.write().insert(name.into(), value.into());
    }

    /// Sets an attribute, answered by the `self` source. The value is
    /// normalized.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .attributes
            .write()
            .insert(name.into(), value.into().normalized());
    }

    pub fn set_config(&self, config: Arc<dyn ConfigSource>) {
        *self.inner.config.write() = Some(config);
    }

    #[must_use]
    pub fn config(&self) -> Option<Arc<dyn ConfigSource>> {
        self.inner.config.read().clone()
    }

    /// Switches the config subtree globals are sourced from and recomputes
    /// every fetched global. Returns the number of globals refreshed.
    pub fn set_config_context(&self, key: Option<&str>) -> usize {
        let globals = &self.inner.context.globals;
        if !globals.set_context_key(key.map(str::to_string)) {
            return 0;
        }
        let refreshed = globals.refresh_fetched(|name| self.lookup_for_global(name));
        info!(context = ?key, refreshed, "config context switched");
        refreshed
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Installs logging, loads the config file named by the command-line
    /// arguments, reloads settings and imports the modules listed under
    /// `modules`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the config file cannot be loaded
    /// and the import error of a module that cannot be resolved.
    pub fn start(&self) -> Result<(), EngineError> {
        if let Some(args) = &self.inner.args {
            init_logging(args.verbose, args.quiet, args.log_format);
            if let Some(path) = &args.config {
                let config = JsonConfig::from_path(path)?;
                info!(path = %path.display(), "loaded config");
                self.set_config(Arc::new(config));
            }
        }
        self.reload_settings();

        for module in self.fetch("modules", Value::Null).to_string_list() {
            self.recover(|| self.inner.registry.import(&module))?;
        }
        Ok(())
    }

    /// Re-reads settings through this executor's Fetch. Settings given
    /// explicitly to the builder are left alone.
    pub fn reload_settings(&self) {
        if self.inner.settings_explicit {
            return;
        }
        let settings = self.load_settings();
        debug!(?settings, "settings loaded");
        *self.inner.settings.write() = settings;
    }

    fn load_settings(&self) -> ExecutorConfig {
        let mut settings = ExecutorConfig::load(|key| self.try_fetch(key));
        for name in self.inner.resolution.names() {
            if !settings.resolve_errors_with.contains(&name) {
                settings.resolve_errors_with.push(name);
            }
        }
        settings
    }

    /// Drops cached instances and every global binding.
    pub fn shutdown(&self) {
        self.inner.cache.clear();
        self.inner.context.globals.expire_all();
        debug!(executor = %self.inner.name, "shut down");
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// The cached instance of `name`, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RegistryLookupFailed`] when nothing is
    /// registered under `name`.
    pub fn instance(
        &self,
        name: &str,
        namespace: Option<&Namespace>,
    ) -> Result<Arc<ComponentInstance>, EngineError> {
        let key = namespace.map_or_else(|| name.to_string(), |ns| ns.qualify(name));
        if let Some(cached) = self.inner.cache.get(&key) {
            return Ok(Arc::clone(cached.value()));
        }
        let instance = self.construct(name, namespace)?;
        Ok(Arc::clone(self.inner.cache.entry(key).or_insert(instance).value()))
    }

    fn construct(
        &self,
        name: &str,
        namespace: Option<&Namespace>,
    ) -> Result<Arc<ComponentInstance>, EngineError> {
        let factory = self.inner.registry.lookup(name, namespace)?;
        debug!(component = name, "constructing");
        Ok(ComponentInstance::new(name, factory()))
    }

    fn resolve_target(&self, target: &Target) -> Result<Arc<ComponentInstance>, EngineError> {
        match target {
            Target::Named {
                name,
                namespace,
                cached: true,
            } => self.instance(name, namespace.as_ref()),
            Target::Named {
                name, namespace, ..
            } => self.construct(name, namespace.as_ref()),
            Target::Instance(instance) => Ok(Arc::clone(instance)),
        }
    }

    /// Runs `target` with this executor injected, under the error-resolution
    /// pipeline.
    ///
    /// # Errors
    ///
    /// Returns the call's error once resolution gives up, or the terminal
    /// error as is.
    pub fn execute(&self, target: impl Into<Target>, args: CallArgs) -> Result<Outcome, EngineError> {
        let target = target.into();
        self.recover(|| {
            let instance = self.resolve_target(&target)?;
            let mut args = args.clone();
            args.executor = Some(self.clone());
            instance.call(args)
        })
    }

    /// Runs `op` under this executor's error-resolution pipeline.
    ///
    /// # Errors
    ///
    /// See [`ResolutionPipeline::run`].
    pub fn recover<T>(&self, op: impl FnMut() -> Result<T, EngineError>) -> Result<T, EngineError> {
        self.inner.resolution.run(self, op)
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("cached", &self.inner.cache.len())
            .finish_non_exhaustive()
    }
}

impl Fetchable for ExecutorInner {
    fn fetch_id(&self) -> FetchId {
        self.id
    }

    fn fetch_name(&self) -> &str {
        &self.name
    }

    fn preferred_sources(&self) -> SourceOrder {
        SourceOrder::new([
            SourceKey::SELF,
            SourceKey::ARGUMENTS,
            SourceKey::CONFIG,
            SourceKey::GLOBALS,
            SourceKey::ENVIRONMENT,
        ])
    }

    fn handles(&self, source: &SourceKey) -> bool {
        matches!(
            source.as_str(),
            "self" | "arguments" | "config" | "globals" | "environment"
        )
    }

    fn consult(&self, source: &SourceKey, name: &str, _search: &mut Search<'_>) -> Option<Value> {
        match source.as_str() {
            "self" if name == "name" => Some(Value::from(self.name.as_str())),
            "self" => self.attributes.read().get(name).cloned(),
            "arguments" => self.arguments.read().get(name).cloned(),
            "config" => {
                let config = self.config.read().clone();
                config?.get_value(name)
            }
            "globals" => self.context.globals.get(name),
            "environment" => self.environment.lookup(name),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutorBuilder
// ---------------------------------------------------------------------------

/// Builds an [`Executor`].
pub struct ExecutorBuilder {
    name: String,
    registry: Arc<ComponentRegistry>,
    config: Option<Arc<dyn ConfigSource>>,
    environment: Arc<dyn Environment>,
    settings: Option<ExecutorConfig>,
    arguments: BTreeMap<String, Value>,
    strategies: Vec<Arc<dyn ResolutionStrategy>>,
    repository: Option<Arc<dyn PackageInstaller>>,
    package_manager: Option<Arc<dyn PackageInstaller>>,
    observer: Option<Arc<dyn FetchObserver>>,
    args: Option<ExecutorArgs>,
}

impl ExecutorBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "executor".to_string(),
            registry: Arc::new(ComponentRegistry::new()),
            config: None,
            environment: Arc::new(ProcessEnvironment),
            settings: None,
            arguments: BTreeMap::new(),
            strategies: Vec::new(),
            repository: None,
            package_manager: None,
            observer: None,
            args: None,
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn registry(self, registry: ComponentRegistry) -> Self {
        self.shared_registry(Arc::new(registry))
    }

    #[must_use]
    pub fn shared_registry(mut self, registry: Arc<ComponentRegistry>) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn config(mut self, config: Arc<dyn ConfigSource>) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = environment;
        self
    }

    /// Fixes the settings instead of reading them through Fetch.
    #[must_use]
    pub fn settings(mut self, settings: ExecutorConfig) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub fn argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Adds a resolution strategy. Unless settings are fixed, it runs after
    /// the built-in ones.
    #[must_use]
    pub fn strategy(mut self, strategy: impl ResolutionStrategy + 'static) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    #[must_use]
    pub fn repository(mut self, installer: Arc<dyn PackageInstaller>) -> Self {
        self.repository = Some(installer);
        self
    }

    #[must_use]
    pub fn package_manager(mut self, installer: Arc<dyn PackageInstaller>) -> Self {
        self.package_manager = Some(installer);
        self
    }

    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn FetchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Command-line arguments. They become call-time arguments and are
    /// consulted by [`Executor::start`].
    #[must_use]
    pub fn args(mut self, args: ExecutorArgs) -> Self {
        self.args = Some(args);
        self
    }

    #[must_use]
    pub fn build(self) -> Executor {
        let mut arguments = self
            .args
            .as_ref()
            .map(ExecutorArgs::arguments)
            .unwrap_or_default();
        arguments.extend(self.arguments);

        let mut resolution = ResolutionPipeline::with_builtins();
        for strategy in self.strategies {
            resolution.add(strategy);
        }

        let settings_explicit = self.settings.is_some();
        let executor = Executor {
            inner: Arc::new(ExecutorInner {
                id: FetchId::next(),
                name: self.name,
                attributes: RwLock::new(BTreeMap::new()),
                arguments: RwLock::new(arguments),
                config: RwLock::new(self.config),
                environment: self.environment,
                registry: self.registry,
                cache: DashMap::new(),
                context: Arc::new(Context::new()),
                resolution,
                settings: RwLock::new(self.settings.unwrap_or_default()),
                settings_explicit,
                repository: self.repository,
                package_manager: self.package_manager,
                observer: self.observer,
                args: self.args,
            }),
        };
        executor.reload_settings();
        executor
    }
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use parking_lot::Mutex;
    use summon_core::{MapConfig, MapEnvironment};

    use super::*;
    use crate::component::Kind;
    use crate::test_support::{executor_with, standard_registry, Hello};

    #[test]
    fn scenario_hello_defaults_and_argument() {
        let executor = executor_with(standard_registry(), MapEnvironment::new());

        let out = executor.execute("Hello", CallArgs::new()).unwrap();
        assert_eq!(out.into_value(), Value::from("Hello says hello to you"));

        let out = executor
            .execute("Hello", CallArgs::new().kwarg("say_hi_to", "World"))
            .unwrap();
        assert_eq!(out.into_value(), Value::from("Hello says hello to World"));
    }

    #[test]
    fn scenario_friendly_enemy_chain() {
        let executor = executor_with(standard_registry(), MapEnvironment::new());

        let out = executor
            .execute(
                "Friendly",
                CallArgs::new().kwarg("enemy", "Worst").next(["Enemy"]),
            )
            .unwrap();
        assert_eq!(
            out.into_value(),
            Value::from("Enemy says hello to its Worst Enemy")
        );

        let err = executor
            .execute("Enemy", CallArgs::new().kwarg("enemy", "Worst"))
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingCapability { .. }));
    }

    #[test]
    fn unknown_chain_entry_is_invalid() {
        let executor = executor_with(standard_registry(), MapEnvironment::new());
        let err = executor
            .execute("Friendly", CallArgs::new().next(["Nobody"]))
            .unwrap_err();
        match err {
            EngineError::InvalidChain { next, .. } => assert_eq!(next, "Nobody"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn instances_are_cached_unless_asked_not_to() {
        let executor = executor_with(standard_registry(), MapEnvironment::new());
        let first = executor.instance("Hello", None).unwrap();
        let second = executor.instance("Hello", None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        executor
            .execute(Target::named("Hello").uncached(), CallArgs::new())
            .unwrap();
        assert!(first.returned().is_null());

        executor.execute("Hello", CallArgs::new()).unwrap();
        assert_eq!(first.returned(), Value::from("Hello says hello to you"));

        executor.shutdown();
        let third = executor.instance("Hello", None).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn namespaced_components_resolve_by_qualified_name() {
        let registry = ComponentRegistry::new();
        let ns = Namespace::from("tools");
        registry.register_in(&ns, "Hello", || Box::new(Hello));
        let executor = executor_with(registry, MapEnvironment::new());

        let out = executor
            .execute(Target::in_namespace("Hello", ns.clone()), CallArgs::new())
            .unwrap();
        assert_eq!(out.into_value(), Value::from("Hello says hello to you"));
        assert!(executor.instance("Hello", Some(&ns)).is_ok());
        assert!(executor.instance("Hello", None).is_err());
    }

    #[test]
    fn executor_instance_target_runs_given_instance() {
        let executor = executor_with(standard_registry(), MapEnvironment::new());
        let hello = ComponentInstance::new("Hello", Box::new(Hello));
        let out = executor
            .execute(Arc::clone(&hello), CallArgs::new().arg("Target"))
            .unwrap();
        assert_eq!(out.into_value(), Value::from("Hello says hello to Target"));
        assert!(hello.executor().is_some());
    }

    #[test]
    fn fetch_precedence_arguments_over_config_over_environment() {
        let executor = Executor::builder()
            .config(Arc::new(MapConfig::new().with("level", "config").with("mode", "config")))
            .environment(Arc::new(
                MapEnvironment::new()
                    .with("LEVEL", "env")
                    .with("MODE", "env")
                    .with("ONLY_ENV", "yes"),
            ))
            .argument("level", "cli")
            .build();

        assert_eq!(executor.fetch("level", Value::Null), Value::from("cli"));
        assert_eq!(executor.fetch("mode", Value::Null), Value::from("config"));
        assert_eq!(executor.fetch("only_env", Value::Null), Value::from("yes"));
        assert_eq!(executor.fetch("absent", 0), Value::Int(0));
        assert_eq!(executor.fetch("name", Value::Null), Value::from("executor"));
    }

    #[test]
    fn settings_read_through_fetch_unless_fixed() {
        let executor = Executor::builder()
            .environment(Arc::new(MapEnvironment::new().with("NO_REPO", "true")))
            .config(Arc::new(MapConfig::new().with("max_resolution_depth", 7)))
            .build();
        let settings = executor.settings();
        assert!(settings.no_repo);
        assert_eq!(settings.max_resolution_depth, 7);

        let fixed = Executor::builder()
            .environment(Arc::new(MapEnvironment::new().with("NO_REPO", "true")))
            .settings(ExecutorConfig::default())
            .build();
        fixed.reload_settings();
        assert!(!fixed.settings().no_repo);
    }

    #[test]
    fn components_fall_back_to_executor_arguments() {
        let registry = ComponentRegistry::new();
        registry.register_kind(
            Kind::builder("Counter")
                .required("count")
                .function(|call| Ok(call.arg("count"))),
        );
        let executor = Executor::builder()
            .registry(registry)
            .environment(Arc::new(MapEnvironment::new()))
            .argument("count", 3)
            .build();

        let out = executor.execute("Counter", CallArgs::new()).unwrap();
        assert_eq!(out.into_value(), Value::Int(3));
    }

    #[test]
    fn config_context_switch_refreshes_fetched_globals() {
        let config = MapConfig::new()
            .with("service_a", summon_core::value_map! { "host" => "a.local" })
            .with("service_b", summon_core::value_map! { "host" => "b.local" });
        let registry = ComponentRegistry::new();
        registry.register_kind(Kind::builder("Host").function(|call| call.global("host")));
        let executor = Executor::builder()
            .registry(registry)
            .config(Arc::new(config))
            .environment(Arc::new(MapEnvironment::new()))
            .build();
        executor.context().globals.set("pinned", Value::from("x"), false);

        assert_eq!(executor.set_config_context(Some("service_a")), 0);
        let out = executor.execute("Host", CallArgs::new()).unwrap();
        assert_eq!(out.into_value(), Value::from("a.local"));

        assert_eq!(executor.set_config_context(Some("service_b")), 1);
        let out = executor.execute("Host", CallArgs::new()).unwrap();
        assert_eq!(out.into_value(), Value::from("b.local"));
        assert_eq!(executor.set_config_context(Some("service_b")), 0);

        // Nothing resolves `host` outside a context: the fetched binding goes.
        executor.set_config_context(None);
        assert!(!executor.context().globals.contains("host"));
        assert_eq!(executor.context().globals.get("pinned"), Some(Value::from("x")));
    }

    #[test]
    fn start_loads_config_file_and_imports_modules() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"modules": ["greetings"], "max_resolution_depth": 3, "say_hi_to": "file"}}"#
        )
        .unwrap();

        let registry = ComponentRegistry::new();
        registry.provide_module("greetings", |r| r.register("Hello", || Box::new(Hello)));
        let args = ExecutorArgs {
            config: Some(file.path().to_path_buf()),
            extra: vec!["--mode".into(), "test".into()],
            ..ExecutorArgs::default()
        };
        let executor = Executor::builder()
            .registry(registry)
            .environment(Arc::new(MapEnvironment::new()))
            .args(args)
            .build();

        executor.start().unwrap();
        assert!(executor.registry().is_imported("greetings"));
        assert_eq!(executor.settings().max_resolution_depth, 3);
        assert_eq!(executor.fetch("mode", Value::Null), Value::from("test"));

        let out = executor.execute("Hello", CallArgs::new()).unwrap();
        assert_eq!(out.into_value(), Value::from("Hello says hello to file"));
    }

    #[test]
    fn start_reports_unreadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Executor::builder()
            .environment(Arc::new(MapEnvironment::new()))
            .args(ExecutorArgs {
                config: Some(dir.path().join("missing.json")),
                ..ExecutorArgs::default()
            })
            .build();
        assert!(matches!(executor.start(), Err(EngineError::Config(_))));
    }

    #[test]
    fn observer_sees_fetch_locations() {
        let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let executor = Executor::builder()
            .environment(Arc::new(MapEnvironment::new()))
            .argument("x", 1)
            .observer(Arc::new(move |name: &str, location: &SourceKey, _: &Value| {
                sink.lock().push((name.to_string(), location.to_string()));
            }))
            .build();
        seen.lock().clear();

        executor.fetch("x", Value::Null);
        assert_eq!(
            seen.lock().as_slice(),
            &[("x".to_string(), "arguments".to_string())]
        );
    }

    #[test]
    fn independent_executors_do_not_share_context() {
        let a = executor_with(standard_registry(), MapEnvironment::new());
        let b = executor_with(standard_registry(), MapEnvironment::new());
        a.context().globals.set("g", Value::Int(1), false);
        assert!(b.context().globals.get("g").is_none());
    }
}
