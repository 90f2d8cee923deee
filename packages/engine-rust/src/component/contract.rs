//! Declarative description of what a component needs and provides.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use summon_core::{ConfigSource, SourceKey, SourceOrder, Value};
use tracing::warn;

use super::invocation::Invocation;
use crate::error::EngineError;

/// Callable body of a [`Method`].
pub type MethodFn =
    Arc<dyn Fn(&Invocation<'_>, &[Value]) -> Result<Value, EngineError> + Send + Sync>;

/// Lookup closure backing a custom Fetch source.
pub type SourceFn = Arc<dyn Fn(&str) -> Option<Value> + Send + Sync>;

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

/// Per-component behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Features {
    /// Run `rollback` when the primary operation fails.
    pub rollback: bool,
    /// Surface fatal result codes as errors instead of returning normally.
    pub raise_exceptions: bool,
    /// Return the instance itself rather than the raw value.
    pub auto_return: bool,
    /// Return an incomplete instance when required arguments are missing.
    pub partial: bool,
    /// Push onto the call tracker while running.
    pub tracked: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            rollback: false,
            raise_exceptions: true,
            auto_return: false,
            partial: false,
            tracked: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Method
// ---------------------------------------------------------------------------

/// Named callable attached to a component.
///
/// A propagating method is inherited by every successor in a chain that
/// does not declare a method of the same name.
#[derive(Clone)]
pub struct Method {
    name: String,
    propagate: bool,
    func: MethodFn,
}

impl Method {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Invocation<'_>, &[Value]) -> Result<Value, EngineError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            propagate: false,
            func: Arc::new(func),
        }
    }

    #[must_use]
    pub fn propagating(mut self) -> Self {
        self.propagate = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn propagates(&self) -> bool {
        self.propagate
    }

    /// Invokes the method on behalf of `call`.
    ///
    /// # Errors
    ///
    /// Returns whatever the method body returns.
    pub fn call(&self, call: &Invocation<'_>, args: &[Value]) -> Result<Value, EngineError> {
        (self.func)(call, args)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("propagate", &self.propagate)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Argument, capability and source declarations of a component.
#[derive(Clone, Default)]
pub struct Contract {
    pub required: Vec<String>,
    pub optional: Vec<(String, Value)>,
    /// Fetched once per instance and cached on it.
    pub statics: Vec<String>,
    /// Positional argument slots, in order.
    pub arg_mapping: Vec<String>,
    pub required_methods: Vec<String>,
    /// External programs that must be on `PATH`.
    pub required_programs: Vec<String>,
    pub methods: Vec<Method>,
    /// Overrides the standard Fetch order.
    pub fetch_order: Option<SourceOrder>,
    pub custom_sources: Vec<(SourceKey, SourceFn)>,
    /// Backing store for the `config` source.
    pub config: Option<Arc<dyn ConfigSource>>,
    pub features: Features,
}

impl Contract {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.optional.push((name.into(), default.into()));
        self
    }

    #[must_use]
    pub fn static_arg(mut self, name: impl Into<String>) -> Self {
        self.statics.push(name.into());
        self
    }

    #[must_use]
    pub fn map_arg(mut self, name: impl Into<String>) -> Self {
        self.arg_mapping.push(name.into());
        self
    }

    #[must_use]
    pub fn requires_method(mut self, name: impl Into<String>) -> Self {
        self.required_methods.push(name.into());
        self
    }

    #[must_use]
    pub fn requires_program(mut self, name: impl Into<String>) -> Self {
        self.required_programs.push(name.into());
        self
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    #[must_use]
    pub fn fetch_from(mut self, order: SourceOrder) -> Self {
        self.fetch_order = Some(order);
        self
    }

    /// Registers a custom source. It is consulted only when `key` appears in
    /// the Fetch order.
    #[must_use]
    pub fn source<F>(mut self, key: impl Into<SourceKey>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<Value> + Send + Sync + 'static,
    {
        self.custom_sources.push((key.into(), Arc::new(lookup)));
        self
    }

    #[must_use]
    pub fn config(mut self, config: Arc<dyn ConfigSource>) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    /// Removes duplicate names. A name both required and optional becomes
    /// optional.
    pub(crate) fn normalize(&mut self, component: &str) {
        dedupe(&mut self.required);
        dedupe(&mut self.statics);
        dedupe(&mut self.required_methods);
        dedupe(&mut self.required_programs);

        let mut seen = BTreeSet::new();
        self.optional.retain(|(name, _)| seen.insert(name.clone()));

        let optional: BTreeSet<&str> = self.optional.iter().map(|(n, _)| n.as_str()).collect();
        self.required.retain(|name| {
            if optional.contains(name.as_str()) {
                warn!(component, name = %name, "argument is both required and optional; treating as optional");
                false
            } else {
                true
            }
        });
    }

    #[must_use]
    pub fn fetch_order(&self) -> SourceOrder {
        self.fetch_order.clone().unwrap_or_default()
    }

    pub(crate) fn custom_source(&self, key: &SourceKey) -> Option<&SourceFn> {
        self.custom_sources
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, f)| f)
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("statics", &self.statics)
            .field("arg_mapping", &self.arg_mapping)
            .field("required_methods", &self.required_methods)
            .field("required_programs", &self.required_programs)
            .field("methods", &self.methods)
            .field("fetch_order", &self.fetch_order)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

fn dedupe(names: &mut Vec<String>) {
    let mut seen = BTreeSet::new();
    names.retain(|n| seen.insert(n.clone()));
}
