//! Component types assembled from a declarative parameter list.
//!
//! ```
//! use summon_engine::{CallArgs, ComponentInstance, Kind, Value};
//!
//! let greet = Kind::builder("Greet")
//!     .optional("who", "world")
//!     .function(|call| Ok(Value::from(format!("hi {}", call.arg("who")))));
//!
//! let instance = ComponentInstance::new("Greet", Box::new(greet));
//! let out = instance.call(CallArgs::new()).unwrap();
//! assert_eq!(out.into_value(), Value::from("hi world"));
//! ```

use std::fmt;
use std::sync::Arc;

use summon_core::{ConfigSource, SourceKey, SourceOrder, Value};

use super::contract::{Contract, Features, Method};
use super::instance::CallArgs;
use super::invocation::Invocation;
use super::Component;
use crate::error::EngineError;

/// Body of a [`Kind`]'s primary operation or rollback.
pub type KindFn = Arc<dyn Fn(&Invocation<'_>) -> Result<Value, EngineError> + Send + Sync>;

/// A component type built from closures and a [`Contract`].
#[derive(Clone)]
pub struct Kind {
    name: String,
    contract: Contract,
    function: KindFn,
    rollback: Option<KindFn>,
}

impl Kind {
    pub fn builder(name: impl Into<String>) -> KindBuilder {
        KindBuilder {
            name: name.into(),
            contract: Contract::new(),
            rollback: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Component for Kind {
    fn contract(&self) -> Contract {
        self.contract.clone()
    }

    fn function(&self, call: &Invocation<'_>) -> Result<Value, EngineError> {
        (self.function)(call)
    }

    fn rollback(&self, call: &Invocation<'_>) -> Result<Value, EngineError> {
        match &self.rollback {
            Some(rollback) => rollback(call),
            None => Ok(Value::Null),
        }
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kind")
            .field("name", &self.name)
            .field("contract", &self.contract)
            .field("rollback", &self.rollback.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Kind`]. Finished by [`KindBuilder::function`].
pub struct KindBuilder {
    name: String,
    contract: Contract,
    rollback: Option<KindFn>,
}

impl KindBuilder {
    #[must_use]
    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.contract = self.contract.required(name);
        self
    }

    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.contract = self.contract.optional(name, default);
        self
    }

    #[must_use]
    pub fn static_arg(mut self, name: impl Into<String>) -> Self {
        self.contract = self.contract.static_arg(name);
        self
    }

    /// Declares the positional argument slots.
    #[must_use]
    pub fn map_args<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.contract = self.contract.map_arg(name);
        }
        self
    }

    #[must_use]
    pub fn requires_method(mut self, name: impl Into<String>) -> Self {
        self.contract = self.contract.requires_method(name);
        self
    }

    #[must_use]
    pub fn requires_program(mut self, name: impl Into<String>) -> Self {
        self.contract = self.contract.requires_program(name);
        self
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.contract = self.contract.method(method);
        self
    }

    /// Binds method `method` to running the registered component `target`.
    ///
    /// The method's arguments become the target's positional arguments and
    /// the calling instance becomes its precursor. The target's value is the
    /// method's return value.
    #[must_use]
    pub fn inject(mut self, method: impl Into<String>, target: impl Into<String>) -> Self {
        let target = target.into();
        let injected = Method::new(method, move |call, args| {
            let mut call_args = CallArgs::new().precursor(Arc::clone(call.instance()));
            call_args.positional = args.to_vec();
            Ok(call.execute(target.as_str(), call_args)?.into_value())
        });
        self.contract = self.contract.method(injected);
        self
    }

    #[must_use]
    pub fn fetch_from(mut self, order: SourceOrder) -> Self {
        self.contract = self.contract.fetch_from(order);
        self
    }

    #[must_use]
    pub fn source<F>(mut self, key: impl Into<SourceKey>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<Value> + Send + Sync + 'static,
    {
        self.contract = self.contract.source(key, lookup);
        self
    }

    #[must_use]
    pub fn config(mut self, config: Arc<dyn ConfigSource>) -> Self {
        self.contract = self.contract.config(config);
        self
    }

    #[must_use]
    pub fn features(mut self, features: Features) -> Self {
        self.contract = self.contract.features(features);
        self
    }

    #[must_use]
    pub fn rollback<F>(mut self, rollback: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value, EngineError> + Send + Sync + 'static,
    {
        self.rollback = Some(Arc::new(rollback));
        self
    }

    /// Sets the primary operation and finishes the type.
    pub fn function<F>(self, function: F) -> Kind
    where
        F: Fn(&Invocation<'_>) -> Result<Value, EngineError> + Send + Sync + 'static,
    {
        Kind {
            name: self.name,
            contract: self.contract,
            function: Arc::new(function),
            rollback: self.rollback,
        }
    }
}

#[cfg(test)]
mod tests {
    use summon_core::MapEnvironment;

    use super::*;
    use crate::registry::ComponentRegistry;
    use crate::test_support::executor_with;

    #[test]
    fn injected_method_runs_target_with_caller_as_precursor() {
        let registry = ComponentRegistry::new();
        registry.register_kind(
            Kind::builder("Shout")
                .required("word")
                .map_args(["word"])
                .function(|call| {
                    let from = call.precursor().map(|p| p.name().to_string()).unwrap_or_default();
                    Ok(Value::from(format!("{from}: {}!", call.arg("word"))))
                }),
        );
        registry.register_kind(
            Kind::builder("Speaker")
                .inject("shout", "Shout")
                .function(|call| call.call_method("shout", &[Value::from("hey")])),
        );
        let executor = executor_with(registry, MapEnvironment::new());

        let out = executor.execute("Speaker", CallArgs::new()).unwrap();
        assert_eq!(out.into_value(), Value::from("Speaker: hey!"));
    }

    #[test]
    fn missing_program_fails_initialization() {
        let kind = Kind::builder("NeedsTool")
            .requires_program("summon-definitely-not-installed-tool")
            .function(|_| Ok(Value::Null));
        let instance = crate::component::ComponentInstance::new("NeedsTool", Box::new(kind));
        let err = instance.call(CallArgs::new()).unwrap_err();
        assert!(matches!(err, EngineError::MissingProgram { .. }));
    }
}
