//! The view of a running call handed to component code.

use std::collections::BTreeMap;
use std::sync::Arc;

use summon_core::{SourceOrder, Value};

use super::instance::{CallArgs, ComponentInstance};
use super::outcome::Outcome;
use crate::error::EngineError;
use crate::executor::{Executor, Target};

/// Borrowed handle on the instance whose call is in progress.
///
/// Passed to `function`, `rollback`, the hooks, and every [`Method`](super::Method)
/// invoked during the call. Methods inherited from a precursor see the
/// successor's invocation, so `name()` and `arg()` refer to the successor.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    instance: &'a Arc<ComponentInstance>,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(instance: &'a Arc<ComponentInstance>) -> Self {
        Self { instance }
    }

    #[must_use]
    pub fn instance(&self) -> &'a Arc<ComponentInstance> {
        self.instance
    }

    #[must_use]
    pub fn name(&self) -> &'a str {
        self.instance.name()
    }

    /// Value of a validated argument or attribute; null when absent.
    #[must_use]
    pub fn arg(&self, name: &str) -> Value {
        self.instance.attribute(name).unwrap_or_default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.instance.attribute(name)
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) {
        self.instance.set(name, value);
    }

    #[must_use]
    pub fn fetch(&self, name: &str, default: impl Into<Value>) -> Value {
        self.instance.fetch(name, default.into())
    }

    #[must_use]
    pub fn fetch_from(&self, name: &str, default: impl Into<Value>, sources: &SourceOrder) -> Value {
        self.instance.fetch_from(name, default.into(), sources)
    }

    #[must_use]
    pub fn positional(&self) -> Vec<Value> {
        self.instance.positional()
    }

    #[must_use]
    pub fn arguments(&self) -> BTreeMap<String, Value> {
        self.instance.arguments()
    }

    #[must_use]
    pub fn precursor(&self) -> Option<Arc<ComponentInstance>> {
        self.instance.precursor()
    }

    #[must_use]
    pub fn caller(&self) -> Option<Arc<ComponentInstance>> {
        self.instance.caller()
    }

    #[must_use]
    pub fn executor(&self) -> Option<Executor> {
        self.instance.executor()
    }

    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.instance.has_method(name)
    }

    /// Calls a method from the instance's method table.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingCapability`] if no such method is bound,
    /// otherwise whatever the method returns.
    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, EngineError> {
        let method = self
            .instance
            .method(name)
            .ok_or_else(|| EngineError::MissingCapability {
                component: self.name().to_string(),
                method: name.to_string(),
            })?;
        method.call(self, args)
    }

    /// Runs another component through the executor. The chain defaults to
    /// empty so the callee never inherits this call's `next`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoExecutor`] when the instance is not bound to
    /// an executor, otherwise the callee's error.
    pub fn execute(&self, target: impl Into<Target>, mut args: CallArgs) -> Result<Outcome, EngineError> {
        let executor = self.require_executor()?;
        args.keywords
            .entry("next".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        executor.execute(target, args)
    }

    /// Runs `op` under the executor's error-resolution pipeline. Without an
    /// executor `op` runs once.
    ///
    /// # Errors
    ///
    /// Returns the error `op` still produces once resolution gives up.
    pub fn recoverable<T>(&self, mut op: impl FnMut() -> Result<T, EngineError>) -> Result<T, EngineError> {
        match self.executor() {
            Some(executor) => executor.recover(op),
            None => op(),
        }
    }

    /// Reads a global binding.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UndefinedName`] when `name` is not bound. The
    /// error-resolution pipeline knows how to bind it.
    pub fn global(&self, name: &str) -> Result<Value, EngineError> {
        self.executor()
            .and_then(|e| e.context().globals.get(name))
            .ok_or_else(|| EngineError::UndefinedName {
                name: name.to_string(),
            })
    }

    /// Marks the primary operation as failed.
    pub fn mark_failed(&self) {
        self.instance.set_function_succeeded(false);
    }

    pub fn set_function_succeeded(&self, succeeded: bool) {
        self.instance.set_function_succeeded(succeeded);
    }

    #[must_use]
    pub fn function_succeeded(&self) -> bool {
        self.instance.function_succeeded()
    }

    pub fn set_rollback_succeeded(&self, succeeded: bool) {
        self.instance.set_rollback_succeeded(succeeded);
    }

    #[must_use]
    pub fn rollback_succeeded(&self) -> bool {
        self.instance.rollback_succeeded()
    }

    fn require_executor(&self) -> Result<Executor, EngineError> {
        self.executor().ok_or_else(|| EngineError::NoExecutor {
            component: self.name().to_string(),
        })
    }
}
