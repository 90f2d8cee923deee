//! Components: named, stateful, callable units of work.

pub mod contract;
pub mod instance;
pub mod invocation;
pub mod kind;
pub mod outcome;

pub use contract::{Contract, Features, Method, MethodFn, SourceFn};
pub use instance::{CallArgs, ComponentInstance};
pub use invocation::Invocation;
pub use kind::{Kind, KindBuilder, KindFn};
pub use outcome::{CallResult, Outcome, Phase, ResultCode};

use summon_core::Value;

use crate::error::EngineError;

/// Behavior of a component type.
///
/// Only [`contract`](Component::contract) and [`function`](Component::function)
/// are mandatory. The call protocol drives the rest:
///
/// 1. `before_function`, `function`, then `after_function` on success.
/// 2. `did_function_succeed` decides between success and failure.
/// 3. On failure with rollback enabled, `rollback` then `did_rollback_succeed`.
/// 4. `validate_next` before each chained component.
/// 5. `teardown` on every exit path.
pub trait Component: Send + Sync {
    /// Declarations of the type. Read once, when an instance is built.
    fn contract(&self) -> Contract;

    /// The primary operation.
    ///
    /// # Errors
    ///
    /// Any error marks the call as failed.
    fn function(&self, call: &Invocation<'_>) -> Result<Value, EngineError>;

    /// Compensates for a failed `function`.
    ///
    /// # Errors
    ///
    /// An error marks the rollback as failed.
    fn rollback(&self, _call: &Invocation<'_>) -> Result<Value, EngineError> {
        Ok(Value::Null)
    }

    fn did_function_succeed(&self, call: &Invocation<'_>) -> bool {
        call.function_succeeded()
    }

    fn did_rollback_succeed(&self, call: &Invocation<'_>) -> bool {
        call.rollback_succeeded()
    }

    /// # Errors
    ///
    /// An error aborts the call before `function` runs.
    fn before_function(&self, _call: &Invocation<'_>) -> Result<(), EngineError> {
        Ok(())
    }

    /// # Errors
    ///
    /// An error is returned from the call as is.
    fn after_function(&self, _call: &Invocation<'_>) -> Result<(), EngineError> {
        Ok(())
    }

    /// Returning `false` aborts the chain with [`EngineError::InvalidChain`].
    fn validate_next(&self, _call: &Invocation<'_>, _next: &str) -> bool {
        true
    }

    fn teardown(&self, _call: &Invocation<'_>) {}
}
