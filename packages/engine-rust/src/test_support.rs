//! Fixture components shared by the unit tests.

use std::sync::Arc;

use summon_core::{MapEnvironment, Value};

use crate::component::{Component, Contract, Invocation, Kind, Method};
use crate::error::EngineError;
use crate::executor::Executor;
use crate::registry::ComponentRegistry;

/// `Hello` method: "<component> says hello to <args[0]>". Propagates to
/// successors, which then greet under their own name.
pub(crate) fn hello_method() -> Method {
    Method::new("Hello", |call, args| {
        let target = args.first().cloned().unwrap_or(Value::Null);
        Ok(Value::from(format!("{} says hello to {target}", call.name())))
    })
    .propagating()
}

/// Greets `say_hi_to`, which defaults to "you" and is also the first
/// positional slot.
pub(crate) struct Hello;

impl Component for Hello {
    fn contract(&self) -> Contract {
        Contract::new()
            .optional("say_hi_to", "you")
            .map_arg("say_hi_to")
            .method(hello_method())
    }

    fn function(&self, call: &Invocation<'_>) -> Result<Value, EngineError> {
        call.call_method("Hello", &[call.arg("say_hi_to")])
    }
}

/// Does nothing itself but hands its `Hello` method down the chain.
pub(crate) fn friendly() -> Kind {
    Kind::builder("Friendly")
        .method(hello_method())
        .function(|_| Ok(Value::Null))
}

/// Needs a `Hello` method it does not have.
pub(crate) fn enemy() -> Kind {
    Kind::builder("Enemy")
        .required("enemy")
        .requires_method("Hello")
        .function(|call| {
            let enemy = call.arg("enemy");
            call.call_method("Hello", &[Value::from(format!("its {enemy} Enemy"))])
        })
}

pub(crate) fn standard_registry() -> ComponentRegistry {
    let registry = ComponentRegistry::new();
    registry.register("Hello", || Box::new(Hello));
    registry.register_kind(friendly());
    registry.register_kind(enemy());
    registry
}

/// Executor over `registry` that reads `environment` instead of the process
/// environment.
pub(crate) fn executor_with(registry: ComponentRegistry, environment: MapEnvironment) -> Executor {
    Executor::builder()
        .registry(registry)
        .environment(Arc::new(environment))
        .build()
}
