//! Summon Engine: component call protocol, registry, executor, and error
//! resolution.

pub mod component;
pub mod context;
pub mod error;
pub mod executor;
pub mod logging;
pub mod registry;
pub mod resolution;
pub mod tracker;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use component::{
    CallArgs, CallResult, Component, ComponentInstance, Contract, Features, Invocation, Kind,
    KindBuilder, Method, Outcome, Phase, ResultCode,
};
pub use context::Context;
pub use error::EngineError;
pub use executor::{Executor, ExecutorArgs, ExecutorBuilder, ExecutorConfig, Target, WeakExecutor};
pub use logging::{init_logging, LogFormat};
pub use registry::ComponentRegistry;
pub use resolution::{ResolutionContext, ResolutionPipeline, ResolutionStrategy};
pub use tracker::{CallTracker, TrackGuard};
pub use traits::{CommandInstaller, InstallRequest, LocalRepository, PackageInstaller};

pub use summon_core::{
    ConfigSource, Environment, FetchObserver, JsonConfig, MapConfig, MapEnvironment, Namespace,
    SourceKey, SourceOrder, Value,
};
