//! Summon Core: dynamic values, multi-source Fetch, and global bindings.

pub mod config;
pub mod environment;
pub mod fetch;
pub mod globals;
pub mod namespace;
pub mod traits;
pub mod types;

pub use config::{ConfigError, JsonConfig, MapConfig};
pub use environment::{MapEnvironment, ProcessEnvironment};
pub use fetch::{fetch, fetch_nested, try_fetch, FetchId, Fetchable, Search, SourceKey, SourceOrder};
pub use globals::{GlobalEntry, GlobalTable};
pub use namespace::Namespace;
pub use traits::{ConfigSource, Environment, FetchObserver};
pub use types::Value;
