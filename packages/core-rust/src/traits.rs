use crate::fetch::SourceKey;
use crate::types::Value;

/// Structured configuration backing the `config` Fetch source.
/// Implementations: JSON documents ([`JsonConfig`](crate::JsonConfig)), plain maps.
pub trait ConfigSource: Send + Sync {
    /// Looks up a top-level key.
    fn get_value(&self, key: &str) -> Option<Value>;
}

/// Process environment lookup backing the `environment` Fetch source.
pub trait Environment: Send + Sync {
    /// Returns the raw variable bound to exactly `name`.
    fn var(&self, name: &str) -> Option<String>;

    /// Tries `name`, then its upper-cased form. Values are interpreted with
    /// [`Value::evaluate`].
    fn lookup(&self, name: &str) -> Option<Value> {
        self.var(name)
            .or_else(|| {
                let upper = name.to_uppercase();
                if upper == name {
                    None
                } else {
                    self.var(&upper)
                }
            })
            .map(|raw| Value::evaluate(&raw))
    }
}

/// Observability hook called when a root Fetch finds a value.
///
/// Must not influence the resolution outcome.
pub trait FetchObserver: Send + Sync {
    fn on_fetch(&self, name: &str, location: &SourceKey, value: &Value);
}

impl<F> FetchObserver for F
where
    F: Fn(&str, &SourceKey, &Value) + Send + Sync,
{
    fn on_fetch(&self, name: &str, location: &SourceKey, value: &Value) {
        self(name, location, value);
    }
}
