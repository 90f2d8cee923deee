//! Configuration sources for the `config` Fetch source.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::traits::ConfigSource;
use crate::types::Value;

/// Errors from loading a configuration document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config root must be an object, found {found}")]
    NotAnObject { found: &'static str },
}

/// In-memory key/value configuration.
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    entries: BTreeMap<String, Value>,
}

impl MapConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }
}

impl ConfigSource for MapConfig {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }
}

/// Configuration backed by a JSON object document.
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    root: BTreeMap<String, Value>,
}

impl JsonConfig {
    /// Parses a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::NotAnObject`] when the document root is not an object.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Self::from_json(json)
    }

    /// Reads and parses a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
    /// errors of [`JsonConfig::parse`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Wraps an already-parsed JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotAnObject`] when `json` is not an object.
    pub fn from_json(json: serde_json::Value) -> Result<Self, ConfigError> {
        match Value::from(json) {
            Value::Map(root) => Ok(Self { root }),
            other => Err(ConfigError::NotAnObject {
                found: kind_name(&other),
            }),
        }
    }

    /// Returns the nested object stored under `key` as its own config.
    #[must_use]
    pub fn section(&self, key: &str) -> Option<JsonConfig> {
        match self.root.get(key) {
            Some(Value::Map(entries)) => Some(Self {
                root: entries.clone(),
            }),
            _ => None,
        }
    }
}

impl ConfigSource for JsonConfig {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.root.get(key).cloned()
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int(_) | Value::Float(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Map(_) => "object",
    }
}
