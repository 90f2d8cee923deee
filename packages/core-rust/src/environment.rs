//! Environment variable lookup.

use std::collections::HashMap;

use crate::traits::Environment;

/// Reads the real process environment via `std::env`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed in-memory environment for deterministic tests and sandboxed runs.
#[derive(Debug, Clone, Default)]
pub struct MapEnvironment {
    vars: HashMap<String, String>,
}

impl MapEnvironment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl Environment for MapEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn lookup_falls_back_to_upper_case() {
        let env = MapEnvironment::new().with("REPO_URL", "https://example.invalid");
        assert_eq!(
            env.lookup("repo_url"),
            Some(Value::from("https://example.invalid"))
        );
    }

    #[test]
    fn exact_name_wins_over_upper_case() {
        let env = MapEnvironment::new()
            .with("count", "1")
            .with("COUNT", "2");
        assert_eq!(env.lookup("count"), Some(Value::Int(1)));
    }

    #[test]
    fn missing_variable_is_none() {
        assert_eq!(MapEnvironment::new().lookup("nothing_here"), None);
    }
}
