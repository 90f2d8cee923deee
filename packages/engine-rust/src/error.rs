//! Engine error taxonomy.
//!
//! The `Display` string of an [`EngineError`] doubles as its resolution
//! signature: two errors with the same string are treated as the same
//! problem by the error-resolution pipeline.

use summon_core::{ConfigError, Namespace, Value};

/// Every failure the engine can surface.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{component} could not fetch required argument '{name}'")]
    MissingArgument { component: String, name: String },

    #[error("{component} got {given} positional arguments but accepts at most {accepted}")]
    TooManyArguments {
        component: String,
        given: usize,
        accepted: usize,
    },

    #[error("{component} has no method: {method}")]
    MissingCapability { component: String, method: String },

    #[error("{component} cannot chain to '{next}': {reason}")]
    InvalidChain {
        component: String,
        next: String,
        reason: String,
    },

    #[error("failed to resolve '{signature}' (attempted: {})", format_attempts(.attempts))]
    ResolutionExhausted {
        signature: String,
        /// Every signature seen during the episode with the strategies tried for it.
        attempts: Vec<(String, Vec<String>)>,
        #[source]
        cause: Box<EngineError>,
    },

    #[error("{component} failed and rollback failed; system state unknown")]
    RollbackFailed { component: String, returned: Value },

    #[error("{component} failed with result code {code}")]
    ComponentFailed {
        component: String,
        code: u8,
        returned: Value,
    },

    #[error("no component named '{name}'{}", in_namespace(.namespace.as_ref()))]
    RegistryLookupFailed {
        name: String,
        namespace: Option<Namespace>,
    },

    #[error("name '{name}' is not defined")]
    UndefinedName { name: String },

    #[error("no module named '{name}'")]
    MissingModule { name: String },

    #[error("missing package '{name}'")]
    MissingPackage { name: String },

    #[error("required program '{name}' not found")]
    MissingProgram { name: String },

    #[error("{component} has no executor")]
    NoExecutor { component: String },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Normalized string form used as the resolution-stack key.
    #[must_use]
    pub fn signature(&self) -> String {
        self.to_string()
    }

    /// Whether the error-resolution pipeline may try to fix this error.
    ///
    /// Contract violations and terminal failures propagate directly.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MissingArgument { .. }
                | Self::RegistryLookupFailed { .. }
                | Self::UndefinedName { .. }
                | Self::MissingModule { .. }
                | Self::MissingPackage { .. }
                | Self::MissingProgram { .. }
                | Self::Internal(_)
        )
    }

    /// Unwraps [`EngineError::ResolutionExhausted`] down to the error that
    /// started the episode.
    #[must_use]
    pub fn root_cause(&self) -> &EngineError {
        match self {
            Self::ResolutionExhausted { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

fn format_attempts(attempts: &[(String, Vec<String>)]) -> String {
    attempts
        .iter()
        .map(|(signature, strategies)| format!("{signature} -> [{}]", strategies.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

fn in_namespace(namespace: Option<&Namespace>) -> String {
    match namespace {
        Some(ns) if !ns.is_root() => format!(" in {ns}"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_display() {
        let err = EngineError::UndefinedName { name: "x".into() };
        assert_eq!(err.signature(), "name 'x' is not defined");
    }

    #[test]
    fn registry_lookup_mentions_namespace() {
        let err = EngineError::RegistryLookupFailed {
            name: "Hello".into(),
            namespace: Some(Namespace::from("a:b")),
        };
        assert_eq!(err.to_string(), "no component named 'Hello' in ::a:b:");

        let bare = EngineError::RegistryLookupFailed {
            name: "Hello".into(),
            namespace: None,
        };
        assert_eq!(bare.to_string(), "no component named 'Hello'");
    }

    #[test]
    fn terminal_errors_are_not_recoverable() {
        let exhausted = EngineError::ResolutionExhausted {
            signature: "s".into(),
            attempts: vec![("s".into(), vec!["a".into(), "b".into()])],
            cause: Box::new(EngineError::UndefinedName { name: "x".into() }),
        };
        assert!(!exhausted.is_recoverable());
        assert!(exhausted.to_string().contains("s -> [a, b]"));
        assert!(matches!(exhausted.root_cause(), EngineError::UndefinedName { .. }));

        let rollback = EngineError::RollbackFailed {
            component: "c".into(),
            returned: Value::Null,
        };
        assert!(!rollback.is_recoverable());
        assert!(EngineError::UndefinedName { name: "x".into() }.is_recoverable());
    }

    #[test]
    fn internal_errors_keep_their_message() {
        let err = EngineError::from(anyhow::anyhow!("name 'y' is not defined"));
        assert_eq!(err.signature(), "name 'y' is not defined");
    }
}
