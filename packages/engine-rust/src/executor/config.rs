//! Executor command-line arguments and resolved settings.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use summon_core::Value;
use tracing::warn;

use crate::logging::LogFormat;

/// Names of the built-in resolution strategies, in default priority order.
pub const DEFAULT_STRATEGIES: [&str; 5] = [
    "resolve_by_fetch",
    "find_in_call_stack",
    "import_module",
    "install_from_repository",
    "install_with_package_manager",
];

// ---------------------------------------------------------------------------
// ExecutorArgs
// ---------------------------------------------------------------------------

/// Command-line arguments understood by every executor.
///
/// Anything after `--` is read as `--key value` pairs and handed to the
/// executor as call-time arguments.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "summon", about = "Run components by name")]
pub struct ExecutorArgs {
    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Decrease log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,

    /// Never install missing components from a repository
    #[arg(long)]
    pub no_repo: bool,

    /// Directory downloaded packages are stored in
    #[arg(long, env = "SUMMON_REPO_STORE")]
    pub repo_store: Option<String>,

    /// Base URL of the package repository
    #[arg(long, env = "SUMMON_REPO_URL")]
    pub repo_url: Option<String>,

    #[arg(long, env = "SUMMON_REPO_USERNAME")]
    pub repo_username: Option<String>,

    #[arg(long, env = "SUMMON_REPO_PASSWORD", hide_env_values = true)]
    pub repo_password: Option<String>,

    /// JSON config file
    #[arg(short, long, env = "SUMMON_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Extra `--key value` arguments
    #[arg(last = true)]
    pub extra: Vec<String>,
}

impl ExecutorArgs {
    /// Arguments exposed through the executor's `arguments` source.
    #[must_use]
    pub fn arguments(&self) -> BTreeMap<String, Value> {
        let mut args = BTreeMap::new();
        args.insert("verbose".to_string(), Value::Int(i64::from(self.verbose)));
        if self.no_repo {
            args.insert("no_repo".to_string(), Value::Bool(true));
        }
        let optional = [
            ("repo_store", &self.repo_store),
            ("repo_url", &self.repo_url),
            ("repo_username", &self.repo_username),
            ("repo_password", &self.repo_password),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                args.insert(name.to_string(), Value::from(value.as_str()));
            }
        }
        args.extend(parse_extra(&self.extra));
        args
    }
}

/// Reads `--key value`, `--key=value` and bare `--flag` tokens.
///
/// Values are interpreted with [`Value::evaluate`]. A flag with no value is
/// `true`. Stray positional tokens are ignored.
#[must_use]
pub fn parse_extra(tokens: &[String]) -> BTreeMap<String, Value> {
    let mut parsed = BTreeMap::new();
    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        let Some(key) = token.strip_prefix("--").or_else(|| token.strip_prefix('-')) else {
            warn!(token = %token, "ignoring extra argument without a key");
            continue;
        };
        if let Some((key, value)) = key.split_once('=') {
            parsed.insert(key.to_string(), Value::evaluate(value));
            continue;
        }
        let value = match iter.peek() {
            Some(next) if !next.starts_with('-') => {
                let value = Value::evaluate(next);
                iter.next();
                value
            }
            _ => Value::Bool(true),
        };
        parsed.insert(key.to_string(), value);
    }
    parsed
}

// ---------------------------------------------------------------------------
// ExecutorConfig
// ---------------------------------------------------------------------------

/// Resolved executor settings.
#[derive(Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Route recoverable errors through the resolution pipeline.
    pub resolve_errors: bool,
    /// Absolute cap on nested resolution attempts.
    pub max_resolution_depth: usize,
    /// Strategy names, in priority order.
    pub resolve_errors_with: Vec<String>,
    pub no_repo: bool,
    pub repo_url: Option<String>,
    pub repo_store: Option<String>,
    pub repo_username: Option<String>,
    pub repo_password: Option<String>,
    /// Prepended to every package name derived from a component name.
    pub package_prefix: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            resolve_errors: true,
            max_resolution_depth: 64,
            resolve_errors_with: DEFAULT_STRATEGIES.iter().map(ToString::to_string).collect(),
            no_repo: false,
            repo_url: None,
            repo_store: None,
            repo_username: None,
            repo_password: None,
            package_prefix: String::new(),
        }
    }
}

impl fmt::Debug for ExecutorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorConfig")
            .field("resolve_errors", &self.resolve_errors)
            .field("max_resolution_depth", &self.max_resolution_depth)
            .field("resolve_errors_with", &self.resolve_errors_with)
            .field("no_repo", &self.no_repo)
            .field("repo_url", &self.repo_url)
            .field("repo_store", &self.repo_store)
            .field("repo_username", &self.repo_username)
            .field("repo_password", &self.repo_password.as_ref().map(|_| "<redacted>"))
            .field("package_prefix", &self.package_prefix)
            .finish()
    }
}

impl ExecutorConfig {
    /// Builds settings from a lookup, keeping the default for every key the
    /// lookup does not provide or provides with the wrong type.
    pub fn load(lookup: impl Fn(&str) -> Option<Value>) -> Self {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| lookup(key).and_then(|v| v.as_bool()).unwrap_or(default);
        let text = |key: &str| lookup(key).and_then(|v| v.as_str().map(str::to_string));

        let resolve_errors_with = lookup("resolve_errors_with")
            .map(|v| v.to_string_list())
            .filter(|names| !names.is_empty())
            .unwrap_or(defaults.resolve_errors_with);

        Self {
            resolve_errors: flag("resolve_errors", defaults.resolve_errors),
            max_resolution_depth: lookup("max_resolution_depth")
                .and_then(|v| v.as_i64())
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.max_resolution_depth),
            resolve_errors_with,
            no_repo: flag("no_repo", defaults.no_repo),
            repo_url: text("repo_url"),
            repo_store: text("repo_store"),
            repo_username: text("repo_username"),
            repo_password: text("repo_password"),
            package_prefix: text("package_prefix").unwrap_or(defaults.package_prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use summon_core::value_map;

    use super::*;

    #[test]
    fn parses_flags_and_extra_pairs() {
        let args = ExecutorArgs::try_parse_from([
            "summon", "-vv", "--no-repo", "--repo-url", "https://repo.example", "--",
            "--count", "5", "--name=World", "--dry-run",
        ])
        .unwrap();
        assert_eq!(args.verbose, 2);

        let parsed = args.arguments();
        assert_eq!(parsed.get("verbose"), Some(&Value::Int(2)));
        assert_eq!(parsed.get("no_repo"), Some(&Value::Bool(true)));
        assert_eq!(parsed.get("repo_url"), Some(&Value::from("https://repo.example")));
        assert_eq!(parsed.get("count"), Some(&Value::Int(5)));
        assert_eq!(parsed.get("name"), Some(&Value::from("World")));
        assert_eq!(parsed.get("dry-run"), Some(&Value::Bool(true)));
    }

    #[test]
    fn parse_extra_skips_stray_tokens() {
        let tokens: Vec<String> = ["stray", "--a", "--b", "None"].iter().map(ToString::to_string).collect();
        let parsed = parse_extra(&tokens);
        assert_eq!(parsed.get("a"), Some(&Value::Bool(true)));
        assert_eq!(parsed.get("b"), Some(&Value::Null));
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn config_defaults() {
        let config = ExecutorConfig::default();
        assert!(config.resolve_errors);
        assert_eq!(config.max_resolution_depth, 64);
        assert_eq!(config.resolve_errors_with.len(), 5);
        assert_eq!(config.resolve_errors_with[0], "resolve_by_fetch");
    }

    #[test]
    fn load_overrides_and_ignores_bad_types() {
        let source = value_map! {
            "resolve_errors" => false,
            "max_resolution_depth" => "not a number",
            "resolve_errors_with" => vec!["import_module"],
            "package_prefix" => "pkg_",
        };
        let config = ExecutorConfig::load(|key| source.get(key).cloned());
        assert!(!config.resolve_errors);
        assert_eq!(config.max_resolution_depth, 64);
        assert_eq!(config.resolve_errors_with, vec!["import_module".to_string()]);
        assert_eq!(config.package_prefix, "pkg_");
        assert!(config.repo_url.is_none());
    }

    #[test]
    fn load_reads_repository_credentials_and_debug_hides_password() {
        let args = ExecutorArgs::try_parse_from([
            "summon", "--repo-username", "deploy", "--repo-password", "s3cret",
        ])
        .unwrap();
        let arguments = args.arguments();
        let config = ExecutorConfig::load(|key| arguments.get(key).cloned());
        assert_eq!(config.repo_username.as_deref(), Some("deploy"));
        assert_eq!(config.repo_password.as_deref(), Some("s3cret"));

        let printed = format!("{config:?}");
        assert!(printed.contains("deploy"));
        assert!(!printed.contains("s3cret"));
    }
}
