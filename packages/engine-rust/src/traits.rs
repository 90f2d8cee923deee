//! Pluggable collaborators used by the error-resolution strategies.

use std::fmt;
use std::process::Command;

use anyhow::Context as _;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::executor::ExecutorConfig;
use crate::registry::{ComponentRegistry, ModuleLoader};

/// A package to install and where to put what it provides.
#[derive(Debug)]
pub struct InstallRequest<'a> {
    pub package: &'a str,
    pub registry: &'a ComponentRegistry,
    pub settings: &'a ExecutorConfig,
}

/// Installs packages that provide missing components or programs.
///
/// Implementations:
/// - `LocalRepository`: in-process package bundles (tests, embedded use)
/// - `CommandInstaller`: shells out to an external package manager
pub trait PackageInstaller: Send + Sync {
    /// Returns `true` if the package was installed and a retry might now
    /// succeed.
    ///
    /// # Errors
    ///
    /// Returns an error if installation was attempted and failed.
    fn install(&self, request: &InstallRequest<'_>) -> anyhow::Result<bool>;
}

// ---------------------------------------------------------------------------
// LocalRepository
// ---------------------------------------------------------------------------

/// Package repository whose packages are module loaders held in memory.
/// Installing a package provides its module to the registry and imports it.
#[derive(Default)]
pub struct LocalRepository {
    packages: DashMap<String, ModuleLoader>,
}

impl LocalRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_package<F>(self, name: impl Into<String>, loader: F) -> Self
    where
        F: Fn(&ComponentRegistry) + Send + Sync + 'static,
    {
        self.packages.insert(name.into(), std::sync::Arc::new(loader));
        self
    }
}

impl PackageInstaller for LocalRepository {
    fn install(&self, request: &InstallRequest<'_>) -> anyhow::Result<bool> {
        let Some(loader) = self.packages.get(request.package).map(|e| e.value().clone()) else {
            debug!(package = request.package, "not in repository");
            return Ok(false);
        };
        request
            .registry
            .provide_module(request.package, move |registry| loader(registry));
        let imported = request.registry.import(request.package)?;
        info!(package = request.package, "installed from repository");
        Ok(imported)
    }
}

impl fmt::Debug for LocalRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.packages.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("LocalRepository").field("packages", &names).finish()
    }
}

// ---------------------------------------------------------------------------
// CommandInstaller
// ---------------------------------------------------------------------------

/// Runs an external command to install a package.
///
/// Arguments may contain `{package}`, `{repo_url}`, `{repo_store}` and
/// `{repo_username}` placeholders, filled from the request. Repository
/// credentials are passed to the command through the `SUMMON_REPO_USERNAME`
/// and `SUMMON_REPO_PASSWORD` environment variables, never on its command
/// line.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
}

impl CommandInstaller {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Arguments with placeholders filled in for `request`.
    #[must_use]
    pub fn render_args(&self, request: &InstallRequest<'_>) -> Vec<String> {
        let url = request.settings.repo_url.as_deref().unwrap_or_default();
        let store = request.settings.repo_store.as_deref().unwrap_or_default();
        let username = request.settings.repo_username.as_deref().unwrap_or_default();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{package}", request.package)
                    .replace("{repo_url}", url)
                    .replace("{repo_store}", store)
                    .replace("{repo_username}", username)
            })
            .collect()
    }

    /// Environment variables carrying the configured repository credentials.
    #[must_use]
    pub fn credential_env(request: &InstallRequest<'_>) -> Vec<(&'static str, String)> {
        [
            ("SUMMON_REPO_USERNAME", &request.settings.repo_username),
            ("SUMMON_REPO_PASSWORD", &request.settings.repo_password),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.clone().map(|v| (key, v)))
        .collect()
    }
}

impl PackageInstaller for CommandInstaller {
    fn install(&self, request: &InstallRequest<'_>) -> anyhow::Result<bool> {
        let args = self.render_args(request);
        info!(program = %self.program, ?args, "installing package");
        let status = Command::new(&self.program)
            .args(&args)
            .envs(Self::credential_env(request))
            .status()
            .with_context(|| format!("failed to run {}", self.program))?;
        Ok(status.success())
    }
}
