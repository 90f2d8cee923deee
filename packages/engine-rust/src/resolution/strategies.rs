//! Built-in resolution strategies.
//!
//! Each one recognizes a family of errors by typed variant and, for opaque
//! [`EngineError::Internal`] errors, by message patterns.

use tracing::debug;

use super::{ResolutionContext, ResolutionStrategy, SubjectPattern};
use crate::error::EngineError;
use crate::traits::{InstallRequest, PackageInstaller};

fn internal_subject(patterns: &[SubjectPattern], error: &EngineError) -> Option<String> {
    let EngineError::Internal(err) = error else {
        return None;
    };
    let message = err.to_string();
    patterns.iter().find_map(|p| p.extract(&message))
}

const UNDEFINED_NAME_EXAMPLES: [&str; 2] = [
    "name 'SUBJECT' is not defined",
    "global name 'SUBJECT' is not defined",
];

fn undefined_name(patterns: &[SubjectPattern], error: &EngineError) -> Option<String> {
    match error {
        EngineError::UndefinedName { name } => Some(name.clone()),
        other => internal_subject(patterns, other),
    }
}

// ---------------------------------------------------------------------------
// ResolveByFetch
// ---------------------------------------------------------------------------

/// Binds an undefined name to whatever the executor's Fetch finds for it.
///
/// The binding is marked as fetched, so it is recomputed when the config
/// context switches.
#[derive(Debug, Clone)]
pub struct ResolveByFetch {
    patterns: Vec<SubjectPattern>,
}

impl ResolveByFetch {
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: SubjectPattern::all(&UNDEFINED_NAME_EXAMPLES),
        }
    }
}

impl Default for ResolveByFetch {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionStrategy for ResolveByFetch {
    fn name(&self) -> &str {
        "resolve_by_fetch"
    }

    fn subject(&self, error: &EngineError) -> Option<String> {
        undefined_name(&self.patterns, error)
    }

    fn resolve(&self, subject: &str, ctx: &ResolutionContext<'_>) -> anyhow::Result<bool> {
        let Some(value) = ctx.executor.lookup_for_global(subject) else {
            return Ok(false);
        };
        debug!(name = subject, %value, "bound global from fetch");
        ctx.executor.context().globals.set(subject, value, true);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// FindInCallStack
// ---------------------------------------------------------------------------

/// Binds an undefined name to an attribute of a component further up the
/// call stack, most recent first.
#[derive(Debug, Clone)]
pub struct FindInCallStack {
    patterns: Vec<SubjectPattern>,
}

impl FindInCallStack {
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: SubjectPattern::all(&UNDEFINED_NAME_EXAMPLES),
        }
    }
}

impl Default for FindInCallStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionStrategy for FindInCallStack {
    fn name(&self) -> &str {
        "find_in_call_stack"
    }

    fn subject(&self, error: &EngineError) -> Option<String> {
        undefined_name(&self.patterns, error)
    }

    fn resolve(&self, subject: &str, ctx: &ResolutionContext<'_>) -> anyhow::Result<bool> {
        let context = ctx.executor.context();
        let found = context
            .tracker
            .stack()
            .into_iter()
            .find_map(|frame| frame.attribute(subject).map(|value| (frame, value)));
        let Some((frame, value)) = found else {
            return Ok(false);
        };
        debug!(name = subject, component = %frame.name(), "bound global from call stack");
        context.globals.set(subject, value, false);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// ImportModule
// ---------------------------------------------------------------------------

/// Imports the registry module that provides a missing name.
#[derive(Debug, Clone)]
pub struct ImportModule {
    patterns: Vec<SubjectPattern>,
}

impl ImportModule {
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: SubjectPattern::all(&["No module named 'SUBJECT'", "no module named 'SUBJECT'"]),
        }
    }
}

impl Default for ImportModule {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionStrategy for ImportModule {
    fn name(&self) -> &str {
        "import_module"
    }

    fn subject(&self, error: &EngineError) -> Option<String> {
        match error {
            EngineError::MissingModule { name } => Some(name.clone()),
            // The subject is settled at resolve time against the registry.
            EngineError::RegistryLookupFailed { name, namespace } => Some(match namespace {
                Some(ns) => ns.qualify(name),
                None => name.clone(),
            }),
            other => internal_subject(&self.patterns, other),
        }
    }

    fn resolve(&self, subject: &str, ctx: &ResolutionContext<'_>) -> anyhow::Result<bool> {
        let registry = ctx.executor.registry();
        let module = match ctx.error {
            EngineError::RegistryLookupFailed { name, namespace } => {
                registry.module_for(name, namespace.as_ref())
            }
            _ => registry.has_module(subject).then(|| subject.to_string()),
        };
        let Some(module) = module else {
            return Ok(false);
        };
        Ok(registry.import(&module)?)
    }
}

// ---------------------------------------------------------------------------
// Installers
// ---------------------------------------------------------------------------

/// Installs the package named after a missing component from the
/// executor's repository.
///
/// The package name is `package_prefix` + namespace prefix + component name.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallFromRepository;

impl ResolutionStrategy for InstallFromRepository {
    fn name(&self) -> &str {
        "install_from_repository"
    }

    fn subject(&self, error: &EngineError) -> Option<String> {
        match error {
            EngineError::RegistryLookupFailed { name, namespace } => {
                let prefix = namespace.as_ref().map(|ns| ns.to_prefix()).unwrap_or_default();
                Some(format!("{prefix}{name}"))
            }
            _ => None,
        }
    }

    fn resolve(&self, subject: &str, ctx: &ResolutionContext<'_>) -> anyhow::Result<bool> {
        if ctx.settings.no_repo {
            debug!(package = subject, "repository installs disabled");
            return Ok(false);
        }
        let Some(repository) = ctx.executor.repository() else {
            return Ok(false);
        };
        let package = format!("{}{subject}", ctx.settings.package_prefix);
        install(&*repository, &package, ctx)
    }
}

/// Installs a missing package or program through the executor's package
/// manager.
#[derive(Debug, Clone)]
pub struct InstallWithPackageManager {
    patterns: Vec<SubjectPattern>,
}

impl InstallWithPackageManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: SubjectPattern::all(&[
                "No package named 'SUBJECT'",
                "SUBJECT: command not found",
            ]),
        }
    }
}

impl Default for InstallWithPackageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionStrategy for InstallWithPackageManager {
    fn name(&self) -> &str {
        "install_with_package_manager"
    }

    fn subject(&self, error: &EngineError) -> Option<String> {
        match error {
            EngineError::MissingPackage { name } | EngineError::MissingProgram { name } => {
                Some(name.clone())
            }
            other => internal_subject(&self.patterns, other),
        }
    }

    fn resolve(&self, subject: &str, ctx: &ResolutionContext<'_>) -> anyhow::Result<bool> {
        let Some(manager) = ctx.executor.package_manager() else {
            return Ok(false);
        };
        install(&*manager, subject, ctx)
    }
}

fn install(
    installer: &dyn PackageInstaller,
    package: &str,
    ctx: &ResolutionContext<'_>,
) -> anyhow::Result<bool> {
    let registry = ctx.executor.registry();
    let request = InstallRequest {
        package,
        registry: &registry,
        settings: ctx.settings,
    };
    installer.install(&request)
}
