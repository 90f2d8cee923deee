//! Error-resolution pipeline.
//!
//! Wraps an operation and, when it fails with a recoverable error, asks
//! strategies in priority order to fix the cause before retrying:
//!
//! 1. Terminal errors and disabled resolution propagate unchanged.
//! 2. The error's signature gets an entry in the resolution stack and the
//!    depth counter goes up. Depth beyond `signatures + 1` or beyond
//!    `max_resolution_depth` means the episode is looping: give up.
//! 3. Each strategy not yet attempted for this signature is marked, asked
//!    for a subject, and asked to resolve it. On `true` the operation is
//!    retried. Success clears the signature. The same signature again moves
//!    on to the next strategy. A different signature recurses.
//! 4. Running out of strategies raises [`EngineError::ResolutionExhausted`].
//!
//! The stack is cleared when the outermost episode unwinds.

pub mod pattern;
pub mod strategies;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

pub use pattern::SubjectPattern;
pub use strategies::{
    FindInCallStack, ImportModule, InstallFromRepository, InstallWithPackageManager,
    ResolveByFetch,
};

use crate::error::EngineError;
use crate::executor::{Executor, ExecutorConfig};

// ---------------------------------------------------------------------------
// ResolutionStrategy
// ---------------------------------------------------------------------------

/// What a strategy gets to look at while resolving.
pub struct ResolutionContext<'a> {
    pub executor: &'a Executor,
    pub error: &'a EngineError,
    pub settings: &'a ExecutorConfig,
}

/// One way of fixing a failure.
pub trait ResolutionStrategy: Send + Sync {
    /// Name used in settings and in the resolution stack.
    fn name(&self) -> &str;

    /// The thing to fix (a name, module, package, ...) if this strategy
    /// applies to `error` at all.
    fn subject(&self, error: &EngineError) -> Option<String>;

    /// Attempts a fix. `true` means a retry might now succeed.
    ///
    /// # Errors
    ///
    /// Errors are logged and treated as `false`.
    fn resolve(&self, subject: &str, ctx: &ResolutionContext<'_>) -> anyhow::Result<bool>;
}

// ---------------------------------------------------------------------------
// ResolutionPipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ResolutionStack {
    /// Signature -> strategies already attempted for it, in order.
    attempts: BTreeMap<String, Vec<String>>,
    depth: usize,
}

/// Strategy set plus the per-executor resolution stack.
pub struct ResolutionPipeline {
    strategies: BTreeMap<String, Arc<dyn ResolutionStrategy>>,
    stack: Mutex<ResolutionStack>,
}

impl ResolutionPipeline {
    /// A pipeline with no strategies.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: BTreeMap::new(),
            stack: Mutex::new(ResolutionStack::default()),
        }
    }

    /// A pipeline with the five built-in strategies.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut pipeline = Self::new();
        pipeline.add(Arc::new(ResolveByFetch::new()));
        pipeline.add(Arc::new(FindInCallStack::new()));
        pipeline.add(Arc::new(ImportModule::new()));
        pipeline.add(Arc::new(InstallFromRepository));
        pipeline.add(Arc::new(InstallWithPackageManager::new()));
        pipeline
    }

    /// Adds or replaces a strategy under its name. Whether and when it runs
    /// is decided by `resolve_errors_with`.
    pub fn add(&mut self, strategy: Arc<dyn ResolutionStrategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.strategies.keys().cloned().collect()
    }

    /// Current nesting depth; zero outside an episode.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.lock().depth
    }

    /// Snapshot of the resolution stack.
    #[must_use]
    pub fn attempts(&self) -> Vec<(String, Vec<String>)> {
        self.stack
            .lock()
            .attempts
            .iter()
            .map(|(sig, names)| (sig.clone(), names.clone()))
            .collect()
    }

    /// Runs `op`, resolving and retrying on recoverable failures.
    ///
    /// # Errors
    ///
    /// Returns terminal errors unchanged, the original error when resolution
    /// is disabled, and [`EngineError::ResolutionExhausted`] when no strategy
    /// fixes the failure.
    pub fn run<T, F>(&self, executor: &Executor, mut op: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Result<T, EngineError>,
    {
        match op() {
            Ok(value) => Ok(value),
            Err(err) => self.resolve(executor, err, &mut op),
        }
    }

    fn resolve<T, F>(&self, executor: &Executor, error: EngineError, op: &mut F) -> Result<T, EngineError>
    where
        F: FnMut() -> Result<T, EngineError>,
    {
        if !error.is_recoverable() {
            return Err(error);
        }
        let settings = executor.settings();
        if !settings.resolve_errors {
            return Err(error);
        }

        let signature = error.signature();
        let (_depth_guard, depth, signatures) = self.enter(&signature);
        debug!(%signature, depth, signatures, "resolving");
        if depth > signatures + 1 || depth > settings.max_resolution_depth {
            warn!(%signature, depth, "resolution is looping; giving up");
            return Err(self.exhausted(signature, error));
        }

        let ctx = ResolutionContext {
            executor,
            error: &error,
            settings: &settings,
        };
        for name in &settings.resolve_errors_with {
            let Some(strategy) = self.strategies.get(name) else {
                warn!(strategy = %name, "unknown resolution strategy");
                continue;
            };
            if !self.mark_attempt(&signature, name) {
                continue;
            }
            let Some(subject) = strategy.subject(&error) else {
                continue;
            };
            let might_be_resolved = match strategy.resolve(&subject, &ctx) {
                Ok(resolved) => resolved,
                Err(err) => {
                    warn!(strategy = %name, %subject, error = %err, "strategy failed");
                    false
                }
            };
            if !might_be_resolved {
                continue;
            }

            debug!(strategy = %name, %subject, "retrying");
            match op() {
                Ok(value) => {
                    info!(%signature, strategy = %name, "resolved");
                    self.stack.lock().attempts.remove(&signature);
                    return Ok(value);
                }
                Err(next) if next.signature() == signature => {
                    debug!(strategy = %name, "same error after retry");
                }
                Err(next) => return self.resolve(executor, next, op),
            }
        }

        Err(self.exhausted(signature, error))
    }

    fn enter(&self, signature: &str) -> (DepthGuard<'_>, usize, usize) {
        let mut stack = self.stack.lock();
        stack.attempts.entry(signature.to_string()).or_default();
        stack.depth += 1;
        let counts = (stack.depth, stack.attempts.len());
        drop(stack);
        (DepthGuard { stack: &self.stack }, counts.0, counts.1)
    }

    /// Records `strategy` against `signature`. Returns `false` if it was
    /// already attempted.
    fn mark_attempt(&self, signature: &str, strategy: &str) -> bool {
        let mut stack = self.stack.lock();
        let attempted = stack.attempts.entry(signature.to_string()).or_default();
        if attempted.iter().any(|s| s == strategy) {
            return false;
        }
        attempted.push(strategy.to_string());
        true
    }

    fn exhausted(&self, signature: String, cause: EngineError) -> EngineError {
        EngineError::ResolutionExhausted {
            signature,
            attempts: self.attempts(),
            cause: Box::new(cause),
        }
    }
}

impl Default for ResolutionPipeline {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ResolutionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionPipeline")
            .field("strategies", &self.names())
            .field("stack", &*self.stack.lock())
            .finish()
    }
}

/// Decrements the depth on drop; the outermost exit clears the stack.
struct DepthGuard<'a> {
    stack: &'a Mutex<ResolutionStack>,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        let mut stack = self.stack.lock();
        stack.depth = stack.depth.saturating_sub(1);
        if stack.depth == 0 {
            stack.attempts.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
