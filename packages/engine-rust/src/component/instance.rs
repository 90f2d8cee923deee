//! Live component instances and the call protocol.
//!
//! A call runs `Warming → Validating → Invoking → {Succeeded | RollingBack}
//! → {Chaining | Failed} → Done`. Per-call state is reset on every call
//! unless the instance is waiting on missing arguments (`Incomplete`).
//! Statics and one-time initialization survive across calls.
//!
//! Locks are held only for short reads and writes. No user code, Fetch
//! delegation or nested call runs while the instance's state is locked.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use summon_core::{
    try_fetch, Environment, FetchId, Fetchable, ProcessEnvironment, Search, SourceKey,
    SourceOrder, Value,
};
use tracing::{debug, debug_span, error, warn};

use super::contract::{Contract, Method};
use super::invocation::Invocation;
use super::outcome::{CallResult, Outcome, Phase, ResultCode};
use super::Component;
use crate::error::EngineError;
use crate::executor::{Executor, WeakExecutor};

const STANDARD_SOURCES: [SourceKey; 8] = [
    SourceKey::SELF,
    SourceKey::ARGUMENTS,
    SourceKey::GLOBALS,
    SourceKey::CONFIG,
    SourceKey::PRECURSOR,
    SourceKey::CALLER,
    SourceKey::EXECUTOR,
    SourceKey::ENVIRONMENT,
];

// ---------------------------------------------------------------------------
// CallArgs
// ---------------------------------------------------------------------------

/// Arguments of a single component call.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: BTreeMap<String, Value>,
    pub precursor: Option<Arc<ComponentInstance>>,
    pub executor: Option<Executor>,
}

impl CallArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.insert(name.into(), value.into());
        self
    }

    /// Sets the chain of components to run after this one succeeds.
    #[must_use]
    pub fn next<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chain: Vec<Value> = names.into_iter().map(|n| Value::String(n.into())).collect();
        self.kwarg("next", Value::Array(chain))
    }

    #[must_use]
    pub fn precursor(mut self, precursor: Arc<ComponentInstance>) -> Self {
        self.precursor = Some(precursor);
        self
    }

    #[must_use]
    pub fn executor(mut self, executor: Executor) -> Self {
        self.executor = Some(executor);
        self
    }
}

// ---------------------------------------------------------------------------
// ComponentInstance
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
#[allow(clippy::struct_excessive_bools)]
struct CallState {
    phase: Phase,
    positional: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
    precursor: Option<Weak<ComponentInstance>>,
    caller: Option<Weak<ComponentInstance>>,
    executor: Option<WeakExecutor>,
    next: Vec<String>,
    result: CallResult,
    methods: BTreeMap<String, Method>,
    initialized: bool,
    statics_loaded: bool,
    function_succeeded: bool,
    rollback_succeeded: bool,
}

/// A constructed component: its behavior, its normalized contract and the
/// state of its latest call.
pub struct ComponentInstance {
    id: FetchId,
    name: String,
    behavior: Box<dyn Component>,
    contract: Contract,
    /// The `self` Fetch source.
    attributes: RwLock<BTreeMap<String, Value>>,
    state: Mutex<CallState>,
}

impl ComponentInstance {
    /// Builds an instance of `behavior` named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, behavior: Box<dyn Component>) -> Arc<Self> {
        let name = name.into();
        let mut contract = behavior.contract();
        contract.normalize(&name);
        Arc::new(Self {
            id: FetchId::next(),
            name,
            behavior,
            contract,
            attributes: RwLock::new(BTreeMap::new()),
            state: Mutex::new(CallState::default()),
        })
    }

    #[must_use]
    pub fn id(&self) -> FetchId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    #[must_use]
    pub fn result(&self) -> CallResult {
        self.state.lock().result.clone()
    }

    /// Payload returned by the primary operation of the latest call.
    #[must_use]
    pub fn returned(&self) -> Value {
        self.state.lock().result.returned.clone()
    }

    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        self.phase() == Phase::Incomplete
    }

    /// Reads an attribute held by the instance itself. `name` is always
    /// available and reports the instance's name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.attributes.read().get(name) {
            return Some(value.clone());
        }
        (name == "name").then(|| Value::from(self.name.as_str()))
    }

    /// Stores an attribute. String values are interpreted first, so `"5"`
    /// is stored as `5` and `"true"` as `true`.
    pub fn set(&self, name: &str, value: impl Into<Value>) {
        let value = value.into().normalized();
        self.attributes.write().insert(name.to_string(), value);
    }

    /// Keyword arguments of the latest call, including mapped positionals.
    #[must_use]
    pub fn arguments(&self) -> BTreeMap<String, Value> {
        self.state.lock().kwargs.clone()
    }

    #[must_use]
    pub fn positional(&self) -> Vec<Value> {
        self.state.lock().positional.clone()
    }

    /// Chain resolved for the latest call.
    #[must_use]
    pub fn next(&self) -> Vec<String> {
        self.state.lock().next.clone()
    }

    #[must_use]
    pub fn precursor(&self) -> Option<Arc<ComponentInstance>> {
        self.state.lock().precursor.as_ref().and_then(Weak::upgrade)
    }

    #[must_use]
    pub fn caller(&self) -> Option<Arc<ComponentInstance>> {
        self.state.lock().caller.as_ref().and_then(Weak::upgrade)
    }

    #[must_use]
    pub fn executor(&self) -> Option<Executor> {
        self.state.lock().executor.as_ref().and_then(WeakExecutor::upgrade)
    }

    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.state.lock().methods.contains_key(name)
    }

    pub(crate) fn method(&self, name: &str) -> Option<Method> {
        self.state.lock().methods.get(name).cloned()
    }

    fn methods(&self) -> BTreeMap<String, Method> {
        self.state.lock().methods.clone()
    }

    pub(crate) fn set_function_succeeded(&self, succeeded: bool) {
        self.state.lock().function_succeeded = succeeded;
    }

    pub(crate) fn function_succeeded(&self) -> bool {
        self.state.lock().function_succeeded
    }

    pub(crate) fn set_rollback_succeeded(&self, succeeded: bool) {
        self.state.lock().rollback_succeeded = succeeded;
    }

    pub(crate) fn rollback_succeeded(&self) -> bool {
        self.state.lock().rollback_succeeded
    }

    /// Fetches `name` with the instance's preferred order.
    #[must_use]
    pub fn fetch(&self, name: &str, default: Value) -> Value {
        self.fetch_from(name, default, &self.contract.fetch_order())
    }

    #[must_use]
    pub fn fetch_from(&self, name: &str, default: Value, sources: &SourceOrder) -> Value {
        self.try_fetch(name, sources).unwrap_or(default)
    }

    #[must_use]
    pub fn try_fetch(&self, name: &str, sources: &SourceOrder) -> Option<Value> {
        let observer = self.executor().and_then(|e| e.observer());
        try_fetch(self, name, Some(sources), observer.as_deref())
    }

    // -----------------------------------------------------------------------
    // Call protocol
    // -----------------------------------------------------------------------

    /// Runs the call protocol.
    ///
    /// # Errors
    ///
    /// - [`EngineError::TooManyArguments`], [`EngineError::MissingArgument`],
    ///   [`EngineError::MissingCapability`] or [`EngineError::MissingProgram`]
    ///   when the contract is not met.
    /// - [`EngineError::RollbackFailed`] when both the operation and its
    ///   rollback fail and `raise_exceptions` is on.
    /// - The operation's own error (or [`EngineError::ComponentFailed`]) when
    ///   it fails without rollback and `raise_exceptions` is on.
    /// - [`EngineError::InvalidChain`] when a `next` entry cannot be run.
    pub fn call(self: &Arc<Self>, args: CallArgs) -> Result<Outcome, EngineError> {
        let executor = args.executor.clone().or_else(|| self.executor());
        let context = executor.as_ref().map(Executor::context);
        let caller = context
            .as_ref()
            .and_then(|ctx| ctx.tracker.latest(0))
            .filter(|c| c.id != self.id);
        let _frame = match &context {
            Some(ctx) if self.contract.features.tracked => Some(ctx.tracker.push(self)),
            _ => None,
        };
        let depth = context.as_ref().map_or(0, |ctx| ctx.tracker.count());
        let span = debug_span!("component", component = %self.name, depth);
        let _entered = span.enter();

        self.warm_up(args, executor.as_ref(), caller.as_ref());
        let result = self.run();

        self.behavior.teardown(&Invocation::new(self));
        let mut state = self.state.lock();
        if state.phase != Phase::Incomplete {
            state.phase = Phase::Done;
        }
        debug!(code = %state.result.code, ok = result.is_ok(), "complete");
        result
    }

    fn warm_up(
        &self,
        args: CallArgs,
        executor: Option<&Executor>,
        caller: Option<&Arc<ComponentInstance>>,
    ) {
        let mut state = self.state.lock();
        let resuming = state.phase == Phase::Incomplete;
        if resuming {
            debug!("resuming incomplete call");
            state.positional.extend(args.positional);
            state.kwargs.extend(args.keywords);
        } else {
            state.positional = args.positional;
            state.kwargs = args.keywords;
            state.result = CallResult::default();
            state.next.clear();
        }
        if !resuming || args.precursor.is_some() {
            state.precursor = args.precursor.as_ref().map(Arc::downgrade);
        }
        state.caller = caller.map(Arc::downgrade);
        if let Some(executor) = executor {
            state.executor = Some(executor.downgrade());
        }
        state.function_succeeded = true;
        state.rollback_succeeded = true;
        state.phase = Phase::Warming;
    }

    fn run(self: &Arc<Self>) -> Result<Outcome, EngineError> {
        self.initialize()?;
        self.populate_methods();

        self.set_phase(Phase::Validating);
        self.load_statics()?;
        let missing = self.validate_args()?;
        if !missing.is_empty() {
            debug!(?missing, "awaiting more arguments");
            self.set_phase(Phase::Incomplete);
            return Ok(Outcome::Incomplete(Arc::clone(self)));
        }
        self.populate_next();
        self.validate_methods()?;

        self.invoke()
    }

    fn initialize(&self) -> Result<(), EngineError> {
        if self.state.lock().initialized {
            return Ok(());
        }
        for program in &self.contract.required_programs {
            if which::which(program).is_err() {
                return Err(EngineError::MissingProgram {
                    name: program.clone(),
                });
            }
        }
        self.state.lock().initialized = true;
        debug!("initialized");
        Ok(())
    }

    /// Own methods plus every propagating method of the precursor that is
    /// not overridden here.
    fn populate_methods(&self) {
        let mut table: BTreeMap<String, Method> = self
            .contract
            .methods
            .iter()
            .map(|m| (m.name().to_string(), m.clone()))
            .collect();
        if let Some(precursor) = self.precursor() {
            for (name, method) in precursor.methods() {
                if method.propagates() {
                    table.entry(name).or_insert(method);
                }
            }
        }
        self.state.lock().methods = table;
    }

    fn load_statics(&self) -> Result<(), EngineError> {
        if self.state.lock().statics_loaded {
            return Ok(());
        }
        let order = self.contract.fetch_order();
        for name in &self.contract.statics {
            let value = self
                .try_fetch(name, &order)
                .ok_or_else(|| self.missing_argument(name))?;
            self.set(name, value);
        }
        self.state.lock().statics_loaded = true;
        Ok(())
    }

    /// Maps positionals and resolves required and optional arguments.
    /// Returns the required names still missing (only when partial
    /// application is enabled).
    fn validate_args(&self) -> Result<Vec<String>, EngineError> {
        // Names bound from positionals are taken as given, whatever the
        // fetch order says.
        let mapped: BTreeMap<String, Value> = {
            let mut state = self.state.lock();
            let accepted = self.contract.arg_mapping.len();
            if state.positional.len() > accepted {
                return Err(EngineError::TooManyArguments {
                    component: self.name.clone(),
                    given: state.positional.len(),
                    accepted,
                });
            }
            let mapped: BTreeMap<String, Value> = self
                .contract
                .arg_mapping
                .iter()
                .cloned()
                .zip(state.positional.iter().cloned())
                .collect();
            state
                .kwargs
                .extend(mapped.iter().map(|(k, v)| (k.clone(), v.clone())));
            mapped
        };

        let order = self.contract.fetch_order().without(&[SourceKey::SELF]);
        let resolve = |name: &str| {
            mapped
                .get(name)
                .cloned()
                .or_else(|| self.try_fetch(name, &order))
        };
        let mut missing = Vec::new();
        for name in &self.contract.required {
            match resolve(name) {
                Some(value) => self.set(name, value),
                None if self.contract.features.partial => missing.push(name.clone()),
                None => return Err(self.missing_argument(name)),
            }
        }
        for (name, default) in &self.contract.optional {
            let value = resolve(name).unwrap_or_else(|| default.clone());
            self.set(name, value);
        }
        Ok(missing)
    }

    fn populate_next(&self) {
        let order = self.contract.fetch_order().without(&[
            SourceKey::SELF,
            SourceKey::ENVIRONMENT,
            SourceKey::EXECUTOR,
        ]);
        let next = self
            .try_fetch("next", &order)
            .map(|v| v.to_string_list())
            .unwrap_or_default();
        self.state.lock().next = next;
    }

    fn validate_methods(&self) -> Result<(), EngineError> {
        let state = self.state.lock();
        for method in &self.contract.required_methods {
            if !state.methods.contains_key(method) {
                return Err(EngineError::MissingCapability {
                    component: self.name.clone(),
                    method: method.clone(),
                });
            }
        }
        Ok(())
    }

    fn invoke(self: &Arc<Self>) -> Result<Outcome, EngineError> {
        let features = self.contract.features;
        let call = Invocation::new(self);

        self.set_phase(Phase::Invoking);
        let attempt = self
            .behavior
            .before_function(&call)
            .and_then(|()| self.behavior.function(&call));
        let failure = match attempt {
            Ok(value) => {
                self.state.lock().result.returned = value;
                self.behavior.after_function(&call)?;
                None
            }
            Err(err) => {
                self.set_function_succeeded(false);
                Some(err)
            }
        };

        if failure.is_none() && self.behavior.did_function_succeed(&call) {
            self.record(Phase::Succeeded, ResultCode::Success);
        } else if features.rollback {
            self.set_phase(Phase::RollingBack);
            if let Some(err) = &failure {
                warn!(error = %err, "function failed; rolling back");
            }
            let rolled_back = match self.behavior.rollback(&call) {
                Ok(_) => self.behavior.did_rollback_succeed(&call),
                Err(err) => {
                    warn!(error = %err, "rollback raised");
                    false
                }
            };
            if !rolled_back {
                self.record(Phase::Failed, ResultCode::RollbackFailed);
                let returned = self.returned();
                error!(component = %self.name, "rollback failed; system state unknown");
                if features.raise_exceptions {
                    return Err(EngineError::RollbackFailed {
                        component: self.name.clone(),
                        returned,
                    });
                }
                return Ok(self.wrap(returned));
            }
            self.record(Phase::Succeeded, ResultCode::Recovered);
        } else {
            self.record(Phase::Failed, ResultCode::Failed);
            let returned = self.returned();
            if features.raise_exceptions {
                return Err(failure.unwrap_or_else(|| EngineError::ComponentFailed {
                    component: self.name.clone(),
                    code: ResultCode::Failed.as_u8(),
                    returned,
                }));
            }
            match failure {
                Some(err) => error!(error = %err, "function failed"),
                None => warn!("function reported failure"),
            }
            return Ok(self.wrap(returned));
        }

        let chained = self.call_next(&call)?;
        Ok(self.wrap(chained.unwrap_or_else(|| self.returned())))
    }

    /// Runs the first entry of `next` with this instance as precursor.
    /// Returns the chained value when it is not null.
    fn call_next(self: &Arc<Self>, call: &Invocation<'_>) -> Result<Option<Value>, EngineError> {
        let next = self.next();
        let Some((first, rest)) = next.split_first() else {
            return Ok(None);
        };
        if !self.result().code.allows_chaining() {
            return Ok(None);
        }
        self.set_phase(Phase::Chaining);

        if !self.behavior.validate_next(call, first) {
            return Err(EngineError::InvalidChain {
                component: self.name.clone(),
                next: first.clone(),
                reason: "rejected by validate_next".into(),
            });
        }
        let executor = self.executor().ok_or_else(|| EngineError::NoExecutor {
            component: self.name.clone(),
        })?;

        // Untracked wrappers are transparent: their successor sees their
        // precursor instead.
        let precursor = if self.contract.features.tracked {
            Some(Arc::clone(self))
        } else {
            self.precursor()
        };
        let mut args = CallArgs::new().next(rest.iter().cloned());
        args.precursor = precursor;

        debug!(next = %first, remaining = rest.len(), "chaining");
        match executor.execute(first.as_str(), args) {
            Ok(outcome) => {
                let value = outcome.into_value();
                Ok((!value.is_null()).then_some(value))
            }
            Err(err) => match err.root_cause() {
                EngineError::RegistryLookupFailed { name, .. } if name == first => {
                    Err(EngineError::InvalidChain {
                        component: self.name.clone(),
                        next: first.clone(),
                        reason: err.to_string(),
                    })
                }
                _ => Err(err),
            },
        }
    }

    fn wrap(self: &Arc<Self>, value: Value) -> Outcome {
        if self.contract.features.auto_return {
            Outcome::Instance(Arc::clone(self))
        } else {
            Outcome::Returned(value)
        }
    }

    fn set_phase(&self, phase: Phase) {
        self.state.lock().phase = phase;
    }

    fn record(&self, phase: Phase, code: ResultCode) {
        let mut state = self.state.lock();
        state.phase = phase;
        state.result.code = code;
    }

    fn missing_argument(&self, name: &str) -> EngineError {
        EngineError::MissingArgument {
            component: self.name.clone(),
            name: name.to_string(),
        }
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Fetch sources
// ---------------------------------------------------------------------------

/// Order used when delegating to a precursor or caller: its own preferred
/// order minus the sources that would re-check the same data or fan out.
fn delegated_order(target: &ComponentInstance) -> SourceOrder {
    target.preferred_sources().without(&[
        SourceKey::SELF,
        SourceKey::ENVIRONMENT,
        SourceKey::GLOBALS,
        SourceKey::EXECUTOR,
    ])
}

impl Fetchable for ComponentInstance {
    fn fetch_id(&self) -> FetchId {
        self.id
    }

    fn fetch_name(&self) -> &str {
        &self.name
    }

    fn preferred_sources(&self) -> SourceOrder {
        self.contract.fetch_order()
    }

    fn handles(&self, source: &SourceKey) -> bool {
        STANDARD_SOURCES.contains(source) || self.contract.custom_source(source).is_some()
    }

    fn consult(&self, source: &SourceKey, name: &str, search: &mut Search<'_>) -> Option<Value> {
        match source.as_str() {
            "self" => self.attribute(name),
            "arguments" => self.state.lock().kwargs.get(name).cloned(),
            "globals" => self.executor()?.context().globals.get(name),
            "config" => self.contract.config.as_ref()?.get_value(name),
            "precursor" => {
                let precursor = self.precursor()?;
                search.delegate(&*precursor, name, &delegated_order(&precursor))
            }
            "caller" => {
                let caller = self.caller()?;
                search.delegate(&*caller, name, &delegated_order(&caller))
            }
            "executor" => self.executor()?.delegate_fetch(name, search),
            "environment" => match self.executor() {
                Some(executor) => executor.environment().lookup(name),
                None => ProcessEnvironment.lookup(name),
            },
            _ => self.contract.custom_source(source).and_then(|lookup| lookup(name)),
        }
    }
}
