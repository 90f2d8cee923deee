//! Multi-source value resolution ("Fetch").
//!
//! A Fetch walks an ordered list of named sources and returns the first value
//! found. Sources are lookup strategies identified by a [`SourceKey`]; an owner
//! ([`Fetchable`]) decides which keys it understands and how to consult them.
//! Unknown keys are skipped, which lets a single order be shared by owners
//! with different capabilities.
//!
//! Delegating sources (`precursor`, `caller`, `executor`) recurse into another
//! owner through [`Search::delegate`]. Every owner entered during one logical
//! search is recorded in the search's visited set; re-entering an owner yields
//! "not found" instead of looping.
//!
//! Fetch never fails: an unresolved name yields the caller's default.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::traits::FetchObserver;
use crate::types::Value;

// ---------------------------------------------------------------------------
// SourceKey / SourceOrder
// ---------------------------------------------------------------------------

/// Name of a Fetch source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceKey(Cow<'static, str>);

impl SourceKey {
    /// Attributes held by the owner itself.
    pub const SELF: SourceKey = SourceKey(Cow::Borrowed("self"));
    /// Keyword arguments of the current call.
    pub const ARGUMENTS: SourceKey = SourceKey(Cow::Borrowed("arguments"));
    /// The global binding table.
    pub const GLOBALS: SourceKey = SourceKey(Cow::Borrowed("globals"));
    /// The owner's configuration mapping.
    pub const CONFIG: SourceKey = SourceKey(Cow::Borrowed("config"));
    /// The component that preceded the owner in a chain.
    pub const PRECURSOR: SourceKey = SourceKey(Cow::Borrowed("precursor"));
    /// The active component that invoked the owner.
    pub const CALLER: SourceKey = SourceKey(Cow::Borrowed("caller"));
    /// The root orchestrator.
    pub const EXECUTOR: SourceKey = SourceKey(Cow::Borrowed("executor"));
    /// Process environment variables.
    pub const ENVIRONMENT: SourceKey = SourceKey(Cow::Borrowed("environment"));

    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for SourceKey {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for SourceKey {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

/// Ordered list of sources to consult. Order is priority: the first source
/// that finds a value wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOrder(Vec<SourceKey>);

impl SourceOrder {
    /// Builds an order, dropping duplicate keys after their first occurrence.
    #[must_use]
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<SourceKey>,
    {
        let mut order: Vec<SourceKey> = Vec::new();
        for key in keys {
            let key = key.into();
            if !order.contains(&key) {
                order.push(key);
            }
        }
        Self(order)
    }

    /// The default component order:
    /// `self → arguments → globals → config → precursor → caller → executor → environment`.
    #[must_use]
    pub fn standard() -> Self {
        Self(vec![
            SourceKey::SELF,
            SourceKey::ARGUMENTS,
            SourceKey::GLOBALS,
            SourceKey::CONFIG,
            SourceKey::PRECURSOR,
            SourceKey::CALLER,
            SourceKey::EXECUTOR,
            SourceKey::ENVIRONMENT,
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceKey> {
        self.0.iter()
    }

    #[must_use]
    pub fn contains(&self, key: &SourceKey) -> bool {
        self.0.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of `self` with `remove` taken out.
    #[must_use]
    pub fn without(&self, remove: &[SourceKey]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|k| !remove.contains(k))
                .cloned()
                .collect(),
        )
    }

    /// Copy of `self` with any of `add` not yet present appended at the end.
    #[must_use]
    pub fn with(&self, add: &[SourceKey]) -> Self {
        let mut order = self.0.clone();
        for key in add {
            if !order.contains(key) {
                order.push(key.clone());
            }
        }
        Self(order)
    }

    #[must_use]
    pub fn with_and_without(&self, add: &[SourceKey], remove: &[SourceKey]) -> Self {
        self.without(remove).with(add)
    }
}

impl Default for SourceOrder {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Display for SourceOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(SourceKey::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Fetchable
// ---------------------------------------------------------------------------

/// Process-unique identity of a Fetch owner, used for loop detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchId(u64);

impl FetchId {
    /// Allocates a fresh identity.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FetchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Anything values can be fetched from.
pub trait Fetchable {
    /// Identity used for the visited set.
    fn fetch_id(&self) -> FetchId;

    /// Name used in diagnostics.
    fn fetch_name(&self) -> &str;

    /// Order used when a Fetch does not specify one.
    fn preferred_sources(&self) -> SourceOrder;

    /// Whether `source` is a lookup strategy this owner implements.
    fn handles(&self, source: &SourceKey) -> bool;

    /// Consults a single source. Delegating sources recurse through
    /// [`Search::delegate`] so the visited set is shared.
    fn consult(&self, source: &SourceKey, name: &str, search: &mut Search<'_>) -> Option<Value>;
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// State shared by every owner entered during one logical Fetch.
pub struct Search<'o> {
    visited: HashSet<FetchId>,
    observer: Option<&'o dyn FetchObserver>,
}

impl<'o> Search<'o> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            visited: HashSet::new(),
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(observer: Option<&'o dyn FetchObserver>) -> Self {
        Self {
            visited: HashSet::new(),
            observer,
        }
    }

    /// Continues this search inside another owner.
    pub fn delegate(
        &mut self,
        owner: &dyn Fetchable,
        name: &str,
        sources: &SourceOrder,
    ) -> Option<Value> {
        locate(owner, name, Some(sources), self).map(|(value, _)| value)
    }
}

impl Default for Search<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Search<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Search")
            .field("visited", &self.visited)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Root Fetch: resolves `name` from `owner`, returning `default` when no
/// source has it.
///
/// `sources` defaults to the owner's preferred order. The observer, if any,
/// is told where the value was found.
pub fn fetch(
    owner: &dyn Fetchable,
    name: &str,
    default: Value,
    sources: Option<&SourceOrder>,
    observer: Option<&dyn FetchObserver>,
) -> Value {
    try_fetch(owner, name, sources, observer).unwrap_or_else(|| {
        debug!(owner = owner.fetch_name(), name, default = %default, "not found; using default");
        default
    })
}

/// Root Fetch that reports absence as `None` instead of substituting a
/// default.
pub fn try_fetch(
    owner: &dyn Fetchable,
    name: &str,
    sources: Option<&SourceOrder>,
    observer: Option<&dyn FetchObserver>,
) -> Option<Value> {
    let mut search = Search::with_observer(observer);
    if let Some(order) = sources {
        trace!(owner = owner.fetch_name(), name, sources = %order, "fetching");
    }
    let (value, location) = locate(owner, name, sources, &mut search)?;
    if let Some(observer) = search.observer {
        observer.on_fetch(name, &location, &value);
    }
    Some(value)
}

/// Nested Fetch: like [`fetch`] but continues an existing search and reports
/// whether the value was found.
pub fn fetch_nested(
    owner: &dyn Fetchable,
    name: &str,
    default: Value,
    sources: Option<&SourceOrder>,
    search: &mut Search<'_>,
) -> (Value, bool) {
    match locate(owner, name, sources, search) {
        Some((value, _)) => (value, true),
        None => (default, false),
    }
}

fn locate(
    owner: &dyn Fetchable,
    name: &str,
    sources: Option<&SourceOrder>,
    search: &mut Search<'_>,
) -> Option<(Value, SourceKey)> {
    if !search.visited.insert(owner.fetch_id()) {
        debug!(owner = owner.fetch_name(), name, "loop detected; skipping");
        return None;
    }

    let preferred;
    let sources = match sources {
        Some(order) => order,
        None => {
            preferred = owner.preferred_sources();
            &preferred
        }
    };

    for source in sources.iter() {
        if !owner.handles(source) {
            continue;
        }
        if let Some(value) = owner.consult(source, name, search) {
            trace!(owner = owner.fetch_name(), name, %source, "found");
            return Some((value, source.clone()));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Weak};

    use parking_lot::{Mutex, RwLock};
    use proptest::prelude::*;

    use super::*;

    /// Minimal owner with map-backed sources and a precursor link.
    struct Node {
        id: FetchId,
        name: &'static str,
        attributes: RwLock<BTreeMap<String, Value>>,
        arguments: RwLock<BTreeMap<String, Value>>,
        config: RwLock<BTreeMap<String, Value>>,
        precursor: RwLock<Option<Weak<Node>>>,
        order: SourceOrder,
        consulted: Mutex<Vec<String>>,
    }

    impl Node {
        fn new(name: &'static str) -> Arc<Self> {
            Self::with_order(name, SourceOrder::new([
                SourceKey::SELF,
                SourceKey::ARGUMENTS,
                SourceKey::CONFIG,
                SourceKey::PRECURSOR,
            ]))
        }

        fn with_order(name: &'static str, order: SourceOrder) -> Arc<Self> {
            Arc::new(Self {
                id: FetchId::next(),
                name,
                attributes: RwLock::new(BTreeMap::new()),
                arguments: RwLock::new(BTreeMap::new()),
                config: RwLock::new(BTreeMap::new()),
                precursor: RwLock::new(None),
                order,
                consulted: Mutex::new(Vec::new()),
            })
        }

        fn set_precursor(&self, other: &Arc<Node>) {
            *self.precursor.write() = Some(Arc::downgrade(other));
        }
    }

    impl Fetchable for Node {
        fn fetch_id(&self) -> FetchId {
            self.id
        }

        fn fetch_name(&self) -> &str {
            self.name
        }

        fn preferred_sources(&self) -> SourceOrder {
            self.order.clone()
        }

        fn handles(&self, source: &SourceKey) -> bool {
            [
                SourceKey::SELF,
                SourceKey::ARGUMENTS,
                SourceKey::CONFIG,
                SourceKey::PRECURSOR,
            ]
            .contains(source)
        }

        fn consult(&self, source: &SourceKey, name: &str, search: &mut Search<'_>) -> Option<Value> {
            self.consulted.lock().push(source.to_string());
            match source.as_str() {
                "self" => self.attributes.read().get(name).cloned(),
                "arguments" => self.arguments.read().get(name).cloned(),
                "config" => self.config.read().get(name).cloned(),
                "precursor" => {
                    let precursor = self.precursor.read().as_ref().and_then(Weak::upgrade)?;
                    let order = precursor.preferred_sources().without(&[SourceKey::SELF]);
                    search.delegate(&*precursor, name, &order)
                }
                _ => None,
            }
        }
    }

    #[test]
    fn scenario_config_after_empty_self_and_arguments() {
        let node = Node::new("counter");
        node.config.write().insert("count".into(), Value::Int(5));

        let order = SourceOrder::new([SourceKey::SELF, SourceKey::ARGUMENTS, SourceKey::CONFIG]);
        assert_eq!(fetch(&*node, "count", Value::Int(0), Some(&order), None), Value::Int(5));

        node.config.write().remove("count");
        assert_eq!(fetch(&*node, "count", Value::Int(0), Some(&order), None), Value::Int(0));
    }

    #[test]
    fn first_source_wins_and_short_circuits() {
        let node = Node::new("n");
        node.attributes.write().insert("x".into(), Value::from("self"));
        node.arguments.write().insert("x".into(), Value::from("args"));

        let value = fetch(&*node, "x", Value::Null, None, None);
        assert_eq!(value, Value::from("self"));
        assert_eq!(*node.consulted.lock(), vec!["self".to_string()]);
    }

    #[test]
    fn precursor_cycle_terminates_with_default() {
        let a = Node::new("a");
        let b = Node::new("b");
        a.set_precursor(&b);
        b.set_precursor(&a);

        let value = fetch(&*a, "undefined", Value::from("fallback"), None, None);
        assert_eq!(value, Value::from("fallback"));
    }

    #[test]
    fn delegates_to_precursor_arguments() {
        let first = Node::new("first");
        let second = Node::new("second");
        first.arguments.write().insert("enemy".into(), Value::from("Worst"));
        second.set_precursor(&first);

        assert_eq!(
            fetch(&*second, "enemy", Value::Null, None, None),
            Value::from("Worst")
        );
    }

    #[test]
    fn delegation_excludes_precursor_self() {
        let first = Node::new("first");
        let second = Node::new("second");
        first.attributes.write().insert("secret".into(), Value::from("hidden"));
        second.set_precursor(&first);

        assert_eq!(fetch(&*second, "secret", Value::Null, None, None), Value::Null);
    }

    #[test]
    fn unknown_sources_are_skipped() {
        let node = Node::new("n");
        node.config.write().insert("k".into(), Value::Int(1));
        let order = SourceOrder::new([SourceKey::new("nowhere"), SourceKey::CONFIG]);

        assert_eq!(fetch(&*node, "k", Value::Null, Some(&order), None), Value::Int(1));
        assert_eq!(*node.consulted.lock(), vec!["config".to_string()]);
    }

    #[test]
    fn nested_fetch_reports_found_flag() {
        let node = Node::new("n");
        node.arguments.write().insert("k".into(), Value::Bool(true));
        let mut search = Search::new();
        assert_eq!(
            fetch_nested(&*node, "k", Value::Null, None, &mut search),
            (Value::Bool(true), true)
        );

        // Same search: the node is already visited.
        assert_eq!(
            fetch_nested(&*node, "k", Value::Int(9), None, &mut search),
            (Value::Int(9), false)
        );
    }

    #[test]
    fn observer_sees_location_without_changing_result() {
        let node = Node::new("n");
        node.arguments.write().insert("k".into(), Value::Int(3));
        let seen = Mutex::new(Vec::new());
        let observer = |name: &str, location: &SourceKey, value: &Value| {
            seen.lock().push((name.to_string(), location.to_string(), value.clone()));
        };

        let value = fetch(&*node, "k", Value::Null, None, Some(&observer));
        assert_eq!(value, Value::Int(3));
        assert_eq!(
            *seen.lock(),
            vec![("k".to_string(), "arguments".to_string(), Value::Int(3))]
        );
    }

    #[test]
    fn try_fetch_distinguishes_absent_from_null() {
        let node = Node::new("n");
        node.arguments.write().insert("present".into(), Value::Null);
        assert_eq!(try_fetch(&*node, "present", None, None), Some(Value::Null));
        assert_eq!(try_fetch(&*node, "absent", None, None), None);
    }

    #[test]
    fn order_helpers_keep_priority() {
        let order = SourceOrder::standard();
        let trimmed = order.without(&[SourceKey::SELF, SourceKey::ENVIRONMENT]);
        assert!(!trimmed.contains(&SourceKey::SELF));
        assert_eq!(trimmed.len(), order.len() - 2);

        let restored = trimmed.with(&[SourceKey::SELF]);
        assert_eq!(restored.iter().last(), Some(&SourceKey::SELF));

        let both = order.with_and_without(&[SourceKey::new("custom")], &[SourceKey::GLOBALS]);
        assert!(both.contains(&SourceKey::new("custom")));
        assert!(!both.contains(&SourceKey::GLOBALS));
    }

    #[test]
    fn source_order_deduplicates() {
        let order = SourceOrder::new([SourceKey::CONFIG, SourceKey::SELF, SourceKey::CONFIG]);
        assert_eq!(order.len(), 2);
        assert_eq!(order.to_string(), "[config, self]");
    }

    proptest! {
        /// Given a name bound in both `self` and `arguments`, the source that
        /// appears first in the order supplies the value.
        #[test]
        fn priority_follows_order(self_first in any::<bool>(), a in any::<i64>(), b in any::<i64>()) {
            let node = Node::new("n");
            node.attributes.write().insert("x".into(), Value::Int(a));
            node.arguments.write().insert("x".into(), Value::Int(b));

            let order = if self_first {
                SourceOrder::new([SourceKey::SELF, SourceKey::ARGUMENTS])
            } else {
                SourceOrder::new([SourceKey::ARGUMENTS, SourceKey::SELF])
            };
            let expected = if self_first { a } else { b };
            prop_assert_eq!(fetch(&*node, "x", Value::Null, Some(&order), None), Value::Int(expected));
        }
    }
}
