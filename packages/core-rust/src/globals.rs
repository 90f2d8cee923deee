//! Process-wide table of named values ("globals").
//!
//! Globals are published by the error-resolution pipeline when a name that
//! no component defines is found elsewhere. Entries remember whether they were
//! obtained by a Fetch so they can be re-resolved after a configuration
//! context switch.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::types::Value;

/// A single global binding.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalEntry {
    pub value: Value,
    /// `true` when the value was produced by a Fetch and should be refreshed
    /// when the configuration context changes.
    pub from_fetch: bool,
}

#[derive(Debug, Default)]
struct GlobalState {
    entries: BTreeMap<String, GlobalEntry>,
    context_key: Option<String>,
}

/// Shared, interior-mutable global binding table.
///
/// Lookups and updates take a short-lived lock; no callback is ever invoked
/// while the lock is held.
#[derive(Debug, Default)]
pub struct GlobalTable {
    state: RwLock<GlobalState>,
}

impl GlobalTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `name`. Rebinding replaces the previous entry.
    pub fn set(&self, name: &str, value: Value, from_fetch: bool) {
        debug!(name, %value, from_fetch, "setting global");
        self.state
            .write()
            .entries
            .insert(name.to_string(), GlobalEntry { value, from_fetch });
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.state.read().entries.get(name).map(|e| e.value.clone())
    }

    #[must_use]
    pub fn entry(&self, name: &str) -> Option<GlobalEntry> {
        self.state.read().entries.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.state.read().entries.contains_key(name)
    }

    /// Removes `name`. Returns whether it was bound.
    pub fn expire(&self, name: &str) -> bool {
        let removed = self.state.write().entries.remove(name).is_some();
        if removed {
            debug!(name, "expired global");
        }
        removed
    }

    pub fn expire_all(&self) {
        self.state.write().entries.clear();
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.state.read().entries.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// The configuration subtree key currently consulted first when resolving
    /// undefined names.
    #[must_use]
    pub fn context_key(&self) -> Option<String> {
        self.state.read().context_key.clone()
    }

    /// Switches the configuration context. Returns `true` when the key
    /// actually changed.
    pub fn set_context_key(&self, key: Option<String>) -> bool {
        let mut state = self.state.write();
        if state.context_key == key {
            return false;
        }
        debug!(from = ?state.context_key, to = ?key, "switching config context");
        state.context_key = key;
        true
    }

    /// Re-resolves every entry obtained by a Fetch.
    ///
    /// `resolve` is called without the table lock held. Entries that no longer
    /// resolve are removed. Returns the number of entries refreshed.
    pub fn refresh_fetched(&self, resolve: impl Fn(&str) -> Option<Value>) -> usize {
        let names: Vec<String> = self
            .state
            .read()
            .entries
            .iter()
            .filter(|(_, e)| e.from_fetch)
            .map(|(name, _)| name.clone())
            .collect();

        let mut refreshed = 0;
        for name in names {
            match resolve(&name) {
                Some(value) => {
                    self.set(&name, value, true);
                    refreshed += 1;
                }
                None => {
                    self.expire(&name);
                }
            }
        }
        refreshed
    }
}
