//! Per-run shared state.

use summon_core::GlobalTable;

use crate::tracker::CallTracker;

/// State shared by every component run under one executor: the call stack
/// and the global binding table.
///
/// Constructed once per executor and injected explicitly into anything that
/// needs it. Independent executors never share a context.
#[derive(Debug, Default)]
pub struct Context {
    pub tracker: CallTracker,
    pub globals: GlobalTable,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
