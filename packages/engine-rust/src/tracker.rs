//! Stack of currently executing components.
//!
//! Frames are pushed when a tracked component's call begins and popped by the
//! returned [`TrackGuard`] on every exit path, including error returns and
//! unwinding panics.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use summon_core::FetchId;

use crate::component::ComponentInstance;

#[derive(Debug)]
struct Frame {
    id: FetchId,
    instance: Weak<ComponentInstance>,
}

/// Ordered stack of active components; most recent last.
#[derive(Debug, Default)]
pub struct CallTracker {
    frames: Mutex<Vec<Frame>>,
}

impl CallTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `instance` and returns a guard that pops it when dropped.
    #[must_use]
    pub fn push(&self, instance: &Arc<ComponentInstance>) -> TrackGuard<'_> {
        let id = instance.id();
        self.frames.lock().push(Frame {
            id,
            instance: Arc::downgrade(instance),
        });
        TrackGuard { tracker: self, id }
    }

    /// Removes the most recent frame for `id`. Returns `false` when no such
    /// frame exists (already popped).
    pub fn pop(&self, id: FetchId) -> bool {
        let mut frames = self.frames.lock();
        match frames.iter().rposition(|f| f.id == id) {
            Some(index) => {
                frames.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of active frames.
    #[must_use]
    pub fn count(&self) -> usize {
        self.frames.lock().len()
    }

    /// The active component `skip` frames below the top.
    #[must_use]
    pub fn latest(&self, skip: usize) -> Option<Arc<ComponentInstance>> {
        self.frames
            .lock()
            .iter()
            .rev()
            .nth(skip)
            .and_then(|f| f.instance.upgrade())
    }

    /// Snapshot of the live frames, most recent first.
    #[must_use]
    pub fn stack(&self) -> Vec<Arc<ComponentInstance>> {
        self.frames
            .lock()
            .iter()
            .rev()
            .filter_map(|f| f.instance.upgrade())
            .collect()
    }
}

/// RAII guard that pops its frame when dropped.
#[derive(Debug)]
pub struct TrackGuard<'a> {
    tracker: &'a CallTracker,
    id: FetchId,
}

impl Drop for TrackGuard<'_> {
    fn drop(&mut self) {
        self.tracker.pop(self.id);
    }
}
