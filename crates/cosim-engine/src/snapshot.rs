//! Single-slot handoff of output snapshots from the clock to readers.
//!
//! [`LatestSnapshot`] holds the most recent `Arc<OutputSnapshot>`. The
//! clock is the only writer; any number of threads may read. Readers get
//! an immutable snapshot that was complete before it was stored, so they
//! can never observe a step in progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::stepper::OutputSnapshot;

/// The most recent snapshot plus a monotonic store counter.
#[derive(Debug, Default)]
pub struct LatestSnapshot {
    slot: Mutex<Option<Arc<OutputSnapshot>>>,
    version: AtomicU64,
}

// Compile-time assertion: LatestSnapshot must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<LatestSnapshot>();
};

impl LatestSnapshot {
    /// Empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot. Single writer only.
    pub fn store(&self, snapshot: OutputSnapshot) {
        let arc = Arc::new(snapshot);
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(arc);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// The current snapshot, or `None` before the first store.
    pub fn load(&self) -> Option<Arc<OutputSnapshot>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Arc::clone)
    }

    /// Number of stores so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}
