//! Last-write-wins input buffers.
//!
//! [`PendingInputs`] is the stepper-local staging area drained right
//! before each advance. [`InputMailbox`] is the shared buffer the gateway
//! writes into from its own thread; the clock drains it into the stepper
//! between steps, so inbound writes never wait on a step in progress.

use std::sync::{Mutex, PoisonError};

use cosim_core::VarId;
use indexmap::IndexMap;
use smallvec::SmallVec;

/// Staged input values, one slot per variable.
///
/// A second write to the same variable overwrites the first in place;
/// iteration order is the order of first write.
#[derive(Clone, Debug, Default)]
pub struct PendingInputs {
    slots: IndexMap<VarId, f64>,
}

impl PendingInputs {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `value` for `id`, replacing any earlier value.
    pub fn insert(&mut self, id: VarId, value: f64) {
        self.slots.insert(id, value);
    }

    /// The staged value for `id`, if any.
    pub fn get(&self, id: VarId) -> Option<f64> {
        self.slots.get(&id).copied()
    }

    /// Number of variables with a staged value.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every staged value.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Remove and return every staged value.
    pub fn drain(&mut self) -> impl Iterator<Item = (VarId, f64)> + '_ {
        self.slots.drain(..)
    }
}

/// Everything taken out of an [`InputMailbox`] in one drain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MailboxDrain {
    /// A reset was requested since the last drain. Apply it before `inputs`.
    pub reset: bool,
    /// Writes that arrived after the most recent reset (or since the last
    /// drain when `reset` is false), last-write-wins per variable.
    pub inputs: SmallVec<[(VarId, f64); 8]>,
}

impl MailboxDrain {
    /// Whether the drain carries nothing to apply.
    pub fn is_empty(&self) -> bool {
        !self.reset && self.inputs.is_empty()
    }
}

#[derive(Debug, Default)]
struct MailboxState {
    pending: PendingInputs,
    reset: bool,
}

/// Shared last-write-wins buffer between the gateway and the clock.
///
/// A [`request_reset`](Self::request_reset) discards writes received
/// before it; writes received after it survive and are applied after the
/// reset.
#[derive(Debug, Default)]
pub struct InputMailbox {
    state: Mutex<MailboxState>,
}

impl InputMailbox {
    /// Empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write to input `id`.
    pub fn write(&self, id: VarId, value: f64) {
        self.lock().pending.insert(id, value);
    }

    /// Request a reset and discard every write received so far.
    pub fn request_reset(&self) {
        let mut state = self.lock();
        state.pending.clear();
        state.reset = true;
    }

    /// The value currently waiting for `id`.
    pub fn peek(&self, id: VarId) -> Option<f64> {
        self.lock().pending.get(id)
    }

    /// Whether a reset is waiting.
    #[doc(hidden)]
    pub fn reset_requested(&self) -> bool {
        self.lock().reset
    }

    /// Take everything out, leaving the mailbox empty.
    pub fn take(&self) -> MailboxDrain {
        let mut state = self.lock();
        let reset = std::mem::take(&mut state.reset);
        MailboxDrain {
            reset,
            inputs: state.pending.drain().collect(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
