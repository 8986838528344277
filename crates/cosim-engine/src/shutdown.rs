//! Pipeline-wide shutdown signal.
//!
//! A zero-capacity channel on which nothing is ever sent. Dropping the
//! [`ShutdownTrigger`] disconnects it, which wakes every thread blocked in
//! [`ShutdownSignal::wait_timeout`] or selecting on
//! [`ShutdownSignal::receiver`] at once.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Create a connected trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = crossbeam_channel::bounded(0);
    (ShutdownTrigger { tx: Some(tx) }, ShutdownSignal { rx })
}

/// Owning side. Fires on [`trigger`](Self::trigger) or drop.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: Option<Sender<()>>,
}

impl ShutdownTrigger {
    /// Fire the signal. Idempotent.
    pub fn trigger(&mut self) {
        self.tx.take();
    }

    /// Whether the signal has been fired.
    pub fn is_triggered(&self) -> bool {
        self.tx.is_none()
    }
}

/// Observing side. Cheap to clone; one per thread.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
}

impl ShutdownSignal {
    /// Whether the trigger has fired.
    pub fn is_triggered(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep up to `timeout`, returning early with `true` if the trigger
    /// fires.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.rx.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// The underlying receiver, for use in `select!`. Becomes ready only
    /// when the trigger fires.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
