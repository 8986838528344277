//! In-process pub/sub bus with ZeroMQ-style prefix subscriptions.
//!
//! [`MemoryBus`] fans every published message out to each subscriber whose
//! prefix list matches the topic. Delivery mirrors PUB/SUB semantics:
//!
//! - Publishing never blocks. Each subscriber has a bounded queue; when
//!   it is full the message is dropped for that subscriber only.
//! - Messages published while no subscriber exists are discarded. There
//!   is no replay for late joiners.
//! - Subscribers whose receiving half was dropped are pruned on the next
//!   publish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use tracing::trace;

use crate::message::Message;
use crate::transport::{Publisher, Subscriber, TransportError};

/// Default per-subscriber queue depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

struct SubscriberSlot {
    prefixes: Vec<Vec<u8>>,
    tx: Sender<Message>,
}

impl SubscriberSlot {
    fn wants(&self, msg: &Message) -> bool {
        self.prefixes.iter().any(|p| msg.matches(p))
    }
}

struct BusState {
    slots: Mutex<Vec<SubscriberSlot>>,
    queue_depth: usize,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Shared handle to an in-process bus. Cloning shares the same bus.
#[derive(Clone)]
pub struct MemoryBus {
    state: Arc<BusState>,
}

impl MemoryBus {
    /// Create a bus with [`DEFAULT_QUEUE_DEPTH`] per subscriber.
    pub fn new() -> Self {
        Self::with_queue_depth(DEFAULT_QUEUE_DEPTH)
    }

    /// Create a bus with a custom per-subscriber queue depth. A depth of
    /// zero is raised to one.
    pub fn with_queue_depth(depth: usize) -> Self {
        Self {
            state: Arc::new(BusState {
                slots: Mutex::new(Vec::new()),
                queue_depth: depth.max(1),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// A publishing handle onto this bus.
    pub fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher {
            state: Arc::clone(&self.state),
        }
    }

    /// Register a subscriber for the given topic prefixes.
    ///
    /// An empty prefix subscribes to every topic. An empty prefix list
    /// subscribes to nothing.
    pub fn subscribe<I, T>(&self, prefixes: I) -> MemorySubscriber
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let (tx, rx) = crossbeam_channel::bounded(self.state.queue_depth);
        let prefixes = prefixes.into_iter().map(|p| p.as_ref().to_vec()).collect();
        self.state
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SubscriberSlot { prefixes, tx });
        MemorySubscriber { rx }
    }

    /// Number of live subscribers (as of the last prune).
    pub fn subscriber_count(&self) -> usize {
        self.state
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Total per-subscriber deliveries so far.
    pub fn delivered(&self) -> u64 {
        self.state.delivered.load(Ordering::Relaxed)
    }

    /// Total per-subscriber drops due to full queues.
    pub fn dropped(&self) -> u64 {
        self.state.dropped.load(Ordering::Relaxed)
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBus")
            .field("subscribers", &self.subscriber_count())
            .field("queue_depth", &self.state.queue_depth)
            .field("delivered", &self.delivered())
            .field("dropped", &self.dropped())
            .finish()
    }
}

// ── Publisher ──────────────────────────────────────────────────────

/// Publishing half of a [`MemoryBus`].
pub struct MemoryPublisher {
    state: Arc<BusState>,
}

impl Publisher for MemoryPublisher {
    fn publish(&mut self, topic: &[u8], payload: &[u8]) -> Result<(), TransportError> {
        let msg = Message::new(topic, payload);
        let mut slots = self
            .state
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        slots.retain(|slot| {
            if !slot.wants(&msg) {
                return true;
            }
            match slot.tx.try_send(msg.clone()) {
                Ok(()) => {
                    self.state.delivered.fetch_add(1, Ordering::Relaxed);
                    true
                }
                Err(TrySendError::Full(_)) => {
                    self.state.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(topic = %msg.topic_lossy(), "subscriber queue full, message dropped");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
        Ok(())
    }
}

// ── Subscriber ─────────────────────────────────────────────────────

/// Receiving half of a [`MemoryBus`] subscription.
pub struct MemorySubscriber {
    rx: Receiver<Message>,
}

impl MemorySubscriber {
    /// Take the next queued message without waiting.
    pub fn try_recv(&mut self) -> Result<Option<Message>, TransportError> {
        match self.rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }

    /// Drain everything currently queued.
    pub fn drain(&mut self) -> Vec<Message> {
        self.rx.try_iter().collect()
    }
}

impl Subscriber for MemorySubscriber {
    fn poll(&mut self, wait: Duration) -> Result<Option<Message>, TransportError> {
        match self.rx.recv_timeout(wait) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_routing() {
        let bus = MemoryBus::new();
        let mut outputs = bus.subscribe(["output"]);
        let mut x_only = bus.subscribe(["output/x"]);
        let mut pub_ = bus.publisher();

        pub_.publish(b"output", b"{}").unwrap();
        pub_.publish(b"output/x", b"1.0").unwrap();
        pub_.publish(b"input/u", b"2.0").unwrap();

        let got: Vec<_> = outputs.drain().into_iter().map(|m| m.topic).collect();
        assert_eq!(got, vec![b"output".to_vec(), b"output/x".to_vec()]);
        let got: Vec<_> = x_only.drain().into_iter().map(|m| m.topic).collect();
        assert_eq!(got, vec![b"output/x".to_vec()]);
    }

    #[test]
    fn publish_without_subscribers_is_discarded() {
        let bus = MemoryBus::new();
        let mut pub_ = bus.publisher();
        pub_.publish(b"output", b"{}").unwrap();

        // A late joiner sees nothing from before it subscribed.
        let mut late = bus.subscribe([""]);
        assert_eq!(late.try_recv().unwrap(), None);
        assert_eq!(bus.delivered(), 0);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let bus = MemoryBus::with_queue_depth(2);
        let mut sub = bus.subscribe([""]);
        let mut pub_ = bus.publisher();
        for i in 0..5 {
            pub_.publish(b"t", format!("{i}").as_bytes()).unwrap();
        }
        let got: Vec<_> = sub.drain().into_iter().map(|m| m.payload).collect();
        assert_eq!(got, vec![b"0".to_vec(), b"1".to_vec()]);
        assert_eq!(bus.dropped(), 3);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = MemoryBus::new();
        let sub = bus.subscribe([""]);
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        bus.publisher().publish(b"t", b"").unwrap();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn zero_queue_depth_holds_one_message() {
        let bus = MemoryBus::with_queue_depth(0);
        let mut sub = bus.subscribe(["input/"]);
        let mut publisher = bus.publisher();
        publisher.publish(b"input/u", b"1").unwrap();
        publisher.publish(b"input/u", b"2").unwrap();
        let first = sub.poll(Duration::from_millis(5)).unwrap().unwrap();
        assert_eq!(first.payload, b"1".to_vec());
        assert_eq!(sub.poll(Duration::from_millis(5)).unwrap(), None);
        assert_eq!(bus.dropped(), 1);
    }

    #[test]
    fn poll_times_out_then_reports_closed() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe(["reset"]);
        assert_eq!(sub.poll(Duration::from_millis(5)).unwrap(), None);
        drop(bus);
        assert_eq!(
            sub.poll(Duration::from_millis(5)),
            Err(TransportError::Closed)
        );
    }
}
