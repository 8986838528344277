//! Periodic output publication.
//!
//! Once per wall-clock period the publisher takes the latest snapshot and
//! sends one combined JSON object on the combined topic, then one message
//! per output variable. It reads snapshots only and never blocks the clock.

use std::sync::Arc;
use std::time::Duration;

use cosim_bus::{Message, Publisher, TransportError};
use crossbeam_channel::{select, tick};
use serde_json::{Map, Value};
use tracing::{debug, error, trace};

use crate::router::{TopicRouter, TIME_KEY};
use crate::shutdown::ShutdownSignal;
use crate::snapshot::LatestSnapshot;
use crate::stepper::OutputSnapshot;

/// Why the publisher loop ended.
#[derive(Clone, Debug, PartialEq)]
pub enum PublisherExit {
    /// The shutdown signal fired.
    Shutdown,
    /// A send failed.
    Transport(TransportError),
}

/// Counters returned when the publisher loop ends.
#[derive(Clone, Debug, PartialEq)]
pub struct PublisherReport {
    /// Periods in which a snapshot was published.
    pub ticks: u64,
    /// Periods skipped because no snapshot existed yet.
    pub skipped: u64,
    /// Messages sent.
    pub messages: u64,
    /// Why the loop ended.
    pub exit: PublisherExit,
}

/// Turns snapshots into outbound messages.
#[derive(Debug)]
pub struct OutputPublisher {
    router: Arc<TopicRouter>,
}

impl OutputPublisher {
    /// A publisher for the outputs in `router`'s registry.
    pub fn new(router: Arc<TopicRouter>) -> Self {
        Self { router }
    }

    /// Encode one snapshot: the combined message first, then one message
    /// per output in registry order.
    ///
    /// The combined payload is `{"t": time, "<output>": value, ...}` with
    /// keys in that order. Non-finite values encode as `null`.
    pub fn encode(&self, snapshot: &OutputSnapshot) -> Vec<Message> {
        let registry = self.router.registry();
        let outputs = registry.outputs();
        let mut messages = Vec::with_capacity(outputs.len() + 1);

        let mut combined = Map::with_capacity(outputs.len() + 1);
        combined.insert(TIME_KEY.to_string(), Value::from(snapshot.time));
        for (&id, &value) in outputs.iter().zip(&snapshot.values) {
            combined.insert(registry.name(id).to_string(), Value::from(value));
        }
        messages.push(Message::new(
            self.router.combined_topic(),
            Value::Object(combined).to_string(),
        ));

        for (&id, &value) in outputs.iter().zip(&snapshot.values) {
            messages.push(Message::new(
                self.router.topic(id),
                Value::from(value).to_string(),
            ));
        }
        messages
    }

    /// Publish the current snapshot every `period` until `shutdown` fires
    /// or a send fails.
    ///
    /// The first publication happens one full period after start.
    pub fn run<P: Publisher + ?Sized>(
        self,
        publisher: &mut P,
        latest: &LatestSnapshot,
        period: Duration,
        shutdown: &ShutdownSignal,
    ) -> PublisherReport {
        let ticker = tick(period);
        let mut ticks = 0u64;
        let mut skipped = 0u64;
        let mut messages = 0u64;

        let exit = 'outer: loop {
            select! {
                recv(shutdown.receiver()) -> _ => break 'outer PublisherExit::Shutdown,
                recv(ticker) -> _ => {}
            }
            let Some(snapshot) = latest.load() else {
                skipped += 1;
                trace!("no snapshot yet; skipping publication");
                continue;
            };
            for msg in self.encode(&snapshot) {
                if let Err(e) = publisher.publish(&msg.topic, &msg.payload) {
                    error!(topic = %msg.topic_lossy(), error = %e, "publish failed; publisher stopping");
                    break 'outer PublisherExit::Transport(e);
                }
                messages += 1;
            }
            ticks += 1;
        };

        debug!(ticks, skipped, messages, "publisher stopped");
        PublisherReport {
            ticks,
            skipped,
            messages,
            exit,
        }
    }
}
