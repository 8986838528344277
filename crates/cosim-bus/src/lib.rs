//! Topic-addressed publish/subscribe transports.
//!
//! The bridge treats its sockets as two opaque primitives: a
//! [`Publisher`] that sends `[topic, payload]` pairs fire-and-forget, and
//! a [`Subscriber`] that yields the next inbound pair. This crate defines
//! those traits and ships two backends:
//!
//! - [`memory`]: an in-process bus with ZeroMQ-style prefix subscriptions,
//!   used by tests and offline tooling.
//! - `zmq` (feature `zmq`): PUB/SUB sockets speaking two-frame multipart
//!   messages.
//!
//! Transports carry no simulation knowledge. Topic naming lives in the
//! engine's router.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod memory;
pub mod message;
pub mod transport;
#[cfg(feature = "zmq")]
pub mod zmq;

pub use memory::{MemoryBus, MemoryPublisher, MemorySubscriber};
pub use message::Message;
pub use transport::{Endpoint, Publisher, SocketRole, Subscriber, TransportError};
