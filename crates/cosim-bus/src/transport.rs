//! Transport traits, endpoints, and the `TransportError` kind.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::message::Message;

// ── Endpoint ───────────────────────────────────────────────────────

/// Whether a socket listens on its address or dials it.
///
/// Which side binds is a deployment choice, not part of the protocol:
/// a bridge may bind its publisher and connect its subscriber, or the
/// other way round, as long as each pair has exactly one binder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketRole {
    /// Listen on the address.
    Bind,
    /// Dial the address.
    Connect,
}

impl fmt::Display for SocketRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind => f.write_str("bind"),
            Self::Connect => f.write_str("connect"),
        }
    }
}

/// A socket address plus its bind/connect role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Transport address, e.g. `tcp://*:7000`.
    pub address: String,
    /// Bind or connect.
    pub role: SocketRole,
}

impl Endpoint {
    /// An endpoint that listens on `address`.
    pub fn bind(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            role: SocketRole::Bind,
        }
    }

    /// An endpoint that dials `address`.
    pub fn connect(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            role: SocketRole::Connect,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.role, self.address)
    }
}

// ── TransportError ─────────────────────────────────────────────────

/// Send/receive failure at the socket boundary.
///
/// A task that hits one of these logs it and terminates; transports are
/// never restarted from inside the bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The other end of an in-process transport is gone.
    Closed,
    /// The endpoint could not be opened, bound, or connected.
    Endpoint {
        /// The endpoint address.
        address: String,
        /// Description from the socket layer.
        reason: String,
    },
    /// A message could not be sent.
    Send {
        /// Description from the socket layer.
        reason: String,
    },
    /// A message could not be received.
    Receive {
        /// Description from the socket layer.
        reason: String,
    },
    /// An inbound multipart message did not have exactly two frames.
    Framing {
        /// Number of frames received.
        parts: usize,
    },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "transport closed"),
            Self::Endpoint { address, reason } => write!(f, "endpoint {address}: {reason}"),
            Self::Send { reason } => write!(f, "send failed: {reason}"),
            Self::Receive { reason } => write!(f, "receive failed: {reason}"),
            Self::Framing { parts } => {
                write!(f, "expected a 2-part [topic, payload] message, got {parts} parts")
            }
        }
    }
}

impl Error for TransportError {}

// ── Traits ─────────────────────────────────────────────────────────

/// Outbound half of a pub/sub transport.
///
/// `publish` is fire-and-forget: it never waits for a subscriber, and
/// messages published while nobody listens are lost rather than queued.
pub trait Publisher: Send {
    /// Send one `[topic, payload]` message.
    fn publish(&mut self, topic: &[u8], payload: &[u8]) -> Result<(), TransportError>;
}

/// Inbound half of a pub/sub transport.
///
/// Only messages whose topic starts with one of the subscribed prefixes
/// are delivered.
pub trait Subscriber: Send {
    /// Wait up to `wait` for the next message.
    ///
    /// Returns `Ok(None)` when nothing arrived in that window. Callers that
    /// want to wait indefinitely loop on this, which keeps the wait
    /// interruptible by a shutdown flag.
    fn poll(&mut self, wait: Duration) -> Result<Option<Message>, TransportError>;
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&mut self, topic: &[u8], payload: &[u8]) -> Result<(), TransportError> {
        (**self).publish(topic, payload)
    }
}

impl<S: Subscriber + ?Sized> Subscriber for Box<S> {
    fn poll(&mut self, wait: Duration) -> Result<Option<Message>, TransportError> {
        (**self).poll(wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_display_shows_role() {
        assert_eq!(Endpoint::bind("tcp://*:7000").to_string(), "bind tcp://*:7000");
        assert_eq!(
            Endpoint::connect("tcp://localhost:7001").to_string(),
            "connect tcp://localhost:7001"
        );
    }

    #[test]
    fn framing_error_reports_part_count() {
        let msg = TransportError::Framing { parts: 3 }.to_string();
        assert!(msg.contains("got 3 parts"));
    }
}
