//! ZeroMQ PUB/SUB backend.
//!
//! Messages travel as two-frame multipart messages `[topic, payload]`.
//! Subscriptions are ZeroMQ prefix filters, so the semantics match
//! [`MemoryBus`](crate::memory::MemoryBus).

use std::time::Duration;

use tracing::{debug, warn};

use crate::message::Message;
use crate::transport::{Endpoint, Publisher, SocketRole, Subscriber, TransportError};

/// Milliseconds a closing socket may spend flushing queued messages.
const LINGER_MS: i32 = 100;

fn open(
    ctx: &zmq::Context,
    kind: zmq::SocketType,
    endpoint: &Endpoint,
) -> Result<zmq::Socket, TransportError> {
    let endpoint_err = |e: zmq::Error| TransportError::Endpoint {
        address: endpoint.address.clone(),
        reason: e.to_string(),
    };
    let socket = ctx.socket(kind).map_err(endpoint_err)?;
    socket.set_linger(LINGER_MS).map_err(endpoint_err)?;
    match endpoint.role {
        SocketRole::Bind => socket.bind(&endpoint.address).map_err(endpoint_err)?,
        SocketRole::Connect => socket.connect(&endpoint.address).map_err(endpoint_err)?,
    }
    debug!(%endpoint, "zmq socket opened");
    Ok(socket)
}

// ── Publisher ──────────────────────────────────────────────────────

/// A PUB socket.
pub struct ZmqPublisher {
    socket: zmq::Socket,
}

impl ZmqPublisher {
    /// Open a PUB socket on `endpoint`.
    pub fn open(ctx: &zmq::Context, endpoint: &Endpoint) -> Result<Self, TransportError> {
        Ok(Self {
            socket: open(ctx, zmq::PUB, endpoint)?,
        })
    }
}

impl Publisher for ZmqPublisher {
    fn publish(&mut self, topic: &[u8], payload: &[u8]) -> Result<(), TransportError> {
        self.socket
            .send_multipart([topic, payload], 0)
            .map_err(|e| TransportError::Send {
                reason: e.to_string(),
            })
    }
}

// ── Subscriber ─────────────────────────────────────────────────────

/// A SUB socket with a fixed set of prefix subscriptions.
pub struct ZmqSubscriber {
    socket: zmq::Socket,
}

impl ZmqSubscriber {
    /// Open a SUB socket on `endpoint` and subscribe to each prefix.
    pub fn open<I, T>(
        ctx: &zmq::Context,
        endpoint: &Endpoint,
        prefixes: I,
    ) -> Result<Self, TransportError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let socket = open(ctx, zmq::SUB, endpoint)?;
        for prefix in prefixes {
            socket
                .set_subscribe(prefix.as_ref())
                .map_err(|e| TransportError::Endpoint {
                    address: endpoint.address.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(Self { socket })
    }
}

/// Map a receive-side result. A signal interrupting the wait (EINTR) is
/// an empty poll, so the caller can check its shutdown flag.
fn interrupted_as_idle<T>(result: Result<T, zmq::Error>) -> Result<Option<T>, TransportError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(zmq::Error::EINTR) => Ok(None),
        Err(e) => Err(TransportError::Receive {
            reason: e.to_string(),
        }),
    }
}

impl Subscriber for ZmqSubscriber {
    fn poll(&mut self, wait: Duration) -> Result<Option<Message>, TransportError> {
        let timeout_ms = i64::try_from(wait.as_millis()).unwrap_or(i64::MAX);
        match interrupted_as_idle(self.socket.poll(zmq::POLLIN, timeout_ms))? {
            None | Some(0) => return Ok(None),
            Some(_) => {}
        }
        let Some(mut frames) = interrupted_as_idle(self.socket.recv_multipart(0))? else {
            return Ok(None);
        };
        if frames.len() != 2 {
            warn!(parts = frames.len(), "discarding malformed multipart message");
            return Err(TransportError::Framing {
                parts: frames.len(),
            });
        }
        let payload = frames.pop().unwrap_or_default();
        let topic = frames.pop().unwrap_or_default();
        Ok(Some(Message { topic, payload }))
    }
}
