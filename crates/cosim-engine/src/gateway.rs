//! Inbound message handling: decode, route, and buffer.
//!
//! The [`InputGateway`] consumes one message at a time in arrival order.
//! Input writes go into the shared [`InputMailbox`]; a reset request
//! discards the writes buffered before it. The gateway never touches the
//! model directly, so a slow step can never stall the socket.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cosim_bus::{Message, Subscriber, TransportError};
use cosim_core::VarId;
use tracing::{debug, error, info, trace, warn};

use crate::pending::InputMailbox;
use crate::router::{Route, TopicRouter};
use crate::shutdown::ShutdownSignal;

// ── PayloadError ───────────────────────────────────────────────────

/// An inbound scalar payload could not be decoded (`MalformedPayload`).
///
/// Recoverable: the message is dropped and the gateway keeps running.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayloadError {
    /// The payload is not valid UTF-8.
    NotUtf8,
    /// The payload is empty or whitespace.
    Empty,
    /// The text is not a number.
    NotANumber {
        /// The offending text, truncated for logging.
        text: String,
    },
    /// The number is NaN or infinite.
    NonFinite {
        /// The offending text.
        text: String,
    },
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotUtf8 => write!(f, "payload is not valid UTF-8"),
            Self::Empty => write!(f, "payload is empty"),
            Self::NotANumber { text } => write!(f, "payload '{text}' is not a number"),
            Self::NonFinite { text } => write!(f, "payload '{text}' is not finite"),
        }
    }
}

impl Error for PayloadError {}

const MAX_LOGGED_PAYLOAD: usize = 64;

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(MAX_LOGGED_PAYLOAD) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Decode a scalar payload into a finite `f64`.
///
/// Accepts plain decimal or exponent notation with surrounding whitespace
/// (`1.5`, ` -3e2 `), and the same wrapped as a JSON string (`"1.5"`).
pub fn decode_scalar(payload: &[u8]) -> Result<f64, PayloadError> {
    let text = std::str::from_utf8(payload).map_err(|_| PayloadError::NotUtf8)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PayloadError::Empty);
    }

    let unquoted;
    let number = if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        unquoted = serde_json::from_str::<String>(trimmed).map_err(|_| PayloadError::NotANumber {
            text: excerpt(trimmed),
        })?;
        unquoted.trim()
    } else {
        trimmed
    };
    if number.is_empty() {
        return Err(PayloadError::Empty);
    }

    let value: f64 = number.parse().map_err(|_| PayloadError::NotANumber {
        text: excerpt(number),
    })?;
    if !value.is_finite() {
        return Err(PayloadError::NonFinite {
            text: excerpt(number),
        });
    }
    Ok(value)
}

// ── Disposition ────────────────────────────────────────────────────

/// What the gateway did with one message.
#[derive(Clone, Debug, PartialEq)]
pub enum Disposition {
    /// The value was buffered for the input.
    Staged {
        /// Target input.
        id: VarId,
        /// Decoded value.
        value: f64,
    },
    /// A reset was requested.
    Reset,
    /// The topic has no inbound meaning.
    Ignored,
    /// The payload could not be decoded; nothing changed.
    Malformed(PayloadError),
}

/// Why the gateway loop ended.
#[derive(Clone, Debug, PartialEq)]
pub enum GatewayExit {
    /// The shutdown signal fired.
    Shutdown,
    /// The subscriber failed.
    Transport(TransportError),
}

/// Counters returned when the gateway loop ends.
#[derive(Clone, Debug, PartialEq)]
pub struct GatewayReport {
    /// Input writes buffered.
    pub applied: u64,
    /// Reset requests.
    pub resets: u64,
    /// Messages dropped for undecodable payloads or framing.
    pub malformed: u64,
    /// Messages on topics with no inbound meaning.
    pub ignored: u64,
    /// Why the loop ended.
    pub exit: GatewayExit,
}

// ── InputGateway ───────────────────────────────────────────────────

/// Routes inbound messages into an [`InputMailbox`].
pub struct InputGateway {
    router: Arc<TopicRouter>,
    mailbox: Arc<InputMailbox>,
    applied: u64,
    resets: u64,
    malformed: u64,
    ignored: u64,
}

impl InputGateway {
    /// A gateway writing into `mailbox`.
    pub fn new(router: Arc<TopicRouter>, mailbox: Arc<InputMailbox>) -> Self {
        Self {
            router,
            mailbox,
            applied: 0,
            resets: 0,
            malformed: 0,
            ignored: 0,
        }
    }

    /// Handle one message.
    pub fn handle(&mut self, msg: &Message) -> Disposition {
        match self.router.resolve(&msg.topic) {
            Route::Input(id) => match decode_scalar(&msg.payload) {
                Ok(value) => {
                    self.mailbox.write(id, value);
                    self.applied += 1;
                    trace!(input = self.router.name(id), value, "input buffered");
                    Disposition::Staged { id, value }
                }
                Err(e) => {
                    self.malformed += 1;
                    warn!(topic = %msg.topic_lossy(), error = %e, "dropping malformed payload");
                    Disposition::Malformed(e)
                }
            },
            Route::Reset => {
                self.mailbox.request_reset();
                self.resets += 1;
                info!("reset requested");
                Disposition::Reset
            }
            Route::Output(_) | Route::CombinedOutput | Route::Unrecognized => {
                self.ignored += 1;
                debug!(topic = %msg.topic_lossy(), "ignoring message on non-inbound topic");
                Disposition::Ignored
            }
        }
    }

    /// Receive and handle messages until `shutdown` fires or the
    /// subscriber fails.
    ///
    /// The subscriber is polled in slices of `poll_interval` so that an
    /// idle socket still notices shutdown. A frame-count error affects
    /// only that message; any other transport error ends the loop.
    pub fn run<S: Subscriber + ?Sized>(
        mut self,
        subscriber: &mut S,
        shutdown: &ShutdownSignal,
        poll_interval: Duration,
    ) -> GatewayReport {
        let exit = loop {
            if shutdown.is_triggered() {
                break GatewayExit::Shutdown;
            }
            match subscriber.poll(poll_interval) {
                Ok(Some(msg)) => {
                    self.handle(&msg);
                }
                Ok(None) => {}
                Err(TransportError::Framing { parts }) => {
                    self.malformed += 1;
                    warn!(parts, "dropping message with unexpected frame count");
                }
                Err(e) => {
                    error!(error = %e, "inbound transport failed; gateway stopping");
                    break GatewayExit::Transport(e);
                }
            }
        };
        self.report(exit)
    }

    /// Counters so far, tagged with `exit`.
    pub fn report(&self, exit: GatewayExit) -> GatewayReport {
        GatewayReport {
            applied: self.applied,
            resets: self.resets,
            malformed: self.malformed,
            ignored: self.ignored,
            exit,
        }
    }
}
