//! Stepping, routing, and the threaded runtime of the cosim bridge.
//!
//! A [`ModelStepper`] owns one model instance and its simulation time.
//! A [`TopicRouter`] maps variables to topics. The [`Bridge`] runs three
//! threads around them: a [`SimulationClock`] that advances the model at a
//! fixed step, an [`InputGateway`] that turns inbound messages into
//! buffered input writes, and an [`OutputPublisher`] that samples the
//! latest snapshot on its own period.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bridge;
pub mod clock;
pub mod config;
pub mod gateway;
pub mod pending;
pub mod publisher;
pub mod router;
pub mod shutdown;
pub mod snapshot;
pub mod stepper;

pub use bridge::{Bridge, BridgeOptions, ShutdownReport, DEFAULT_POLL_INTERVAL};
pub use clock::{ClockOutcome, ClockReport, SimulationClock};
pub use config::{
    ClockConfig, ConfigError, ModelConfig, Pacing, PublishConfig, ScenarioConfig, ScenarioError,
    TransportConfig,
};
pub use gateway::{decode_scalar, Disposition, GatewayExit, GatewayReport, InputGateway, PayloadError};
pub use pending::{InputMailbox, MailboxDrain, PendingInputs};
pub use publisher::{OutputPublisher, PublisherExit, PublisherReport};
pub use router::{Route, TopicRouter, TopicScheme, TIME_KEY};
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use snapshot::LatestSnapshot;
pub use stepper::{ModelStepper, OutputSnapshot};
