//! Scenario → running bridge.
//!
//! Resolves the model named by a scenario, instantiates it, builds the
//! topic table, and starts a [`Bridge`] over either in-memory or ZeroMQ
//! transports.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use cosim_bus::{MemoryBus, TransportError};
use cosim_engine::{
    shutdown_channel, Bridge, BridgeOptions, ConfigError, ModelConfig, ModelStepper,
    ScenarioConfig, ScenarioError, ShutdownSignal, TopicRouter, TopicScheme,
};
use cosim_models::CatalogError;
use tracing::info;

use crate::offline::OfflineError;

// ── SetupError ───────────────────────────────────────────────────

/// Anything that can go wrong between reading a scenario and having a
/// running bridge.
#[derive(Debug)]
pub enum SetupError {
    /// The scenario file could not be read or parsed.
    Scenario(ScenarioError),
    /// The model source is not in the catalog.
    Catalog(CatalogError),
    /// The configuration was rejected.
    Config(ConfigError),
    /// A socket could not be opened.
    Transport(TransportError),
    /// The offline runner failed.
    Offline(OfflineError),
    /// An output file could not be written.
    Io {
        /// The file path, when there is one.
        path: Option<PathBuf>,
        /// The underlying error.
        source: std::io::Error,
    },
    /// A bounded run was requested without a stop time.
    MissingStopTime,
    /// The interrupt handler could not be installed.
    Signal(ctrlc::Error),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scenario(e) => write!(f, "scenario: {e}"),
            Self::Catalog(e) => write!(f, "model: {e}"),
            Self::Config(e) => write!(f, "configuration: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Offline(e) => write!(f, "offline run: {e}"),
            Self::Io {
                path: Some(path),
                source,
            } => write!(f, "writing {}: {source}", path.display()),
            Self::Io { path: None, source } => write!(f, "writing output: {source}"),
            Self::MissingStopTime => {
                write!(f, "no stop time: set clock.stop_time or pass --stop-time")
            }
            Self::Signal(e) => write!(f, "installing interrupt handler: {e}"),
        }
    }
}

impl Error for SetupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Scenario(e) => Some(e),
            Self::Catalog(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Transport(e) => Some(e),
            Self::Offline(e) => Some(e),
            Self::Io { source, .. } => Some(source),
            Self::MissingStopTime => None,
            Self::Signal(e) => Some(e),
        }
    }
}

impl From<ScenarioError> for SetupError {
    fn from(e: ScenarioError) -> Self {
        Self::Scenario(e)
    }
}

impl From<CatalogError> for SetupError {
    fn from(e: CatalogError) -> Self {
        Self::Catalog(e)
    }
}

impl From<ConfigError> for SetupError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<TransportError> for SetupError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<OfflineError> for SetupError {
    fn from(e: OfflineError) -> Self {
        Self::Offline(e)
    }
}

// ── Building blocks ──────────────────────────────────────────────

/// Load and instantiate the model a scenario names.
pub fn build_stepper(model: &ModelConfig) -> Result<ModelStepper, SetupError> {
    let engine = cosim_models::load(&model.source)?;
    let stepper = ModelStepper::new(engine, model.start_time, &model.parameters)?;
    info!(
        model = stepper.model_name(),
        start_time = model.start_time,
        parameters = model.parameters.len(),
        "model loaded"
    );
    Ok(stepper)
}

/// The topic table for `stepper`'s variables.
pub fn build_router(
    stepper: &ModelStepper,
    scheme: &TopicScheme,
) -> Result<Arc<TopicRouter>, SetupError> {
    let router = TopicRouter::new(Arc::clone(stepper.registry()), scheme.clone())?;
    Ok(Arc::new(router))
}

/// Model and topic table for a validated scenario.
pub fn prepare(config: &ScenarioConfig) -> Result<(ModelStepper, Arc<TopicRouter>), SetupError> {
    config.validate()?;
    let stepper = build_stepper(&config.model)?;
    let router = build_router(&stepper, &config.topics)?;
    Ok((stepper, router))
}

/// Start a bridge for `config` over in-process buses.
///
/// The bridge publishes on `outbound` and subscribes on `inbound`.
pub fn start_memory_bridge(
    config: &ScenarioConfig,
    outbound: &MemoryBus,
    inbound: &MemoryBus,
) -> Result<Bridge, SetupError> {
    let (stepper, router) = prepare(config)?;
    let subscriber = inbound.subscribe(router.subscriptions().to_vec());
    let bridge = Bridge::start(
        stepper,
        router,
        BridgeOptions::from_scenario(config),
        outbound.publisher(),
        subscriber,
    )?;
    Ok(bridge)
}

/// Start a bridge for `config` over ZeroMQ sockets on the configured
/// endpoints.
#[cfg(feature = "zmq")]
pub fn start_zmq_bridge(config: &ScenarioConfig, ctx: &zmq::Context) -> Result<Bridge, SetupError> {
    use cosim_bus::zmq::{ZmqPublisher, ZmqSubscriber};

    let (stepper, router) = prepare(config)?;
    let publisher = ZmqPublisher::open(ctx, &config.transport.outbound)?;
    let subscriber = ZmqSubscriber::open(ctx, &config.transport.inbound, router.subscriptions())?;
    info!(
        outbound = %config.transport.outbound,
        inbound = %config.transport.inbound,
        "zmq transports open"
    );
    let bridge = Bridge::start(
        stepper,
        router,
        BridgeOptions::from_scenario(config),
        publisher,
        subscriber,
    )?;
    Ok(bridge)
}

/// A signal that fires on the first Ctrl-C (or SIGTERM).
///
/// Installs a process-wide handler, so call at most once.
pub fn interrupt_signal() -> Result<ShutdownSignal, SetupError> {
    let (mut trigger, signal) = shutdown_channel();
    ctrlc::set_handler(move || {
        if !trigger.is_triggered() {
            info!("interrupt received; shutting down");
        }
        trigger.trigger();
    })
    .map_err(SetupError::Signal)?;
    Ok(signal)
}
