//! Scenario configuration, validation, and error types.
//!
//! A [`ScenarioConfig`] is one TOML document describing which model to
//! run, how to step it, how often to publish, and where the sockets live.
//! [`validate()`](ScenarioConfig::validate) checks every structural
//! invariant before any thread starts; model-dependent checks (parameter
//! names, topic collisions) happen when the stepper and router are built.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cosim_bus::Endpoint;
use cosim_core::{EngineError, RegistryError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::router::TopicScheme;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while validating a scenario or assembling a bridge.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// The model's variable metadata is inconsistent.
    Registry(RegistryError),
    /// The model could not be instantiated at startup.
    Engine(EngineError),
    /// A configured parameter is not a parameter of the model.
    UnknownParameter {
        /// The configured name.
        name: String,
    },
    /// A configured parameter value is NaN or infinite.
    NonFiniteParameter {
        /// The parameter name.
        name: String,
        /// The invalid value.
        value: f64,
    },
    /// Two distinct routes map to the same wire topic.
    TopicCollision {
        /// The shared topic.
        topic: String,
        /// Owner of the topic registered first.
        first: String,
        /// Owner of the colliding topic.
        second: String,
    },
    /// An output variable uses a name reserved by the combined snapshot.
    ReservedOutputName {
        /// The offending name.
        name: String,
    },
    /// The topic scheme itself is unusable.
    InvalidTopicScheme {
        /// Description of the problem.
        reason: String,
    },
    /// `start_time` is NaN or infinite.
    InvalidStartTime {
        /// The invalid value.
        value: f64,
    },
    /// `step_size` is NaN, infinite, zero, or negative.
    InvalidStepSize {
        /// The invalid value.
        value: f64,
    },
    /// `stop_time` is not finite or does not lie after `start_time`.
    InvalidStopTime {
        /// The configured stop time.
        stop_time: f64,
        /// The configured start time.
        start_time: f64,
    },
    /// `publish.period` is NaN, infinite, zero, or negative.
    InvalidPublishPeriod {
        /// The invalid value.
        value: f64,
    },
    /// A transport endpoint is unusable.
    InvalidEndpoint {
        /// Description of the problem.
        reason: String,
    },
    /// The router was built from a different registry than the stepper's.
    RegistryMismatch,
    /// A background thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry(e) => write!(f, "model metadata: {e}"),
            Self::Engine(e) => write!(f, "model startup: {e}"),
            Self::UnknownParameter { name } => {
                write!(f, "'{name}' is not a parameter of the model")
            }
            Self::NonFiniteParameter { name, value } => {
                write!(f, "parameter '{name}' must be finite, got {value}")
            }
            Self::TopicCollision {
                topic,
                first,
                second,
            } => write!(f, "topic '{topic}' is claimed by both {first} and {second}"),
            Self::ReservedOutputName { name } => write!(
                f,
                "output '{name}' clashes with the time key of the combined snapshot"
            ),
            Self::InvalidTopicScheme { reason } => write!(f, "invalid topic scheme: {reason}"),
            Self::InvalidStartTime { value } => {
                write!(f, "start_time must be finite, got {value}")
            }
            Self::InvalidStepSize { value } => {
                write!(f, "step_size must be finite and positive, got {value}")
            }
            Self::InvalidStopTime {
                stop_time,
                start_time,
            } => write!(
                f,
                "stop_time must be finite and after start_time {start_time}, got {stop_time}"
            ),
            Self::InvalidPublishPeriod { value } => {
                write!(f, "publish period must be finite and at least 1 ns, got {value}")
            }
            Self::InvalidEndpoint { reason } => write!(f, "invalid endpoint: {reason}"),
            Self::RegistryMismatch => {
                write!(f, "topic router and stepper were built from different models")
            }
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registry(e) => Some(e),
            Self::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RegistryError> for ConfigError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<EngineError> for ConfigError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

// ── ScenarioError ──────────────────────────────────────────────────

/// Errors loading a scenario file.
#[derive(Debug)]
pub enum ScenarioError {
    /// The file could not be read.
    Io {
        /// The scenario path.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },
    /// The document is not valid TOML or does not match the schema.
    Parse {
        /// The scenario path, if loaded from disk.
        path: Option<PathBuf>,
        /// The underlying parse error.
        source: toml::de::Error,
    },
    /// The document parsed but failed validation.
    Invalid(ConfigError),
}

impl fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "reading {}: {source}", path.display()),
            Self::Parse {
                path: Some(path),
                source,
            } => write!(f, "parsing {}: {source}", path.display()),
            Self::Parse { path: None, source } => write!(f, "parsing scenario: {source}"),
            Self::Invalid(e) => write!(f, "invalid scenario: {e}"),
        }
    }
}

impl Error for ScenarioError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(e) => Some(e),
        }
    }
}

impl From<ConfigError> for ScenarioError {
    fn from(e: ConfigError) -> Self {
        Self::Invalid(e)
    }
}

// ── Sections ───────────────────────────────────────────────────────

/// `[model]`: what to run and how to initialize it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Model source, resolved by the caller (e.g. a catalog name).
    pub source: String,
    /// Simulation time at instantiation and after every reset. Default: 0.
    #[serde(default)]
    pub start_time: f64,
    /// Parameter values applied at instantiation and every reset, in order.
    #[serde(default)]
    pub parameters: IndexMap<String, f64>,
}

/// How the clock relates simulation time to wall-clock time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    /// Sleep `dt` minus processing time after each step.
    #[default]
    Realtime,
    /// Step as fast as possible.
    Unpaced,
}

/// `[clock]`: step size, stop condition, and pacing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    /// Simulation seconds per step. Default: 0.1.
    pub step_size: f64,
    /// Simulation time at which stepping stops. `None` runs unbounded.
    pub stop_time: Option<f64>,
    /// Wall-clock pacing. Default: realtime.
    pub pacing: Pacing,
    /// Keep serving inputs and resets after reaching `stop_time` instead
    /// of ending the clock. Default: true.
    pub hold_at_stop: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            step_size: 0.1,
            stop_time: None,
            pacing: Pacing::Realtime,
            hold_at_stop: true,
        }
    }
}

/// `[publish]`: output sampling period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    /// Wall-clock seconds between publications. Default: 0.01.
    pub period: f64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self { period: 0.01 }
    }
}

impl PublishConfig {
    /// The period as a `Duration`. Only meaningful after validation.
    pub fn period_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.period).unwrap_or(Duration::MAX)
    }
}

fn default_outbound() -> Endpoint {
    Endpoint::bind("tcp://*:7000")
}

fn default_inbound() -> Endpoint {
    Endpoint::connect("tcp://localhost:7001")
}

/// `[transport]`: where the bridge publishes and listens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Endpoint of the outbound PUB socket. Default: bind `tcp://*:7000`.
    #[serde(default = "default_outbound")]
    pub outbound: Endpoint,
    /// Endpoint of the inbound SUB socket. Default: connect `tcp://localhost:7001`.
    #[serde(default = "default_inbound")]
    pub inbound: Endpoint,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            outbound: default_outbound(),
            inbound: default_inbound(),
        }
    }
}

// ── ScenarioConfig ─────────────────────────────────────────────────

/// A complete bridge deployment description.
///
/// Unknown top-level tables are ignored so that client tools can keep
/// their own sections (e.g. `[controller]`) in the same file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Model selection and initialization.
    pub model: ModelConfig,
    /// Stepping loop settings.
    #[serde(default)]
    pub clock: ClockConfig,
    /// Publication settings.
    #[serde(default)]
    pub publish: PublishConfig,
    /// Socket endpoints.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Topic naming.
    #[serde(default)]
    pub topics: TopicScheme,
}

impl ScenarioConfig {
    /// Read, parse, and validate a scenario file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ScenarioError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a scenario held in memory.
    pub fn from_toml_str(text: &str) -> Result<Self, ScenarioError> {
        let config: Self =
            toml::from_str(text).map_err(|source| ScenarioError::Parse { path: None, source })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all structural invariants.
    ///
    /// Model-dependent checks are deferred to
    /// [`ModelStepper::new`](crate::ModelStepper::new) and
    /// [`TopicRouter::new`](crate::TopicRouter::new).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let start = self.model.start_time;
        if !start.is_finite() {
            return Err(ConfigError::InvalidStartTime { value: start });
        }
        for (name, &value) in &self.model.parameters {
            if !value.is_finite() {
                return Err(ConfigError::NonFiniteParameter {
                    name: name.clone(),
                    value,
                });
            }
        }

        let dt = self.clock.step_size;
        if !dt.is_finite() || dt <= 0.0 {
            return Err(ConfigError::InvalidStepSize { value: dt });
        }
        if let Some(stop) = self.clock.stop_time {
            if !stop.is_finite() || stop <= start {
                return Err(ConfigError::InvalidStopTime {
                    stop_time: stop,
                    start_time: start,
                });
            }
        }

        let period = self.publish.period;
        let usable = Duration::try_from_secs_f64(period).is_ok_and(|d| !d.is_zero());
        if !period.is_finite() || period <= 0.0 || !usable {
            return Err(ConfigError::InvalidPublishPeriod { value: period });
        }

        for (label, endpoint) in [
            ("outbound", &self.transport.outbound),
            ("inbound", &self.transport.inbound),
        ] {
            if endpoint.address.trim().is_empty() {
                return Err(ConfigError::InvalidEndpoint {
                    reason: format!("{label} address is empty"),
                });
            }
        }
        if self.transport.outbound == self.transport.inbound
            && self.transport.outbound.role == cosim_bus::SocketRole::Bind
        {
            return Err(ConfigError::InvalidEndpoint {
                reason: format!(
                    "inbound and outbound both bind {}",
                    self.transport.outbound.address
                ),
            });
        }

        self.topics.validate()
    }
}
