//! Example remote controller.
//!
//! Subscribes to the bridge's combined output topic, feeds one measured
//! output through a [`Pid`], and publishes the result on one input topic.
//! All controller memory is an explicit [`PidState`]; a rewind in sample
//! time (the bridge was reset) clears it.

use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use cosim_bus::{Endpoint, Publisher, Subscriber, TransportError};
use cosim_engine::{ShutdownSignal, TopicScheme, TIME_KEY};
use cosim_models::{Pid, PidGains, PidOutput, PidState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::setup::SetupError;

// ── ControllerConfig ─────────────────────────────────────────────

/// `[controller]`: setpoint, gains, wiring, and endpoints.
///
/// Defaults regulate `x` to zero with `u = 3·e + 0.5·ė`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Desired value of the measured output.
    pub target: f64,
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain.
    pub ki: f64,
    /// Derivative gain.
    pub kd: f64,
    /// Output variable read from each combined sample.
    pub measurement: String,
    /// Input variable the control signal is written to.
    pub actuation: String,
    /// Where the bridge publishes (the controller subscribes here).
    pub subscribe: Endpoint,
    /// Where the bridge listens (the controller publishes here).
    pub publish: Endpoint,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            target: 0.0,
            kp: 3.0,
            ki: 0.0,
            kd: 0.5,
            measurement: "x".into(),
            actuation: "u".into(),
            subscribe: Endpoint::connect("tcp://localhost:7000"),
            publish: Endpoint::bind("tcp://*:7001"),
        }
    }
}

impl ControllerConfig {
    /// The PID described by this section.
    pub fn pid(&self) -> Pid {
        Pid::new(self.target, PidGains::new(self.kp, self.ki, self.kd))
    }
}

/// The parts of a scenario file a controller reads. Other tables are
/// ignored, so one file can describe both sides.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ControllerScenario {
    /// `[controller]`.
    #[serde(default)]
    pub controller: ControllerConfig,
    /// `[topics]`, so both sides agree on topic names.
    #[serde(default)]
    pub topics: TopicScheme,
}

impl ControllerScenario {
    /// Read the controller side of a scenario file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SetupError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| {
            SetupError::Scenario(cosim_engine::ScenarioError::Io {
                path: path.to_path_buf(),
                source,
            })
        })?;
        toml::from_str(&text).map_err(|source| {
            SetupError::Scenario(cosim_engine::ScenarioError::Parse {
                path: Some(path.to_path_buf()),
                source,
            })
        })
    }
}

// ── SampleError ──────────────────────────────────────────────────

/// A combined sample could not be used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SampleError {
    /// The payload is not a JSON object.
    NotAnObject,
    /// A required key is absent.
    MissingField {
        /// The key.
        name: String,
    },
    /// A required key is not a finite number (`null` included).
    NotANumber {
        /// The key.
        name: String,
    },
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "sample is not a JSON object"),
            Self::MissingField { name } => write!(f, "sample has no '{name}'"),
            Self::NotANumber { name } => write!(f, "sample '{name}' is not a finite number"),
        }
    }
}

impl Error for SampleError {}

fn number(sample: &serde_json::Map<String, Value>, name: &str) -> Result<f64, SampleError> {
    let value = sample.get(name).ok_or_else(|| SampleError::MissingField {
        name: name.to_string(),
    })?;
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| SampleError::NotANumber {
            name: name.to_string(),
        })
}

// ── ClosedLoop ───────────────────────────────────────────────────

/// What one sample produced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SampleOutcome {
    /// A new control signal.
    Command(PidOutput),
    /// Same sample time as the previous one; nothing to do.
    Stale,
}

/// Sample-to-command logic, independent of any socket.
#[derive(Clone, Debug)]
pub struct ClosedLoop {
    pid: Pid,
    state: PidState,
    measurement: String,
    last_time: Option<f64>,
}

impl ClosedLoop {
    /// A loop feeding `measurement` through `pid`.
    pub fn new(pid: Pid, measurement: impl Into<String>) -> Self {
        Self {
            pid,
            state: PidState::new(),
            measurement: measurement.into(),
            last_time: None,
        }
    }

    /// Current controller memory.
    pub fn state(&self) -> &PidState {
        &self.state
    }

    /// Handle one combined-output payload.
    ///
    /// `dt` is the difference between consecutive sample times. Repeated
    /// samples of the same step are skipped; a sample older than the last
    /// one means the bridge was reset, and the controller state is cleared.
    pub fn on_sample(&mut self, payload: &[u8]) -> Result<SampleOutcome, SampleError> {
        let Ok(Value::Object(sample)) = serde_json::from_slice::<Value>(payload) else {
            return Err(SampleError::NotAnObject);
        };
        let time = number(&sample, TIME_KEY)?;
        let measured = number(&sample, &self.measurement)?;

        let dt = match self.last_time {
            Some(prev) if time == prev => return Ok(SampleOutcome::Stale),
            Some(prev) if time < prev => {
                debug!(time, prev, "sample time went backwards; clearing controller state");
                self.state.clear();
                0.0
            }
            Some(prev) => time - prev,
            None => 0.0,
        };
        self.last_time = Some(time);
        Ok(SampleOutcome::Command(
            self.pid.update(&mut self.state, measured, dt),
        ))
    }
}

// ── Running ──────────────────────────────────────────────────────

/// Counters returned when the controller stops.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControllerReport {
    /// Combined samples received.
    pub samples: u64,
    /// Commands published.
    pub commands: u64,
    /// Samples skipped as repeats.
    pub stale: u64,
    /// Samples that could not be used.
    pub rejected: u64,
}

/// Run `control` against a bridge until `shutdown` fires, `max_commands`
/// commands have been sent, or a transport fails.
///
/// With `reset` set, a reset request is published before the first
/// sample is read.
#[allow(clippy::too_many_arguments)]
pub fn run<P, S>(
    control: &mut ClosedLoop,
    topics: &TopicScheme,
    actuation: &str,
    publisher: &mut P,
    subscriber: &mut S,
    shutdown: &ShutdownSignal,
    reset: bool,
    max_commands: Option<u64>,
) -> Result<ControllerReport, TransportError>
where
    P: Publisher + ?Sized,
    S: Subscriber + ?Sized,
{
    let combined = topics.combined.as_bytes();
    let command_topic = topics.input_topic(actuation);
    let mut report = ControllerReport::default();

    if reset {
        publisher.publish(topics.reset.as_bytes(), b"")?;
        info!("reset requested");
    }

    while !shutdown.is_triggered() {
        if max_commands.is_some_and(|max| report.commands >= max) {
            break;
        }
        let msg = match subscriber.poll(Duration::from_millis(50)) {
            Ok(Some(msg)) => msg,
            Ok(None) => continue,
            Err(TransportError::Framing { parts }) => {
                warn!(parts, "dropping message with unexpected frame count");
                continue;
            }
            Err(e) => return Err(e),
        };
        if msg.topic != combined {
            continue;
        }
        report.samples += 1;
        match control.on_sample(&msg.payload) {
            Ok(SampleOutcome::Command(out)) => {
                publisher.publish(command_topic.as_bytes(), out.u.to_string().as_bytes())?;
                report.commands += 1;
                debug!(u = out.u, error = out.error, "command sent");
            }
            Ok(SampleOutcome::Stale) => report.stale += 1,
            Err(e) => {
                report.rejected += 1;
                warn!(error = %e, "ignoring unusable sample");
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_bus::MemoryBus;
    use cosim_engine::shutdown_channel;
    use proptest::prelude::*;

    fn pd() -> ClosedLoop {
        ClosedLoop::new(ControllerConfig::default().pid(), "x")
    }

    fn command(outcome: Result<SampleOutcome, SampleError>) -> PidOutput {
        match outcome {
            Ok(SampleOutcome::Command(out)) => out,
            other => panic!("expected Command, got {other:?}"),
        }
    }

    #[test]
    fn first_sample_is_proportional_only() {
        let mut c = pd();
        let out = command(c.on_sample(br#"{"t":0.0,"x":2.0}"#));
        assert_eq!(out.error, -2.0);
        assert_eq!(out.u, -6.0);
    }

    #[test]
    fn derivative_uses_sample_spacing() {
        let mut c = pd();
        command(c.on_sample(br#"{"t":1.0,"x":2.0}"#));
        let out = command(c.on_sample(br#"{"t":1.5,"x":1.0}"#));
        // e: -2 → -1 over 0.5 s, so ė = 2.
        assert!((out.u - (3.0 * -1.0 + 0.5 * 2.0)).abs() < 1e-12);
    }

    #[test]
    fn repeated_sample_is_stale() {
        let mut c = pd();
        command(c.on_sample(br#"{"t":1.0,"x":2.0}"#));
        assert_eq!(
            c.on_sample(br#"{"t":1.0,"x":2.0}"#),
            Ok(SampleOutcome::Stale)
        );
    }

    #[test]
    fn rewind_clears_state() {
        let mut c = ClosedLoop::new(Pid::new(1.0, PidGains::new(1.0, 1.0, 0.0)), "x");
        command(c.on_sample(br#"{"t":0.0,"x":0.0}"#));
        command(c.on_sample(br#"{"t":1.0,"x":0.0}"#));
        assert_eq!(c.state().integral, 1.0);
        let out = command(c.on_sample(br#"{"t":0.0,"x":0.0}"#));
        assert_eq!(c.state().integral, 0.0);
        assert_eq!(out.u, 1.0);
    }

    #[test]
    fn unusable_samples_are_rejected() {
        let mut c = pd();
        assert_eq!(c.on_sample(b"[1,2]"), Err(SampleError::NotAnObject));
        assert_eq!(c.on_sample(b"not json"), Err(SampleError::NotAnObject));
        assert!(matches!(
            c.on_sample(br#"{"x":1.0}"#),
            Err(SampleError::MissingField { .. })
        ));
        assert!(matches!(
            c.on_sample(br#"{"t":0.0,"x":null}"#),
            Err(SampleError::NotANumber { .. })
        ));
    }

    #[test]
    fn config_defaults_and_overrides() {
        let scenario: ControllerScenario = toml::from_str(
            r#"
            [model]
            source = "ignored"

            [controller]
            target = 10.0
            kp = 10.0
            ki = 1.0
            kd = 2.0
            "#,
        )
        .unwrap();
        let c = &scenario.controller;
        assert_eq!(c.pid(), Pid::new(10.0, PidGains::new(10.0, 1.0, 2.0)));
        assert_eq!(c.measurement, "x");
        assert_eq!(c.subscribe, Endpoint::connect("tcp://localhost:7000"));
        assert_eq!(scenario.topics, TopicScheme::default());

        let empty: ControllerScenario = toml::from_str("").unwrap();
        assert_eq!(empty.controller, ControllerConfig::default());
    }

    #[test]
    fn run_answers_each_new_sample() {
        let bridge_out = MemoryBus::new();
        let bridge_in = MemoryBus::new();
        let mut samples = bridge_out.subscribe(["output"]);
        let mut commands = bridge_in.subscribe(["input/", "reset"]);
        let mut feed = bridge_out.publisher();
        let mut out = bridge_in.publisher();
        let (_trigger, signal) = shutdown_channel();

        feed.publish(b"output", br#"{"t":0.0,"x":1.0}"#).unwrap();
        feed.publish(b"output/x", b"1.0").unwrap();
        feed.publish(b"output", br#"{"t":0.0,"x":1.0}"#).unwrap();
        feed.publish(b"output", br#"{"t":0.1,"x":0.5}"#).unwrap();

        let mut c = pd();
        let report = run(
            &mut c,
            &TopicScheme::default(),
            "u",
            &mut out,
            &mut samples,
            &signal,
            true,
            Some(2),
        )
        .unwrap();
        assert_eq!(report.commands, 2);
        assert_eq!(report.stale, 1);

        let sent = commands.drain();
        assert_eq!(sent[0].topic, b"reset");
        assert_eq!(sent[1].topic, b"input/u");
        assert_eq!(sent[1].payload, b"-3");
        assert_eq!(sent.len(), 3);
    }

    proptest! {
        #[test]
        fn one_command_per_new_sample_time(times in prop::collection::vec(0u8..20, 1..40)) {
            let mut c = pd();
            let mut expected = 0;
            let mut commands = 0;
            let mut prev = None;
            for t in times {
                if prev != Some(t) {
                    expected += 1;
                }
                prev = Some(t);
                let payload = format!(r#"{{"t":{},"x":1.0}}"#, f64::from(t) / 10.0);
                if let Ok(SampleOutcome::Command(out)) = c.on_sample(payload.as_bytes()) {
                    prop_assert!(out.u.is_finite());
                    commands += 1;
                }
            }
            prop_assert_eq!(commands, expected);
        }
    }
}
