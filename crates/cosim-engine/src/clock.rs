//! The stepping loop.
//!
//! The [`SimulationClock`] owns the [`ModelStepper`] for the lifetime of
//! the loop. Each iteration drains the input mailbox, advances the model
//! by one fixed step, stores a fresh snapshot, and (when paced) sleeps the
//! remainder of the step budget. The stepper is handed back on exit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cosim_core::{EngineError, StepError};
use tracing::{debug, error, info, warn};

use crate::config::{ClockConfig, ConfigError, Pacing};
use crate::pending::InputMailbox;
use crate::shutdown::ShutdownSignal;
use crate::snapshot::LatestSnapshot;
use crate::stepper::ModelStepper;

/// How long an idle clock waits between mailbox checks.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Why the clock loop ended.
#[derive(Clone, Debug, PartialEq)]
pub enum ClockOutcome {
    /// The stop time was reached (and, when holding, shutdown followed).
    Completed,
    /// Shutdown fired before the stop time.
    Shutdown,
    /// A step failed. Stepping stopped; it is not retried.
    Failed(StepError),
    /// A reset could not rebuild the model.
    Fatal(EngineError),
}

/// Summary returned when the clock loop ends.
#[derive(Clone, Debug, PartialEq)]
pub struct ClockReport {
    /// Successful advances, across resets.
    pub steps: u64,
    /// Resets applied.
    pub resets: u64,
    /// Simulation time at exit.
    pub final_time: f64,
    /// Why the loop ended.
    pub outcome: ClockOutcome,
}

/// Fixed-step driver for one [`ModelStepper`].
pub struct SimulationClock {
    stepper: ModelStepper,
    mailbox: Arc<InputMailbox>,
    latest: Arc<LatestSnapshot>,
    dt: f64,
    budget: Duration,
    stop_time: Option<f64>,
    pacing: Pacing,
    hold_at_stop: bool,
    steps: u64,
    resets: u64,
}

impl SimulationClock {
    /// A clock driving `stepper` with the settings in `config`.
    pub fn new(
        stepper: ModelStepper,
        mailbox: Arc<InputMailbox>,
        latest: Arc<LatestSnapshot>,
        config: &ClockConfig,
    ) -> Result<Self, ConfigError> {
        let dt = config.step_size;
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ConfigError::InvalidStepSize { value: dt });
        }
        // Sub-nanosecond steps get a zero budget: realtime pacing never sleeps.
        let budget = Duration::try_from_secs_f64(dt).unwrap_or(Duration::MAX);
        if let Some(stop) = config.stop_time {
            if !stop.is_finite() || stop <= stepper.start_time() {
                return Err(ConfigError::InvalidStopTime {
                    stop_time: stop,
                    start_time: stepper.start_time(),
                });
            }
        }
        Ok(Self {
            stepper,
            mailbox,
            latest,
            dt,
            budget,
            stop_time: config.stop_time,
            pacing: config.pacing,
            hold_at_stop: config.hold_at_stop,
            steps: 0,
            resets: 0,
        })
    }

    /// Whether the next step would pass the stop time.
    ///
    /// Stepping continues while `time + dt/2 < stop`, so accumulated
    /// rounding never adds or drops a step.
    fn at_stop(&self) -> bool {
        self.stop_time
            .is_some_and(|stop| !(self.stepper.time() + self.dt / 2.0 < stop))
    }

    /// Apply a pending reset, then stage pending inputs.
    fn apply_mailbox(&mut self) -> Result<(), EngineError> {
        let drain = self.mailbox.take();
        if drain.reset {
            self.stepper.reset()?;
            self.resets += 1;
            self.latest.store(self.stepper.snapshot());
            info!(
                generation = self.stepper.generation(),
                time = self.stepper.time(),
                "model reset"
            );
        }
        for (id, value) in drain.inputs {
            if let Err(e) = self.stepper.stage(id, value) {
                warn!(error = %e, "dropping mailbox write");
            }
        }
        Ok(())
    }

    /// Main loop. Runs until the stop time (or, when holding at the stop
    /// time, until shutdown), a step failure, or shutdown.
    ///
    /// Consumes self and returns the stepper alongside the report so the
    /// caller can inspect or reuse the model.
    pub fn run(mut self, shutdown: &ShutdownSignal) -> (ModelStepper, ClockReport) {
        self.latest.store(self.stepper.snapshot());
        info!(
            model = self.stepper.model_name(),
            dt = self.dt,
            stop_time = ?self.stop_time,
            pacing = ?self.pacing,
            "clock started"
        );

        let mut idle = false;
        let outcome = loop {
            if shutdown.is_triggered() {
                break if self.at_stop() {
                    ClockOutcome::Completed
                } else {
                    ClockOutcome::Shutdown
                };
            }

            let tick_start = Instant::now();

            if let Err(e) = self.apply_mailbox() {
                error!(error = %e, "reset failed; clock stopping");
                break ClockOutcome::Fatal(e);
            }

            if self.at_stop() {
                if !self.hold_at_stop {
                    break ClockOutcome::Completed;
                }
                if !idle {
                    info!(time = self.stepper.time(), "stop time reached; idling");
                    idle = true;
                }
                // Keep serving resets and inputs until shutdown.
                shutdown.wait_timeout(IDLE_POLL);
                continue;
            }
            idle = false;

            match self.stepper.advance(self.dt) {
                Ok(()) => {
                    self.steps += 1;
                    self.latest.store(self.stepper.snapshot());
                }
                Err(e) => {
                    error!(time = self.stepper.time(), error = %e, "step failed; clock stopping");
                    break ClockOutcome::Failed(e);
                }
            }

            if self.pacing == Pacing::Realtime {
                if let Some(remaining) = self.budget.checked_sub(tick_start.elapsed()) {
                    shutdown.wait_timeout(remaining);
                }
            }
        };

        let report = ClockReport {
            steps: self.steps,
            resets: self.resets,
            final_time: self.stepper.time(),
            outcome,
        };
        debug!(?report, "clock stopped");
        (self.stepper, report)
    }
}

impl std::fmt::Debug for SimulationClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationClock")
            .field("stepper", &self.stepper)
            .field("dt", &self.dt)
            .field("stop_time", &self.stop_time)
            .field("pacing", &self.pacing)
            .field("hold_at_stop", &self.hold_at_stop)
            .finish()
    }
}
