//! In-process closed-loop runner.
//!
//! Steps a model in lockstep with a [`Pid`] controller, with no threads
//! or sockets, and records one [`TrajectoryRow`] per step.

use std::error::Error;
use std::fmt;
use std::io::{self, Write};

use cosim_core::{LookupError, StepError};
use cosim_engine::ModelStepper;
use cosim_models::{Pid, PidState};
use tracing::{debug, info};

/// The offline runner could not complete.
#[derive(Debug)]
pub enum OfflineError {
    /// The measured output or the actuated input does not exist.
    Lookup(LookupError),
    /// The model rejected a step.
    Step(StepError),
    /// Step size or stop time is unusable.
    InvalidHorizon {
        /// Requested step size.
        step_size: f64,
        /// Requested stop time.
        stop_time: f64,
    },
}

impl fmt::Display for OfflineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lookup(e) => write!(f, "{e}"),
            Self::Step(e) => write!(f, "{e}"),
            Self::InvalidHorizon {
                step_size,
                stop_time,
            } => write!(
                f,
                "cannot step by {step_size} up to {stop_time}: step must be positive and both finite"
            ),
        }
    }
}

impl Error for OfflineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Lookup(e) => Some(e),
            Self::Step(e) => Some(e),
            Self::InvalidHorizon { .. } => None,
        }
    }
}

impl From<LookupError> for OfflineError {
    fn from(e: LookupError) -> Self {
        Self::Lookup(e)
    }
}

impl From<StepError> for OfflineError {
    fn from(e: StepError) -> Self {
        Self::Step(e)
    }
}

/// One closed-loop step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrajectoryRow {
    /// Simulation time after the step.
    pub time: f64,
    /// Measured output before the step.
    pub measured: f64,
    /// Controller error for that measurement.
    pub error: f64,
    /// Control signal applied during the step.
    pub u: f64,
}

/// Wiring and horizon of an offline run.
#[derive(Clone, Debug, PartialEq)]
pub struct OfflineRun {
    /// Output the controller reads.
    pub measurement: String,
    /// Input the controller drives.
    pub actuation: String,
    /// Simulation seconds per step.
    pub step_size: f64,
    /// Stepping stops once time reaches this value (within half a step).
    pub stop_time: f64,
}

impl OfflineRun {
    /// Run `pid` against `stepper` from its current time to the stop time.
    pub fn execute(
        &self,
        stepper: &mut ModelStepper,
        pid: &Pid,
    ) -> Result<Vec<TrajectoryRow>, OfflineError> {
        let dt = self.step_size;
        if !(dt.is_finite() && dt > 0.0 && self.stop_time.is_finite()) {
            return Err(OfflineError::InvalidHorizon {
                step_size: dt,
                stop_time: self.stop_time,
            });
        }
        let actuation = stepper.registry().input(&self.actuation)?;
        let measurement = [self.measurement.as_str()];
        stepper.get_output(&measurement)?;

        let mut state = PidState::new();
        let mut rows = Vec::new();
        while stepper.time() + dt / 2.0 < self.stop_time {
            let measured = stepper.get_output(&measurement)?[0];
            let out = pid.update(&mut state, measured, dt);
            stepper.stage(actuation, out.u)?;
            stepper.advance(dt)?;
            rows.push(TrajectoryRow {
                time: stepper.time(),
                measured,
                error: out.error,
                u: out.u,
            });
        }
        debug!(steps = rows.len(), "offline run finished");
        if let Some(last) = rows.last() {
            info!(
                time = last.time,
                measured = last.measured,
                error = last.error,
                "final state"
            );
        }
        Ok(rows)
    }

    /// Write `rows` as CSV with a `time,<measurement>,error,<actuation>`
    /// header.
    pub fn write_csv<W: Write>(&self, out: &mut W, rows: &[TrajectoryRow]) -> io::Result<()> {
        writeln!(out, "time,{},error,{}", self.measurement, self.actuation)?;
        for row in rows {
            writeln!(out, "{},{},{},{}", row.time, row.measured, row.error, row.u)?;
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_engine::ScenarioConfig;
    use cosim_models::{Integrator, PidGains};

    use crate::setup::build_stepper;

    fn run(stop_time: f64) -> OfflineRun {
        OfflineRun {
            measurement: "x".into(),
            actuation: "u".into(),
            step_size: 0.1,
            stop_time,
        }
    }

    fn msd_stepper() -> ModelStepper {
        let config = ScenarioConfig::from_toml_str(
            "[model]\nsource = \"mass-spring-damper\"\n\
             [model.parameters]\nm = 10.0\nd = 1.0\nk = 2.0\n",
        )
        .unwrap();
        build_stepper(&config.model).unwrap()
    }

    #[test]
    fn regulates_mass_spring_damper_to_target() {
        let mut stepper = msd_stepper();
        let pid = Pid::new(10.0, PidGains::new(10.0, 1.0, 2.0));
        let rows = run(100.0).execute(&mut stepper, &pid).unwrap();

        assert_eq!(rows.len(), 1000);
        let last = rows.last().unwrap();
        assert!((last.time - 100.0).abs() < 1e-6);
        assert!((last.measured - 10.0).abs() < 0.05, "x = {}", last.measured);
    }

    #[test]
    fn first_row_measures_before_stepping() {
        let mut stepper = msd_stepper();
        let pid = Pid::new(10.0, PidGains::new(10.0, 1.0, 2.0));
        let rows = run(0.3).execute(&mut stepper, &pid).unwrap();

        assert_eq!(rows.len(), 3);
        assert!((rows[0].time - 0.1).abs() < 1e-12);
        assert_eq!(rows[0].measured, 0.0);
        assert_eq!(rows[0].error, 10.0);
        // 10·e plus 1·(e·dt) of integral, no derivative on the first update.
        assert!((rows[0].u - 101.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_wiring_is_lookup_error() {
        let mut stepper =
            ModelStepper::new(Box::new(Integrator::new()), 0.0, &Default::default()).unwrap();
        let pid = Pid::new(1.0, PidGains::new(1.0, 0.0, 0.0));
        let mut bad = run(1.0);
        bad.measurement = "v".into();
        match bad.execute(&mut stepper, &pid) {
            Err(OfflineError::Lookup(_)) => {}
            other => panic!("expected Lookup, got {other:?}"),
        }
        assert_eq!(stepper.steps(), 0);
    }

    #[test]
    fn bad_horizon_is_rejected() {
        let mut stepper = msd_stepper();
        let pid = Pid::new(1.0, PidGains::new(1.0, 0.0, 0.0));
        let mut bad = run(1.0);
        bad.step_size = 0.0;
        assert!(matches!(
            bad.execute(&mut stepper, &pid),
            Err(OfflineError::InvalidHorizon { .. })
        ));
    }

    #[test]
    fn csv_has_header_and_one_line_per_row() {
        let rows = [
            TrajectoryRow {
                time: 0.1,
                measured: 0.0,
                error: 1.0,
                u: 2.0,
            },
            TrajectoryRow {
                time: 0.2,
                measured: 0.5,
                error: 0.5,
                u: 1.0,
            },
        ];
        let mut out = Vec::new();
        run(1.0).write_csv(&mut out, &rows).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "time,x,error,u\n0.1,0,1,2\n0.2,0.5,0.5,1\n");
    }
}
