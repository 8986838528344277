//! Reference PID controller.
//!
//! Controllers are clients of the bridge, not part of it; this one exists
//! for the offline runner and the example controller binary. All memory
//! between updates lives in an explicit [`PidState`] owned by the caller.

use serde::{Deserialize, Serialize};

/// Proportional, integral, and derivative gains.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain.
    #[serde(default)]
    pub ki: f64,
    /// Derivative gain.
    #[serde(default)]
    pub kd: f64,
}

impl PidGains {
    /// Gains with all three terms.
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

/// Controller memory carried between updates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PidState {
    /// Error seen by the previous update; `None` before the first one.
    pub prev_error: Option<f64>,
    /// Running integral of the error.
    pub integral: f64,
}

impl PidState {
    /// Zeroed state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all history, as after a simulation reset.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// One controller evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PidOutput {
    /// Control signal.
    pub u: f64,
    /// `target - measurement` at this update.
    pub error: f64,
}

/// Setpoint tracking PID with derivative on error.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pid {
    /// Desired value of the measured variable.
    pub target: f64,
    /// Controller gains.
    #[serde(flatten)]
    pub gains: PidGains,
}

impl Pid {
    /// A controller tracking `target`.
    pub fn new(target: f64, gains: PidGains) -> Self {
        Self { target, gains }
    }

    /// Compute the control signal for `measurement` after `dt` seconds.
    ///
    /// The derivative term is zero on the first update and whenever `dt`
    /// is not positive; the integral only accumulates over positive `dt`.
    pub fn update(&self, state: &mut PidState, measurement: f64, dt: f64) -> PidOutput {
        let error = self.target - measurement;
        let derivative = match state.prev_error {
            Some(prev) if dt > 0.0 => (error - prev) / dt,
            _ => 0.0,
        };
        if dt > 0.0 {
            state.integral += error * dt;
        }
        state.prev_error = Some(error);

        let PidGains { kp, ki, kd } = self.gains;
        PidOutput {
            u: kp * error + ki * state.integral + kd * derivative,
            error,
        }
    }
}
