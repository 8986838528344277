//! Reusable model-engine fixtures.
//!
//! - [`MirrorEngine`]: every output equals the step count plus the last
//!   input, so a snapshot mixing two steps is detectable.
//! - [`FailingEngine`]: an integrator that fails deterministically after N steps.
//! - [`RecordingEngine`]: logs every call into a shared [`CallLog`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cosim_core::{Causality, EngineError, ModelEngine, ValueRef, VariableDef};

fn check_lengths(refs: usize, values: usize) -> Result<(), EngineError> {
    if refs != values {
        return Err(EngineError::StepRejected {
            reason: format!("{refs} refs but {values} values"),
        });
    }
    Ok(())
}

// ── MirrorEngine ───────────────────────────────────────────────────

/// Input `u` (vr 0) plus `n` outputs named `y0..yN` (vr 1..=n).
///
/// After each step every output holds `steps + u`. All outputs of a
/// consistent snapshot are therefore equal.
pub struct MirrorEngine {
    outputs: usize,
    step_delay: Duration,
    steps: u64,
    u: f64,
    instantiated: bool,
}

impl MirrorEngine {
    pub fn new(outputs: usize) -> Self {
        Self {
            outputs,
            step_delay: Duration::ZERO,
            steps: 0,
            u: 0.0,
            instantiated: false,
        }
    }

    /// Sleep this long inside every `do_step` to widen race windows.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    fn value(&self) -> f64 {
        self.steps as f64 + self.u
    }
}

impl ModelEngine for MirrorEngine {
    fn name(&self) -> &str {
        "mirror"
    }

    fn variables(&self) -> Vec<VariableDef> {
        let mut vars = vec![VariableDef::new("u", Causality::Input, 0)];
        vars.extend(
            (0..self.outputs).map(|i| VariableDef::new(format!("y{i}"), Causality::Output, i as u32 + 1)),
        );
        vars
    }

    fn instantiate(
        &mut self,
        _start_time: f64,
        parameters: &[(ValueRef, f64)],
    ) -> Result<(), EngineError> {
        if let Some(&(vr, _)) = parameters.first() {
            return Err(EngineError::UnknownValueRef(vr));
        }
        self.steps = 0;
        self.u = 0.0;
        self.instantiated = true;
        Ok(())
    }

    fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> Result<(), EngineError> {
        check_lengths(refs.len(), values.len())?;
        for (&vr, &value) in refs.iter().zip(values) {
            match vr {
                ValueRef(0) => self.u = value,
                other => return Err(EngineError::UnknownValueRef(other)),
            }
        }
        Ok(())
    }

    fn get_real(&self, refs: &[ValueRef], out: &mut [f64]) -> Result<(), EngineError> {
        if !self.instantiated {
            return Err(EngineError::NotInstantiated);
        }
        for (&vr, slot) in refs.iter().zip(out.iter_mut()) {
            *slot = match vr.0 {
                0 => self.u,
                n if (n as usize) <= self.outputs => self.value(),
                _ => return Err(EngineError::UnknownValueRef(vr)),
            };
        }
        Ok(())
    }

    fn do_step(&mut self, _current_time: f64, _dt: f64) -> Result<(), EngineError> {
        if !self.instantiated {
            return Err(EngineError::NotInstantiated);
        }
        if !self.step_delay.is_zero() {
            std::thread::sleep(self.step_delay);
        }
        self.steps += 1;
        Ok(())
    }
}

// ── FailingEngine ──────────────────────────────────────────────────

/// Integrator (`u` vr 0, `x` vr 1) that rejects every step after the
/// first `succeed_count` since the last instantiation.
pub struct FailingEngine {
    pub succeed_count: u64,
    steps: u64,
    u: f64,
    x: f64,
}

impl FailingEngine {
    /// Create an engine that succeeds `succeed_count` times then fails.
    pub fn new(succeed_count: u64) -> Self {
        Self {
            succeed_count,
            steps: 0,
            u: 0.0,
            x: 0.0,
        }
    }

    /// Steps attempted since the last instantiation, failed ones included.
    pub fn attempts(&self) -> u64 {
        self.steps
    }
}

impl ModelEngine for FailingEngine {
    fn name(&self) -> &str {
        "failing"
    }

    fn variables(&self) -> Vec<VariableDef> {
        vec![
            VariableDef::new("u", Causality::Input, 0),
            VariableDef::new("x", Causality::Output, 1),
        ]
    }

    fn instantiate(
        &mut self,
        _start_time: f64,
        _parameters: &[(ValueRef, f64)],
    ) -> Result<(), EngineError> {
        self.steps = 0;
        self.u = 0.0;
        self.x = 0.0;
        Ok(())
    }

    fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> Result<(), EngineError> {
        check_lengths(refs.len(), values.len())?;
        for (&vr, &value) in refs.iter().zip(values) {
            match vr {
                ValueRef(0) => self.u = value,
                other => return Err(EngineError::UnknownValueRef(other)),
            }
        }
        Ok(())
    }

    fn get_real(&self, refs: &[ValueRef], out: &mut [f64]) -> Result<(), EngineError> {
        for (&vr, slot) in refs.iter().zip(out.iter_mut()) {
            *slot = match vr {
                ValueRef(0) => self.u,
                ValueRef(1) => self.x,
                other => return Err(EngineError::UnknownValueRef(other)),
            };
        }
        Ok(())
    }

    fn do_step(&mut self, current_time: f64, dt: f64) -> Result<(), EngineError> {
        self.steps += 1;
        if self.steps > self.succeed_count {
            return Err(EngineError::StepRejected {
                reason: format!(
                    "deliberate failure at t={current_time} after {} successful steps",
                    self.succeed_count
                ),
            });
        }
        self.x += self.u * dt;
        Ok(())
    }
}

// ── RecordingEngine ────────────────────────────────────────────────

/// One call observed by a [`RecordingEngine`].
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Instantiate {
        start_time: f64,
        parameters: Vec<(ValueRef, f64)>,
    },
    SetReal(Vec<(ValueRef, f64)>),
    DoStep {
        current_time: f64,
        dt: f64,
    },
}

/// Shared view of a [`RecordingEngine`]'s calls, usable after the engine
/// has been moved into a stepper or onto another thread.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    /// Copy of every call so far.
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    /// Only the `SetReal` batches, in order.
    pub fn writes(&self) -> Vec<Vec<(ValueRef, f64)>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SetReal(w) => Some(w),
                _ => None,
            })
            .collect()
    }

    /// Number of `Instantiate` calls.
    pub fn instantiations(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Instantiate { .. }))
            .count()
    }

    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }
}

/// Integrator-shaped engine with inputs `u` (vr 0) and `w` (vr 1),
/// output `x` (vr 2), and parameter `gain` (vr 3); `x' = gain·(u + w)`.
/// Every mutating call is appended to its [`CallLog`].
pub struct RecordingEngine {
    log: CallLog,
    gain: f64,
    u: f64,
    w: f64,
    x: f64,
}

impl RecordingEngine {
    pub fn new() -> (Self, CallLog) {
        let log = CallLog::default();
        let engine = Self {
            log: log.clone(),
            gain: 1.0,
            u: 0.0,
            w: 0.0,
            x: 0.0,
        };
        (engine, log)
    }
}

impl ModelEngine for RecordingEngine {
    fn name(&self) -> &str {
        "recording"
    }

    fn variables(&self) -> Vec<VariableDef> {
        vec![
            VariableDef::new("u", Causality::Input, 0),
            VariableDef::new("w", Causality::Input, 1),
            VariableDef::new("x", Causality::Output, 2),
            VariableDef::new("gain", Causality::Parameter, 3).with_start(1.0),
        ]
    }

    fn instantiate(
        &mut self,
        start_time: f64,
        parameters: &[(ValueRef, f64)],
    ) -> Result<(), EngineError> {
        self.log.push(Call::Instantiate {
            start_time,
            parameters: parameters.to_vec(),
        });
        self.gain = 1.0;
        for &(vr, value) in parameters {
            match vr {
                ValueRef(3) => self.gain = value,
                other => return Err(EngineError::UnknownValueRef(other)),
            }
        }
        self.u = 0.0;
        self.w = 0.0;
        self.x = 0.0;
        Ok(())
    }

    fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> Result<(), EngineError> {
        check_lengths(refs.len(), values.len())?;
        self.log.push(Call::SetReal(
            refs.iter().copied().zip(values.iter().copied()).collect(),
        ));
        for (&vr, &value) in refs.iter().zip(values) {
            match vr {
                ValueRef(0) => self.u = value,
                ValueRef(1) => self.w = value,
                other => return Err(EngineError::UnknownValueRef(other)),
            }
        }
        Ok(())
    }

    fn get_real(&self, refs: &[ValueRef], out: &mut [f64]) -> Result<(), EngineError> {
        for (&vr, slot) in refs.iter().zip(out.iter_mut()) {
            *slot = match vr {
                ValueRef(0) => self.u,
                ValueRef(1) => self.w,
                ValueRef(2) => self.x,
                ValueRef(3) => self.gain,
                other => return Err(EngineError::UnknownValueRef(other)),
            };
        }
        Ok(())
    }

    fn do_step(&mut self, current_time: f64, dt: f64) -> Result<(), EngineError> {
        self.log.push(Call::DoStep { current_time, dt });
        self.x += self.gain * (self.u + self.w) * dt;
        Ok(())
    }
}
