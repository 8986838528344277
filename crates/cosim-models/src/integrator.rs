//! Pure integrator: `x' = u`, with initial value `x0`.
//!
//! Exact under a piecewise-constant input, which makes it the model of
//! choice for timing and end-to-end tests: after a step of `dt` with input
//! `u`, `x` grows by exactly `u·dt`.

use cosim_core::{Causality, EngineError, ModelEngine, ValueRef, VariableDef};

const VR_U: ValueRef = ValueRef(0);
const VR_X: ValueRef = ValueRef(1);
const VR_X0: ValueRef = ValueRef(2);

/// Integrator with input `u`, output `x`, and parameter `x0`.
#[derive(Debug, Default)]
pub struct Integrator {
    x0: f64,
    u: f64,
    x: f64,
    instantiated: bool,
}

impl Integrator {
    /// Model name as it appears in the catalog.
    pub const NAME: &'static str = "integrator";

    /// A fresh, uninstantiated integrator.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelEngine for Integrator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn variables(&self) -> Vec<VariableDef> {
        vec![
            VariableDef::new("u", Causality::Input, VR_U.0).with_start(0.0),
            VariableDef::new("x", Causality::Output, VR_X.0).with_start(0.0),
            VariableDef::new("x0", Causality::Parameter, VR_X0.0).with_start(0.0),
        ]
    }

    fn instantiate(
        &mut self,
        _start_time: f64,
        parameters: &[(ValueRef, f64)],
    ) -> Result<(), EngineError> {
        self.instantiated = false;
        self.x0 = 0.0;
        for &(vr, value) in parameters {
            match vr {
                VR_X0 => self.x0 = value,
                other => return Err(EngineError::UnknownValueRef(other)),
            }
        }
        if !self.x0.is_finite() {
            return Err(EngineError::InstantiationFailed {
                reason: format!("x0 must be finite, got {}", self.x0),
            });
        }
        self.u = 0.0;
        self.x = self.x0;
        self.instantiated = true;
        Ok(())
    }

    fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> Result<(), EngineError> {
        if !self.instantiated {
            return Err(EngineError::NotInstantiated);
        }
        for (&vr, &value) in refs.iter().zip(values) {
            match vr {
                VR_U => self.u = value,
                VR_X0 => self.x0 = value,
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
            *slot = match vr {
                VR_U => self.u,
                VR_X => self.x,
                VR_X0 => self.x0,
                other => return Err(EngineError::UnknownValueRef(other)),
            };
        }
        Ok(())
    }

    fn do_step(&mut self, _current_time: f64, dt: f64) -> Result<(), EngineError> {
        if !self.instantiated {
            return Err(EngineError::NotInstantiated);
        }
        let next = self.x + self.u * dt;
        if !next.is_finite() {
            return Err(EngineError::StepRejected {
                reason: format!("x would become {next}"),
            });
        }
        self.x = next;
        Ok(())
    }
}
