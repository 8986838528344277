//! Damped harmonic oscillator driven by an external force.
//!
//! ```text
//! m·x'' + d·x' + k·x = u
//! ```
//!
//! Integrated with classic fourth-order Runge-Kutta. A requested step is
//! split into equal substeps no longer than [`MAX_SUBSTEP`] so that stiff
//! parameter choices stay stable at coarse bridge step sizes.

use cosim_core::{Causality, EngineError, ModelEngine, ValueRef, VariableDef};

/// Longest internal integration step, in seconds.
pub const MAX_SUBSTEP: f64 = 1e-2;

const VR_M: ValueRef = ValueRef(0);
const VR_D: ValueRef = ValueRef(1);
const VR_K: ValueRef = ValueRef(2);
const VR_U: ValueRef = ValueRef(3);
const VR_X: ValueRef = ValueRef(4);
const VR_V: ValueRef = ValueRef(5);
const VR_X0: ValueRef = ValueRef(6);
const VR_V0: ValueRef = ValueRef(7);

#[derive(Clone, Copy, Debug, PartialEq)]
struct Params {
    m: f64,
    d: f64,
    k: f64,
    x0: f64,
    v0: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            m: 1.0,
            d: 0.0,
            k: 1.0,
            x0: 0.0,
            v0: 0.0,
        }
    }
}

/// Mass-spring-damper with parameters `m`, `d`, `k`, `x0`, `v0`, input
/// `u` (force) and outputs `x` (position) and `v` (velocity).
#[derive(Debug)]
pub struct MassSpringDamper {
    params: Params,
    u: f64,
    x: f64,
    v: f64,
    instantiated: bool,
}

impl MassSpringDamper {
    /// Model name as it appears in the catalog.
    pub const NAME: &'static str = "mass_spring_damper";

    /// A fresh, uninstantiated model with default parameters.
    pub fn new() -> Self {
        Self {
            params: Params::default(),
            u: 0.0,
            x: 0.0,
            v: 0.0,
            instantiated: false,
        }
    }

    fn param_slot(&mut self, vr: ValueRef) -> Option<&mut f64> {
        match vr {
            VR_M => Some(&mut self.params.m),
            VR_D => Some(&mut self.params.d),
            VR_K => Some(&mut self.params.k),
            VR_X0 => Some(&mut self.params.x0),
            VR_V0 => Some(&mut self.params.v0),
            _ => None,
        }
    }

    fn derivative(&self, x: f64, v: f64) -> (f64, f64) {
        let Params { m, d, k, .. } = self.params;
        (v, (self.u - d * v - k * x) / m)
    }

    fn rk4(&mut self, h: f64) {
        let (x, v) = (self.x, self.v);
        let (k1x, k1v) = self.derivative(x, v);
        let (k2x, k2v) = self.derivative(x + 0.5 * h * k1x, v + 0.5 * h * k1v);
        let (k3x, k3v) = self.derivative(x + 0.5 * h * k2x, v + 0.5 * h * k2v);
        let (k4x, k4v) = self.derivative(x + h * k3x, v + h * k3v);
        self.x = x + h / 6.0 * (k1x + 2.0 * k2x + 2.0 * k3x + k4x);
        self.v = v + h / 6.0 * (k1v + 2.0 * k2v + 2.0 * k3v + k4v);
    }
}

impl Default for MassSpringDamper {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelEngine for MassSpringDamper {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn variables(&self) -> Vec<VariableDef> {
        let p = Params::default();
        vec![
            VariableDef::new("m", Causality::Parameter, VR_M.0).with_start(p.m),
            VariableDef::new("d", Causality::Parameter, VR_D.0).with_start(p.d),
            VariableDef::new("k", Causality::Parameter, VR_K.0).with_start(p.k),
            VariableDef::new("u", Causality::Input, VR_U.0).with_start(0.0),
            VariableDef::new("x", Causality::Output, VR_X.0).with_start(p.x0),
            VariableDef::new("v", Causality::Output, VR_V.0).with_start(p.v0),
            VariableDef::new("x0", Causality::Parameter, VR_X0.0).with_start(p.x0),
            VariableDef::new("v0", Causality::Parameter, VR_V0.0).with_start(p.v0),
        ]
    }

    fn instantiate(
        &mut self,
        _start_time: f64,
        parameters: &[(ValueRef, f64)],
    ) -> Result<(), EngineError> {
        self.instantiated = false;
        self.params = Params::default();
        for &(vr, value) in parameters {
            let slot = self
                .param_slot(vr)
                .ok_or(EngineError::UnknownValueRef(vr))?;
            *slot = value;
        }
        let Params { m, d, k, x0, v0 } = self.params;
        if !(m.is_finite() && m > 0.0) {
            return Err(EngineError::InstantiationFailed {
                reason: format!("mass must be finite and positive, got {m}"),
            });
        }
        if let Some((name, value)) = [("d", d), ("k", k), ("x0", x0), ("v0", v0)]
            .into_iter()
            .find(|(_, value)| !value.is_finite())
        {
            return Err(EngineError::InstantiationFailed {
                reason: format!("parameter {name} must be finite, got {value}"),
            });
        }
        self.u = 0.0;
        self.x = x0;
        self.v = v0;
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
                other => {
                    let slot = self
                        .param_slot(other)
                        .ok_or(EngineError::UnknownValueRef(other))?;
                    *slot = value;
                }
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
                VR_M => self.params.m,
                VR_D => self.params.d,
                VR_K => self.params.k,
                VR_U => self.u,
                VR_X => self.x,
                VR_V => self.v,
                VR_X0 => self.params.x0,
                VR_V0 => self.params.v0,
                other => return Err(EngineError::UnknownValueRef(other)),
            };
        }
        Ok(())
    }

    fn do_step(&mut self, current_time: f64, dt: f64) -> Result<(), EngineError> {
        if !self.instantiated {
            return Err(EngineError::NotInstantiated);
        }
        if !self.u.is_finite() {
            return Err(EngineError::StepRejected {
                reason: format!("input u is not finite ({})", self.u),
            });
        }
        let substeps = (dt / MAX_SUBSTEP).ceil().max(1.0) as usize;
        let h = dt / substeps as f64;
        for _ in 0..substeps {
            self.rk4(h);
        }
        if !(self.x.is_finite() && self.v.is_finite()) {
            return Err(EngineError::StepRejected {
                reason: format!(
                    "state diverged at t={}: x={}, v={}",
                    current_time + dt,
                    self.x,
                    self.v
                ),
            });
        }
        Ok(())
    }
}
