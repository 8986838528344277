//! The [`ModelEngine`] trait: the opaque model-execution capability.
//!
//! The bridge never integrates equations itself. It drives an engine
//! through five operations (instantiate, set, step, get, reset) and
//! addresses variables only by the [`ValueRef`]s the engine declared in
//! its metadata.

use crate::error::EngineError;
use crate::id::ValueRef;
use crate::variable::VariableDef;

/// A co-simulation model instance.
///
/// # Contract
///
/// - [`variables()`](ModelEngine::variables) is pure metadata and must
///   return the same list every call.
/// - [`instantiate()`](ModelEngine::instantiate) (re)creates the instance
///   at `start_time` with the given parameter values and leaves it ready
///   for stepping. It may be called again to start over.
/// - [`do_step()`](ModelEngine::do_step) integrates from `current_time` to
///   `current_time + dt`. On `Err` the caller treats the instance as
///   unusable until the next `instantiate()`/`reset()`.
/// - Instance-owned resources (scratch files, extracted packages, native
///   handles) are released in `Drop`, so every exit path releases them.
///
/// Engines are `Send` but not required to be `Sync`: exactly one thread
/// owns an engine at a time.
pub trait ModelEngine: Send {
    /// Human-readable model identifier used in logs.
    fn name(&self) -> &str;

    /// Variable metadata in declaration order.
    fn variables(&self) -> Vec<VariableDef>;

    /// Create the instance at `start_time` and apply `parameters`.
    fn instantiate(
        &mut self,
        start_time: f64,
        parameters: &[(ValueRef, f64)],
    ) -> Result<(), EngineError>;

    /// Write real values. `refs` and `values` have equal length.
    fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> Result<(), EngineError>;

    /// Read real values into `out`. `refs` and `out` have equal length.
    fn get_real(&self, refs: &[ValueRef], out: &mut [f64]) -> Result<(), EngineError>;

    /// Advance the instance from `current_time` by `dt`.
    fn do_step(&mut self, current_time: f64, dt: f64) -> Result<(), EngineError>;

    /// Return to the initial state. Defaults to a fresh instantiation.
    fn reset(&mut self, start_time: f64, parameters: &[(ValueRef, f64)]) -> Result<(), EngineError> {
        self.instantiate(start_time, parameters)
    }
}

impl<T: ModelEngine + ?Sized> ModelEngine for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn variables(&self) -> Vec<VariableDef> {
        (**self).variables()
    }

    fn instantiate(
        &mut self,
        start_time: f64,
        parameters: &[(ValueRef, f64)],
    ) -> Result<(), EngineError> {
        (**self).instantiate(start_time, parameters)
    }

    fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> Result<(), EngineError> {
        (**self).set_real(refs, values)
    }

    fn get_real(&self, refs: &[ValueRef], out: &mut [f64]) -> Result<(), EngineError> {
        (**self).get_real(refs, out)
    }

    fn do_step(&mut self, current_time: f64, dt: f64) -> Result<(), EngineError> {
        (**self).do_step(current_time, dt)
    }

    fn reset(&mut self, start_time: f64, parameters: &[(ValueRef, f64)]) -> Result<(), EngineError> {
        (**self).reset(start_time, parameters)
    }
}
