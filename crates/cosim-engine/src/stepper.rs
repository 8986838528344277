//! The [`ModelStepper`]: sole owner of the live model and its clock.
//!
//! Every mutation of the model goes through one of four operations
//! (stage/set-input, advance, reset, and the snapshot read). Each runs to
//! completion on the caller's thread, so a stepper owned by a single
//! thread can never expose a half-applied step.

use std::sync::Arc;

use cosim_core::{
    Causality, EngineError, LookupError, ModelEngine, StepError, ValueRef, VarId,
    VariableRegistry,
};
use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::pending::PendingInputs;

// ── OutputSnapshot ─────────────────────────────────────────────────

/// Time and every output value captured between two advances.
///
/// `values[i]` belongs to `registry.outputs()[i]`.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputSnapshot {
    /// Simulation time of the capture.
    pub time: f64,
    /// Successful advances since the last reset.
    pub step: u64,
    /// Resets performed since construction.
    pub generation: u64,
    /// Output values in registry order.
    pub values: SmallVec<[f64; 8]>,
}

// ── SimTime ────────────────────────────────────────────────────────

/// Start time plus a compensated running sum of step sizes.
///
/// Plain `time += dt` drifts by one rounding error per step; the
/// compensation term keeps N steps of `dt` within a few ulps of
/// `start + N·dt`.
#[derive(Clone, Copy, Debug)]
struct SimTime {
    start: f64,
    sum: f64,
    compensation: f64,
}

impl SimTime {
    fn new(start: f64) -> Self {
        Self {
            start,
            sum: 0.0,
            compensation: 0.0,
        }
    }

    fn now(&self) -> f64 {
        self.start + (self.sum + self.compensation)
    }

    fn add(&mut self, dt: f64) {
        let t = self.sum + dt;
        if self.sum.abs() >= dt.abs() {
            self.compensation += (self.sum - t) + dt;
        } else {
            self.compensation += (dt - t) + self.sum;
        }
        self.sum = t;
    }
}

// ── ModelStepper ───────────────────────────────────────────────────

/// Owns one model instance, its simulation time, and its staged inputs.
pub struct ModelStepper {
    engine: Box<dyn ModelEngine>,
    registry: Arc<VariableRegistry>,
    parameters: Vec<(ValueRef, f64)>,
    time: SimTime,
    steps: u64,
    generation: u64,
    pending: PendingInputs,
    /// Last applied input / last read output, indexed by `VarId`.
    last_values: Vec<f64>,
    output_refs: Vec<ValueRef>,
    disabled: bool,
}

impl ModelStepper {
    /// Build the registry from the engine's metadata, resolve `parameters`
    /// by name, and instantiate the model at `start_time`.
    pub fn new(
        engine: Box<dyn ModelEngine>,
        start_time: f64,
        parameters: &IndexMap<String, f64>,
    ) -> Result<Self, ConfigError> {
        if !start_time.is_finite() {
            return Err(ConfigError::InvalidStartTime { value: start_time });
        }
        let registry = Arc::new(VariableRegistry::build(engine.variables())?);

        let mut resolved = Vec::with_capacity(parameters.len());
        for (name, &value) in parameters {
            let id = registry
                .parameter(name)
                .map_err(|_| ConfigError::UnknownParameter { name: name.clone() })?;
            if !value.is_finite() {
                return Err(ConfigError::NonFiniteParameter {
                    name: name.clone(),
                    value,
                });
            }
            resolved.push((registry.value_ref(id), value));
        }

        let output_refs = registry
            .outputs()
            .iter()
            .map(|&id| registry.value_ref(id))
            .collect();
        let last_values = registry
            .iter()
            .map(|(_, def)| def.start.unwrap_or(f64::NAN))
            .collect();

        let mut stepper = Self {
            engine,
            registry,
            parameters: resolved,
            time: SimTime::new(start_time),
            steps: 0,
            generation: 0,
            pending: PendingInputs::new(),
            last_values,
            output_refs,
            disabled: false,
        };
        stepper.engine.instantiate(start_time, &stepper.parameters)?;
        for &(vr, value) in &stepper.parameters {
            if let Some(id) = stepper.id_of(vr) {
                stepper.last_values[id.index()] = value;
            }
        }
        stepper.refresh_values()?;
        debug!(
            model = stepper.engine.name(),
            inputs = stepper.registry.inputs().len(),
            outputs = stepper.registry.outputs().len(),
            parameters = stepper.parameters.len(),
            "model instantiated"
        );
        Ok(stepper)
    }

    fn id_of(&self, vr: ValueRef) -> Option<VarId> {
        self.registry
            .iter()
            .find(|(_, def)| def.value_ref == vr)
            .map(|(id, _)| id)
    }

    /// Re-read every input and output from the engine into `last_values`.
    fn refresh_values(&mut self) -> Result<(), EngineError> {
        let ids: SmallVec<[VarId; 16]> = self
            .registry
            .inputs()
            .iter()
            .chain(self.registry.outputs())
            .copied()
            .collect();
        let refs: SmallVec<[ValueRef; 16]> =
            ids.iter().map(|&id| self.registry.value_ref(id)).collect();
        let mut out: SmallVec<[f64; 16]> = SmallVec::from_elem(0.0, refs.len());
        self.engine.get_real(&refs, &mut out)?;
        for (id, value) in ids.into_iter().zip(out) {
            self.last_values[id.index()] = value;
        }
        Ok(())
    }

    fn refresh_outputs(&mut self) -> Result<(), EngineError> {
        let mut out: SmallVec<[f64; 8]> = SmallVec::from_elem(0.0, self.output_refs.len());
        self.engine.get_real(&self.output_refs, &mut out)?;
        for (&id, value) in self.registry.outputs().iter().zip(out) {
            self.last_values[id.index()] = value;
        }
        Ok(())
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// The variable registry built from the model's metadata.
    pub fn registry(&self) -> &Arc<VariableRegistry> {
        &self.registry
    }

    /// Name the engine reports for itself.
    pub fn model_name(&self) -> &str {
        self.engine.name()
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.time.now()
    }

    /// Time the model starts from at construction and after every reset.
    pub fn start_time(&self) -> f64 {
        self.time.start
    }

    /// Successful advances since the last reset.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Resets performed since construction.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a failed step has left the model unusable until reset.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Number of inputs staged for the next advance.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Staged value of input `name`, if one is waiting.
    #[doc(hidden)]
    pub fn pending_value(&self, name: &str) -> Option<f64> {
        let id = self.registry.input(name).ok()?;
        self.pending.get(id)
    }

    /// Last value seen for a variable: the last applied input, the last
    /// read output, or the configured parameter value.
    pub fn last_value(&self, name: &str) -> Option<f64> {
        let id = self.registry.lookup(name)?;
        Some(self.last_values[id.index()])
    }

    // ── Operations ─────────────────────────────────────────────────

    /// Stage `value` for input `name`; applied by the next advance.
    pub fn set_input(&mut self, name: &str, value: f64) -> Result<(), LookupError> {
        let id = self.registry.input(name)?;
        self.pending.insert(id, value);
        Ok(())
    }

    /// Stage `value` for an input handle.
    ///
    /// Fails if `id` is not an input of this stepper's registry.
    pub fn stage(&mut self, id: VarId, value: f64) -> Result<(), LookupError> {
        if !self.registry.inputs().contains(&id) {
            let name = if id.index() < self.registry.len() {
                self.registry.name(id).to_string()
            } else {
                format!("#{id}")
            };
            return Err(LookupError::UnknownVariable {
                name,
                expected: Causality::Input,
            });
        }
        self.pending.insert(id, value);
        Ok(())
    }

    /// Apply staged inputs and advance the model by exactly `dt`.
    ///
    /// On failure time does not move and the stepper refuses further
    /// advances until [`reset()`](Self::reset).
    pub fn advance(&mut self, dt: f64) -> Result<(), StepError> {
        if self.disabled {
            return Err(StepError::Disabled);
        }
        if !dt.is_finite() || dt <= 0.0 {
            return Err(StepError::InvalidDt { dt });
        }
        let time = self.time.now();

        if !self.pending.is_empty() {
            let mut refs: SmallVec<[ValueRef; 8]> = SmallVec::new();
            let mut values: SmallVec<[f64; 8]> = SmallVec::new();
            let mut ids: SmallVec<[VarId; 8]> = SmallVec::new();
            for (id, value) in self.pending.drain() {
                ids.push(id);
                refs.push(self.registry.value_ref(id));
                values.push(value);
            }
            if let Err(reason) = self.engine.set_real(&refs, &values) {
                return Err(self.fail(time, dt, reason));
            }
            for (id, value) in ids.into_iter().zip(values) {
                self.last_values[id.index()] = value;
            }
        }

        if let Err(reason) = self.engine.do_step(time, dt) {
            return Err(self.fail(time, dt, reason));
        }
        if let Err(reason) = self.refresh_outputs() {
            return Err(self.fail(time, dt, reason));
        }
        self.time.add(dt);
        self.steps += 1;
        Ok(())
    }

    fn fail(&mut self, time: f64, dt: f64, reason: EngineError) -> StepError {
        self.disabled = true;
        warn!(time, dt, error = %reason, "model step failed; stepping disabled until reset");
        StepError::Rejected { time, dt, reason }
    }

    /// Current values of the named outputs, in the order given.
    pub fn get_output(&self, names: &[&str]) -> Result<Vec<f64>, LookupError> {
        names
            .iter()
            .map(|name| {
                let id = self.registry.output(name)?;
                Ok(self.last_values[id.index()])
            })
            .collect()
    }

    /// Capture time and every output.
    pub fn snapshot(&self) -> OutputSnapshot {
        OutputSnapshot {
            time: self.time.now(),
            step: self.steps,
            generation: self.generation,
            values: self
                .registry
                .outputs()
                .iter()
                .map(|&id| self.last_values[id.index()])
                .collect(),
        }
    }

    /// Reinitialize the model at the start time with the configured
    /// parameters, discard staged inputs, and re-enable stepping.
    ///
    /// An error here means the model cannot be rebuilt; the stepper stays
    /// disabled and the caller should treat it as fatal.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        self.pending.clear();
        self.disabled = true;
        let start = self.time.start;
        self.engine.reset(start, &self.parameters)?;
        self.refresh_values()?;
        self.time = SimTime::new(start);
        self.steps = 0;
        self.generation += 1;
        self.disabled = false;
        debug!(
            model = self.engine.name(),
            generation = self.generation,
            start,
            "model reset"
        );
        Ok(())
    }
}

impl std::fmt::Debug for ModelStepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStepper")
            .field("model", &self.engine.name())
            .field("time", &self.time.now())
            .field("steps", &self.steps)
            .field("generation", &self.generation)
            .field("pending", &self.pending.len())
            .field("disabled", &self.disabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_models::{Integrator, MassSpringDamper};
    use cosim_test_utils::{Call, FailingEngine, RecordingEngine};
    use proptest::prelude::*;

    fn params(pairs: &[(&str, f64)]) -> IndexMap<String, f64> {
        pairs.iter().map(|&(k, v)| (k.to_string(), v)).collect()
    }

    fn integrator() -> ModelStepper {
        ModelStepper::new(Box::new(Integrator::new()), 0.0, &IndexMap::new()).unwrap()
    }

    #[test]
    fn advance_moves_time_and_applies_input() {
        let mut s = integrator();
        s.set_input("u", 2.0).unwrap();
        s.advance(0.5).unwrap();
        assert_eq!(s.time(), 0.5);
        assert_eq!(s.steps(), 1);
        assert_eq!(s.get_output(&["x"]).unwrap(), vec![1.0]);
        assert_eq!(s.last_value("u"), Some(2.0));
        assert_eq!(s.pending_len(), 0);
    }

    #[test]
    fn stage_rejects_non_input_handles() {
        let mut s = integrator();
        let x = s.registry().output("x").unwrap();
        match s.stage(x, 1.0) {
            Err(LookupError::UnknownVariable { name, expected }) => {
                assert_eq!(name, "x");
                assert_eq!(expected, Causality::Input);
            }
            other => panic!("expected UnknownVariable, got {other:?}"),
        }
        assert!(matches!(
            s.stage(VarId(999), 1.0),
            Err(LookupError::UnknownVariable { .. })
        ));
        assert_eq!(s.pending_len(), 0);

        let u = s.registry().input("u").unwrap();
        s.stage(u, 4.0).unwrap();
        assert_eq!(s.pending_value("u"), Some(4.0));
    }

    #[test]
    fn last_write_wins_before_advance() {
        let (engine, log) = RecordingEngine::new();
        let mut s = ModelStepper::new(Box::new(engine), 0.0, &IndexMap::new()).unwrap();
        s.set_input("u", 1.0).unwrap();
        s.set_input("u", 2.0).unwrap();
        assert_eq!(s.pending_value("u"), Some(2.0));
        s.advance(0.1).unwrap();

        assert_eq!(log.writes(), vec![vec![(ValueRef(0), 2.0)]]);
    }

    #[test]
    fn nothing_staged_means_no_write() {
        let (engine, log) = RecordingEngine::new();
        let mut s = ModelStepper::new(Box::new(engine), 0.0, &IndexMap::new()).unwrap();
        s.advance(0.1).unwrap();
        assert!(log.writes().is_empty());
    }

    #[test]
    fn unknown_or_wrong_causality_input_rejected() {
        let mut s = integrator();
        for name in ["nope", "x", "x0"] {
            match s.set_input(name, 1.0) {
                Err(LookupError::UnknownVariable { .. }) => {}
                other => panic!("{name}: expected UnknownVariable, got {other:?}"),
            }
        }
        assert_eq!(s.pending_len(), 0);
    }

    #[test]
    fn get_output_preserves_request_order() {
        let mut s = ModelStepper::new(
            Box::new(MassSpringDamper::new()),
            0.0,
            &params(&[("x0", 1.0), ("v0", -2.0)]),
        )
        .unwrap();
        assert_eq!(s.get_output(&["v", "x"]).unwrap(), vec![-2.0, 1.0]);
        assert_eq!(s.get_output(&["x", "x", "v"]).unwrap(), vec![1.0, 1.0, -2.0]);
        s.advance(0.1).unwrap();
        match s.get_output(&["x", "u"]) {
            Err(LookupError::UnknownVariable { name, .. }) => assert_eq!(name, "u"),
            other => panic!("expected UnknownVariable, got {other:?}"),
        }
    }

    #[test]
    fn invalid_dt_rejected_without_touching_model() {
        let (engine, log) = RecordingEngine::new();
        let mut s = ModelStepper::new(Box::new(engine), 0.0, &IndexMap::new()).unwrap();
        for dt in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            match s.advance(dt) {
                Err(StepError::InvalidDt { .. }) => {}
                other => panic!("dt {dt}: expected InvalidDt, got {other:?}"),
            }
        }
        assert!(!s.is_disabled());
        assert_eq!(log.calls().len(), 1, "only the instantiate call");
    }

    #[test]
    fn failed_step_disables_until_reset() {
        let mut s = ModelStepper::new(Box::new(FailingEngine::new(2)), 0.0, &IndexMap::new()).unwrap();
        s.advance(0.1).unwrap();
        s.advance(0.1).unwrap();
        let before = s.time();

        match s.advance(0.1) {
            Err(StepError::Rejected { time, dt, .. }) => {
                assert_eq!(time, before);
                assert_eq!(dt, 0.1);
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert_eq!(s.time(), before, "time must not advance on failure");
        assert!(s.is_disabled());
        assert_eq!(s.advance(0.1), Err(StepError::Disabled));

        s.reset().unwrap();
        assert!(!s.is_disabled());
        assert_eq!(s.time(), 0.0);
        s.advance(0.1).unwrap();
    }

    #[test]
    fn reset_restores_initial_outputs_and_clears_pending() {
        let mut s = ModelStepper::new(
            Box::new(MassSpringDamper::new()),
            2.0,
            &params(&[("m", 10.0), ("d", 1.0), ("k", 2.0), ("x0", 0.25)]),
        )
        .unwrap();
        let initial = s.get_output(&["x", "v"]).unwrap();

        s.set_input("u", 5.0).unwrap();
        for _ in 0..20 {
            s.advance(0.1).unwrap();
        }
        assert_ne!(s.get_output(&["x", "v"]).unwrap(), initial);
        s.set_input("u", 9.0).unwrap();

        s.reset().unwrap();
        assert_eq!(s.get_output(&["x", "v"]).unwrap(), initial);
        assert_eq!(s.time(), 2.0);
        assert_eq!(s.steps(), 0);
        assert_eq!(s.generation(), 1);
        assert_eq!(s.pending_len(), 0);
        assert_eq!(s.last_value("u"), Some(0.0));
    }

    #[test]
    fn parameters_reapplied_on_every_reset() {
        let (engine, log) = RecordingEngine::new();
        let mut s = ModelStepper::new(Box::new(engine), 1.0, &params(&[("gain", 3.0)])).unwrap();
        s.reset().unwrap();
        let inits: Vec<_> = log
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Instantiate { .. }))
            .collect();
        let expected = Call::Instantiate {
            start_time: 1.0,
            parameters: vec![(ValueRef(3), 3.0)],
        };
        assert_eq!(inits, vec![expected.clone(), expected]);
        assert_eq!(s.last_value("gain"), Some(3.0));
    }

    #[test]
    fn unknown_parameter_is_config_error() {
        match ModelStepper::new(Box::new(Integrator::new()), 0.0, &params(&[("k", 1.0)])) {
            Err(ConfigError::UnknownParameter { name }) => assert_eq!(name, "k"),
            other => panic!("expected UnknownParameter, got {other:?}"),
        }
        // Inputs are not parameters either.
        assert!(ModelStepper::new(Box::new(Integrator::new()), 0.0, &params(&[("u", 1.0)])).is_err());
    }

    #[test]
    fn instantiation_failure_is_config_error() {
        match ModelStepper::new(Box::new(MassSpringDamper::new()), 0.0, &params(&[("m", -1.0)])) {
            Err(ConfigError::Engine(EngineError::InstantiationFailed { .. })) => {}
            other => panic!("expected Engine(InstantiationFailed), got {other:?}"),
        }
    }

    #[test]
    fn snapshot_captures_all_outputs() {
        let mut s = ModelStepper::new(Box::new(MassSpringDamper::new()), 0.0, &params(&[("x0", 1.0)]))
            .unwrap();
        s.advance(0.1).unwrap();
        let snap = s.snapshot();
        assert_eq!(snap.step, 1);
        assert_eq!(snap.time, s.time());
        assert_eq!(snap.values.to_vec(), s.get_output(&["x", "v"]).unwrap());
    }

    proptest! {
        #[test]
        fn n_steps_land_on_start_plus_n_dt(
            start in -1e3f64..1e3,
            dt in 1e-4f64..1.0,
            n in 1u64..2000,
        ) {
            let mut s = ModelStepper::new(Box::new(Integrator::new()), start, &IndexMap::new()).unwrap();
            for _ in 0..n {
                s.advance(dt).unwrap();
            }
            let expected = start + n as f64 * dt;
            let tolerance = 1e-9 * expected.abs().max(1.0);
            prop_assert!((s.time() - expected).abs() <= tolerance,
                "time {} expected {} after {} steps", s.time(), expected, n);
        }
    }
}
