//! Benchmark profiles for the cosim bridge.
//!
//! - [`reference_stepper`]: the mass-spring-damper plant used by the
//!   closed-loop demo (m = 10, d = 1, k = 2).
//! - [`reference_router`]: default topic table over a stepper's registry.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use cosim_engine::{ModelStepper, TopicRouter, TopicScheme};
use cosim_models::MassSpringDamper;
use indexmap::IndexMap;

/// Build the reference plant at `t = 0`.
///
/// Panics if the model rejects its own parameters, which would be a bug in
/// the model rather than in the benchmark.
pub fn reference_stepper() -> ModelStepper {
    let parameters: IndexMap<String, f64> = [("m", 10.0), ("d", 1.0), ("k", 2.0)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    ModelStepper::new(Box::new(MassSpringDamper::new()), 0.0, &parameters)
        .expect("reference parameters are valid")
}

/// Default topic table over `stepper`'s registry.
pub fn reference_router(stepper: &ModelStepper) -> Arc<TopicRouter> {
    Arc::new(
        TopicRouter::new(Arc::clone(stepper.registry()), TopicScheme::default())
            .expect("reference model has no colliding topics"),
    )
}
