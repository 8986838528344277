//! Built-in models and the reference controller for the cosim bridge.
//!
//! - [`MassSpringDamper`]: `m·x'' + d·x' + k·x = u`, the demo plant.
//! - [`Integrator`]: `x' = u`, exact and cheap, used for timing tests.
//! - [`catalog`]: resolves a scenario's `model.source` to an engine.
//! - [`pid`]: the PID reference controller with explicit state.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod catalog;
pub mod integrator;
pub mod mass_spring_damper;
pub mod pid;

pub use catalog::{load, CatalogError, MODEL_NAMES};
pub use integrator::Integrator;
pub use mass_spring_damper::MassSpringDamper;
pub use pid::{Pid, PidGains, PidOutput, PidState};
