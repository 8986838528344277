//! Core types and traits for the cosim co-simulation bridge.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the workspace: variable
//! handles, causality, the variable registry built from model metadata,
//! the [`ModelEngine`] trait, and the model-side error taxonomy.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod model;
pub mod registry;
pub mod variable;

pub use error::{EngineError, LookupError, RegistryError, StepError};
pub use id::{ValueRef, VarId};
pub use model::ModelEngine;
pub use registry::VariableRegistry;
pub use variable::{Causality, VariableDef};
