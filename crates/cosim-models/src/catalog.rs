//! Name-based lookup of the built-in models.
//!
//! A scenario's `model.source` names one of these. Model packages from
//! external tools plug in by implementing [`ModelEngine`] directly.

use std::error::Error;
use std::fmt;

use cosim_core::ModelEngine;

use crate::integrator::Integrator;
use crate::mass_spring_damper::MassSpringDamper;

/// Names accepted by [`load`], in display order.
pub const MODEL_NAMES: &[&str] = &[MassSpringDamper::NAME, Integrator::NAME];

/// The requested model source is not in the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogError {
    /// No built-in model has this name.
    UnknownModel {
        /// The requested source.
        source: String,
    },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownModel { source } => write!(
                f,
                "unknown model source '{source}' (known: {})",
                MODEL_NAMES.join(", ")
            ),
        }
    }
}

impl Error for CatalogError {}

/// Create an uninstantiated model by name.
///
/// Matching ignores ASCII case and treats `-` like `_`.
pub fn load(source: &str) -> Result<Box<dyn ModelEngine>, CatalogError> {
    let normalized = source.trim().to_ascii_lowercase().replace('-', "_");
    match normalized.as_str() {
        MassSpringDamper::NAME => Ok(Box::new(MassSpringDamper::new())),
        Integrator::NAME => Ok(Box::new(Integrator::new())),
        _ => Err(CatalogError::UnknownModel {
            source: source.to_string(),
        }),
    }
}
