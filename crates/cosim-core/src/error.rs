//! Error types for the model side of the bridge.
//!
//! Organized by subsystem: engine (the opaque model capability), step
//! (advancing simulation time), lookup (name resolution at the registry
//! boundary), and registry construction.

use std::error::Error;
use std::fmt;

use crate::id::ValueRef;
use crate::variable::Causality;

/// Errors reported by a [`ModelEngine`](crate::ModelEngine) implementation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineError {
    /// The model instance could not be created or initialized.
    InstantiationFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The model refused to integrate over the requested interval.
    StepRejected {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// A value reference does not belong to this model.
    UnknownValueRef(ValueRef),
    /// The engine was used before `instantiate()` succeeded.
    NotInstantiated,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstantiationFailed { reason } => write!(f, "instantiation failed: {reason}"),
            Self::StepRejected { reason } => write!(f, "step rejected: {reason}"),
            Self::UnknownValueRef(vr) => write!(f, "unknown value reference {vr}"),
            Self::NotInstantiated => write!(f, "model is not instantiated"),
        }
    }
}

impl Error for EngineError {}

/// Errors from `ModelStepper::advance()` (the `StepFailure` kind).
///
/// Any of these stops the stepping loop. After [`StepError::Rejected`] the
/// stepper refuses further advances until it is reset.
#[derive(Clone, Debug, PartialEq)]
pub enum StepError {
    /// The engine rejected the step or the inputs staged for it.
    Rejected {
        /// Simulation time at the start of the failed step.
        time: f64,
        /// Requested step size.
        dt: f64,
        /// The underlying engine error.
        reason: EngineError,
    },
    /// `dt` was NaN, infinite, zero, or negative.
    InvalidDt {
        /// The invalid value.
        dt: f64,
    },
    /// A previous step failed; the model must be reset before stepping.
    Disabled,
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { time, dt, reason } => {
                write!(f, "step at t={time} with dt={dt} failed: {reason}")
            }
            Self::InvalidDt { dt } => write!(f, "dt must be finite and positive, got {dt}"),
            Self::Disabled => write!(f, "stepping disabled after a failed step; reset required"),
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Rejected { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Name lookup failed at the registry boundary (the `UnknownVariable` kind).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupError {
    /// No variable with this name and causality is registered.
    UnknownVariable {
        /// The name that was looked up.
        name: String,
        /// The causality the caller required.
        expected: Causality,
    },
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownVariable { name, expected } => {
                write!(f, "unknown {expected} variable '{name}'")
            }
        }
    }
}

impl Error for LookupError {}

/// Errors detected while building a [`VariableRegistry`](crate::VariableRegistry).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// Two variables share a name.
    DuplicateName {
        /// The repeated name.
        name: String,
    },
    /// Two variables share an engine value reference.
    DuplicateValueRef {
        /// The repeated reference.
        value_ref: ValueRef,
        /// Name of the first variable holding it.
        first: String,
        /// Name of the second variable holding it.
        second: String,
    },
    /// More variables than a [`VarId`](crate::VarId) can address.
    TooManyVariables {
        /// The number of variables declared.
        count: usize,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName { name } => write!(f, "duplicate variable name '{name}'"),
            Self::DuplicateValueRef {
                value_ref,
                first,
                second,
            } => write!(
                f,
                "variables '{first}' and '{second}' share value reference {value_ref}"
            ),
            Self::TooManyVariables { count } => {
                write!(f, "{count} variables exceed the u32 handle space")
            }
        }
    }
}

impl Error for RegistryError {}
