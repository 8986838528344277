//! Variable metadata: causality and per-variable definitions.

use std::fmt;

use crate::id::ValueRef;

/// Role a variable plays in the model interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Causality {
    /// Written from outside before each step.
    Input,
    /// Computed by the model, read after each step.
    Output,
    /// Fixed for a run; applied at initialization and on every reset.
    Parameter,
}

impl Causality {
    /// Lower-case label used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Parameter => "parameter",
        }
    }
}

impl fmt::Display for Causality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single variable as declared by the model's metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableDef {
    /// Unique variable name.
    pub name: String,
    /// Input, output, or parameter.
    pub causality: Causality,
    /// Engine-side handle for this variable.
    pub value_ref: ValueRef,
    /// Declared start value, if the model provides one.
    pub start: Option<f64>,
}

impl VariableDef {
    /// Shorthand constructor with no start value.
    pub fn new(name: impl Into<String>, causality: Causality, value_ref: u32) -> Self {
        Self {
            name: name.into(),
            causality,
            value_ref: ValueRef(value_ref),
            start: None,
        }
    }

    /// Attach a declared start value.
    pub fn with_start(mut self, start: f64) -> Self {
        self.start = Some(start);
        self
    }
}
