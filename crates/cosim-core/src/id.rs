//! Strongly-typed handles for model variables.

use std::fmt;

/// Stable handle of a variable inside a [`VariableRegistry`](crate::VariableRegistry).
///
/// `VarId(n)` is the n-th variable in the order the model declared its
/// metadata. Handles are assigned once when the registry is built and
/// never change afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl VarId {
    /// The handle as a registry index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for VarId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Opaque value reference the model engine uses to address a variable.
///
/// The bridge never interprets the number; it only passes it back to the
/// engine it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueRef(pub u32);

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vr{}", self.0)
    }
}

impl From<u32> for ValueRef {
    fn from(v: u32) -> Self {
        Self(v)
    }
}
