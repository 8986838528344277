//! The [`VariableRegistry`]: name → handle resolution built once at startup.
//!
//! Causality filtering happens exactly once, here. Everything downstream
//! (stepper, router, gateway, publisher) works with [`VarId`] handles and
//! the pre-partitioned input/output/parameter lists.

use indexmap::IndexMap;

use crate::error::{LookupError, RegistryError};
use crate::id::{ValueRef, VarId};
use crate::variable::{Causality, VariableDef};

/// Immutable set of model variables, partitioned by causality.
#[derive(Clone, Debug)]
pub struct VariableRegistry {
    variables: Vec<VariableDef>,
    by_name: IndexMap<String, VarId>,
    inputs: Vec<VarId>,
    outputs: Vec<VarId>,
    parameters: Vec<VarId>,
}

impl VariableRegistry {
    /// Build a registry from model metadata.
    ///
    /// Rejects duplicate names and duplicate value references. Handle
    /// `VarId(n)` is assigned to `defs[n]`.
    pub fn build(defs: Vec<VariableDef>) -> Result<Self, RegistryError> {
        if u32::try_from(defs.len()).is_err() {
            return Err(RegistryError::TooManyVariables { count: defs.len() });
        }

        let mut by_name = IndexMap::with_capacity(defs.len());
        let mut by_ref: IndexMap<ValueRef, usize> = IndexMap::with_capacity(defs.len());
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut parameters = Vec::new();

        for (i, def) in defs.iter().enumerate() {
            let id = VarId(i as u32);
            if by_name.insert(def.name.clone(), id).is_some() {
                return Err(RegistryError::DuplicateName {
                    name: def.name.clone(),
                });
            }
            if let Some(&first) = by_ref.get(&def.value_ref) {
                return Err(RegistryError::DuplicateValueRef {
                    value_ref: def.value_ref,
                    first: defs[first].name.clone(),
                    second: def.name.clone(),
                });
            }
            by_ref.insert(def.value_ref, i);

            match def.causality {
                Causality::Input => inputs.push(id),
                Causality::Output => outputs.push(id),
                Causality::Parameter => parameters.push(id),
            }
        }

        Ok(Self {
            variables: defs,
            by_name,
            inputs,
            outputs,
            parameters,
        })
    }

    /// Number of registered variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the model declared no variables at all.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Definition behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this registry.
    pub fn get(&self, id: VarId) -> &VariableDef {
        &self.variables[id.index()]
    }

    /// Name behind a handle.
    pub fn name(&self, id: VarId) -> &str {
        &self.get(id).name
    }

    /// Engine value reference behind a handle.
    pub fn value_ref(&self, id: VarId) -> ValueRef {
        self.get(id).value_ref
    }

    /// Resolve a name regardless of causality.
    pub fn lookup(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    /// Resolve a name that must have the given causality.
    pub fn resolve(&self, name: &str, expected: Causality) -> Result<VarId, LookupError> {
        match self.lookup(name) {
            Some(id) if self.get(id).causality == expected => Ok(id),
            _ => Err(LookupError::UnknownVariable {
                name: name.to_string(),
                expected,
            }),
        }
    }

    /// Resolve a registered input by name.
    pub fn input(&self, name: &str) -> Result<VarId, LookupError> {
        self.resolve(name, Causality::Input)
    }

    /// Resolve a registered output by name.
    pub fn output(&self, name: &str) -> Result<VarId, LookupError> {
        self.resolve(name, Causality::Output)
    }

    /// Resolve a registered parameter by name.
    pub fn parameter(&self, name: &str) -> Result<VarId, LookupError> {
        self.resolve(name, Causality::Parameter)
    }

    /// Input handles in declaration order.
    pub fn inputs(&self) -> &[VarId] {
        &self.inputs
    }

    /// Output handles in declaration order.
    pub fn outputs(&self) -> &[VarId] {
        &self.outputs
    }

    /// Parameter handles in declaration order.
    pub fn parameters(&self) -> &[VarId] {
        &self.parameters
    }

    /// Input names in declaration order.
    pub fn input_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.inputs.iter().map(|&id| self.name(id))
    }

    /// Output names in declaration order.
    pub fn output_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.outputs.iter().map(|&id| self.name(id))
    }

    /// All `(handle, definition)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, &VariableDef)> + '_ {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, def)| (VarId(i as u32), def))
    }
}
