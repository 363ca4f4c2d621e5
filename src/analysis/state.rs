//! Variable-type state threaded through analysis.

use crate::lattice::ValueType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mapping from variable id to the lattice element describing the values the
/// variable may currently hold.
///
/// Absent keys are implicitly `ANY`: `get` returns `ANY` for them, and the
/// merge treats a key present on only one side as joining with `ANY`. A
/// variable assigned on only one arm of a branch is therefore unknown after
/// the merge.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeState {
    vars: HashMap<String, ValueType>,
}

impl TypeState {
    /// An empty state; every variable reads as `ANY`.
    pub fn new() -> TypeState {
        TypeState {
            vars: HashMap::new(),
        }
    }

    /// The type of a variable, `ANY` when unknown.
    pub fn get(&self, id: &str) -> ValueType {
        self.vars.get(id).copied().unwrap_or(ValueType::ANY)
    }

    /// Records a variable's type. Returns whether the stored element changed.
    pub fn set(&mut self, id: &str, ty: ValueType) -> bool {
        let prev = self
            .vars
            .insert(id.to_string(), ty)
            .unwrap_or(ValueType::ANY);
        prev != ty
    }

    /// Joins another state into this one, element-wise.
    ///
    /// Keys present on only one side widen to `ANY` (on this side that means
    /// joining the stored element with `ANY`; keys absent here already read
    /// as `ANY`). Returns whether this state changed.
    pub fn or(&mut self, other: &TypeState) -> bool {
        let mut changed = false;
        for (id, ty) in self.vars.iter_mut() {
            let other_ty = other.vars.get(id).copied().unwrap_or(ValueType::ANY);
            let joined = *ty | other_ty;
            if joined != *ty {
                *ty = joined;
                changed = true;
            }
        }
        changed
    }

    /// Widens every entry to `ANY`, as required after a yield or an opaque
    /// call. Returns whether anything was narrower beforehand.
    pub fn clear(&mut self) -> bool {
        let mut changed = false;
        for ty in self.vars.values_mut() {
            if *ty != ValueType::ANY {
                *ty = ValueType::ANY;
                changed = true;
            }
        }
        changed
    }

    /// Number of explicitly tracked variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// True when no variable is explicitly tracked.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
