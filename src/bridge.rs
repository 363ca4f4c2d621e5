//! The narrow contract between emitted code and the host runtime.
//!
//! Generated factories assume exactly the symbols listed here: the `thread`
//! they are instantiated with, the `target`/`runtime`/`stage` bindings of
//! the preamble, and the helper functions the runtime's scoped evaluator
//! provides in the lexical scope of the evaluated source. Everything else
//! the VM exposes is out of bounds for emitted code.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Helper functions the scoped evaluator must provide in scope.
pub const RUNTIME_HELPERS: &[&str] = &[
    "toBoolean",
    "mod",
    "randomInt",
    "randomFloat",
    "listGet",
    "listDelete",
    "listInsert",
    "listReplace",
    "listContains",
    "listIndexOf",
    "listContents",
    "compareEqual",
    "compareLessThan",
    "compareGreaterThan",
    "timer",
    "limitPrecision",
    "colorToList",
    "distance",
    "daysSince2000",
    "startHats",
    "waitThreads",
    "executeInCompatibilityLayer",
    "retire",
    "isStuck",
    "tan",
];

static HELPER_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| RUNTIME_HELPERS.iter().copied().collect());

/// True when `name` is one of the helpers the scoped evaluator provides.
pub fn is_runtime_helper(name: &str) -> bool {
    HELPER_SET.contains(name)
}

/// Compile-time facts about the target a script runs on.
///
/// The compiler needs very little from the target itself: whether it is the
/// stage, and which names are claimed by costumes and sounds. A string
/// constant equal to such a name must never be folded through a numeric
/// fast path, because host blocks resolve those names by string identity.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompileTarget {
    pub is_stage: bool,
    pub costume_names: Vec<String>,
    pub sound_names: Vec<String>,
}

impl CompileTarget {
    /// A target with no name collisions to worry about.
    pub fn sprite() -> CompileTarget {
        CompileTarget::default()
    }

    /// True when a string constant collides with a costume or sound name.
    pub fn is_unsafe_name(&self, s: &str) -> bool {
        self.costume_names.iter().any(|n| n == s) || self.sound_names.iter().any(|n| n == s)
    }
}

/// The output of compiling one script: the factory source plus the metadata
/// the runtime needs to install it.
///
/// The factory source is a single host-language expression. Evaluating it
/// yields a function of `thread` that returns the script body — a plain
/// function, or a generator when `yields` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledScript {
    pub factory_source: String,
    pub factory_name: String,
    /// Name of the inner function, with a sanitized copy of the procedure
    /// code appended for debuggability.
    pub function_name: String,
    pub yields: bool,
    pub is_procedure: bool,
    pub procedure_code: String,
    pub top_block_id: String,
}

/// Evaluates factory sources in a closed lexical scope containing the
/// `RUNTIME_HELPERS`. Implemented by the runtime; the compiler core only
/// produces sources for it.
pub trait ScopedEval {
    /// Host representation of the evaluated factory.
    type Factory;

    fn scoped_eval(&mut self, compiled: &CompiledScript) -> Self::Factory;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_lookup() {
        assert!(is_runtime_helper("compareEqual"));
        assert!(is_runtime_helper("executeInCompatibilityLayer"));
        assert!(!is_runtime_helper("toNumber"));
        assert!(!is_runtime_helper("eval"));
    }

    #[test]
    fn test_unsafe_names() {
        let target = CompileTarget {
            is_stage: false,
            costume_names: vec!["123".into(), "walk".into()],
            sound_names: vec!["pop".into()],
        };
        assert!(target.is_unsafe_name("123"));
        assert!(target.is_unsafe_name("pop"));
        assert!(!target.is_unsafe_name("456"));
    }
}
