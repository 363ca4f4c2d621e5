//! Name pools for generated source.
//!
//! Factory and function names are unique across every script compiled
//! through one context (the counters live on `CompilerContext`); locals and
//! setup bindings only need to be unique within one compiled function, so
//! their pools live on the generator and are disposed with it.

use std::collections::HashMap;

/// Pool of short local names (`a0`, `a1`, ...).
#[derive(Debug, Default)]
pub struct LocalPool {
    next: usize,
}

impl LocalPool {
    pub fn new() -> LocalPool {
        LocalPool::default()
    }

    /// A fresh local name.
    pub fn next(&mut self) -> String {
        let n = self.next;
        self.next += 1;
        format!("a{}", n)
    }
}

/// Deduplicated setup bindings (`b0`, `b1`, ...): expressions evaluated once
/// in the factory preamble and referenced by name from the body.
#[derive(Debug, Default)]
pub struct SetupBindings {
    entries: Vec<(String, String)>,
    by_expr: HashMap<String, String>,
}

impl SetupBindings {
    pub fn new() -> SetupBindings {
        SetupBindings::default()
    }

    /// The binding name for `expr`, allocating one on first use.
    pub fn bind(&mut self, expr: &str) -> String {
        if let Some(name) = self.by_expr.get(expr) {
            return name.clone();
        }
        let name = format!("b{}", self.entries.len());
        self.entries.push((name.clone(), expr.to_string()));
        self.by_expr.insert(expr.to_string(), name.clone());
        name
    }

    /// Bindings in allocation order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A sanitized, truncated copy of a procedure code, appended to generated
/// function names for debuggability.
pub fn sanitize_procedure_name(code: &str) -> String {
    code.chars()
        .take(20)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
