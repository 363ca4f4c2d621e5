//! Scripts, procedure tables and the references they share.

use crate::bridge::CompiledScript;
use crate::ir::stack::Stack;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a variable or list lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope {
    /// Owned by the sprite the script runs on.
    Target,
    /// Owned by the stage, shared by every sprite.
    Stage,
}

/// A reference to a variable slot in a target's variable table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableRef {
    pub id: String,
    pub name: String,
    pub scope: VariableScope,
    /// Cloud variables mirror writes to the cloud service.
    #[serde(default)]
    pub is_cloud: bool,
}

impl VariableRef {
    /// A sprite-local variable reference.
    pub fn for_target(id: impl Into<String>, name: impl Into<String>) -> VariableRef {
        VariableRef {
            id: id.into(),
            name: name.into(),
            scope: VariableScope::Target,
            is_cloud: false,
        }
    }

    /// A stage (global) variable reference.
    pub fn for_stage(id: impl Into<String>, name: impl Into<String>) -> VariableRef {
        VariableRef {
            id: id.into(),
            name: name.into(),
            scope: VariableScope::Stage,
            is_cloud: false,
        }
    }
}

/// A reference to a list slot in a target's variable table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListRef {
    pub id: String,
    pub name: String,
    pub scope: VariableScope,
}

impl ListRef {
    /// A sprite-local list reference.
    pub fn for_target(id: impl Into<String>, name: impl Into<String>) -> ListRef {
        ListRef {
            id: id.into(),
            name: name.into(),
            scope: VariableScope::Target,
        }
    }

    /// A stage (global) list reference.
    pub fn for_stage(id: impl Into<String>, name: impl Into<String>) -> ListRef {
        ListRef {
            id: id.into(),
            name: name.into(),
            scope: VariableScope::Stage,
        }
    }
}

/// One compilable script: an entry hat's stack or a procedure variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Id of the hat or definition block the script hangs from.
    pub top_block_id: String,
    pub stack: Stack,
    pub is_procedure: bool,
    /// Procedure signature string; empty for entry scripts.
    #[serde(default)]
    pub procedure_code: String,
    /// Argument names, in call order.
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Warp mode suppresses per-iteration loop yields.
    #[serde(default)]
    pub is_warp: bool,
    /// Whether the compiled function must be a resumable generator.
    #[serde(default)]
    pub yields: bool,
    /// Whether warp-mode loops still check the stuck timer.
    #[serde(default)]
    pub warp_timer: bool,
    /// Procedure variants this script calls, in dependency order.
    #[serde(default)]
    pub depended_procedures: Vec<String>,
    /// Cache slot for the compiled function, filled by `Ir::compile`.
    #[serde(skip)]
    pub cached_compile: Option<CompiledScript>,
}

impl Script {
    /// An entry script over a stack.
    pub fn entry(top_block_id: impl Into<String>, stack: Stack) -> Script {
        Script {
            top_block_id: top_block_id.into(),
            stack,
            is_procedure: false,
            procedure_code: String::new(),
            arguments: Vec::new(),
            is_warp: false,
            yields: false,
            warp_timer: false,
            depended_procedures: Vec::new(),
            cached_compile: None,
        }
    }

    /// A procedure variant over a stack.
    pub fn procedure(code: impl Into<String>, arguments: Vec<String>, stack: Stack) -> Script {
        let code = code.into();
        Script {
            top_block_id: code.clone(),
            stack,
            is_procedure: true,
            procedure_code: code,
            arguments,
            is_warp: false,
            yields: false,
            warp_timer: false,
            depended_procedures: Vec::new(),
            cached_compile: None,
        }
    }
}

/// A compilation unit: one entry script plus the procedure variants it can
/// reach, keyed by variant code.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ir {
    pub entry: Script,
    pub procedures: HashMap<String, Script>,
}

impl Default for Script {
    fn default() -> Self {
        Script::entry("", Vec::new())
    }
}

impl Ir {
    /// An IR with no procedures.
    pub fn with_entry(entry: Script) -> Ir {
        Ir {
            entry,
            procedures: HashMap::new(),
        }
    }
}
