//! Stack blocks: the statement nodes of a script.
//!
//! A stack is an ordered sequence of blocks. Control blocks own nested
//! stacks for their branches and bodies. Each block may be annotated by the
//! analyzer with the variable-type state observed at its entry and exit;
//! the annotations are metadata only and never change execution semantics.

use crate::analysis::state::TypeState;
use crate::ir::input::Input;
use crate::ir::script::{ListRef, VariableRef};
use serde::{Deserialize, Serialize};

/// An ordered sequence of stack blocks.
pub type Stack = Vec<StackBlock>;

/// The shape of a statement node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StackKind {
    VarSet {
        var: VariableRef,
        value: Input,
    },
    VarShow {
        var: VariableRef,
    },
    VarHide {
        var: VariableRef,
    },
    ListAdd {
        list: ListRef,
        item: Input,
    },
    ListInsert {
        list: ListRef,
        index: Input,
        item: Input,
    },
    ListReplace {
        list: ListRef,
        index: Input,
        item: Input,
    },
    ListDelete {
        list: ListRef,
        index: Input,
    },
    ListDeleteAll {
        list: ListRef,
    },
    ListShow {
        list: ListRef,
    },
    ListHide {
        list: ListRef,
    },
    IfElse {
        condition: Input,
        then_branch: Stack,
        else_branch: Stack,
    },
    While {
        condition: Input,
        body: Stack,
    },
    Repeat {
        times: Input,
        body: Stack,
    },
    /// Counted loop writing 1..=count into a variable.
    For {
        var: VariableRef,
        count: Input,
        body: Stack,
    },
    Wait {
        seconds: Input,
    },
    WaitUntil {
        condition: Input,
    },
    StopScript,
    StopAll,
    StopOtherScripts,
    Broadcast {
        name: Input,
    },
    BroadcastAndWait {
        name: Input,
    },
    ProcedureCall {
        /// Procedure variant code.
        code: String,
        arguments: Vec<Input>,
    },
    MotionSetX {
        x: Input,
    },
    MotionSetY {
        y: Input,
    },
    MotionSetXY {
        x: Input,
        y: Input,
    },
    MotionChangeX {
        dx: Input,
    },
    MotionChangeY {
        dy: Input,
    },
    MotionSetDirection {
        direction: Input,
    },
    LooksSay {
        message: Input,
    },
    LooksShow,
    LooksHide,
    LooksSetSize {
        size: Input,
    },
    LooksSetCostume {
        costume: Input,
    },
    PenClear,
    PenDown,
    PenUp,
    SoundStopAll,
    /// Dispose the running clone and retire its threads.
    CloneDeleteThis,
    /// Execute an uncompiled block through the runtime shim.
    CompatibilityLayer {
        opcode: String,
        inputs: Vec<(String, Input)>,
        fields: Vec<(String, String)>,
    },
    /// Invoke a block contributed by an addon.
    AddonCall {
        name: String,
        arguments: Vec<(String, Input)>,
    },
    Debugger,
    /// Report an input's value next to the hat block when defined.
    VisualReport {
        input: Input,
    },
    Nop,
}

impl StackKind {
    /// True for the loop constructs that re-run their body.
    pub fn is_loop(&self) -> bool {
        matches!(
            self,
            StackKind::While { .. } | StackKind::Repeat { .. } | StackKind::For { .. }
        )
    }
}

/// A statement node plus its analysis metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StackBlock {
    pub kind: StackKind,
    /// Whether executing this block can hand control back to the sequencer.
    /// On a loop, the flag means the loop yields at its head every iteration.
    #[serde(default)]
    pub yields: bool,
    /// Variable-type state at block entry, recorded by the analyzer.
    #[serde(skip)]
    pub entry_state: Option<TypeState>,
    /// Variable-type state at block exit, recorded by the analyzer.
    #[serde(skip)]
    pub exit_state: Option<TypeState>,
}

impl StackBlock {
    /// A block with no yield flag and no annotations.
    pub fn new(kind: StackKind) -> StackBlock {
        StackBlock {
            kind,
            yields: false,
            entry_state: None,
            exit_state: None,
        }
    }

    /// A block flagged as able to yield.
    pub fn yielding(kind: StackKind) -> StackBlock {
        StackBlock {
            kind,
            yields: true,
            entry_state: None,
            exit_state: None,
        }
    }
}
