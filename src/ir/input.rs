//! Input expression nodes.
//!
//! An input is a tree of typed expressions: constants, variable and list
//! reads, casts, operators and the reporter blocks of the surface language.
//! Every node carries the lattice type of the values it may produce; the
//! type starts at the conservative per-opcode default and is refined by the
//! analyzer and rewriter.

use crate::ir::constant::Constant;
use crate::ir::script::{ListRef, VariableRef};
use crate::lattice::ValueType;
use serde::{Deserialize, Serialize};

/// Cast targets for explicit coercion nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastKind {
    /// Host truthiness; `""`, `"0"` and `"false"` are false.
    Boolean,
    /// Numeric coercion with NaN replaced by 0. Preserves -0.
    Number,
    /// Lossless numeric coercion; may produce NaN.
    NumberOrNan,
    /// Numeric coercion followed by truncation toward zero.
    NumberIndex,
    /// Host string coercion.
    String,
}

impl CastKind {
    /// The lattice element a value is guaranteed to inhabit after this cast.
    /// A cast whose operand is already always inside this set is redundant.
    pub fn target_type(self) -> ValueType {
        match self {
            CastKind::Boolean => ValueType::BOOLEAN,
            CastKind::Number => ValueType::NUMBER,
            CastKind::NumberOrNan => ValueType::NUMBER_OR_NAN,
            CastKind::NumberIndex => ValueType::NUMBER_OR_NAN.without(ValueType::FRACT),
            CastKind::String => ValueType::ANY_STRING,
        }
    }
}

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Eq,
    Lt,
    Gt,
    /// String concatenation.
    Join,
    /// 1-based letter extraction.
    LetterOf,
    /// Case-insensitive substring test.
    Contains,
    /// Random number between two bounds; integral when both bounds are.
    Random,
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Len,
    Abs,
    Floor,
    Ceil,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Ln,
    Log10,
    PowE,
    Pow10,
    Round,
}

/// The shape of an input expression node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum InputKind {
    Constant(Constant),
    VarGet(VariableRef),
    ListGet {
        list: ListRef,
        index: Box<Input>,
    },
    ListLength {
        list: ListRef,
    },
    ListContains {
        list: ListRef,
        item: Box<Input>,
    },
    ListIndexOf {
        list: ListRef,
        item: Box<Input>,
    },
    ListContents {
        list: ListRef,
    },
    /// A string/number procedure argument, read from the call frame.
    ProcedureArgStringNumber {
        index: usize,
        name: String,
    },
    /// A boolean procedure argument.
    ProcedureArgBoolean {
        index: usize,
        name: String,
    },
    Cast {
        kind: CastKind,
        value: Box<Input>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Input>,
        right: Box<Input>,
    },
    Unary {
        op: UnaryOp,
        value: Box<Input>,
    },
    MotionX,
    MotionY,
    MotionDirection,
    LooksSize,
    LooksCostumeNumber,
    LooksCostumeName,
    SensingTimer,
    SensingMouseX,
    SensingMouseY,
    SensingMouseDown,
    SensingKeyDown {
        key: Box<Input>,
    },
    SensingDaysSince2000,
    SensingUsername,
    SensingDistanceTo {
        object: Box<Input>,
    },
    SensingTouching {
        object: Box<Input>,
    },
    /// Read a property (or variable) of another target.
    SensingOf {
        property: String,
        object: Box<Input>,
    },
    /// Evaluate an uncompiled reporter through the runtime shim.
    CompatibilityLayer {
        opcode: String,
        inputs: Vec<(String, Input)>,
        fields: Vec<(String, String)>,
    },
}

impl InputKind {
    /// The declared default lattice type of this opcode, before analysis.
    pub fn default_type(&self) -> ValueType {
        match self {
            InputKind::Constant(c) => c.value_type(),
            InputKind::VarGet(_) => ValueType::ANY,
            InputKind::ListGet { .. } => ValueType::ANY,
            InputKind::ListLength { .. } => ValueType::POS_INT | ValueType::ZERO,
            InputKind::ListContains { .. } => ValueType::BOOLEAN,
            InputKind::ListIndexOf { .. } => ValueType::POS_INT | ValueType::ZERO,
            InputKind::ListContents { .. } => ValueType::ANY_STRING,
            InputKind::ProcedureArgStringNumber { .. } => ValueType::ANY,
            InputKind::ProcedureArgBoolean { .. } => ValueType::BOOLEAN,
            InputKind::Cast { kind, .. } => kind.target_type(),
            InputKind::Binary { op, .. } => match op {
                // Even with coerced operands, opposing infinities and 0/0
                // can produce NaN.
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                    ValueType::NUMBER_OR_NAN
                }
                BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Eq
                | BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::Contains => ValueType::BOOLEAN,
                BinaryOp::Join | BinaryOp::LetterOf => ValueType::ANY_STRING,
                BinaryOp::Random => ValueType::NUMBER,
            },
            InputKind::Unary { op, .. } => match op {
                UnaryOp::Not => ValueType::BOOLEAN,
                UnaryOp::Len => ValueType::POS_INT | ValueType::ZERO,
                UnaryOp::Abs => ValueType::POS | ValueType::ZERO,
                UnaryOp::Floor | UnaryOp::Ceil | UnaryOp::Round => {
                    ValueType::NUMBER.without(ValueType::FRACT)
                }
                UnaryOp::Sqrt | UnaryOp::Asin | UnaryOp::Acos | UnaryOp::Atan => {
                    ValueType::NUMBER_OR_NAN
                }
                UnaryOp::Sin | UnaryOp::Cos => ValueType::REAL,
                UnaryOp::Tan => ValueType::NUMBER,
                UnaryOp::Ln | UnaryOp::Log10 => ValueType::NUMBER_OR_NAN,
                UnaryOp::PowE | UnaryOp::Pow10 => ValueType::POS | ValueType::ZERO,
            },
            InputKind::MotionX | InputKind::MotionY => ValueType::REAL,
            InputKind::MotionDirection => ValueType::REAL,
            InputKind::LooksSize => ValueType::POS_REAL | ValueType::ZERO,
            InputKind::LooksCostumeNumber => ValueType::POS_INT,
            InputKind::LooksCostumeName => ValueType::ANY_STRING,
            InputKind::SensingTimer => ValueType::POS_REAL | ValueType::ZERO,
            InputKind::SensingMouseX | InputKind::SensingMouseY => {
                ValueType::POS_INT | ValueType::NEG_INT | ValueType::ANY_ZERO
            }
            InputKind::SensingMouseDown
            | InputKind::SensingKeyDown { .. }
            | InputKind::SensingTouching { .. } => ValueType::BOOLEAN,
            InputKind::SensingDaysSince2000 => ValueType::POS_REAL,
            InputKind::SensingUsername => ValueType::ANY_STRING,
            InputKind::SensingDistanceTo { .. } => ValueType::POS_REAL | ValueType::ZERO,
            InputKind::SensingOf { .. } => ValueType::ANY,
            InputKind::CompatibilityLayer { .. } => ValueType::ANY,
        }
    }
}

/// An input expression with its refined type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub kind: InputKind,
    /// Over-approximation of the values this expression can produce.
    pub ty: ValueType,
    /// Whether evaluating this input can hand control back to the sequencer.
    #[serde(default)]
    pub yields: bool,
}

impl Input {
    /// Builds a node with the opcode's declared default type.
    pub fn new(kind: InputKind) -> Input {
        let ty = kind.default_type();
        let yields = matches!(kind, InputKind::CompatibilityLayer { .. });
        Input { kind, ty, yields }
    }

    /// A constant input carrying the precise type of its literal.
    pub fn constant(value: Constant) -> Input {
        Input::new(InputKind::Constant(value))
    }

    /// A numeric constant.
    pub fn number(n: f64) -> Input {
        Input::constant(Constant::Number(n))
    }

    /// A string constant.
    pub fn string(s: impl Into<String>) -> Input {
        Input::constant(Constant::String(s.into()))
    }

    /// A boolean constant.
    pub fn boolean(b: bool) -> Input {
        Input::constant(Constant::Boolean(b))
    }

    /// A variable read. Its type stays `ANY` until analysis runs.
    pub fn var_get(var: VariableRef) -> Input {
        Input::new(InputKind::VarGet(var))
    }

    /// A binary operator node.
    pub fn binary(op: BinaryOp, left: Input, right: Input) -> Input {
        Input::new(InputKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// A unary operator node.
    pub fn unary(op: UnaryOp, value: Input) -> Input {
        Input::new(InputKind::Unary {
            op,
            value: Box::new(value),
        })
    }

    /// True iff this is a CONSTANT node storing `v`; numeric comparands are
    /// checked after numeric coercion of the stored literal.
    pub fn is_constant(&self, v: &Constant) -> bool {
        match &self.kind {
            InputKind::Constant(c) => c.matches(v),
            _ => false,
        }
    }

    /// The stored literal, when this is a CONSTANT node.
    pub fn as_constant(&self) -> Option<&Constant> {
        match &self.kind {
            InputKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Coerces this input to a target type.
    ///
    /// Returns the node unchanged when its type already guarantees the
    /// target, folds the cast at build time on constants, and otherwise
    /// wraps the node in an explicit cast.
    pub fn to_type(self, kind: CastKind) -> Input {
        if self.ty.is_always(kind.target_type()) {
            return self;
        }
        if let InputKind::Constant(c) = &self.kind {
            let folded = match kind {
                CastKind::Boolean => Constant::Boolean(c.to_boolean()),
                CastKind::Number => Constant::Number(c.to_number()),
                CastKind::NumberOrNan => Constant::Number(c.to_number_or_nan()),
                CastKind::NumberIndex => Constant::Number(c.to_number_index()),
                CastKind::String => Constant::String(c.to_display_string()),
            };
            return Input::constant(folded);
        }
        let mut out = Input::new(InputKind::Cast {
            kind,
            value: Box::new(self),
        });
        out.yields = match &out.kind {
            InputKind::Cast { value, .. } => value.yields,
            _ => false,
        };
        out
    }
}
