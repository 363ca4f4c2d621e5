//! The value-type bitset.
//!
//! A `ValueType` is a set of disjoint atoms describing the values an
//! expression may evaluate to. The numeric atoms split the number line
//! finely enough to track signs, zeros, infinities and NaN through
//! arithmetic:
//!
//! ```text
//! POS_INT   positive integer-valued numbers
//! POS_FRACT positive numbers with a fractional part
//! POS_INF   +Infinity
//! NEG_INT   negative integer-valued numbers
//! NEG_FRACT negative numbers with a fractional part
//! NEG_INF   -Infinity
//! ZERO      +0
//! NEG_ZERO  -0
//! NAN       NaN
//! ```
//!
//! plus `BOOLEAN`, `STRING` and `STRING_NUM` (a string that parses as a
//! number). The empty set is the lattice bottom; `ANY` (all atoms) is top.
//!
//! Two invariants hold everywhere in the compiler: the type attached to a
//! constant exactly characterizes its literal, and every analyzer-produced
//! type over-approximates — no runtime value may fall outside it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

/// A set of value atoms forming an element of the type lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueType(u32);

impl ValueType {
    /// The empty set (lattice bottom). No runtime value has this type.
    pub const NONE: ValueType = ValueType(0);

    /// Positive integer-valued number.
    pub const POS_INT: ValueType = ValueType(1 << 0);
    /// Positive number with a fractional component.
    pub const POS_FRACT: ValueType = ValueType(1 << 1);
    /// +Infinity.
    pub const POS_INF: ValueType = ValueType(1 << 2);
    /// Negative integer-valued number.
    pub const NEG_INT: ValueType = ValueType(1 << 3);
    /// Negative number with a fractional component.
    pub const NEG_FRACT: ValueType = ValueType(1 << 4);
    /// -Infinity.
    pub const NEG_INF: ValueType = ValueType(1 << 5);
    /// Positive zero.
    pub const ZERO: ValueType = ValueType(1 << 6);
    /// Negative zero.
    pub const NEG_ZERO: ValueType = ValueType(1 << 7);
    /// NaN.
    pub const NAN: ValueType = ValueType(1 << 8);
    /// A boolean.
    pub const BOOLEAN: ValueType = ValueType(1 << 9);
    /// A string with no numeric interpretation.
    pub const STRING: ValueType = ValueType(1 << 10);
    /// A string that parses as a number.
    pub const STRING_NUM: ValueType = ValueType(1 << 11);

    /// Positive finite numbers.
    pub const POS_REAL: ValueType = Self::POS_INT.union(Self::POS_FRACT);
    /// Negative finite numbers.
    pub const NEG_REAL: ValueType = Self::NEG_INT.union(Self::NEG_FRACT);
    /// All positive numbers, including +Infinity.
    pub const POS: ValueType = Self::POS_REAL.union(Self::POS_INF);
    /// All negative numbers, including -Infinity.
    pub const NEG: ValueType = Self::NEG_REAL.union(Self::NEG_INF);
    /// Either zero.
    pub const ANY_ZERO: ValueType = Self::ZERO.union(Self::NEG_ZERO);
    /// Fractional numbers of either sign.
    pub const FRACT: ValueType = Self::POS_FRACT.union(Self::NEG_FRACT);
    /// All finite numbers.
    pub const REAL: ValueType = Self::POS_REAL.union(Self::NEG_REAL).union(Self::ANY_ZERO);
    /// Either infinity.
    pub const INF: ValueType = Self::POS_INF.union(Self::NEG_INF);
    /// All numbers except NaN.
    pub const NUMBER: ValueType = Self::REAL.union(Self::INF);
    /// All numbers, NaN included.
    pub const NUMBER_OR_NAN: ValueType = Self::NUMBER.union(Self::NAN);
    /// Types whose numeric coercion holds no surprises: numbers themselves
    /// and booleans (which coerce to exactly 0 or 1). Numeric strings are
    /// excluded; whitespace and sign forms make their coercion lossy.
    pub const NUMBER_INTERPRETABLE: ValueType = Self::NUMBER.union(Self::BOOLEAN);
    /// Any string.
    pub const ANY_STRING: ValueType = Self::STRING.union(Self::STRING_NUM);
    /// The full set (lattice top).
    pub const ANY: ValueType = Self::NUMBER_OR_NAN
        .union(Self::BOOLEAN)
        .union(Self::ANY_STRING);

    /// Set union; the lattice join.
    pub const fn union(self, other: ValueType) -> ValueType {
        ValueType(self.0 | other.0)
    }

    /// Set intersection; the lattice meet.
    pub const fn intersect(self, other: ValueType) -> ValueType {
        ValueType(self.0 & other.0)
    }

    /// Set difference.
    pub const fn without(self, other: ValueType) -> ValueType {
        ValueType(self.0 & !other.0)
    }

    /// True when every value of this type is also of type `t`
    /// (`self & t == self`).
    pub const fn is_always(self, t: ValueType) -> bool {
        self.0 & t.0 == self.0
    }

    /// True when some value of this type may be of type `t`
    /// (`self & t != 0`).
    pub const fn is_sometimes(self, t: ValueType) -> bool {
        self.0 & t.0 != 0
    }

    /// True for the empty set.
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// The exact atom of a numeric literal.
    pub fn number_type(n: f64) -> ValueType {
        if n.is_nan() {
            return Self::NAN;
        }
        if n == f64::INFINITY {
            return Self::POS_INF;
        }
        if n == f64::NEG_INFINITY {
            return Self::NEG_INF;
        }
        if n == 0.0 {
            return if n.is_sign_negative() {
                Self::NEG_ZERO
            } else {
                Self::ZERO
            };
        }
        match (n > 0.0, n.fract() == 0.0) {
            (true, true) => Self::POS_INT,
            (true, false) => Self::POS_FRACT,
            (false, true) => Self::NEG_INT,
            (false, false) => Self::NEG_FRACT,
        }
    }
}

impl Default for ValueType {
    /// The default type is `ANY`, representing maximum uncertainty.
    fn default() -> Self {
        ValueType::ANY
    }
}

impl BitOr for ValueType {
    type Output = ValueType;
    fn bitor(self, rhs: ValueType) -> ValueType {
        self.union(rhs)
    }
}

impl BitOrAssign for ValueType {
    fn bitor_assign(&mut self, rhs: ValueType) {
        *self = self.union(rhs);
    }
}

impl BitAnd for ValueType {
    type Output = ValueType;
    fn bitand(self, rhs: ValueType) -> ValueType {
        self.intersect(rhs)
    }
}

impl BitAndAssign for ValueType {
    fn bitand_assign(&mut self, rhs: ValueType) {
        *self = self.intersect(rhs);
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "none");
        }
        if *self == ValueType::ANY {
            return write!(f, "any");
        }
        const NAMES: [(ValueType, &str); 12] = [
            (ValueType::POS_INT, "+int"),
            (ValueType::POS_FRACT, "+fract"),
            (ValueType::POS_INF, "+inf"),
            (ValueType::NEG_INT, "-int"),
            (ValueType::NEG_FRACT, "-fract"),
            (ValueType::NEG_INF, "-inf"),
            (ValueType::ZERO, "0"),
            (ValueType::NEG_ZERO, "-0"),
            (ValueType::NAN, "nan"),
            (ValueType::BOOLEAN, "bool"),
            (ValueType::STRING, "string"),
            (ValueType::STRING_NUM, "string-num"),
        ];
        let mut first = true;
        for (atom, name) in NAMES {
            if self.is_sometimes(atom) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}
