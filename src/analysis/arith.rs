//! Result typing for the four arithmetic operators.
//!
//! Each operator's result type is the union of contributions over the
//! Cartesian product of the operands' number atoms, following the sign,
//! zero and infinity rules of IEEE-754 double arithmetic. Contributions are
//! over-approximations: a pair may contribute more atoms than a particular
//! value pair can produce, never fewer.
//!
//! Operands are coerced before the tables apply: any non-number component
//! widens to the full `NUMBER` group, because the host coercion can turn a
//! string into any number (NaN becomes 0 on the way in).

use crate::lattice::ValueType;

/// One number atom, the unit the truth tables work over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Atom {
    PosInt,
    PosFract,
    PosInf,
    NegInt,
    NegFract,
    NegInf,
    Zero,
    NegZero,
    Nan,
}

impl Atom {
    const ALL: [Atom; 9] = [
        Atom::PosInt,
        Atom::PosFract,
        Atom::PosInf,
        Atom::NegInt,
        Atom::NegFract,
        Atom::NegInf,
        Atom::Zero,
        Atom::NegZero,
        Atom::Nan,
    ];

    fn mask(self) -> ValueType {
        match self {
            Atom::PosInt => ValueType::POS_INT,
            Atom::PosFract => ValueType::POS_FRACT,
            Atom::PosInf => ValueType::POS_INF,
            Atom::NegInt => ValueType::NEG_INT,
            Atom::NegFract => ValueType::NEG_FRACT,
            Atom::NegInf => ValueType::NEG_INF,
            Atom::Zero => ValueType::ZERO,
            Atom::NegZero => ValueType::NEG_ZERO,
            Atom::Nan => ValueType::NAN,
        }
    }

    /// Sign for the sign-product rules; zeros carry their sign.
    fn is_negative(self) -> bool {
        matches!(
            self,
            Atom::NegInt | Atom::NegFract | Atom::NegInf | Atom::NegZero
        )
    }

    fn is_zero(self) -> bool {
        matches!(self, Atom::Zero | Atom::NegZero)
    }

    fn is_infinite(self) -> bool {
        matches!(self, Atom::PosInf | Atom::NegInf)
    }

    fn is_finite_nonzero(self) -> bool {
        matches!(
            self,
            Atom::PosInt | Atom::PosFract | Atom::NegInt | Atom::NegFract
        )
    }

    fn is_fract(self) -> bool {
        matches!(self, Atom::PosFract | Atom::NegFract)
    }

    fn negated(self) -> Atom {
        match self {
            Atom::PosInt => Atom::NegInt,
            Atom::PosFract => Atom::NegFract,
            Atom::PosInf => Atom::NegInf,
            Atom::NegInt => Atom::PosInt,
            Atom::NegFract => Atom::PosFract,
            Atom::NegInf => Atom::PosInf,
            Atom::Zero => Atom::NegZero,
            Atom::NegZero => Atom::Zero,
            Atom::Nan => Atom::Nan,
        }
    }
}

/// Integer group with the sign taken from `negative`.
fn signed_int(negative: bool) -> ValueType {
    if negative {
        ValueType::NEG_INT
    } else {
        ValueType::POS_INT
    }
}

fn signed_fract(negative: bool) -> ValueType {
    if negative {
        ValueType::NEG_FRACT
    } else {
        ValueType::POS_FRACT
    }
}

fn signed_inf(negative: bool) -> ValueType {
    if negative {
        ValueType::NEG_INF
    } else {
        ValueType::POS_INF
    }
}

fn signed_zero(negative: bool) -> ValueType {
    if negative {
        ValueType::NEG_ZERO
    } else {
        ValueType::ZERO
    }
}

/// Coerce an operand type for the tables: its number component passes
/// through, anything else may become any non-NaN number.
fn coerce(t: ValueType) -> ValueType {
    if t.is_always(ValueType::NUMBER_OR_NAN) {
        t
    } else {
        (t & ValueType::NUMBER_OR_NAN) | ValueType::NUMBER
    }
}

fn combine(a: ValueType, b: ValueType, table: fn(Atom, Atom) -> ValueType) -> ValueType {
    let (a, b) = (coerce(a), coerce(b));
    let mut out = ValueType::NONE;
    for x in Atom::ALL {
        if !a.is_sometimes(x.mask()) {
            continue;
        }
        for y in Atom::ALL {
            if b.is_sometimes(y.mask()) {
                out |= table(x, y);
            }
        }
    }
    out
}

/// Result type of `a + b`.
pub fn add_type(a: ValueType, b: ValueType) -> ValueType {
    combine(a, b, add_atoms)
}

/// Result type of `a - b`, via negation of the right operand.
pub fn sub_type(a: ValueType, b: ValueType) -> ValueType {
    combine(a, b, |x, y| add_atoms(x, y.negated()))
}

/// Result type of `a * b`.
pub fn mul_type(a: ValueType, b: ValueType) -> ValueType {
    combine(a, b, mul_atoms)
}

/// Result type of `a / b`.
pub fn div_type(a: ValueType, b: ValueType) -> ValueType {
    combine(a, b, div_atoms)
}

fn add_atoms(x: Atom, y: Atom) -> ValueType {
    use Atom::*;
    match (x, y) {
        (Nan, _) | (_, Nan) => ValueType::NAN,
        // Opposing infinities cancel to NaN; otherwise an infinity wins.
        (PosInf, NegInf) | (NegInf, PosInf) => ValueType::NAN,
        (PosInf, _) | (_, PosInf) => ValueType::POS_INF,
        (NegInf, _) | (_, NegInf) => ValueType::NEG_INF,
        // Zero sums: -0 only when both addends are -0.
        (NegZero, NegZero) => ValueType::NEG_ZERO,
        (Zero | NegZero, Zero | NegZero) => ValueType::ZERO,
        // Adding a zero to a finite nonzero value is exact.
        (Zero | NegZero, other) | (other, Zero | NegZero) => other.mask(),
        // Finite nonzero pairs: same sign can overflow to the signed
        // infinity; opposite signs can cancel exactly to +0. The sum of two
        // floats never rounds to zero without being exactly zero, and
        // fractional bits appear only when an operand carries them.
        (p, q) => {
            let fract = p.is_fract() || q.is_fract();
            match (p.is_negative(), q.is_negative()) {
                (false, false) => {
                    let mut out = ValueType::POS_INT | ValueType::POS_INF;
                    if fract {
                        out |= ValueType::POS_FRACT;
                    }
                    out
                }
                (true, true) => {
                    let mut out = ValueType::NEG_INT | ValueType::NEG_INF;
                    if fract {
                        out |= ValueType::NEG_FRACT;
                    }
                    out
                }
                _ => {
                    let mut out = ValueType::POS_INT | ValueType::NEG_INT | ValueType::ZERO;
                    if fract {
                        out |= ValueType::FRACT;
                    }
                    out
                }
            }
        }
    }
}

fn mul_atoms(x: Atom, y: Atom) -> ValueType {
    use Atom::*;
    if x == Nan || y == Nan {
        return ValueType::NAN;
    }
    let negative = x.is_negative() != y.is_negative();
    // Infinity times zero is NaN; any other infinite product keeps the
    // sign-product infinity.
    if x.is_infinite() || y.is_infinite() {
        if x.is_zero() || y.is_zero() {
            return ValueType::NAN;
        }
        return signed_inf(negative);
    }
    if x.is_zero() || y.is_zero() {
        return signed_zero(negative);
    }
    // Finite nonzero products.
    let mut out = signed_int(negative) | signed_inf(negative);
    if x.is_fract() || y.is_fract() {
        out |= signed_fract(negative);
        if x.is_fract() && y.is_fract() {
            // Two tiny fractions can underflow to a signed zero.
            out |= signed_zero(negative);
        }
    }
    out
}

fn div_atoms(x: Atom, y: Atom) -> ValueType {
    use Atom::*;
    if x == Nan || y == Nan {
        return ValueType::NAN;
    }
    let negative = x.is_negative() != y.is_negative();
    match (x, y) {
        // 0/0 and inf/inf are indeterminate.
        _ if x.is_zero() && y.is_zero() => ValueType::NAN,
        _ if x.is_infinite() && y.is_infinite() => ValueType::NAN,
        // Division by zero produces the sign-product infinity.
        _ if y.is_zero() => signed_inf(negative),
        // Zero over anything else, or finite over infinity, collapses to a
        // signed zero.
        _ if x.is_zero() || y.is_infinite() => signed_zero(negative),
        _ if x.is_infinite() => signed_inf(negative),
        // Finite nonzero over finite nonzero.
        _ => {
            let mut out = signed_int(negative) | signed_fract(negative);
            if y.is_fract() {
                // Dividing by a magnitude below one can overflow.
                out |= signed_inf(negative);
            }
            if x.is_fract() {
                // A tiny numerator over a huge denominator can underflow.
                out |= signed_zero(negative);
            }
            out
        }
    }
}
