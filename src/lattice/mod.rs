//! Value-type lattice for script analysis.
//!
//! The lattice encodes what is statically known about the value an input
//! expression can produce at runtime. Elements are bitsets over disjoint
//! atoms; union of bitsets is the lattice join, intersection the meet.

pub mod types;

pub use types::ValueType;
