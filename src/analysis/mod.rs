//! Type analysis: the variable state, the arithmetic truth tables and the
//! IR walker that annotates blocks with entry/exit states.

pub mod analyzer;
pub mod arith;
pub mod state;

pub use analyzer::{cast_type, input_type, Analyzer};
pub use state::TypeState;
