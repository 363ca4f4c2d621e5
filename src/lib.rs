//! Compiler core for a block-based sprite runtime.
//!
//! The front-end lowers stacked visual blocks into the IR defined here; this
//! crate turns each script of that IR into a host-language function factory.
//!
//! # Architecture
//!
//! ```text
//! IR → Analyze → Rewrite → Codegen → factory source
//! ```
//!
//! - `lattice`: value kinds and numeric refinements as a bitset
//!   join-semilattice.
//! - `ir`: trees of typed input expressions and stacked commands.
//! - `analysis`: a monotone dataflow pass propagating variable types through
//!   branches and loops, annotating every block with its entry/exit state.
//! - `rewrite`: drops coercions the analysis proved redundant.
//! - `codegen`: lowers the optimized IR to a function factory, applying
//!   type-driven rewrites (identity comparisons, list-index fast paths,
//!   string-only comparisons) and emitting cooperative yields.
//! - `bridge`: the narrow contract emitted code assumes from the runtime.
//!
//! Compilation is pure and per-script: one failed script never affects the
//! others, and the only shared state is the name pools on
//! [`context::CompilerContext`].

pub mod analysis;
pub mod bridge;
pub mod codegen;
pub mod context;
pub mod error;
pub mod ir;
pub mod lattice;
pub mod rewrite;

pub use analysis::{Analyzer, TypeState};
pub use bridge::{CompiledScript, CompileTarget, ScopedEval, RUNTIME_HELPERS};
pub use codegen::{compile, compile_ir};
pub use context::{CompileObserver, CompileStats, CompilerConfig, CompilerContext};
pub use error::{CompileError, CompileResult};
pub use ir::{
    BinaryOp, CastKind, Constant, Input, InputKind, Ir, ListRef, Script, Stack, StackBlock,
    StackKind, UnaryOp, VariableRef, VariableScope,
};
pub use lattice::ValueType;
pub use rewrite::Rewriter;
