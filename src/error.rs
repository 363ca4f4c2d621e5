//! Compilation errors.
//!
//! Errors abort the compilation of a single script; other scripts sharing the
//! same IR or compiler context are unaffected. The type analyzer never fails
//! on well-formed IR (unhandled nodes keep their previous type), so every
//! variant here originates from IR construction or code generation.

use thiserror::Error;

/// Script compilation error.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The IR violates a structural rule: unknown opcode shape, wrong
    /// argument arity, or a constant whose value does not fit its declared
    /// lattice type.
    #[error("malformed IR: {0}")]
    MalformedIr(String),

    /// A cast was requested to a target the compiler cannot lower.
    #[error("unsupported cast: {0}")]
    UnsupportedCast(String),

    /// A yield point was emitted into a script whose `yields` flag is false.
    #[error("script '{script}' is not flagged as yielding but requires a yield")]
    YieldInNonYieldingScript {
        /// Top block id or procedure code of the offending script.
        script: String,
    },

    /// A non-yielding script called a procedure variant that yields.
    #[error("script '{caller}' is not flagged as yielding but calls yielding procedure '{callee}'")]
    YieldingCallInNonYieldingScript {
        /// Top block id or procedure code of the calling script.
        caller: String,
        /// Procedure variant code of the callee.
        callee: String,
    },

    /// A procedure variant was referenced but is absent from the IR's
    /// procedure table.
    #[error("procedure variant '{0}' is not present in the IR")]
    MissingProcedure(String),
}

/// Result type for compilation operations.
pub type CompileResult<T> = Result<T, CompileError>;
