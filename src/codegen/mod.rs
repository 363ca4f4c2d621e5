//! Code generation: lowering an optimized IR to a host-language function
//! factory.
//!
//! Each script becomes a single source expression of the shape
//!
//! ```text
//! (function factoryN(thread) {
//!   const target = thread.target;
//!   const runtime = target.runtime;
//!   const stage = runtime.getTargetForStage();
//!   const b0 = ...;              // deduplicated setup bindings
//!   return function* genN() {    // plain funN when the script never yields
//!     ...
//!     retire();
//!   };
//! })
//! ```
//!
//! handed to the host's scoped evaluator, whose lexical scope supplies the
//! helper functions named in `bridge::RUNTIME_HELPERS`. Yield points are
//! emitted around every construct that can block or run long; a yield in a
//! script not flagged as yielding is a compile-time error.

mod expressions;
pub mod names;
mod statements;

use crate::analysis::Analyzer;
use crate::bridge::{CompiledScript, CompileTarget};
use crate::context::CompilerContext;
use crate::error::{CompileError, CompileResult};
use crate::ir::script::{Ir, ListRef, Script, VariableRef, VariableScope};
use crate::rewrite::Rewriter;
use names::{sanitize_procedure_name, LocalPool, SetupBindings};
use std::collections::HashMap;

/// Per-stack compilation context: whether the stack is a loop body and
/// whether the block being lowered is its last.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Frame {
    pub is_loop: bool,
    pub is_last_block: bool,
}

impl Frame {
    fn root() -> Frame {
        Frame {
            is_loop: false,
            is_last_block: false,
        }
    }

    pub(crate) fn branch() -> Frame {
        Frame {
            is_loop: false,
            is_last_block: false,
        }
    }

    pub(crate) fn loop_body() -> Frame {
        Frame {
            is_loop: true,
            is_last_block: false,
        }
    }
}

/// Lowers one script to its factory source.
pub struct CodeGenerator<'a> {
    script: &'a Script,
    procedures: &'a HashMap<String, Script>,
    target: &'a CompileTarget,
    ctx: &'a mut CompilerContext,
    source: String,
    indent: usize,
    locals: LocalPool,
    setup: SetupBindings,
    frames: Vec<Frame>,
    yielded: bool,
    /// Set when a modulo was lowered; position setters must then drop any
    /// interpolation state the renderer holds for the target.
    descended_into_modulo: bool,
    /// Whether the generator preamble needs the promise-recycle flag.
    needs_promise_recycle: bool,
    /// Scratch locals declared at the top of the generated function.
    scratch_decls: Vec<String>,
    number_scratch: Option<String>,
    target_scratch: Option<String>,
}

/// Compiles a single script against its procedure table.
///
/// The script should have been analyzed and rewritten first; un-annotated
/// IR still compiles, just without the type-driven fast paths.
pub fn compile(
    script: &Script,
    procedures: &HashMap<String, Script>,
    target: &CompileTarget,
    ctx: &mut CompilerContext,
) -> CompileResult<CompiledScript> {
    CodeGenerator::new(script, procedures, target, ctx).run()
}

/// Runs the whole pipeline over an IR: analysis, cast elimination, then
/// code generation for every depended procedure and the entry script,
/// filling each script's compile cache slot.
pub fn compile_ir(
    ir: &mut Ir,
    target: &CompileTarget,
    ctx: &mut CompilerContext,
) -> CompileResult<()> {
    Analyzer::new().analyze(ir);
    let mut rewriter = Rewriter::new();
    rewriter.rewrite(ir);
    ctx.stats.casts_eliminated += rewriter.casts_eliminated();

    let order = ir.entry.depended_procedures.clone();
    for code in &order {
        let compiled = {
            let script = ir
                .procedures
                .get(code)
                .ok_or_else(|| CompileError::MissingProcedure(code.clone()))?;
            compile(script, &ir.procedures, target, ctx)?
        };
        if let Some(script) = ir.procedures.get_mut(code) {
            script.cached_compile = Some(compiled);
        }
    }
    let compiled = compile(&ir.entry, &ir.procedures, target, ctx)?;
    ir.entry.cached_compile = Some(compiled);
    Ok(())
}

impl<'a> CodeGenerator<'a> {
    fn new(
        script: &'a Script,
        procedures: &'a HashMap<String, Script>,
        target: &'a CompileTarget,
        ctx: &'a mut CompilerContext,
    ) -> CodeGenerator<'a> {
        CodeGenerator {
            script,
            procedures,
            target,
            ctx,
            source: String::new(),
            indent: 0,
            locals: LocalPool::new(),
            setup: SetupBindings::new(),
            frames: Vec::new(),
            yielded: false,
            descended_into_modulo: false,
            needs_promise_recycle: false,
            scratch_decls: Vec::new(),
            number_scratch: None,
            target_scratch: None,
        }
    }

    fn run(mut self) -> CompileResult<CompiledScript> {
        let script = self.script;
        self.descend_stack(&script.stack, Frame::root())?;
        if !script.is_procedure {
            // Entry scripts mark their thread done; procedures just return.
            self.write_line("retire();");
        }
        let body = std::mem::take(&mut self.source);

        let function_base = self.ctx.next_function_name(script.yields);
        let function_name = if script.is_procedure && !script.procedure_code.is_empty() {
            format!(
                "{}_{}",
                function_base,
                sanitize_procedure_name(&script.procedure_code)
            )
        } else {
            function_base
        };
        let factory_name = self.ctx.next_factory_name();
        let star = if script.yields { "*" } else { "" };
        let params = (0..script.arguments.len())
            .map(|i| format!("p{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let mut out = String::new();
        out.push_str(&format!("(function {}(thread) {{\n", factory_name));
        out.push_str("const target = thread.target;\n");
        out.push_str("const runtime = target.runtime;\n");
        out.push_str("const stage = runtime.getTargetForStage();\n");
        for (name, expr) in self.setup.entries() {
            out.push_str(&format!("const {} = {};\n", name, expr));
        }
        out.push_str(&format!(
            "return function{} {}({}) {{\n",
            star, function_name, params
        ));
        if self.needs_promise_recycle {
            out.push_str("let hasResumedFromPromise = false;\n");
        }
        for local in &self.scratch_decls {
            out.push_str(&format!("let {} = 0;\n", local));
        }
        out.push_str(&body);
        out.push_str("};\n})");

        self.ctx.stats.scripts_compiled += 1;
        self.ctx.stats.setup_bindings += self.setup.len();

        let compiled = CompiledScript {
            factory_source: out,
            factory_name,
            function_name,
            yields: script.yields,
            is_procedure: script.is_procedure,
            procedure_code: script.procedure_code.clone(),
            top_block_id: script.top_block_id.clone(),
        };
        if self.ctx.config.debug {
            log::debug!(
                "compiled '{}': {}",
                self.script_name(),
                compiled.factory_source
            );
        }
        self.ctx.notify(&compiled);
        Ok(compiled)
    }

    /// The script's name for diagnostics: its procedure code, or its top
    /// block id for entry scripts.
    fn script_name(&self) -> &str {
        if self.script.is_procedure {
            &self.script.procedure_code
        } else {
            &self.script.top_block_id
        }
    }

    fn write_line(&mut self, line: &str) {
        for _ in 0..self.indent {
            self.source.push_str("  ");
        }
        self.source.push_str(line);
        self.source.push('\n');
    }

    /// Registers a yield point, failing when the script is not flagged as
    /// yielding.
    fn mark_yield(&mut self) -> CompileResult<()> {
        if !self.script.yields {
            return Err(CompileError::YieldInNonYieldingScript {
                script: self.script_name().to_string(),
            });
        }
        self.yielded = true;
        self.ctx.stats.yields_emitted += 1;
        Ok(())
    }

    /// Per-iteration loop yield: unconditional outside warp, a stuck check
    /// when the warp timer is on, nothing in plain warp.
    fn emit_loop_yield(&mut self) -> CompileResult<()> {
        if !self.script.is_warp {
            self.mark_yield()?;
            self.write_line("yield;");
        } else if self.script.warp_timer {
            self.mark_yield()?;
            self.write_line("if (isStuck()) yield;");
        }
        Ok(())
    }

    /// Yield for constructs that would otherwise spin: unconditional outside
    /// warp, a stuck check inside it.
    fn emit_stuck_or_not_warp_yield(&mut self) -> CompileResult<()> {
        self.mark_yield()?;
        if self.script.is_warp {
            self.write_line("if (isStuck()) yield;");
        } else {
            self.write_line("yield;");
        }
        Ok(())
    }

    /// True when the block being lowered is the syntactically last of every
    /// frame up to and including the innermost loop.
    fn is_last_block_in_loop(&self) -> bool {
        for frame in self.frames.iter().rev() {
            if !frame.is_last_block {
                return false;
            }
            if frame.is_loop {
                return true;
            }
        }
        false
    }

    /// Binding for a variable slot, on the target or the stage.
    fn variable_binding(&mut self, var: &VariableRef) -> String {
        let expr = match var.scope {
            VariableScope::Target => format!("target.variables[{}]", js_string(&var.id)),
            VariableScope::Stage => format!("stage.variables[{}]", js_string(&var.id)),
        };
        self.setup.bind(&expr)
    }

    /// Binding for a list slot, on the target or the stage.
    fn list_binding(&mut self, list: &ListRef) -> String {
        let expr = match list.scope {
            VariableScope::Target => format!("target.variables[{}]", js_string(&list.id)),
            VariableScope::Stage => format!("stage.variables[{}]", js_string(&list.id)),
        };
        self.setup.bind(&expr)
    }

    /// A shared scratch local for exact numeric coercion.
    fn number_scratch(&mut self) -> String {
        if let Some(name) = &self.number_scratch {
            return name.clone();
        }
        let name = self.locals.next();
        self.scratch_decls.push(name.clone());
        self.number_scratch = Some(name.clone());
        name
    }

    /// A shared scratch local for dynamically looked-up targets.
    fn target_scratch(&mut self) -> String {
        if let Some(name) = &self.target_scratch {
            return name.clone();
        }
        let name = self.locals.next();
        self.scratch_decls.push(name.clone());
        self.target_scratch = Some(name.clone());
        name
    }
}

/// A host string literal for `s`.
pub(crate) fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// A host number literal for `n`; `-0` keeps its sign in source form.
pub(crate) fn number_literal(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == f64::INFINITY {
        return "Infinity".to_string();
    }
    if n == f64::NEG_INFINITY {
        return "-Infinity".to_string();
    }
    if n == 0.0 && n.is_sign_negative() {
        return "-0".to_string();
    }
    format!("{}", n)
}
