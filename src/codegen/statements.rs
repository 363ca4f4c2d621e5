//! Stack lowering: control flow, data, motion, looks, pen, sound, events,
//! procedures and the compatibility layer.

use super::{js_string, CodeGenerator, Frame};
use crate::error::{CompileError, CompileResult};
use crate::ir::stack::{Stack, StackBlock, StackKind};

impl<'a> CodeGenerator<'a> {
    pub(crate) fn descend_stack(&mut self, stack: &Stack, frame: Frame) -> CompileResult<()> {
        self.frames.push(frame);
        let result = self.descend_stack_blocks(stack);
        self.frames.pop();
        result
    }

    fn descend_stack_blocks(&mut self, stack: &Stack) -> CompileResult<()> {
        for (i, block) in stack.iter().enumerate() {
            if let Some(frame) = self.frames.last_mut() {
                frame.is_last_block = i + 1 == stack.len();
            }
            self.descend_block(block)?;
        }
        Ok(())
    }

    fn descend_block(&mut self, block: &StackBlock) -> CompileResult<()> {
        match &block.kind {
            StackKind::VarSet { var, value } => {
                let value = self.descend_input(value)?;
                let binding = self.variable_binding(var);
                self.write_line(&format!("{}.value = {};", binding, value.source));
                if var.is_cloud {
                    self.write_line(&format!(
                        "if ({}.isCloud) runtime.ioDevices.cloud.requestUpdateVariable({}, {}.value);",
                        binding,
                        js_string(&var.name),
                        binding
                    ));
                }
            }
            StackKind::VarShow { var } => self.emit_monitor_change(&var.id, true),
            StackKind::VarHide { var } => self.emit_monitor_change(&var.id, false),

            StackKind::ListAdd { list, item } => {
                let item = self.descend_input(item)?;
                let binding = self.list_binding(list);
                self.write_line(&format!("{}.value.push({});", binding, item.source));
                self.emit_monitor_invalidate(&binding);
            }
            StackKind::ListInsert { list, index, item } => {
                let index = self.descend_input(index)?;
                let item = self.descend_input(item)?;
                let binding = self.list_binding(list);
                self.write_line(&format!(
                    "listInsert({}.value, {}, {});",
                    binding, index.source, item.source
                ));
                self.emit_monitor_invalidate(&binding);
            }
            StackKind::ListReplace { list, index, item } => {
                let index = self.descend_input(index)?;
                let item = self.descend_input(item)?;
                let binding = self.list_binding(list);
                self.write_line(&format!(
                    "listReplace({}.value, {}, {});",
                    binding, index.source, item.source
                ));
                self.emit_monitor_invalidate(&binding);
            }
            StackKind::ListDelete { list, index } => {
                let index = self.descend_input(index)?;
                let binding = self.list_binding(list);
                self.write_line(&format!(
                    "listDelete({}.value, {});",
                    binding, index.source
                ));
                self.emit_monitor_invalidate(&binding);
            }
            StackKind::ListDeleteAll { list } => {
                let binding = self.list_binding(list);
                self.write_line(&format!("{}.value = [];", binding));
                self.emit_monitor_invalidate(&binding);
            }
            StackKind::ListShow { list } => self.emit_monitor_change(&list.id, true),
            StackKind::ListHide { list } => self.emit_monitor_change(&list.id, false),

            StackKind::IfElse {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.descend_to_boolean(condition)?;
                self.write_line(&format!("if ({}) {{", condition));
                self.indent += 1;
                self.descend_stack(then_branch, Frame::branch())?;
                self.indent -= 1;
                if !else_branch.is_empty() {
                    self.write_line("} else {");
                    self.indent += 1;
                    self.descend_stack(else_branch, Frame::branch())?;
                    self.indent -= 1;
                }
                self.write_line("}");
            }

            StackKind::While { condition, body } => {
                let condition = self.descend_to_boolean(condition)?;
                self.write_line(&format!("while ({}) {{", condition));
                self.indent += 1;
                self.descend_stack(body, Frame::loop_body())?;
                if !ends_with_compat_call(body) {
                    self.emit_loop_yield()?;
                }
                self.indent -= 1;
                self.write_line("}");
            }
            StackKind::Repeat { times, body } => {
                let times = self.descend_to_number(times)?;
                let counter = self.locals.next();
                self.write_line(&format!(
                    "for (let {} = {}; {} >= 0.5; {}--) {{",
                    counter, times, counter, counter
                ));
                self.indent += 1;
                self.descend_stack(body, Frame::loop_body())?;
                if !ends_with_compat_call(body) {
                    self.emit_loop_yield()?;
                }
                self.indent -= 1;
                self.write_line("}");
            }
            StackKind::For { var, count, body } => {
                let count = self.descend_to_number(count)?;
                let counter = self.locals.next();
                let binding = self.variable_binding(var);
                self.write_line(&format!("let {} = 0;", counter));
                self.write_line(&format!("while ({} < {}) {{", counter, count));
                self.indent += 1;
                self.write_line(&format!("{}++;", counter));
                self.write_line(&format!("{}.value = {};", binding, counter));
                self.descend_stack(body, Frame::loop_body())?;
                if !ends_with_compat_call(body) {
                    self.emit_loop_yield()?;
                }
                self.indent -= 1;
                self.write_line("}");
            }

            StackKind::Wait { seconds } => {
                let seconds = self.descend_to_number(seconds)?;
                let duration = self.locals.next();
                self.write_line("thread.timer = timer();");
                self.write_line(&format!(
                    "const {} = Math.max(0, 1000 * {});",
                    duration, seconds
                ));
                self.write_line("runtime.requestRedraw();");
                // A wait always reschedules at least once, warp or not.
                self.mark_yield()?;
                self.write_line("yield;");
                self.write_line(&format!(
                    "while (thread.timer.timeElapsed() < {}) {{",
                    duration
                ));
                self.indent += 1;
                self.mark_yield()?;
                self.write_line("yield;");
                self.indent -= 1;
                self.write_line("}");
                self.write_line("thread.timer = null;");
            }
            StackKind::WaitUntil { condition } => {
                let condition = self.descend_to_boolean(condition)?;
                self.write_line(&format!("while (!{}) {{", condition));
                self.indent += 1;
                self.emit_stuck_or_not_warp_yield()?;
                self.indent -= 1;
                self.write_line("}");
            }

            StackKind::StopScript => {
                if self.script.is_procedure {
                    self.write_line("return;");
                } else {
                    self.write_line("retire();");
                    self.write_line("return;");
                }
            }
            StackKind::StopAll => {
                self.write_line("runtime.stopAll();");
                self.write_line("retire();");
                self.write_line("return;");
            }
            StackKind::StopOtherScripts => {
                self.write_line("runtime.stopForTarget(target, thread);");
            }

            StackKind::Broadcast { name } => {
                let name = self.descend_to_string(name)?;
                self.write_line(&format!(
                    "startHats(\"event_whenbroadcastreceived\", {{ BROADCAST_OPTION: {} }});",
                    name
                ));
            }
            StackKind::BroadcastAndWait { name } => {
                let name = self.descend_to_string(name)?;
                self.mark_yield()?;
                self.write_line(&format!(
                    "yield* waitThreads(startHats(\"event_whenbroadcastreceived\", {{ BROADCAST_OPTION: {} }}));",
                    name
                ));
            }

            StackKind::ProcedureCall { code, arguments } => {
                self.descend_procedure_call(code, arguments)?;
            }

            StackKind::MotionSetX { x } => {
                let x = self.descend_to_number(x)?;
                self.write_line(&format!("target.setXY({}, target.y);", x));
                self.emit_interpolation_guard();
            }
            StackKind::MotionSetY { y } => {
                let y = self.descend_to_number(y)?;
                self.write_line(&format!("target.setXY(target.x, {});", y));
                self.emit_interpolation_guard();
            }
            StackKind::MotionSetXY { x, y } => {
                let x = self.descend_to_number(x)?;
                let y = self.descend_to_number(y)?;
                self.write_line(&format!("target.setXY({}, {});", x, y));
                self.emit_interpolation_guard();
            }
            StackKind::MotionChangeX { dx } => {
                let dx = self.descend_to_number(dx)?;
                self.write_line(&format!("target.setXY(target.x + {}, target.y);", dx));
                self.emit_interpolation_guard();
            }
            StackKind::MotionChangeY { dy } => {
                let dy = self.descend_to_number(dy)?;
                self.write_line(&format!("target.setXY(target.x, target.y + {});", dy));
                self.emit_interpolation_guard();
            }
            StackKind::MotionSetDirection { direction } => {
                let direction = self.descend_to_number(direction)?;
                self.write_line(&format!("target.setDirection({});", direction));
            }

            StackKind::LooksSay { message } => {
                let message = self.descend_to_string(message)?;
                let looks = self.setup.bind("runtime.ext_scratch3_looks");
                self.write_line(&format!("{}._say({}, target);", looks, message));
            }
            StackKind::LooksShow => self.write_line("target.setVisible(true);"),
            StackKind::LooksHide => self.write_line("target.setVisible(false);"),
            StackKind::LooksSetSize { size } => {
                let size = self.descend_to_number(size)?;
                self.write_line(&format!("target.setSize({});", size));
            }
            StackKind::LooksSetCostume { costume } => {
                let costume = self.descend_input(costume)?;
                let looks = self.setup.bind("runtime.ext_scratch3_looks");
                self.write_line(&format!(
                    "{}._setCostume(target, {});",
                    looks, costume.source
                ));
            }

            StackKind::PenClear => {
                let pen = self.setup.bind("runtime.ext_pen");
                self.write_line(&format!("{}._clear();", pen));
            }
            StackKind::PenDown => {
                let pen = self.setup.bind("runtime.ext_pen");
                self.write_line(&format!("{}._penDown(target);", pen));
            }
            StackKind::PenUp => {
                let pen = self.setup.bind("runtime.ext_pen");
                self.write_line(&format!("{}._penUp(target);", pen));
            }

            StackKind::SoundStopAll => {
                let sound = self.setup.bind("runtime.ext_scratch3_sound");
                self.write_line(&format!("{}._stopAllSounds();", sound));
            }

            StackKind::CloneDeleteThis => {
                self.write_line("runtime.disposeTarget(target);");
                self.write_line("runtime.stopForTarget(target);");
                self.write_line("retire();");
                self.write_line("return;");
            }

            StackKind::CompatibilityLayer {
                opcode,
                inputs,
                fields,
            } => {
                self.descend_compat_call(opcode, inputs, fields)?;
            }

            StackKind::AddonCall { name, arguments } => {
                let args = self.object_literal(arguments)?;
                let addon = self
                    .setup
                    .bind(&format!("runtime.getAddonBlock({})", js_string(name)));
                self.write_line(&format!("{}.callback({}, thread);", addon, args));
            }

            StackKind::Debugger => self.write_line("debugger;"),

            StackKind::VisualReport { input } => {
                let value = self.descend_input(input)?;
                let local = self.locals.next();
                self.write_line(&format!("const {} = {};", local, value.source));
                let script = self.script;
                self.write_line(&format!(
                    "if ({} !== undefined) runtime.visualReport({}, {});",
                    local,
                    js_string(&script.top_block_id),
                    local
                ));
            }

            StackKind::Nop => {}
        }
        Ok(())
    }

    fn descend_procedure_call(
        &mut self,
        code: &str,
        arguments: &[crate::ir::Input],
    ) -> CompileResult<()> {
        let script = self.script;
        let callee = self
            .procedures
            .get(code)
            .ok_or_else(|| CompileError::MissingProcedure(code.to_string()))?;
        // Calls to empty procedures vanish entirely.
        if callee.stack.is_empty() {
            return Ok(());
        }
        if arguments.len() != callee.arguments.len() {
            return Err(CompileError::MalformedIr(format!(
                "procedure '{}' expects {} arguments, got {}",
                code,
                callee.arguments.len(),
                arguments.len()
            )));
        }
        if callee.yields && !script.yields {
            return Err(CompileError::YieldingCallInNonYieldingScript {
                caller: self.script_name().to_string(),
                callee: code.to_string(),
            });
        }
        // Direct recursion outside warp gives the sequencer a chance to run
        // before the stack grows.
        if script.is_procedure && code == script.procedure_code && !callee.is_warp {
            self.mark_yield()?;
            self.write_line("yield;");
        }
        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            args.push(self.descend_input(argument)?.source);
        }
        let call = format!(
            "thread.procedures[{}]({})",
            js_string(code),
            args.join(", ")
        );
        if callee.yields {
            self.mark_yield()?;
            self.write_line(&format!("yield* {};", call));
        } else {
            self.write_line(&format!("{};", call));
        }
        Ok(())
    }

    fn descend_compat_call(
        &mut self,
        opcode: &str,
        inputs: &[(String, crate::ir::Input)],
        fields: &[(String, String)],
    ) -> CompileResult<()> {
        self.mark_yield()?;
        let function = self
            .setup
            .bind(&format!("runtime.getOpcodeFunction({})", js_string(opcode)));
        let inputs = self.object_literal(inputs)?;
        let fields_src: Vec<String> = fields
            .iter()
            .map(|(name, value)| format!("{}: {}", js_string(name), js_string(value)))
            .collect();
        let script = self.script;
        self.write_line(&format!(
            "yield* executeInCompatibilityLayer({}, {{ {} }}, {}, {});",
            inputs,
            fields_src.join(", "),
            function,
            script.is_warp
        ));
        // When the shim resumed from a promise inside a loop, the iteration
        // it interrupted must be recycled rather than counted.
        if self.is_last_block_in_loop() {
            self.needs_promise_recycle = true;
            self.write_line("if (hasResumedFromPromise) {");
            self.indent += 1;
            self.write_line("hasResumedFromPromise = false;");
            self.write_line("continue;");
            self.indent -= 1;
            self.write_line("}");
        }
        Ok(())
    }

    fn emit_monitor_change(&mut self, id: &str, visible: bool) {
        self.write_line(&format!(
            "runtime.monitorBlocks.changeBlock({{ id: {}, element: \"checkbox\", value: {} }}, runtime);",
            js_string(id),
            visible
        ));
    }

    fn emit_monitor_invalidate(&mut self, binding: &str) {
        self.write_line(&format!("{}._monitorUpToDate = false;", binding));
    }

    /// Position setters drop interpolation state once a modulo has been
    /// lowered anywhere earlier in the script.
    fn emit_interpolation_guard(&mut self) {
        if self.descended_into_modulo {
            self.write_line("target.interpolationData = null;");
        }
    }
}

/// True when a stack's last block runs through the compatibility shim,
/// which already yields; the enclosing loop then skips its own trailing
/// yield to avoid yielding twice per iteration.
fn ends_with_compat_call(stack: &Stack) -> bool {
    matches!(
        stack.last().map(|block| &block.kind),
        Some(StackKind::CompatibilityLayer { .. })
    )
}
