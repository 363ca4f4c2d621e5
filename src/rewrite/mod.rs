//! Cast elimination and type specialization.
//!
//! A second pass over an analyzed IR. It threads a variable state the same
//! way the analyzer does, but reads the recorded block annotations to reset
//! at block boundaries. Input trees are rewritten bottom-up: a cast whose
//! operand already always inhabits the cast's target set is dropped, and
//! every surviving node has its type field refreshed to the analyzed type.
//! The result is a semantically equivalent tree; running the pass twice
//! changes nothing.

use crate::analysis::analyzer::input_type;
use crate::analysis::state::TypeState;
use crate::ir::input::{Input, InputKind};
use crate::ir::script::{Ir, Script};
use crate::ir::stack::{Stack, StackBlock, StackKind};

/// Rewrites an analyzed IR in place.
#[derive(Debug, Default)]
pub struct Rewriter {
    casts_eliminated: usize,
}

impl Rewriter {
    pub fn new() -> Rewriter {
        Rewriter::default()
    }

    /// Number of cast nodes dropped so far.
    pub fn casts_eliminated(&self) -> usize {
        self.casts_eliminated
    }

    /// Rewrites every depended procedure, then the entry script.
    pub fn rewrite(&mut self, ir: &mut Ir) {
        let order = ir.entry.depended_procedures.clone();
        for code in &order {
            if let Some(script) = ir.procedures.get_mut(code) {
                self.rewrite_script(script);
            }
        }
        self.rewrite_script(&mut ir.entry);
    }

    fn rewrite_script(&mut self, script: &mut Script) {
        let mut state = TypeState::new();
        self.rewrite_stack(&mut script.stack, &mut state);
    }

    fn rewrite_stack(&mut self, stack: &mut Stack, state: &mut TypeState) {
        for block in stack.iter_mut() {
            self.rewrite_block(block, state);
        }
    }

    fn rewrite_block(&mut self, block: &mut StackBlock, state: &mut TypeState) {
        if let Some(entry) = &block.entry_state {
            *state = entry.clone();
        }
        match &mut block.kind {
            StackKind::VarSet { value, .. } => self.rewrite_input(value, state),
            StackKind::IfElse {
                condition,
                then_branch,
                else_branch,
            } => {
                self.rewrite_input(condition, state);
                let mut taken = state.clone();
                self.rewrite_stack(then_branch, &mut taken);
                self.rewrite_stack(else_branch, state);
            }
            StackKind::While { condition, body } => {
                self.rewrite_input(condition, state);
                self.rewrite_stack(body, state);
            }
            StackKind::Repeat { times, body } => {
                self.rewrite_input(times, state);
                self.rewrite_stack(body, state);
            }
            StackKind::For { count, body, .. } => {
                self.rewrite_input(count, state);
                self.rewrite_stack(body, state);
            }
            StackKind::ListAdd { item, .. } => self.rewrite_input(item, state),
            StackKind::ListInsert { index, item, .. }
            | StackKind::ListReplace { index, item, .. } => {
                self.rewrite_input(index, state);
                self.rewrite_input(item, state);
            }
            StackKind::ListDelete { index, .. } => self.rewrite_input(index, state),
            StackKind::Wait { seconds } => self.rewrite_input(seconds, state),
            StackKind::WaitUntil { condition } => self.rewrite_input(condition, state),
            StackKind::Broadcast { name } | StackKind::BroadcastAndWait { name } => {
                self.rewrite_input(name, state)
            }
            StackKind::ProcedureCall { arguments, .. } => {
                for arg in arguments {
                    self.rewrite_input(arg, state);
                }
            }
            StackKind::MotionSetX { x } => self.rewrite_input(x, state),
            StackKind::MotionSetY { y } => self.rewrite_input(y, state),
            StackKind::MotionSetXY { x, y } => {
                self.rewrite_input(x, state);
                self.rewrite_input(y, state);
            }
            StackKind::MotionChangeX { dx } => self.rewrite_input(dx, state),
            StackKind::MotionChangeY { dy } => self.rewrite_input(dy, state),
            StackKind::MotionSetDirection { direction } => self.rewrite_input(direction, state),
            StackKind::LooksSay { message } => self.rewrite_input(message, state),
            StackKind::LooksSetSize { size } => self.rewrite_input(size, state),
            StackKind::LooksSetCostume { costume } => self.rewrite_input(costume, state),
            StackKind::CompatibilityLayer { inputs, .. } => {
                for (_, input) in inputs {
                    self.rewrite_input(input, state);
                }
            }
            StackKind::AddonCall { arguments, .. } => {
                for (_, input) in arguments {
                    self.rewrite_input(input, state);
                }
            }
            StackKind::VisualReport { input } => self.rewrite_input(input, state),
            _ => {}
        }
        if let Some(exit) = &block.exit_state {
            *state = exit.clone();
        }
    }

    /// Bottom-up rewrite of one input tree.
    fn rewrite_input(&mut self, input: &mut Input, state: &TypeState) {
        match &mut input.kind {
            InputKind::Cast { value, .. } => self.rewrite_input(value, state),
            InputKind::Binary { left, right, .. } => {
                self.rewrite_input(left, state);
                self.rewrite_input(right, state);
            }
            InputKind::Unary { value, .. } => self.rewrite_input(value, state),
            InputKind::ListGet { index, .. } => self.rewrite_input(index, state),
            InputKind::ListContains { item, .. } | InputKind::ListIndexOf { item, .. } => {
                self.rewrite_input(item, state)
            }
            InputKind::SensingKeyDown { key } => self.rewrite_input(key, state),
            InputKind::SensingDistanceTo { object }
            | InputKind::SensingTouching { object }
            | InputKind::SensingOf { object, .. } => self.rewrite_input(object, state),
            InputKind::CompatibilityLayer { inputs, .. } => {
                for (_, inner) in inputs {
                    self.rewrite_input(inner, state);
                }
            }
            _ => {}
        }

        let redundant = match &input.kind {
            InputKind::Cast { kind, value } => {
                input_type(value, state).is_always(kind.target_type())
            }
            _ => false,
        };
        if redundant {
            match std::mem::replace(input, Input::number(0.0)) {
                Input {
                    kind: InputKind::Cast { value, .. },
                    ..
                } => *input = *value,
                other => *input = other,
            }
            self.casts_eliminated += 1;
            return;
        }
        input.ty = input_type(input, state);
    }
}
