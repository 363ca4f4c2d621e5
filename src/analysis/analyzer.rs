//! Dataflow type analysis over the IR.
//!
//! The analyzer threads one `TypeState` through straight-line code,
//! branching it at conditionals and iterating loop bodies to a fixed point.
//! Each stack block is annotated with the state observed at its entry and
//! exit; the rewriter consumes those annotations afterwards.
//!
//! Cooperative scheduling shapes the analysis: after any yield another
//! script may have mutated shared variables, so every yielding command —
//! and every call that can reach user code — clears the state.
//!
//! Termination of the loop iteration follows from the lattice: the bitset
//! has finite height, every transfer only grows types, and `TypeState::or`
//! reports when nothing grew.

use crate::analysis::arith;
use crate::analysis::state::TypeState;
use crate::ir::input::{BinaryOp, CastKind, Input, InputKind};
use crate::ir::script::{Ir, Script, VariableRef};
use crate::ir::stack::{Stack, StackBlock, StackKind};
use crate::lattice::ValueType;
use std::collections::HashMap;

/// Computes the refined result type of an input under a variable state.
///
/// Pure: inputs have no side effects on the state. Opcodes without an
/// explicit refinement fall back to their declared default type, which is
/// always a safe over-approximation.
pub fn input_type(input: &Input, state: &TypeState) -> ValueType {
    match &input.kind {
        InputKind::Constant(c) => c.value_type(),
        InputKind::VarGet(var) => state.get(&var.id),
        InputKind::Cast { kind, value } => cast_type(*kind, input_type(value, state)),
        InputKind::Binary { op, left, right } => {
            let l = input_type(left, state);
            let r = input_type(right, state);
            match op {
                BinaryOp::Add => arith::add_type(l, r),
                BinaryOp::Sub => arith::sub_type(l, r),
                BinaryOp::Mul => arith::mul_type(l, r),
                BinaryOp::Div => arith::div_type(l, r),
                _ => input.kind.default_type(),
            }
        }
        _ => input.kind.default_type(),
    }
}

/// Result type of a cast applied to an operand of type `inner`.
pub fn cast_type(kind: CastKind, inner: ValueType) -> ValueType {
    match kind {
        CastKind::Boolean => ValueType::BOOLEAN,
        CastKind::Number => {
            if inner.is_sometimes(ValueType::NUMBER) {
                let t = inner & ValueType::NUMBER_OR_NAN;
                if t.is_sometimes(ValueType::NAN) {
                    t.without(ValueType::NAN) | ValueType::ZERO
                } else {
                    t
                }
            } else {
                ValueType::NUMBER
            }
        }
        CastKind::NumberOrNan => {
            if inner.is_sometimes(ValueType::NUMBER_OR_NAN) {
                inner & ValueType::NUMBER_OR_NAN
            } else {
                ValueType::NUMBER_OR_NAN
            }
        }
        CastKind::NumberIndex => {
            let mut t = cast_type(CastKind::NumberOrNan, inner);
            // Truncation toward zero folds fractions into the neighboring
            // integer or the zero of their sign.
            if t.is_sometimes(ValueType::POS_FRACT) {
                t = t.without(ValueType::POS_FRACT) | ValueType::POS_INT | ValueType::ZERO;
            }
            if t.is_sometimes(ValueType::NEG_FRACT) {
                t = t.without(ValueType::NEG_FRACT) | ValueType::NEG_INT | ValueType::NEG_ZERO;
            }
            t
        }
        CastKind::String => {
            if inner.is_always(ValueType::NUMBER) {
                ValueType::STRING_NUM
            } else {
                ValueType::ANY_STRING
            }
        }
    }
}

/// Walks an IR, annotating every stack block with its entry and exit
/// variable-type state.
#[derive(Debug, Default)]
pub struct Analyzer {
    /// Recorded procedure effects, keyed by variant code. Currently never
    /// populated: calls clear the state at the call site. The lookup stays
    /// so summaries can land without reshaping the walker.
    summaries: HashMap<String, TypeState>,
}

impl Analyzer {
    pub fn new() -> Analyzer {
        Analyzer::default()
    }

    /// Analyzes every depended procedure variant in order, then the entry
    /// script, each from a fresh state.
    pub fn analyze(&mut self, ir: &mut Ir) {
        let order = ir.entry.depended_procedures.clone();
        for code in &order {
            if let Some(script) = ir.procedures.get_mut(code) {
                self.analyze_script(script);
            }
        }
        self.analyze_script(&mut ir.entry);
    }

    fn analyze_script(&mut self, script: &mut Script) {
        log::debug!(
            "analyzing script '{}'",
            if script.is_procedure {
                &script.procedure_code
            } else {
                &script.top_block_id
            }
        );
        let mut state = TypeState::new();
        self.analyze_stack(&mut script.stack, &mut state);
    }

    fn analyze_stack(&mut self, stack: &mut Stack, state: &mut TypeState) -> bool {
        let mut changed = false;
        for block in stack.iter_mut() {
            changed |= self.analyze_block(block, state);
        }
        changed
    }

    fn analyze_block(&mut self, block: &mut StackBlock, state: &mut TypeState) -> bool {
        let is_loop = block.kind.is_loop();
        // A loop that yields at its head starts every iteration with other
        // scripts possibly having run; widening up front makes iterating
        // the body pointless, so a single pass annotates it.
        let yields_at_head = is_loop && block.yields;
        let mut changed = false;
        if yields_at_head {
            changed |= state.clear();
        }

        join_into(&mut block.entry_state, state);

        changed |= match &mut block.kind {
            StackKind::VarSet { var, value } => {
                let ty = input_type(value, state);
                state.set(&var.id, ty)
            }
            StackKind::IfElse {
                condition,
                then_branch,
                else_branch,
            } => {
                let _ = input_type(condition, state);
                let mut taken = state.clone();
                let mut ch = self.analyze_stack(then_branch, &mut taken);
                ch |= self.analyze_stack(else_branch, state);
                ch | state.or(&taken)
            }
            StackKind::While { body, .. } | StackKind::Repeat { body, .. } => {
                self.analyze_loop(body, state, yields_at_head, None)
            }
            StackKind::For { var, body, .. } => {
                let var = var.clone();
                self.analyze_loop(body, state, yields_at_head, Some(&var))
            }
            StackKind::ProcedureCall { code, .. } => match self.summaries.get(code.as_str()) {
                Some(summary) => {
                    let summary = summary.clone();
                    state.or(&summary)
                }
                None => state.clear(),
            },
            _ => false,
        };

        // Any other yielding command, and every passage into user-visible
        // foreign code, invalidates variable refinements afterwards.
        let clears_after = !is_loop
            && !matches!(block.kind, StackKind::ProcedureCall { .. })
            && (block.yields
                || matches!(
                    block.kind,
                    StackKind::CompatibilityLayer { .. }
                        | StackKind::AddonCall { .. }
                        | StackKind::BroadcastAndWait { .. }
                ));
        if clears_after {
            changed |= state.clear();
        }

        join_into(&mut block.exit_state, state);
        changed
    }

    fn analyze_loop(
        &mut self,
        body: &mut Stack,
        state: &mut TypeState,
        yields_at_head: bool,
        loop_var: Option<&VariableRef>,
    ) -> bool {
        if yields_at_head {
            let mut copy = state.clone();
            if let Some(var) = loop_var {
                copy.set(&var.id, ValueType::POS_INT);
            }
            let mut changed = self.analyze_stack(body, &mut copy);
            changed |= state.or(&copy);
            return changed;
        }
        let mut changed = false;
        loop {
            let mut copy = state.clone();
            if let Some(var) = loop_var {
                copy.set(&var.id, ValueType::POS_INT);
            }
            self.analyze_stack(body, &mut copy);
            if !state.or(&copy) {
                break;
            }
            changed = true;
        }
        changed
    }
}

/// Joins the current state into an annotation slot, creating it on first
/// visit.
fn join_into(slot: &mut Option<TypeState>, state: &TypeState) {
    match slot {
        Some(existing) => {
            existing.or(state);
        }
        None => *slot = Some(state.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::input::UnaryOp;

    fn var_x() -> VariableRef {
        VariableRef::for_target("x-id", "x")
    }

    fn set_block(var: VariableRef, value: Input) -> StackBlock {
        StackBlock::new(StackKind::VarSet { var, value })
    }

    #[test]
    fn test_straight_line_assignment_refines_variable() {
        // set x to 3; set x to x + 4
        let add = Input::binary(
            BinaryOp::Add,
            Input::var_get(var_x()).to_type(CastKind::Number),
            Input::number(4.0),
        );
        let mut ir = Ir::with_entry(Script::entry(
            "top",
            vec![
                set_block(var_x(), Input::number(3.0)),
                set_block(var_x(), add),
            ],
        ));
        Analyzer::new().analyze(&mut ir);

        let exit = ir.entry.stack[1].exit_state.as_ref().expect("exit state");
        // 3 + 4: positive integer arithmetic, possibly overflowing.
        assert!(exit
            .get("x-id")
            .is_always(ValueType::POS_INT | ValueType::POS_INF));
    }

    #[test]
    fn test_branch_merge_joins_both_arms() {
        let branch = StackBlock::new(StackKind::IfElse {
            condition: Input::boolean(true),
            then_branch: vec![set_block(var_x(), Input::number(1.0))],
            else_branch: vec![set_block(var_x(), Input::string("hi"))],
        });
        let mut ir = Ir::with_entry(Script::entry("top", vec![branch]));
        Analyzer::new().analyze(&mut ir);

        let exit = ir.entry.stack[0].exit_state.as_ref().expect("exit state");
        assert_eq!(exit.get("x-id"), ValueType::POS_INT | ValueType::STRING);
    }

    #[test]
    fn test_variable_set_on_one_arm_is_unknown_after() {
        let branch = StackBlock::new(StackKind::IfElse {
            condition: Input::boolean(true),
            then_branch: vec![set_block(var_x(), Input::number(1.0))],
            else_branch: vec![],
        });
        let mut ir = Ir::with_entry(Script::entry("top", vec![branch]));
        Analyzer::new().analyze(&mut ir);

        let exit = ir.entry.stack[0].exit_state.as_ref().expect("exit state");
        assert_eq!(exit.get("x-id"), ValueType::ANY);
    }

    #[test]
    fn test_loop_fixed_point_accumulates_types() {
        // set y to "s"; while p { set y to y + 1 }
        let y = || VariableRef::for_target("y-id", "y");
        let body_add = Input::binary(
            BinaryOp::Add,
            Input::var_get(y()).to_type(CastKind::Number),
            Input::number(1.0),
        );
        let mut ir = Ir::with_entry(Script::entry(
            "top",
            vec![
                set_block(y(), Input::string("s")),
                StackBlock::new(StackKind::While {
                    condition: Input::boolean(true),
                    body: vec![set_block(y(), body_add)],
                }),
            ],
        ));
        Analyzer::new().analyze(&mut ir);

        let exit = ir.entry.stack[1].exit_state.as_ref().expect("exit state");
        let ty = exit.get("y-id");
        // The string survives the join (zero iterations) and numeric
        // refinements accumulate from the body.
        assert!(ty.is_sometimes(ValueType::STRING));
        assert!(ty.is_sometimes(ValueType::NUMBER));
    }

    #[test]
    fn test_division_by_zero_refinement() {
        let div = Input::binary(BinaryOp::Div, Input::number(1.0), Input::number(0.0));
        let mut ir = Ir::with_entry(Script::entry(
            "top",
            vec![set_block(var_x(), div)],
        ));
        Analyzer::new().analyze(&mut ir);

        let exit = ir.entry.stack[0].exit_state.as_ref().expect("exit state");
        assert_eq!(exit.get("x-id"), ValueType::POS_INF);
    }

    #[test]
    fn test_infinity_minus_infinity_includes_nan() {
        let inf = Input::number(f64::INFINITY);
        let neg_inf = Input::number(f64::NEG_INFINITY);
        let ty = input_type(
            &Input::binary(BinaryOp::Add, inf, neg_inf),
            &TypeState::new(),
        );
        assert!(ty.is_sometimes(ValueType::NAN));
    }

    #[test]
    fn test_procedure_call_clears_refinements() {
        let mut ir = Ir::with_entry(Script::entry(
            "top",
            vec![
                set_block(var_x(), Input::number(3.0)),
                StackBlock::new(StackKind::ProcedureCall {
                    code: "P".into(),
                    arguments: vec![],
                }),
            ],
        ));
        ir.entry.depended_procedures.push("P".into());
        ir.procedures
            .insert("P".into(), Script::procedure("P", vec![], vec![]));
        Analyzer::new().analyze(&mut ir);

        let exit = ir.entry.stack[1].exit_state.as_ref().expect("exit state");
        assert_eq!(exit.get("x-id"), ValueType::ANY);
    }

    #[test]
    fn test_yielding_command_clears_refinements() {
        let mut ir = Ir::with_entry(Script::entry(
            "top",
            vec![
                set_block(var_x(), Input::number(3.0)),
                StackBlock::yielding(StackKind::Wait {
                    seconds: Input::number(1.0),
                }),
            ],
        ));
        ir.entry.yields = true;
        Analyzer::new().analyze(&mut ir);

        let exit = ir.entry.stack[1].exit_state.as_ref().expect("exit state");
        assert_eq!(exit.get("x-id"), ValueType::ANY);
    }

    #[test]
    fn test_monotone_from_larger_state() {
        // Analyzing the same expression from a larger state yields a type
        // at least as large.
        let expr = Input::binary(
            BinaryOp::Add,
            Input::var_get(var_x()).to_type(CastKind::Number),
            Input::number(1.0),
        );
        let mut small = TypeState::new();
        small.set("x-id", ValueType::POS_INT);
        let mut large = TypeState::new();
        large.set("x-id", ValueType::POS_INT | ValueType::NEG_INT);

        let from_small = input_type(&expr, &small);
        let from_large = input_type(&expr, &large);
        assert!(from_small.is_always(from_large));
    }

    #[test]
    fn test_cast_number_maps_nan_to_zero() {
        let t = cast_type(CastKind::Number, ValueType::POS_INF | ValueType::NAN);
        assert_eq!(t, ValueType::POS_INF | ValueType::ZERO);
    }

    #[test]
    fn test_cast_index_truncates_fractions() {
        let t = cast_type(CastKind::NumberIndex, ValueType::POS_FRACT);
        assert_eq!(t, ValueType::POS_INT | ValueType::ZERO);
        let t = cast_type(CastKind::NumberIndex, ValueType::NEG_FRACT);
        assert_eq!(t, ValueType::NEG_INT | ValueType::NEG_ZERO);
    }

    #[test]
    fn test_unhandled_opcode_keeps_declared_type() {
        let input = Input::unary(UnaryOp::Sqrt, Input::number(4.0));
        assert_eq!(
            input_type(&input, &TypeState::new()),
            ValueType::NUMBER_OR_NAN
        );
    }

    #[test]
    fn test_loop_termination_bound() {
        // The fixed point must settle within |atoms| * |vars| joins; with a
        // single variable that is at most 12 iterations. The loop below
        // alternates a variable between numeric refinements and strings,
        // which converges in two.
        let body = vec![
            set_block(var_x(), Input::string("s")),
            set_block(
                var_x(),
                Input::binary(
                    BinaryOp::Add,
                    Input::var_get(var_x()).to_type(CastKind::Number),
                    Input::number(0.5),
                ),
            ),
        ];
        let mut ir = Ir::with_entry(Script::entry(
            "top",
            vec![StackBlock::new(StackKind::While {
                condition: Input::boolean(true),
                body,
            })],
        ));
        Analyzer::new().analyze(&mut ir);
        let exit = ir.entry.stack[0].exit_state.as_ref().expect("exit state");
        assert!(exit.get("x-id").is_sometimes(ValueType::NUMBER));
    }
}
