//! End-to-end compile scenarios: small IRs through analysis, rewriting and
//! code generation, with assertions on the emitted factory source.

use sprite_vm_compiler::{
    compile_ir, Analyzer, BinaryOp, CastKind, CompileTarget, CompilerContext, Input, InputKind,
    Ir, ListRef, Script, StackBlock, StackKind, TypeState, ValueType, VariableRef,
};

fn var(id: &str) -> VariableRef {
    VariableRef::for_target(id, id)
}

fn set(v: VariableRef, value: Input) -> StackBlock {
    StackBlock::new(StackKind::VarSet { var: v, value })
}

fn compiled_entry_source(ir: &mut Ir) -> String {
    let target = CompileTarget::sprite();
    let mut ctx = CompilerContext::new();
    compile_ir(ir, &target, &mut ctx).expect("compile should succeed");
    ir.entry
        .cached_compile
        .as_ref()
        .expect("cached compile")
        .factory_source
        .clone()
}

#[test]
fn integer_accumulation_compares_with_identity() {
    // set x to 3; set x to x + 4; if x = 7 { set x to 0 }
    let eq = Input::binary(BinaryOp::Eq, Input::var_get(var("x")), Input::number(7.0));
    let mut ir = Ir::with_entry(Script::entry(
        "top",
        vec![
            set(var("x"), Input::number(3.0)),
            set(
                var("x"),
                Input::binary(
                    BinaryOp::Add,
                    Input::var_get(var("x")).to_type(CastKind::Number),
                    Input::number(4.0),
                ),
            ),
            StackBlock::new(StackKind::IfElse {
                condition: eq,
                then_branch: vec![set(var("x"), Input::number(0.0))],
                else_branch: vec![],
            }),
        ],
    ));
    let source = compiled_entry_source(&mut ir);
    assert!(source.contains("=== 7)"), "expected numeric identity: {}", source);
    assert!(!source.contains("compareEqual"));
    // The cast around the read of x was proven redundant.
    assert!(!source.contains("Math.trunc"));
}

#[test]
fn string_variable_comparison_lowers_to_lowercase_strings() {
    // set s to "hello"; if s = 5 { ... }
    let eq = Input::binary(BinaryOp::Eq, Input::var_get(var("s")), Input::number(5.0));
    let mut ir = Ir::with_entry(Script::entry(
        "top",
        vec![
            set(var("s"), Input::string("hello")),
            StackBlock::new(StackKind::IfElse {
                condition: eq,
                then_branch: vec![StackBlock::new(StackKind::Nop)],
                else_branch: vec![],
            }),
        ],
    ));
    let source = compiled_entry_source(&mut ir);
    assert!(
        source.contains(".toLowerCase() === \"5\")"),
        "expected lowercase string comparison: {}",
        source
    );
}

#[test]
fn loop_variable_fed_by_string_keeps_its_cast() {
    // set y to "0"; while c { set y to y + 1 } in a warp script: the fixed
    // point gives y the union of string and numeric refinements, so the
    // cast around the read of y must survive.
    let mut entry = Script::entry(
        "top",
        vec![
            set(var("y"), Input::string("0")),
            StackBlock::new(StackKind::While {
                condition: Input::boolean(true),
                body: vec![set(
                    var("y"),
                    Input::binary(
                        BinaryOp::Add,
                        Input::var_get(var("y")).to_type(CastKind::Number),
                        Input::number(1.0),
                    ),
                )],
            }),
        ],
    );
    entry.is_warp = true;
    let mut ir = Ir::with_entry(entry);
    let target = CompileTarget::sprite();
    let mut ctx = CompilerContext::new();
    compile_ir(&mut ir, &target, &mut ctx).expect("compile should succeed");
    // The cast survived: y may still be a string at the read.
    assert_eq!(ctx.stats.casts_eliminated, 0);
}

#[test]
fn division_type_flows_into_later_comparisons() {
    // set c to 1 / 0; if c = 2 { ... } — c is exactly +Infinity, a number,
    // so the comparison stays on the numeric identity path.
    let eq = Input::binary(BinaryOp::Eq, Input::var_get(var("c")), Input::number(2.0));
    let mut ir = Ir::with_entry(Script::entry(
        "top",
        vec![
            set(
                var("c"),
                Input::binary(BinaryOp::Div, Input::number(1.0), Input::number(0.0)),
            ),
            StackBlock::new(StackKind::IfElse {
                condition: eq,
                then_branch: vec![StackBlock::new(StackKind::Nop)],
                else_branch: vec![],
            }),
        ],
    ));
    let source = compiled_entry_source(&mut ir);
    assert!(source.contains("=== 2)"), "expected numeric identity: {}", source);
    assert!(!source.contains("compareEqual"));
}

#[test]
fn nan_capable_sum_keeps_its_number_cast() {
    // set a to Infinity; set b to -Infinity; set c to (a + b) with a plain
    // number cast: the sum may be NaN, so the cast must survive rewriting.
    let sum = Input::binary(
        BinaryOp::Add,
        Input::var_get(var("a")).to_type(CastKind::NumberOrNan),
        Input::var_get(var("b")).to_type(CastKind::NumberOrNan),
    )
    .to_type(CastKind::Number);
    let mut ir = Ir::with_entry(Script::entry(
        "top",
        vec![
            set(var("a"), Input::number(f64::INFINITY)),
            set(var("b"), Input::number(f64::NEG_INFINITY)),
            set(var("c"), sum),
        ],
    ));
    let target = CompileTarget::sprite();
    let mut ctx = CompilerContext::new();
    compile_ir(&mut ir, &target, &mut ctx).expect("compile should succeed");
    // The two inner casts fold away, the outer NaN-stripping one must not.
    assert_eq!(ctx.stats.casts_eliminated, 2);
    let source = ir.entry.cached_compile.as_ref().expect("cached").factory_source.clone();
    assert!(source.contains("|| 0"), "NaN guard expected: {}", source);
}

#[test]
fn procedure_call_erases_variable_knowledge() {
    // set x to 3; call P; if x = 3 { ... } — after the call the compiler
    // may not assume x is numeric.
    let eq = Input::binary(BinaryOp::Eq, Input::var_get(var("x")), Input::number(3.0));
    let mut entry = Script::entry(
        "top",
        vec![
            set(var("x"), Input::number(3.0)),
            StackBlock::new(StackKind::ProcedureCall {
                code: "P".into(),
                arguments: vec![],
            }),
            StackBlock::new(StackKind::IfElse {
                condition: eq,
                then_branch: vec![StackBlock::new(StackKind::Nop)],
                else_branch: vec![],
            }),
        ],
    );
    entry.depended_procedures.push("P".into());
    let mut ir = Ir::with_entry(entry);
    ir.procedures.insert(
        "P".into(),
        Script::procedure("P", vec![], vec![StackBlock::new(StackKind::Nop)]),
    );
    let source = compiled_entry_source(&mut ir);
    // x may have been rewritten by another script reached from P; the safe
    // constant 3 still allows the numeric identity form, but x itself must
    // be coerced rather than used raw.
    assert!(source.contains("=== 3)"), "{}", source);
    assert!(
        source.contains("+ b0.value") || source.contains("+b0.value"),
        "expected a coercion of the post-call read: {}",
        source
    );
}

#[test]
fn wait_emits_timer_protocol() {
    let mut entry = Script::entry(
        "top",
        vec![StackBlock::yielding(StackKind::Wait {
            seconds: Input::number(0.5),
        })],
    );
    entry.yields = true;
    let mut ir = Ir::with_entry(entry);
    let source = compiled_entry_source(&mut ir);
    assert!(source.contains("thread.timer = timer();"));
    assert!(source.contains("runtime.requestRedraw();"));
    assert!(source.contains("while (thread.timer.timeElapsed() <"));
    assert!(source.contains("thread.timer = null;"));
}

#[test]
fn repeat_counts_down_with_half_threshold() {
    let mut entry = Script::entry(
        "top",
        vec![StackBlock::yielding(StackKind::Repeat {
            times: Input::number(10.0),
            body: vec![set(var("x"), Input::number(1.0))],
        })],
    );
    entry.yields = true;
    let mut ir = Ir::with_entry(entry);
    let source = compiled_entry_source(&mut ir);
    assert!(source.contains("for (let a0 = 10; a0 >= 0.5; a0--)"), "{}", source);
}

#[test]
fn counted_for_loop_writes_the_loop_variable() {
    let mut entry = Script::entry(
        "top",
        vec![StackBlock::yielding(StackKind::For {
            var: var("i"),
            count: Input::number(5.0),
            body: vec![StackBlock::new(StackKind::Nop)],
        })],
    );
    entry.yields = true;
    let mut ir = Ir::with_entry(entry);
    let source = compiled_entry_source(&mut ir);
    assert!(source.contains("let a0 = 0;"), "{}", source);
    assert!(source.contains("while (a0 < 5)"), "{}", source);
    assert!(source.contains("a0++;"));
    assert!(source.contains(".value = a0;"));
}

#[test]
fn stop_script_in_procedure_returns_without_retiring() {
    let mut proc = Script::procedure("P", vec![], vec![StackBlock::new(StackKind::StopScript)]);
    proc.yields = false;
    let mut entry = Script::entry(
        "top",
        vec![StackBlock::new(StackKind::ProcedureCall {
            code: "P".into(),
            arguments: vec![],
        })],
    );
    entry.depended_procedures.push("P".into());
    let mut ir = Ir::with_entry(entry);
    ir.procedures.insert("P".into(), proc);
    let target = CompileTarget::sprite();
    let mut ctx = CompilerContext::new();
    compile_ir(&mut ir, &target, &mut ctx).expect("compile should succeed");
    let proc_source = &ir.procedures["P"]
        .cached_compile
        .as_ref()
        .expect("cached")
        .factory_source;
    assert!(proc_source.contains("return;"));
    assert!(!proc_source.contains("retire();"));
    let entry_source = &ir.entry.cached_compile.as_ref().expect("cached").factory_source;
    assert!(entry_source.contains("retire();"));
}

#[test]
fn analyzer_soundness_on_concrete_arithmetic() {
    // For literal operand pairs, the runtime result's exact atom must fall
    // inside the analyzer-computed type for every operator.
    let samples = [
        0.0,
        -0.0,
        1.0,
        -1.0,
        3.0,
        -7.0,
        0.5,
        -2.25,
        1e300,
        -1e300,
        1e-300,
        -1e-300,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::NAN,
    ];
    let state = TypeState::new();
    for &a in &samples {
        for &b in &samples {
            let cases: [(BinaryOp, f64); 4] = [
                (BinaryOp::Add, a + b),
                (BinaryOp::Sub, a - b),
                (BinaryOp::Mul, a * b),
                (BinaryOp::Div, a / b),
            ];
            for (op, concrete) in cases {
                let expr = Input::binary(op, Input::number(a), Input::number(b));
                let analyzed = sprite_vm_compiler::analysis::input_type(&expr, &state);
                let actual = ValueType::number_type(concrete);
                assert!(
                    actual.is_always(analyzed),
                    "{:?} of {} and {}: runtime atom {} escapes analyzed type {}",
                    op,
                    a,
                    b,
                    actual,
                    analyzed
                );
            }
        }
    }
}

#[test]
fn analyzer_annotations_survive_reanalysis() {
    // Running the analyzer twice joins annotations without changing the
    // fixed point.
    let mut ir = Ir::with_entry(Script::entry(
        "top",
        vec![
            set(var("x"), Input::number(3.0)),
            set(
                var("x"),
                Input::binary(
                    BinaryOp::Add,
                    Input::var_get(var("x")).to_type(CastKind::Number),
                    Input::number(4.0),
                ),
            ),
        ],
    ));
    Analyzer::new().analyze(&mut ir);
    let first = ir.entry.stack[1].exit_state.clone();
    Analyzer::new().analyze(&mut ir);
    let second = ir.entry.stack[1].exit_state.clone();
    assert_eq!(first, second);
}

#[test]
fn list_index_expression_uses_nullish_fast_path() {
    // Index is an arithmetic expression: certainly numeric, so the direct
    // element read applies with the trailing empty-string default.
    let index = Input::binary(BinaryOp::Add, Input::number(1.0), Input::number(1.0))
        .to_type(CastKind::NumberIndex);
    let get = Input::new(InputKind::ListGet {
        list: ListRef::for_target("l", "items"),
        index: Box::new(index),
    });
    let mut ir = Ir::with_entry(Script::entry("top", vec![set(var("x"), get)]));
    let source = compiled_entry_source(&mut ir);
    assert!(source.contains("?? \"\")"), "{}", source);
    assert!(!source.contains("listGet("));
}

#[test]
fn compiled_factories_get_unique_names_across_scripts() {
    let target = CompileTarget::sprite();
    let mut ctx = CompilerContext::new();
    let mut first = Ir::with_entry(Script::entry(
        "top-a",
        vec![set(var("x"), Input::number(1.0))],
    ));
    let mut second = Ir::with_entry(Script::entry(
        "top-b",
        vec![set(var("x"), Input::number(2.0))],
    ));
    compile_ir(&mut first, &target, &mut ctx).expect("compile should succeed");
    compile_ir(&mut second, &target, &mut ctx).expect("compile should succeed");
    let a = first.entry.cached_compile.as_ref().expect("cached");
    let b = second.entry.cached_compile.as_ref().expect("cached");
    assert_ne!(a.factory_name, b.factory_name);
    assert_ne!(a.function_name, b.function_name);
}
