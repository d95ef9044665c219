//! End-to-end scenarios for the simulator: straight-line code, branch
//! merging, loop unwinding, threads and recursion, checked against the
//! shape of the emitted trace equation and the VCC counters.

use serval_ir::builder::FunctionBuilder;
use serval_ir::expr::{Expr, ExprKind};
use serval_ir::program::GotoProgram;
use serval_ir::symbol::{Symbol, SymbolTable};
use serval_ir::types::Type;
use serval_symex::{
    run_all_paths, AssignmentKind, PathResult, Step, StepKind, SymexConfig,
};

fn i32t() -> Type {
    Type::signed(32)
}

fn var(name: &str) -> Expr {
    Expr::symbol(name, i32t())
}

fn int(value: i128) -> Expr {
    Expr::int(value, i32t())
}

fn run(program: &GotoProgram, symbols: &SymbolTable, config: &SymexConfig) -> Vec<PathResult> {
    run_all_paths(config, symbols, program, &program.entry_point).expect("symex succeeds")
}

fn run_single(program: &GotoProgram, symbols: &SymbolTable, config: &SymexConfig) -> PathResult {
    let mut paths = run(program, symbols, config);
    assert_eq!(paths.len(), 1, "expected a single merged path");
    paths.pop().unwrap()
}

fn state_assignments(path: &PathResult) -> Vec<&Step> {
    path.equation
        .steps()
        .iter()
        .filter(|step| {
            matches!(
                step.kind,
                StepKind::Assignment {
                    kind: AssignmentKind::State | AssignmentKind::Hidden,
                    ..
                }
            )
        })
        .collect()
}

fn phi_assignments(path: &PathResult) -> Vec<&Step> {
    path.equation
        .steps()
        .iter()
        .filter(|step| {
            matches!(
                step.kind,
                StepKind::Assignment {
                    kind: AssignmentKind::Phi,
                    ..
                }
            )
        })
        .collect()
}

fn assignment_lhs_name(step: &Step) -> String {
    match &step.kind {
        StepKind::Assignment { lhs, .. } => lhs.as_symbol().expect("symbol lhs").full_name(),
        other => panic!("not an assignment: {other:?}"),
    }
}

fn writes_to<'a>(path: &'a PathResult, name: &str) -> Vec<&'a Step> {
    state_assignments(path)
        .into_iter()
        .filter(|step| match &step.kind {
            StepKind::Assignment { lhs, .. } => {
                lhs.as_symbol().map(|s| s.identifier.as_str()) == Some(name)
            }
            _ => false,
        })
        .collect()
}

fn straight_line_program() -> GotoProgram {
    // int x; x = 1; x = x + 1; assert(x == 2);
    let mut program = GotoProgram::new();
    program.add_function(
        FunctionBuilder::new("main")
            .decl("x", i32t())
            .assign(var("x"), int(1))
            .assign(var("x"), var("x").add(int(1)))
            .assert_expr(var("x").eq(int(2)))
            .finish(),
    );
    program
}

#[test]
fn straight_line_discharges_with_propagation() {
    let program = straight_line_program();
    let path = run_single(&program, &SymbolTable::new(), &SymexConfig::default());

    let assignments = state_assignments(&path);
    assert_eq!(assignments.len(), 2);
    assert_eq!(assignment_lhs_name(assignments[0]), "x!0@0#2");
    assert_eq!(assignment_lhs_name(assignments[1]), "x!0@0#3");
    // Propagation folds both right-hand sides to constants.
    for (step, expected) in assignments.iter().zip([1, 2]) {
        match &step.kind {
            StepKind::Assignment { rhs, .. } => {
                assert_eq!(rhs.as_int_constant(), Some(expected));
            }
            _ => unreachable!(),
        }
    }

    // The assertion simplifies to true and is dropped.
    assert_eq!(path.equation.assertions().count(), 0);
    assert_eq!(path.outcome.total_vccs, 1);
    assert_eq!(path.outcome.remaining_vccs, 0);
}

#[test]
fn straight_line_keeps_the_assertion_without_propagation() {
    let program = straight_line_program();
    let config = SymexConfig {
        constant_propagation: false,
        ..SymexConfig::default()
    };
    let path = run_single(&program, &SymbolTable::new(), &config);

    let assertions: Vec<&Step> = path.equation.assertions().collect();
    assert_eq!(assertions.len(), 1);
    match &assertions[0].kind {
        StepKind::Assertion { cond, message } => {
            assert_eq!(message, "assertion");
            // Guard is true, so the obligation is the bare equality.
            assert!(matches!(cond.kind, ExprKind::Binary { .. }));
        }
        _ => unreachable!(),
    }
    assert!(assertions[0].guard.is_true());
    assert_eq!(path.outcome.total_vccs, 1);
    assert_eq!(path.outcome.remaining_vccs, 1);
}

fn branch_program() -> GotoProgram {
    // int x = nondet(); int y; if (x > 0) y = 1; else y = 2; assert(y >= 1);
    let mut program = GotoProgram::new();
    program.add_function(
        FunctionBuilder::new("main")
            .decl("x", i32t())
            .assign(var("x"), Expr::nondet(i32t()))
            .decl("y", i32t())
            .goto_if(var("x").gt(int(0)).not(), "else")
            .assign(var("y"), int(1))
            .goto("join")
            .label("else")
            .assign(var("y"), int(2))
            .label("join")
            .assert_expr(var("y").ge(int(1)))
            .finish(),
    );
    program
}

#[test]
fn symbolic_branch_merges_with_a_phi() {
    let program = branch_program();
    let path = run_single(&program, &SymbolTable::new(), &SymexConfig::default());

    let phis = phi_assignments(&path);
    assert_eq!(phis.len(), 1, "one phi for y at the join");
    match &phis[0].kind {
        StepKind::Assignment { lhs, rhs, .. } => {
            assert_eq!(lhs.as_symbol().unwrap().identifier, "y");
            // The merged value selects between the two branch constants.
            match &rhs.kind {
                ExprKind::If {
                    then_value,
                    else_value,
                    ..
                } => {
                    let mut arms = [
                        then_value.as_int_constant().unwrap(),
                        else_value.as_int_constant().unwrap(),
                    ];
                    arms.sort();
                    assert_eq!(arms, [1, 2]);
                }
                other => panic!("phi rhs is not an ite: {other:?}"),
            }
        }
        _ => unreachable!(),
    }

    // ite(c, 1, 2) >= 1 simplifies away; the VCC is discharged.
    assert_eq!(path.equation.assertions().count(), 0);
    assert_eq!(path.outcome.total_vccs, 1);
    assert_eq!(path.outcome.remaining_vccs, 0);
}

#[test]
fn path_exploration_splits_the_branch_into_two_paths() {
    let program = branch_program();
    let config = SymexConfig {
        doing_path_exploration: true,
        ..SymexConfig::default()
    };
    let paths = run(&program, &SymbolTable::new(), &config);
    assert_eq!(paths.len(), 2);
    for path in &paths {
        // No merging under path exploration.
        assert!(phi_assignments(path).is_empty());
        assert_eq!(path.outcome.total_vccs, 1);
        assert_eq!(path.outcome.remaining_vccs, 0);
    }
}

#[test]
fn write_through_a_conditional_pointer_keeps_the_unselected_object() {
    // int x = 1; int y = 2; int *p = c ? &x : &y; *p = 5;
    // Only the selected alias may change.
    let ptr_t = Type::pointer(i32t());
    let mut program = GotoProgram::new();
    program.add_function(
        FunctionBuilder::new("main")
            .decl("c", Type::Bool)
            .assign(Expr::symbol("c", Type::Bool), Expr::nondet(Type::Bool))
            .decl("x", i32t())
            .assign(var("x"), int(1))
            .decl("y", i32t())
            .assign(var("y"), int(2))
            .decl("p", ptr_t.clone())
            .assign(
                Expr::symbol("p", ptr_t.clone()),
                Expr::ite(
                    Expr::symbol("c", Type::Bool),
                    var("x").address_of(),
                    var("y").address_of(),
                ),
            )
            .assign(Expr::symbol("p", ptr_t).deref(), int(5))
            .assert_expr(var("x").eq(int(1)).or(var("y").eq(int(2))))
            .finish(),
    );

    let path = run_single(&program, &SymbolTable::new(), &SymexConfig::default());

    // One initialization plus one conditional write for each candidate.
    let x_writes = writes_to(&path, "x");
    let y_writes = writes_to(&path, "y");
    assert_eq!(x_writes.len(), 2);
    assert_eq!(y_writes.len(), 2);

    // Each conditional write selects between the written value and the
    // object's previous version, so the untaken side is a no-op.
    for (step, name) in [(x_writes[1], "x"), (y_writes[1], "y")] {
        match &step.kind {
            StepKind::Assignment { rhs, .. } => match &rhs.kind {
                ExprKind::If {
                    then_value,
                    else_value,
                    ..
                } => {
                    assert_eq!(then_value.as_int_constant(), Some(5));
                    let old = else_value
                        .as_symbol()
                        .unwrap_or_else(|| panic!("old value of {name} is not a symbol"));
                    assert_eq!(old.identifier, name);
                    assert!(old.is_versioned());
                }
                other => panic!("write to {name} is not conditional: {other:?}"),
            },
            _ => unreachable!(),
        }
    }

    // The aliased writes invalidate propagation; the disjunction stays a
    // solver obligation instead of being discharged or falsified here.
    assert_eq!(path.outcome.total_vccs, 1);
    assert_eq!(path.outcome.remaining_vccs, 1);
    path.equation.validate().expect("SSA names are unique");
}

fn counting_loop_program() -> GotoProgram {
    // int i = 0; int a[4]; do { a[i] = i; i = i + 1; } while (i < 3);
    let array_t = Type::array(i32t(), 4);
    let mut program = GotoProgram::new();
    program.add_function(
        FunctionBuilder::new("main")
            .decl("i", i32t())
            .decl("a", array_t.clone())
            .assign(var("i"), int(0))
            .label("head")
            .assign(
                Expr::symbol("a", array_t.clone()).index(var("i")),
                var("i"),
            )
            .assign(var("i"), var("i").add(int(1)))
            .goto_if(var("i").lt(int(3)), "head")
            .finish(),
    );
    program
}

fn array_with_assignments(path: &PathResult) -> usize {
    state_assignments(path)
        .iter()
        .filter(|step| match &step.kind {
            StepKind::Assignment { lhs, rhs, .. } => {
                lhs.as_symbol().map(|s| s.identifier.as_str()) == Some("a")
                    && matches!(rhs.kind, ExprKind::With { .. })
            }
            _ => false,
        })
        .count()
}

#[test]
fn bounded_loop_emits_an_unwinding_assertion() {
    let program = counting_loop_program();
    let config = SymexConfig {
        constant_propagation: false,
        unwind: Some(3),
        unwinding_assertions: true,
        ..SymexConfig::default()
    };
    let path = run_single(&program, &SymbolTable::new(), &config);

    assert_eq!(array_with_assignments(&path), 3);

    let assertions: Vec<&Step> = path.equation.assertions().collect();
    assert_eq!(assertions.len(), 1);
    match &assertions[0].kind {
        StepKind::Assertion { message, .. } => {
            assert!(
                message.starts_with("unwinding assertion loop main."),
                "unexpected message {message:?}"
            );
        }
        _ => unreachable!(),
    }
    assert_eq!(path.outcome.total_vccs, 1);
}

#[test]
fn concrete_loop_unrolls_fully_under_propagation() {
    let program = counting_loop_program();
    let path = run_single(&program, &SymbolTable::new(), &SymexConfig::default());
    // All three iterations fold concretely; the back edge condition becomes
    // false and no unwinding machinery triggers.
    assert_eq!(array_with_assignments(&path), 3);
    assert_eq!(path.outcome.total_vccs, 0);
}

#[test]
fn exhausted_unwind_bound_cuts_the_path() {
    let program = counting_loop_program();
    let config = SymexConfig {
        constant_propagation: false,
        unwind: Some(2),
        unwinding_assertions: false,
        partial_loops: false,
        ..SymexConfig::default()
    };
    let path = run_single(&program, &SymbolTable::new(), &config);

    // Two iterations only, and no unwinding assertion.
    assert_eq!(array_with_assignments(&path), 2);
    assert_eq!(path.equation.assertions().count(), 0);
    assert_eq!(path.outcome.total_vccs, 0);
}

#[test]
fn two_threads_interleave_at_thread_completion() {
    // thread 0: x = 1; thread 1: assert(x != 42); x = 42;
    let mut symbols = SymbolTable::new();
    symbols.insert(Symbol::static_object("x", i32t()));

    let mut program = GotoProgram::new();
    program.add_function(
        FunctionBuilder::new("main")
            .start_thread("t2")
            .assign(var("x"), int(1))
            .goto("finish")
            .label("t2")
            .assert_expr(var("x").not_eq(int(42)))
            .assign(var("x"), int(42))
            .end_thread()
            .label("finish")
            .finish(),
    );

    let config = SymexConfig {
        constant_propagation: false,
        ..SymexConfig::default()
    };
    let path = run_single(&program, &symbols, &config);

    // The spawn event is recorded.
    assert!(path
        .equation
        .steps()
        .iter()
        .any(|step| matches!(step.kind, StepKind::Spawn { thread: 1 })));

    // Statics carry no level-1 tags; both writes version the same name.
    let assignments = state_assignments(&path);
    assert_eq!(assignments.len(), 2);
    assert_eq!(assignment_lhs_name(assignments[0]), "x#1");
    assert_eq!(assignment_lhs_name(assignments[1]), "x#2");
    // The second write happens on thread 1.
    assert_eq!(assignments[1].source.thread, 1);

    // The assertion is reachable in this schedule.
    let assertions: Vec<&Step> = path.equation.assertions().collect();
    assert_eq!(assertions.len(), 1);
    assert_eq!(assertions[0].source.thread, 1);
    assert_eq!(path.outcome.total_vccs, 1);
    assert_eq!(path.outcome.remaining_vccs, 1);
}

#[test]
fn recursion_gets_distinct_parameter_instances() {
    // int f(int n) { if (n <= 0) return 0; return n + f(n - 1); }
    // assert(f(2) == 3);
    let mut program = GotoProgram::new();
    program.add_function(
        FunctionBuilder::new("f")
            .parameter("n", i32t())
            .returns(i32t())
            .goto_if(var("n").gt(int(0)), "rec")
            .ret(Some(int(0)))
            .label("rec")
            .decl("tmp", i32t())
            .call(Some(var("tmp")), "f", vec![var("n").sub(int(1))])
            .ret(Some(var("n").add(var("tmp"))))
            .finish(),
    );
    program.add_function(
        FunctionBuilder::new("main")
            .decl("r", i32t())
            .call(Some(var("r")), "f", vec![int(2)])
            .assert_expr(var("r").eq(int(3)))
            .finish(),
    );

    let path = run_single(&program, &SymbolTable::new(), &SymexConfig::default());

    // Three activations of f, each with its own level-1 instance of n.
    let mut parameter_names: Vec<String> = state_assignments(&path)
        .iter()
        .filter_map(|step| match &step.kind {
            StepKind::Assignment { lhs, .. } => {
                let symbol = lhs.as_symbol()?;
                (symbol.identifier == "n").then(|| symbol.full_name())
            }
            _ => None,
        })
        .collect();
    assert_eq!(parameter_names.len(), 3);
    parameter_names.sort();
    parameter_names.dedup();
    assert_eq!(parameter_names.len(), 3, "instances must be disjoint");

    // The unfolded calls evaluate concretely and discharge the assertion.
    assert_eq!(path.outcome.total_vccs, 1);
    assert_eq!(path.outcome.remaining_vccs, 0);
    path.equation.validate().expect("SSA names are unique");
}

#[test]
fn recursion_bound_cuts_unbounded_unfolding() {
    // f calls itself unconditionally; only the unwind bound stops it.
    let mut program = GotoProgram::new();
    program.add_function(
        FunctionBuilder::new("f")
            .parameter("n", i32t())
            .returns(i32t())
            .decl("tmp", i32t())
            .call(Some(var("tmp")), "f", vec![var("n")])
            .ret(Some(var("tmp")))
            .finish(),
    );
    program.add_function(
        FunctionBuilder::new("main")
            .decl("r", i32t())
            .call(Some(var("r")), "f", vec![int(0)])
            .finish(),
    );

    let config = SymexConfig {
        unwind: Some(4),
        ..SymexConfig::default()
    };
    let path = run_single(&program, &SymbolTable::new(), &config);
    // Four activations happened, then the guard was cut.
    let activations = state_assignments(&path)
        .iter()
        .filter(|step| match &step.kind {
            StepKind::Assignment { lhs, .. } => {
                lhs.as_symbol().map(|s| s.identifier.as_str()) == Some("n")
            }
            _ => false,
        })
        .count();
    assert_eq!(activations, 4);
}

#[test]
fn assumptions_reach_the_equation_in_single_threaded_runs() {
    let mut program = GotoProgram::new();
    program.add_function(
        FunctionBuilder::new("main")
            .decl("x", i32t())
            .assign(var("x"), Expr::nondet(i32t()))
            .assume(var("x").gt(int(0)))
            .assert_expr(var("x").ge(int(0)))
            .finish(),
    );
    let path = run_single(&program, &SymbolTable::new(), &SymexConfig::default());
    assert_eq!(
        path.equation
            .steps()
            .iter()
            .filter(|s| s.is_assumption())
            .count(),
        1
    );
    // The assertion stays symbolic (x is unconstrained modulo the
    // assumption) and is left to the solver.
    assert_eq!(path.outcome.total_vccs, 1);
    assert_eq!(path.outcome.remaining_vccs, 1);
}
