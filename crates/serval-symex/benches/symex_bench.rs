use criterion::{black_box, criterion_group, criterion_main, Criterion};

use serval_ir::builder::FunctionBuilder;
use serval_ir::expr::Expr;
use serval_ir::program::GotoProgram;
use serval_ir::symbol::SymbolTable;
use serval_ir::types::Type;
use serval_symex::{run_all_paths, SymexConfig};

fn counting_loop(iterations: i128) -> GotoProgram {
    let t = Type::signed(32);
    let var = |name: &str| Expr::symbol(name, t.clone());
    let mut program = GotoProgram::new();
    program.add_function(
        FunctionBuilder::new("main")
            .decl("i", t.clone())
            .decl("sum", t.clone())
            .assign(var("i"), Expr::int(0, t.clone()))
            .assign(var("sum"), Expr::int(0, t.clone()))
            .label("head")
            .assign(var("sum"), var("sum").add(var("i")))
            .assign(var("i"), var("i").add(Expr::int(1, t.clone())))
            .goto_if(var("i").lt(Expr::int(iterations, t.clone())), "head")
            .assert_expr(var("sum").ge(Expr::int(0, t.clone())))
            .finish(),
    );
    program
}

fn bench_concrete_loop(c: &mut Criterion) {
    let program = counting_loop(100);
    let symbols = SymbolTable::new();
    let config = SymexConfig::default();
    c.bench_function("symex_concrete_loop_100", |b| {
        b.iter(|| {
            let paths =
                run_all_paths(&config, &symbols, &program, &program.entry_point).unwrap();
            black_box(paths)
        })
    });
}

fn bench_symbolic_loop(c: &mut Criterion) {
    let program = counting_loop(100);
    let symbols = SymbolTable::new();
    let config = SymexConfig {
        constant_propagation: false,
        unwind: Some(50),
        ..SymexConfig::default()
    };
    c.bench_function("symex_symbolic_loop_unwind_50", |b| {
        b.iter(|| {
            let paths =
                run_all_paths(&config, &symbols, &program, &program.entry_point).unwrap();
            black_box(paths)
        })
    });
}

criterion_group!(benches, bench_concrete_loop, bench_symbolic_loop);
criterion_main!(benches);
