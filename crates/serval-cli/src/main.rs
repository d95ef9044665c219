use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::{miette, IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use serval_ir::program::GotoProgram;
use serval_ir::symbol::SymbolTable;
use serval_solver::{
    get_solver, verify_equation, ArraysUf, DecisionResult, SmtSolverFamily, SolverConfig,
};
use serval_symex::{run_all_paths, StepKind, SymexConfig};

#[derive(Parser)]
#[command(name = "serval")]
#[command(about = "Bounded model checker for goto-programs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Symbolically execute a goto-program and check its assertions
    Verify {
        /// Path to the program file (JSON)
        file: PathBuf,

        #[command(flatten)]
        symex: SymexArgs,

        #[command(flatten)]
        solver: SolverArgs,

        /// Print the symbolic trace equation
        #[arg(long)]
        show_vcc: bool,

        /// Machine-readable report
        #[arg(long)]
        json: bool,
    },
    /// Print the instructions of a goto-program
    ShowGoto {
        /// Path to the program file (JSON)
        file: PathBuf,
    },
}

#[derive(Args)]
struct SymexArgs {
    /// Maximum steps per path (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    depth: u64,

    /// Explore one path at a time instead of merging
    #[arg(long)]
    paths: bool,

    /// Disable constant propagation
    #[arg(long)]
    no_propagation: bool,

    /// Disable expression simplification
    #[arg(long)]
    no_simplify: bool,

    /// Global loop/recursion unwind bound
    #[arg(long)]
    unwind: Option<u64>,

    /// Per-loop bound, `loop-id:bound` (repeatable)
    #[arg(long = "unwindset", value_name = "LOOP:BOUND")]
    unwindset: Vec<String>,

    /// Assert that unwind bounds suffice
    #[arg(long)]
    unwinding_assertions: bool,

    /// Continue past the unwind bound
    #[arg(long)]
    partial_loops: bool,

    /// Turn self-loops into assumptions
    #[arg(long)]
    self_loops_to_assumptions: bool,

    /// Tolerate unresolvable dereferences quietly
    #[arg(long)]
    allow_pointer_unsoundness: bool,

    /// Re-check the SSA renaming of the emitted equation
    #[arg(long)]
    validate_ssa_equation: bool,

    /// Extra per-step tracing
    #[arg(long, default_value_t = 0)]
    debug_level: u32,
}

#[derive(Args)]
struct SolverArgs {
    /// Dump the CNF in DIMACS format
    #[arg(long)]
    dimacs: bool,

    /// Bit-vector refinement
    #[arg(long)]
    refine: bool,

    /// String refinement
    #[arg(long)]
    refine_strings: bool,

    #[arg(long)]
    refine_arrays: bool,

    #[arg(long)]
    refine_arithmetic: bool,

    #[arg(long)]
    max_node_refinement: Option<u32>,

    /// Use an SMT-LIB 2 back end
    #[arg(long)]
    smt2: bool,

    /// Floating-point theory in the SMT-LIB logic
    #[arg(long)]
    fpa: bool,

    #[arg(long)]
    boolector: bool,
    #[arg(long)]
    cvc3: bool,
    #[arg(long)]
    cvc4: bool,
    #[arg(long)]
    mathsat: bool,
    #[arg(long)]
    yices: bool,
    #[arg(long)]
    z3: bool,
    #[arg(long)]
    cprover_smt2: bool,
    #[arg(long)]
    generic: bool,

    /// Output file for dump back ends ("-" for stdout)
    #[arg(long)]
    outfile: Option<String>,

    #[arg(long)]
    beautify: bool,

    /// Disable the SAT preprocessor
    #[arg(long)]
    no_sat_preprocessor: bool,

    /// Treat arrays as uninterpreted: never | auto | always
    #[arg(long, default_value = "auto")]
    arrays_uf: String,

    /// Solver time limit in seconds (0 = none)
    #[arg(long, default_value_t = 0)]
    solver_time_limit: u64,

    #[arg(long)]
    all_properties: bool,

    #[arg(long)]
    cover: bool,

    #[arg(long)]
    incremental_check: bool,
}

/// On-disk program format: the goto functions plus the initial symbol table.
#[derive(Serialize, Deserialize)]
struct ProgramFile {
    #[serde(default)]
    symbols: SymbolTable,
    program: GotoProgram,
}

fn load_program(path: &PathBuf) -> Result<ProgramFile> {
    let text = fs::read_to_string(path).into_diagnostic()?;
    serde_json::from_str(&text).into_diagnostic()
}

fn symex_config(args: &SymexArgs) -> Result<SymexConfig> {
    let mut config = SymexConfig {
        max_depth: args.depth,
        doing_path_exploration: args.paths,
        allow_pointer_unsoundness: args.allow_pointer_unsoundness,
        constant_propagation: !args.no_propagation,
        self_loops_to_assumptions: args.self_loops_to_assumptions,
        simplify: !args.no_simplify,
        unwinding_assertions: args.unwinding_assertions,
        partial_loops: args.partial_loops,
        debug_level: args.debug_level,
        run_validation_checks: args.validate_ssa_equation,
        unwind: args.unwind,
        ..SymexConfig::default()
    };
    for entry in &args.unwindset {
        let (name, bound) = entry
            .rsplit_once(':')
            .ok_or_else(|| miette!("malformed --unwindset entry `{entry}`"))?;
        let bound: u64 = bound
            .parse()
            .map_err(|_| miette!("malformed bound in --unwindset entry `{entry}`"))?;
        config.unwind_set.insert(name.to_string(), bound);
    }
    Ok(config)
}

fn solver_config(args: &SolverArgs) -> Result<SolverConfig> {
    let families = [
        (args.boolector, SmtSolverFamily::Boolector),
        (args.cvc3, SmtSolverFamily::Cvc3),
        (args.cvc4, SmtSolverFamily::Cvc4),
        (args.mathsat, SmtSolverFamily::Mathsat),
        (args.yices, SmtSolverFamily::Yices),
        (args.z3, SmtSolverFamily::Z3),
        (args.cprover_smt2, SmtSolverFamily::CproverSmt2),
        (args.generic, SmtSolverFamily::Generic),
    ];
    let selected: Vec<_> = families.iter().filter(|(set, _)| *set).collect();
    if selected.len() > 1 {
        return Err(miette!("at most one solver family can be selected"));
    }
    let solver_family = selected
        .first()
        .map(|(_, family)| *family)
        .unwrap_or_default();

    let arrays_uf = match args.arrays_uf.as_str() {
        "never" => ArraysUf::Never,
        "auto" => ArraysUf::Auto,
        "always" => ArraysUf::Always,
        other => return Err(miette!("unknown --arrays-uf value `{other}`")),
    };

    Ok(SolverConfig {
        dimacs: args.dimacs,
        refine: args.refine,
        refine_strings: args.refine_strings,
        refine_arrays: args.refine_arrays,
        refine_arithmetic: args.refine_arithmetic,
        max_node_refinement: args.max_node_refinement,
        smt2: args.smt2,
        fpa: args.fpa,
        solver_family,
        outfile: args.outfile.clone(),
        beautify: args.beautify,
        sat_preprocessor: !args.no_sat_preprocessor,
        arrays_uf,
        solver_time_limit: (args.solver_time_limit > 0).then_some(args.solver_time_limit),
        all_properties: args.all_properties,
        cover: args.cover,
        incremental_check: args.incremental_check,
    })
}

fn describe_step(step: &serval_symex::Step) -> String {
    match &step.kind {
        StepKind::Assignment { lhs, rhs, kind, .. } => {
            format!("ASSIGN ({kind:?}) {lhs:?} := {rhs:?}")
        }
        StepKind::Assumption { cond } => format!("ASSUME {cond:?}"),
        StepKind::Assertion { cond, message } => format!("ASSERT [{message}] {cond:?}"),
        StepKind::Location => "LOCATION".to_string(),
        StepKind::Decl { symbol } => format!("DECL {symbol:?}"),
        StepKind::Input { id, value } => format!("INPUT {id} {value:?}"),
        StepKind::Output { id, values } => format!("OUTPUT {id} {values:?}"),
        StepKind::Spawn { thread } => format!("SPAWN thread {thread}"),
        StepKind::AtomicBegin { section } => format!("ATOMIC_BEGIN {section}"),
        StepKind::AtomicEnd { section } => format!("ATOMIC_END {section}"),
    }
}

fn verify(
    file: PathBuf,
    symex: SymexArgs,
    solver: SolverArgs,
    show_vcc: bool,
    json: bool,
) -> Result<ExitCode> {
    let loaded = load_program(&file)?;
    let symex_config = symex_config(&symex)?;
    let solver_config = solver_config(&solver)?;

    let paths = run_all_paths(
        &symex_config,
        &loaded.symbols,
        &loaded.program,
        &loaded.program.entry_point,
    )
    .into_diagnostic()?;

    let mut failures = 0usize;
    let mut unknowns = 0usize;
    let mut path_reports = Vec::new();

    for (index, path) in paths.iter().enumerate() {
        if show_vcc {
            println!("== path {index} ==");
            for (step_index, step) in path.equation.steps().iter().enumerate() {
                println!(
                    "{step_index:4}: {} @ {}:{} t{}",
                    describe_step(step),
                    step.source.function,
                    step.source.pc,
                    step.source.thread
                );
            }
        }

        let mut backend = get_solver(&solver_config).into_diagnostic()?;
        let result = verify_equation(&mut backend, &path.equation).into_diagnostic()?;
        let verdict = match &result {
            DecisionResult::Satisfiable => {
                failures += 1;
                "failure"
            }
            DecisionResult::Unsatisfiable => "success",
            DecisionResult::Unknown(_) => {
                unknowns += 1;
                "unknown"
            }
        };
        if json {
            path_reports.push(json!({
                "path": index,
                "steps": path.equation.len(),
                "total_vccs": path.outcome.total_vccs,
                "remaining_vccs": path.outcome.remaining_vccs,
                "result": verdict,
            }));
        } else {
            println!(
                "path {index}: {} steps, {} VCC(s) ({} remaining after simplification): {verdict}",
                path.equation.len(),
                path.outcome.total_vccs,
                path.outcome.remaining_vccs
            );
            if let DecisionResult::Unknown(reason) = &result {
                println!("  note: {reason}");
            }
        }
    }

    if json {
        let report = json!({
            "paths": path_reports,
            "failures": failures,
            "unknowns": unknowns,
        });
        println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
    } else if failures == 0 && unknowns == 0 {
        println!("VERIFICATION SUCCESSFUL");
    } else if failures > 0 {
        println!("VERIFICATION FAILED");
    }

    Ok(if failures > 0 {
        ExitCode::from(10)
    } else if unknowns > 0 {
        ExitCode::from(5)
    } else {
        ExitCode::SUCCESS
    })
}

fn show_goto(file: PathBuf) -> Result<ExitCode> {
    let loaded = load_program(&file)?;
    for function in loaded.program.functions.values() {
        println!("{}:", function.name);
        for (index, instruction) in function.body.iter().enumerate() {
            println!("{index:4}: {:?}", instruction.kind);
        }
        println!();
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Verify {
            file,
            symex,
            solver,
            show_vcc,
            json,
        } => verify(file, symex, solver, show_vcc, json),
        Commands::ShowGoto { file } => show_goto(file),
    }
}
