//! Solver construction.
//!
//! `get_solver` turns a configuration record into a ready back end,
//! first match wins: DIMACS dump, bit-vector refinement, string refinement,
//! SMT-LIB 2, otherwise the default bit-vector flattening over SAT.

use std::fs::File;

use tracing::debug;

use crate::config::{SmtSolverFamily, SolverConfig, SolverConfigError};
use crate::dimacs::DimacsBackend;
use crate::flatten::BvConverter;
use crate::procedure::{DecisionProcedure, DecisionResult, SolveError};
use crate::refinement::{BvRefinement, StringRefinement};
use crate::sat::SatCheck;
use crate::smt2::{Smt2Dump, Smt2Out, Smt2Process};
use serval_symex::Equation;

/// The configured back end bundle. The converter owns its propositional
/// engine and any output stream, so dropping the bundle disposes them in
/// dependency order.
pub struct Solver {
    pub procedure: Box<dyn DecisionProcedure>,
}

impl Solver {
    pub fn name(&self) -> &'static str {
        self.procedure.name()
    }
}

pub fn get_solver(config: &SolverConfig) -> Result<Solver, SolverConfigError> {
    if config.dimacs {
        return get_dimacs(config);
    }
    if config.refine {
        return get_bv_refinement(config);
    } else if config.refine_strings {
        return get_string_refinement(config);
    }
    if config.smt2 {
        return get_smt2(config);
    }
    get_default(config)
}

/// Feed an equation to a solver and report per-run satisfiability.
pub fn verify_equation(
    solver: &mut Solver,
    equation: &Equation,
) -> Result<DecisionResult, SolveError> {
    solver.procedure.convert(equation)?;
    solver.procedure.solve()
}

fn apply_time_limit(procedure: &mut dyn DecisionProcedure, config: &SolverConfig) {
    if let Some(seconds) = config.solver_time_limit {
        if seconds > 0 {
            procedure.set_time_limit_seconds(seconds);
        }
    }
}

fn get_default(config: &SolverConfig) -> Result<Solver, SolverConfigError> {
    // The SAT preprocessor does not work with beautification.
    let sat = if config.beautify || !config.sat_preprocessor {
        SatCheck::without_preprocessor()
    } else {
        SatCheck::new()
    };
    let mut converter = BvConverter::new(sat, config.arrays_uf);
    apply_time_limit(&mut converter, config);
    debug!("selected the default bit-vector back end");
    Ok(Solver {
        procedure: Box::new(converter),
    })
}

fn get_dimacs(config: &SolverConfig) -> Result<Solver, SolverConfigError> {
    no_beautification(config)?;
    no_incremental_check(config)?;
    let outfile = match config.outfile.as_deref() {
        Some("-") | None => None,
        Some(path) => Some(path.to_string()),
    };
    debug!(?outfile, "selected the DIMACS back end");
    Ok(Solver {
        procedure: Box::new(DimacsBackend::new(outfile)),
    })
}

fn get_bv_refinement(config: &SolverConfig) -> Result<Solver, SolverConfigError> {
    // The preprocessor may be disabled; with it enabled, beautification is
    // rejected as in the default back end.
    let sat = if config.sat_preprocessor {
        no_beautification(config)?;
        SatCheck::new()
    } else {
        SatCheck::without_preprocessor()
    };
    let converter = BvConverter::new(sat, config.arrays_uf);
    let mut refinement = BvRefinement::new(converter);
    refinement.max_node_refinement = config.max_node_refinement;
    refinement.refine_arrays = config.refine_arrays;
    refinement.refine_arithmetic = config.refine_arithmetic;
    apply_time_limit(&mut refinement, config);
    debug!("selected the bit-vector refinement back end");
    Ok(Solver {
        procedure: Box::new(refinement),
    })
}

fn get_string_refinement(config: &SolverConfig) -> Result<Solver, SolverConfigError> {
    let converter = BvConverter::new(SatCheck::without_preprocessor(), config.arrays_uf);
    let mut inner = BvRefinement::new(converter);
    inner.max_node_refinement = config.max_node_refinement;
    inner.refine_arrays = config.refine_arrays;
    inner.refine_arithmetic = config.refine_arithmetic;
    let mut refinement = StringRefinement::new(inner);
    apply_time_limit(&mut refinement, config);
    debug!("selected the string refinement back end");
    Ok(Solver {
        procedure: Box::new(refinement),
    })
}

fn get_smt2(config: &SolverConfig) -> Result<Solver, SolverConfigError> {
    no_beautification(config)?;
    match config.outfile.as_deref() {
        None => {
            if config.solver_family == SmtSolverFamily::Generic {
                return Err(SolverConfigError::MissingOutfile);
            }
            let mut process = Smt2Process::new(config.solver_family, config.fpa);
            apply_time_limit(&mut process, config);
            debug!(family = ?config.solver_family, "selected the SMT-LIB process back end");
            Ok(Solver {
                procedure: Box::new(process),
            })
        }
        Some("-") => {
            debug!("selected the SMT-LIB stdout dump");
            Ok(Solver {
                procedure: Box::new(Smt2Dump::new(Smt2Out::Stdout, config.fpa)),
            })
        }
        Some(path) => {
            let file = File::create(path).map_err(|source| SolverConfigError::OutputFile {
                path: path.to_string(),
                source,
            })?;
            debug!(path, "selected the SMT-LIB file dump");
            Ok(Solver {
                procedure: Box::new(Smt2Dump::new(Smt2Out::File(file), config.fpa)),
            })
        }
    }
}

fn no_beautification(config: &SolverConfig) -> Result<(), SolverConfigError> {
    if config.beautify {
        return Err(SolverConfigError::BeautifyUnsupported);
    }
    Ok(())
}

fn no_incremental_check(config: &SolverConfig) -> Result<(), SolverConfigError> {
    if config.all_properties {
        return Err(SolverConfigError::IncrementalUnsupported("all-properties"));
    }
    if config.cover {
        return Err(SolverConfigError::IncrementalUnsupported("cover"));
    }
    if config.incremental_check {
        return Err(SolverConfigError::IncrementalUnsupported(
            "incremental-check",
        ));
    }
    Ok(())
}
