//! CNF dump back end.
//!
//! Flattens the equation onto a clause-recording backend and writes the
//! result in DIMACS format instead of solving.

use std::fs::File;
use std::io::{BufWriter, Write};

use serval_symex::Equation;

use crate::config::ArraysUf;
use crate::flatten::BvConverter;
use crate::procedure::{DecisionProcedure, DecisionResult, SolveError};
use crate::sat::{Literal, SatBackend, SatVerdict, Variable};

/// Records clauses; cannot solve.
#[derive(Debug, Default)]
pub struct DimacsCnf {
    num_variables: u32,
    clauses: Vec<Vec<Literal>>,
}

impl DimacsCnf {
    pub fn clauses(&self) -> &[Vec<Literal>] {
        &self.clauses
    }

    pub fn write_dimacs<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "p cnf {} {}", self.num_variables, self.clauses.len())?;
        for clause in &self.clauses {
            for lit in clause {
                write!(out, "{} ", lit.dimacs())?;
            }
            writeln!(out, "0")?;
        }
        Ok(())
    }
}

impl SatBackend for DimacsCnf {
    fn new_variable(&mut self) -> Variable {
        let var = Variable(self.num_variables);
        self.num_variables += 1;
        var
    }

    fn add_clause(&mut self, clause: &[Literal]) {
        self.clauses.push(clause.to_vec());
    }

    fn solve(&mut self) -> Result<SatVerdict, SolveError> {
        Err(SolveError::Unsupported(
            "the DIMACS back end records clauses and does not solve".to_string(),
        ))
    }

    fn value(&self, _variable: Variable) -> Option<bool> {
        None
    }

    fn num_variables(&self) -> u32 {
        self.num_variables
    }
}

pub struct DimacsBackend {
    converter: BvConverter<DimacsCnf>,
    /// `None` writes to stdout.
    outfile: Option<String>,
}

impl DimacsBackend {
    pub fn new(outfile: Option<String>) -> Self {
        DimacsBackend {
            converter: BvConverter::new(DimacsCnf::default(), ArraysUf::Never),
            outfile,
        }
    }

    fn write(&mut self) -> Result<(), SolveError> {
        // Materialize the violation clause before dumping.
        let _ = self.converter.solve();
        match &self.outfile {
            Some(path) => {
                let file = File::create(path)?;
                let mut out = BufWriter::new(file);
                self.converter.backend().write_dimacs(&mut out)?;
                out.flush()?;
            }
            None => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                self.converter.backend().write_dimacs(&mut out)?;
            }
        }
        Ok(())
    }
}

impl DecisionProcedure for DimacsBackend {
    fn convert(&mut self, equation: &Equation) -> Result<(), SolveError> {
        self.converter.convert(equation)
    }

    fn solve(&mut self) -> Result<DecisionResult, SolveError> {
        self.write()?;
        Ok(DecisionResult::Unknown("CNF written".to_string()))
    }

    fn name(&self) -> &'static str {
        "DIMACS dump"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimacs_rendering_matches_the_header() {
        let mut cnf = DimacsCnf::default();
        let a = Literal::positive(cnf.new_variable());
        let b = Literal::positive(cnf.new_variable());
        cnf.add_clause(&[a, b.negated()]);
        cnf.add_clause(&[a.negated()]);

        let mut out = Vec::new();
        cnf.write_dimacs(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "p cnf 2 2\n1 -2 0\n-1 0\n");
    }

    #[test]
    fn recording_backend_refuses_to_solve() {
        let mut cnf = DimacsCnf::default();
        assert!(matches!(cnf.solve(), Err(SolveError::Unsupported(_))));
    }
}
