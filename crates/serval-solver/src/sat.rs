//! Propositional back end.
//!
//! Literals are encoded as `2*var` / `2*var + 1` so negation is a single
//! xor. The in-tree `SatCheck` is a plain DPLL with unit propagation and an
//! optional clause-cleanup preprocessing pass; it stands in for an external
//! SAT engine behind the same interface.

use crate::procedure::SolveError;

/// A propositional variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(pub u32);

impl Variable {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A variable with polarity. Positive literal = `2*var`, negative =
/// `2*var + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Literal(pub u32);

impl Literal {
    #[inline]
    pub fn positive(var: Variable) -> Self {
        Literal(var.0 << 1)
    }

    #[inline]
    pub fn negative(var: Variable) -> Self {
        Literal((var.0 << 1) | 1)
    }

    #[inline]
    pub fn variable(self) -> Variable {
        Variable(self.0 >> 1)
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        (self.0 & 1) == 0
    }

    #[inline]
    pub fn negated(self) -> Self {
        Literal(self.0 ^ 1)
    }

    /// DIMACS rendering: 1-based, sign carries polarity.
    pub fn dimacs(self) -> i64 {
        let var = i64::from(self.variable().0) + 1;
        if self.is_positive() {
            var
        } else {
            -var
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatVerdict {
    Satisfiable,
    Unsatisfiable,
}

/// Contract of a propositional engine.
pub trait SatBackend {
    fn new_variable(&mut self) -> Variable;
    fn add_clause(&mut self, clause: &[Literal]);
    fn solve(&mut self) -> Result<SatVerdict, SolveError>;
    /// Model value after a satisfiable solve.
    fn value(&self, variable: Variable) -> Option<bool>;
    fn num_variables(&self) -> u32;
    fn has_preprocessor(&self) -> bool {
        false
    }
}

/// DPLL solver over a growing clause store.
#[derive(Debug, Default)]
pub struct SatCheck {
    num_variables: u32,
    clauses: Vec<Vec<Literal>>,
    model: Vec<Option<bool>>,
    preprocess: bool,
}

impl SatCheck {
    pub fn new() -> Self {
        SatCheck {
            preprocess: true,
            ..SatCheck::default()
        }
    }

    pub fn without_preprocessor() -> Self {
        SatCheck::default()
    }

    /// Drop tautological clauses and duplicate literals.
    fn preprocessed(&self) -> Vec<Vec<Literal>> {
        let mut out = Vec::with_capacity(self.clauses.len());
        'clauses: for clause in &self.clauses {
            let mut cleaned: Vec<Literal> = Vec::with_capacity(clause.len());
            for &lit in clause {
                if cleaned.contains(&lit.negated()) {
                    continue 'clauses;
                }
                if !cleaned.contains(&lit) {
                    cleaned.push(lit);
                }
            }
            out.push(cleaned);
        }
        out
    }

    fn dpll(clauses: &[Vec<Literal>], assignment: &mut Vec<Option<bool>>) -> bool {
        // Unit propagation to a fixpoint.
        loop {
            let mut changed = false;
            for clause in clauses {
                let mut satisfied = false;
                let mut unassigned = None;
                let mut unassigned_count = 0;
                for &lit in clause {
                    match assignment[lit.variable().index()] {
                        Some(value) => {
                            if value == lit.is_positive() {
                                satisfied = true;
                                break;
                            }
                        }
                        None => {
                            unassigned_count += 1;
                            unassigned = Some(lit);
                        }
                    }
                }
                if satisfied {
                    continue;
                }
                match unassigned_count {
                    0 => return false,
                    1 => {
                        let lit = unassigned.expect("counted one unassigned literal");
                        assignment[lit.variable().index()] = Some(lit.is_positive());
                        changed = true;
                    }
                    _ => {}
                }
            }
            if !changed {
                break;
            }
        }

        // Branch on a literal from some unsatisfied clause.
        let mut branch = None;
        for clause in clauses {
            let mut satisfied = false;
            let mut candidate = None;
            for &lit in clause {
                match assignment[lit.variable().index()] {
                    Some(value) if value == lit.is_positive() => {
                        satisfied = true;
                        break;
                    }
                    Some(_) => {}
                    None => candidate = Some(lit),
                }
            }
            if !satisfied {
                if let Some(lit) = candidate {
                    branch = Some(lit);
                    break;
                }
            }
        }
        let Some(lit) = branch else {
            return true;
        };

        for value in [lit.is_positive(), !lit.is_positive()] {
            let mut trial = assignment.clone();
            trial[lit.variable().index()] = Some(value);
            if Self::dpll(clauses, &mut trial) {
                *assignment = trial;
                return true;
            }
        }
        false
    }
}

impl SatBackend for SatCheck {
    fn new_variable(&mut self) -> Variable {
        let var = Variable(self.num_variables);
        self.num_variables += 1;
        var
    }

    fn add_clause(&mut self, clause: &[Literal]) {
        self.clauses.push(clause.to_vec());
    }

    fn solve(&mut self) -> Result<SatVerdict, SolveError> {
        let clauses = if self.preprocess {
            self.preprocessed()
        } else {
            self.clauses.clone()
        };
        let mut assignment = vec![None; self.num_variables as usize];
        if Self::dpll(&clauses, &mut assignment) {
            self.model = assignment;
            Ok(SatVerdict::Satisfiable)
        } else {
            self.model.clear();
            Ok(SatVerdict::Unsatisfiable)
        }
    }

    fn value(&self, variable: Variable) -> Option<bool> {
        self.model.get(variable.index()).copied().flatten()
    }

    fn num_variables(&self) -> u32 {
        self.num_variables
    }

    fn has_preprocessor(&self) -> bool {
        self.preprocess
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(solver: &mut SatCheck) -> (Literal, Literal) {
        let v = solver.new_variable();
        (Literal::positive(v), Literal::negative(v))
    }

    #[test]
    fn literal_encoding_round_trips() {
        let v = Variable(7);
        let pos = Literal::positive(v);
        let neg = Literal::negative(v);
        assert_eq!(pos.variable(), v);
        assert_eq!(neg.variable(), v);
        assert!(pos.is_positive());
        assert!(!neg.is_positive());
        assert_eq!(pos.negated(), neg);
        assert_eq!(neg.negated(), pos);
        assert_eq!(pos.dimacs(), 8);
        assert_eq!(neg.dimacs(), -8);
    }

    #[test]
    fn single_unit_clause_is_satisfiable() {
        let mut solver = SatCheck::new();
        let (a, _) = lit(&mut solver);
        solver.add_clause(&[a]);
        assert_eq!(solver.solve().unwrap(), SatVerdict::Satisfiable);
        assert_eq!(solver.value(a.variable()), Some(true));
    }

    #[test]
    fn contradicting_units_are_unsatisfiable() {
        let mut solver = SatCheck::new();
        let (a, not_a) = lit(&mut solver);
        solver.add_clause(&[a]);
        solver.add_clause(&[not_a]);
        assert_eq!(solver.solve().unwrap(), SatVerdict::Unsatisfiable);
    }

    #[test]
    fn propagation_chases_implications() {
        // (a) ∧ (¬a ∨ b) ∧ (¬b ∨ c) forces c.
        let mut solver = SatCheck::new();
        let (a, not_a) = lit(&mut solver);
        let (b, not_b) = lit(&mut solver);
        let (c, _) = lit(&mut solver);
        solver.add_clause(&[a]);
        solver.add_clause(&[not_a, b]);
        solver.add_clause(&[not_b, c]);
        assert_eq!(solver.solve().unwrap(), SatVerdict::Satisfiable);
        assert_eq!(solver.value(c.variable()), Some(true));
    }

    #[test]
    fn branching_finds_models_beyond_propagation() {
        // (a ∨ b) ∧ (¬a ∨ b) is satisfiable with b.
        let mut solver = SatCheck::new();
        let (a, not_a) = lit(&mut solver);
        let (b, _) = lit(&mut solver);
        solver.add_clause(&[a, b]);
        solver.add_clause(&[not_a, b]);
        assert_eq!(solver.solve().unwrap(), SatVerdict::Satisfiable);
        assert_eq!(solver.value(b.variable()), Some(true));
    }

    #[test]
    fn pigeonhole_two_in_one_is_unsatisfiable() {
        // Two pigeons, one hole: x1 ∧ x2 ∧ (¬x1 ∨ ¬x2).
        let mut solver = SatCheck::without_preprocessor();
        let (a, not_a) = lit(&mut solver);
        let (b, not_b) = lit(&mut solver);
        solver.add_clause(&[a]);
        solver.add_clause(&[b]);
        solver.add_clause(&[not_a, not_b]);
        assert_eq!(solver.solve().unwrap(), SatVerdict::Unsatisfiable);
    }

    #[test]
    fn preprocessor_drops_tautologies() {
        let mut solver = SatCheck::new();
        let (a, not_a) = lit(&mut solver);
        solver.add_clause(&[a, not_a]);
        assert_eq!(solver.preprocessed().len(), 0);
        assert_eq!(solver.solve().unwrap(), SatVerdict::Satisfiable);
    }
}
