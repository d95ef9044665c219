use serval_symex::Equation;
use thiserror::Error;

/// Outcome of a satisfiability query over a trace equation. `Satisfiable`
/// means some assertion can be violated; `Unsatisfiable` means all of them
/// hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionResult {
    Satisfiable,
    Unsatisfiable,
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("unsupported expression for this back end: {0}")]
    Unsupported(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("solver process error: {0}")]
    Process(String),
}

/// A configured back end: a converter over a propositional or textual
/// engine that a trace equation is fed into.
pub trait DecisionProcedure {
    /// Feed the whole equation: assignments and assumptions become
    /// constraints, the negated assertions the query.
    fn convert(&mut self, equation: &Equation) -> Result<(), SolveError>;

    fn solve(&mut self) -> Result<DecisionResult, SolveError>;

    fn set_time_limit_seconds(&mut self, _seconds: u64) {}

    /// Whether the back end can stream further queries after a solve.
    fn supports_incremental(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}
