//! The symbolic trace equation.
//!
//! An append-only ordered log of SSA steps in exact path order. Once a step
//! is emitted it is never rewritten; the log is what the decision procedure
//! consumes.

use indexmap::IndexSet;
use serde::Serialize;
use serval_ir::expr::Expr;
use serval_ir::program::FunctionId;

/// A point in the simulated execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourcePoint {
    pub thread: usize,
    pub function: FunctionId,
    pub pc: usize,
}

impl SourcePoint {
    pub fn new(thread: usize, function: impl Into<FunctionId>, pc: usize) -> Self {
        SourcePoint {
            thread,
            function: function.into(),
            pc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignmentKind {
    /// Ordinary program state update.
    State,
    /// Update inside auxiliary library code.
    Hidden,
    /// Merge-point reconstruction.
    Phi,
    /// Branch-guard bookkeeping.
    Guard,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StepKind {
    Assignment {
        lhs: Expr,
        /// The original, pre-decomposition left-hand side.
        full_lhs: Expr,
        rhs: Expr,
        kind: AssignmentKind,
    },
    Assumption {
        cond: Expr,
    },
    Assertion {
        /// The full obligation, guard included.
        cond: Expr,
        message: String,
    },
    Location,
    Decl {
        symbol: Expr,
    },
    Input {
        id: String,
        value: Expr,
    },
    Output {
        id: String,
        values: Vec<Expr>,
    },
    Spawn {
        thread: usize,
    },
    AtomicBegin {
        section: u64,
    },
    AtomicEnd {
        section: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub guard: Expr,
    pub source: SourcePoint,
    pub kind: StepKind,
}

impl Step {
    pub fn is_assignment(&self) -> bool {
        matches!(self.kind, StepKind::Assignment { .. })
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self.kind, StepKind::Assertion { .. })
    }

    pub fn is_assumption(&self) -> bool {
        matches!(self.kind, StepKind::Assumption { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Equation {
    steps: Vec<Step>,
}

impl Equation {
    pub fn new() -> Self {
        Equation::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn assignment(
        &mut self,
        guard: Expr,
        source: SourcePoint,
        lhs: Expr,
        full_lhs: Expr,
        rhs: Expr,
        kind: AssignmentKind,
    ) {
        self.steps.push(Step {
            guard,
            source,
            kind: StepKind::Assignment {
                lhs,
                full_lhs,
                rhs,
                kind,
            },
        });
    }

    pub fn assumption(&mut self, guard: Expr, source: SourcePoint, cond: Expr) {
        self.steps.push(Step {
            guard,
            source,
            kind: StepKind::Assumption { cond },
        });
    }

    pub fn assertion(
        &mut self,
        guard: Expr,
        source: SourcePoint,
        cond: Expr,
        message: impl Into<String>,
    ) {
        self.steps.push(Step {
            guard,
            source,
            kind: StepKind::Assertion {
                cond,
                message: message.into(),
            },
        });
    }

    pub fn location(&mut self, guard: Expr, source: SourcePoint) {
        self.steps.push(Step {
            guard,
            source,
            kind: StepKind::Location,
        });
    }

    pub fn decl(&mut self, guard: Expr, source: SourcePoint, symbol: Expr) {
        self.steps.push(Step {
            guard,
            source,
            kind: StepKind::Decl { symbol },
        });
    }

    pub fn input(&mut self, guard: Expr, source: SourcePoint, id: impl Into<String>, value: Expr) {
        self.steps.push(Step {
            guard,
            source,
            kind: StepKind::Input {
                id: id.into(),
                value,
            },
        });
    }

    pub fn output(
        &mut self,
        guard: Expr,
        source: SourcePoint,
        id: impl Into<String>,
        values: Vec<Expr>,
    ) {
        self.steps.push(Step {
            guard,
            source,
            kind: StepKind::Output {
                id: id.into(),
                values,
            },
        });
    }

    pub fn spawn(&mut self, guard: Expr, source: SourcePoint, thread: usize) {
        self.steps.push(Step {
            guard,
            source,
            kind: StepKind::Spawn { thread },
        });
    }

    pub fn atomic_begin(&mut self, guard: Expr, source: SourcePoint, section: u64) {
        self.steps.push(Step {
            guard,
            source,
            kind: StepKind::AtomicBegin { section },
        });
    }

    pub fn atomic_end(&mut self, guard: Expr, source: SourcePoint, section: u64) {
        self.steps.push(Step {
            guard,
            source,
            kind: StepKind::AtomicEnd { section },
        });
    }

    pub fn assertions(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.is_assertion())
    }

    pub fn assignments(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.is_assignment())
    }

    /// Check that every assignment target is a fully-renamed SSA symbol and
    /// that no symbol is written twice.
    pub fn validate(&self) -> Result<(), String> {
        let mut written = IndexSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if let StepKind::Assignment { lhs, .. } = &step.kind {
                let Some(symbol) = lhs.as_symbol() else {
                    return Err(format!("step {index}: assignment target is not a symbol"));
                };
                if !symbol.is_versioned() {
                    return Err(format!(
                        "step {index}: assignment target `{symbol}` lacks a level-2 version"
                    ));
                }
                let name = symbol.full_name();
                if !written.insert(name.clone()) {
                    return Err(format!("step {index}: SSA symbol `{name}` written twice"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serval_ir::expr::SsaSymbol;
    use serval_ir::types::Type;

    fn src(pc: usize) -> SourcePoint {
        SourcePoint::new(0, "main", pc)
    }

    fn versioned(name: &str, version: u64) -> Expr {
        Expr::ssa(
            SsaSymbol::new(name).with_instance(0, 0).with_version(version),
            Type::signed(32),
        )
    }

    #[test]
    fn steps_are_recorded_in_order() {
        let mut eq = Equation::new();
        eq.location(Expr::true_expr(), src(0));
        eq.assumption(Expr::true_expr(), src(1), Expr::symbol("c", Type::Bool));
        eq.assertion(Expr::true_expr(), src(2), Expr::symbol("a", Type::Bool), "assertion");
        assert_eq!(eq.len(), 3);
        assert!(eq.steps()[1].is_assumption());
        assert_eq!(eq.assertions().count(), 1);
    }

    #[test]
    fn earlier_steps_survive_later_emissions() {
        let mut eq = Equation::new();
        eq.location(Expr::true_expr(), src(0));
        let snapshot = eq.steps()[0].clone();
        for pc in 1..50 {
            eq.location(Expr::true_expr(), src(pc));
        }
        assert_eq!(eq.steps()[0], snapshot);
    }

    #[test]
    fn validate_accepts_unique_versioned_targets() {
        let mut eq = Equation::new();
        eq.assignment(
            Expr::true_expr(),
            src(0),
            versioned("x", 1),
            versioned("x", 1),
            Expr::int(1, Type::signed(32)),
            AssignmentKind::State,
        );
        eq.assignment(
            Expr::true_expr(),
            src(1),
            versioned("x", 2),
            versioned("x", 2),
            Expr::int(2, Type::signed(32)),
            AssignmentKind::State,
        );
        assert!(eq.validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_writes() {
        let mut eq = Equation::new();
        for _ in 0..2 {
            eq.assignment(
                Expr::true_expr(),
                src(0),
                versioned("x", 1),
                versioned("x", 1),
                Expr::int(1, Type::signed(32)),
                AssignmentKind::State,
            );
        }
        assert!(eq.validate().is_err());
    }

    #[test]
    fn validate_rejects_unversioned_targets() {
        let mut eq = Equation::new();
        eq.assignment(
            Expr::true_expr(),
            src(0),
            Expr::symbol("x", Type::signed(32)),
            Expr::symbol("x", Type::signed(32)),
            Expr::int(1, Type::signed(32)),
            AssignmentKind::State,
        );
        assert!(eq.validate().is_err());
    }
}
