//! Symbolic path conditions.
//!
//! A guard is the conjunction of branch conditions assumed true along the
//! current path, kept as a list of conjuncts with opportunistic
//! simplification: `false` collapses the guard, `true` is a no-op, duplicate
//! conjuncts are kept once.

use serval_ir::expr::{BinaryOp, Expr, ExprKind};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Guard {
    conjuncts: Vec<Expr>,
}

impl Guard {
    pub fn true_guard() -> Self {
        Guard::default()
    }

    pub fn is_true(&self) -> bool {
        self.conjuncts.is_empty()
    }

    pub fn is_false(&self) -> bool {
        self.conjuncts.len() == 1 && self.conjuncts[0].is_false()
    }

    /// Conjoin one condition. Nested conjunctions are flattened.
    pub fn add(&mut self, expr: Expr) {
        if self.is_false() || expr.is_true() {
            return;
        }
        if expr.is_false() {
            self.conjuncts = vec![Expr::false_expr()];
            return;
        }
        let Expr { kind, typ } = expr;
        match kind {
            ExprKind::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => {
                self.add(*lhs);
                self.add(*rhs);
            }
            kind => {
                let expr = Expr { kind, typ };
                if !self.conjuncts.contains(&expr) {
                    self.conjuncts.push(expr);
                }
            }
        }
    }

    pub fn append(&mut self, other: &Guard) {
        for conjunct in &other.conjuncts {
            self.add(conjunct.clone());
        }
    }

    pub fn as_expr(&self) -> Expr {
        match self.conjuncts.len() {
            0 => Expr::true_expr(),
            1 => self.conjuncts[0].clone(),
            _ => {
                let mut iter = self.conjuncts.iter().cloned();
                let first = iter.next().unwrap();
                iter.fold(first, |acc, conjunct| acc.and(conjunct))
            }
        }
    }

    /// Wrap an obligation: `g ⇒ e`, with the trivial guards folded away.
    pub fn guard_expr(&self, expr: Expr) -> Expr {
        if self.is_true() {
            expr
        } else if self.is_false() {
            Expr::true_expr()
        } else {
            self.as_expr().implies(expr)
        }
    }

    fn contains_all(&self, other: &Guard) -> bool {
        other
            .conjuncts
            .iter()
            .all(|conjunct| self.conjuncts.contains(conjunct))
    }

    /// Conjuncts of `self` that are not part of `other`; the branch-specific
    /// part of a guard relative to the merge partner.
    pub fn diff(&self, other: &Guard) -> Guard {
        Guard {
            conjuncts: self
                .conjuncts
                .iter()
                .filter(|conjunct| !other.conjuncts.contains(conjunct))
                .cloned()
                .collect(),
        }
    }

    /// Disjunction of two incoming guards at a merge point. When one guard's
    /// conjuncts are a subset of the other's, the stronger guard implies the
    /// weaker and the disjunction collapses to the weaker one. Otherwise the
    /// common prefix is factored out.
    pub fn disjunction(a: &Guard, b: &Guard) -> Guard {
        if a.is_false() || b.is_true() {
            return b.clone();
        }
        if b.is_false() || a.is_true() {
            return a.clone();
        }
        if a == b {
            return a.clone();
        }
        if b.contains_all(a) {
            return a.clone();
        }
        if a.contains_all(b) {
            return b.clone();
        }
        let mut common = Guard::true_guard();
        for conjunct in &a.conjuncts {
            if b.conjuncts.contains(conjunct) {
                common.add(conjunct.clone());
            }
        }
        let rest_a = a.diff(&common);
        let rest_b = b.diff(&common);
        common.add(rest_a.as_expr().or(rest_b.as_expr()));
        common
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serval_ir::types::Type;

    fn b(name: &str) -> Expr {
        Expr::symbol(name, Type::Bool)
    }

    #[test]
    fn empty_guard_is_true() {
        let g = Guard::true_guard();
        assert!(g.is_true());
        assert!(!g.is_false());
        assert_eq!(g.as_expr(), Expr::true_expr());
    }

    #[test]
    fn adding_false_collapses() {
        let mut g = Guard::true_guard();
        g.add(b("p"));
        g.add(Expr::false_expr());
        assert!(g.is_false());
        // Further additions change nothing.
        g.add(b("q"));
        assert!(g.is_false());
    }

    #[test]
    fn adding_true_is_a_no_op_and_duplicates_dedup() {
        let mut g = Guard::true_guard();
        g.add(Expr::true_expr());
        assert!(g.is_true());
        g.add(b("p"));
        g.add(b("p"));
        assert_eq!(g.as_expr(), b("p"));
    }

    #[test]
    fn nested_conjunctions_flatten() {
        let mut g = Guard::true_guard();
        g.add(b("p").and(b("q")));
        g.add(b("q"));
        assert_eq!(g.as_expr(), b("p").and(b("q")));
    }

    #[test]
    fn guard_expr_wraps_with_implication() {
        let mut g = Guard::true_guard();
        assert_eq!(g.guard_expr(b("e")), b("e"));
        g.add(b("p"));
        assert_eq!(g.guard_expr(b("e")), b("p").implies(b("e")));
        g.add(Expr::false_expr());
        assert_eq!(g.guard_expr(b("e")), Expr::true_expr());
    }

    #[test]
    fn disjunction_collapses_on_implication() {
        let mut g1 = Guard::true_guard();
        g1.add(b("p"));
        let mut g2 = Guard::true_guard();
        g2.add(b("p"));
        g2.add(b("q"));
        // g2 implies g1, so g1 ∨ g2 = g1.
        assert_eq!(Guard::disjunction(&g1, &g2), g1);
        assert_eq!(Guard::disjunction(&g2, &g1), g1);
    }

    #[test]
    fn disjunction_factors_the_common_prefix() {
        let mut g1 = Guard::true_guard();
        g1.add(b("c"));
        g1.add(b("p"));
        let mut g2 = Guard::true_guard();
        g2.add(b("c"));
        g2.add(b("q"));
        let merged = Guard::disjunction(&g1, &g2);
        assert_eq!(merged.as_expr(), b("c").and(b("p").or(b("q"))));
    }

    #[test]
    fn diff_keeps_branch_specific_conjuncts() {
        let mut g1 = Guard::true_guard();
        g1.add(b("c"));
        g1.add(b("p"));
        let mut g2 = Guard::true_guard();
        g2.add(b("c"));
        assert_eq!(g1.diff(&g2).as_expr(), b("p"));
    }

    #[test]
    fn disjunction_with_false_side_returns_the_other() {
        let mut dead = Guard::true_guard();
        dead.add(Expr::false_expr());
        let mut live = Guard::true_guard();
        live.add(b("p"));
        assert_eq!(Guard::disjunction(&dead, &live), live);
        assert_eq!(Guard::disjunction(&live, &dead), live);
    }
}
