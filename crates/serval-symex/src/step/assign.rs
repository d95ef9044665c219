//! Assignment semantics.
//!
//! Structural left-hand sides are decomposed recursively until a symbol is
//! reached: array writes become functional `with` updates, struct and byte
//! writes likewise, and a conditional target assigns both arms under the
//! branch condition. A write under a branch condition keeps the arm's old
//! value on the untaken side, so every emitted SSA equality holds
//! unconditionally. The right-hand side is renamed before the target's
//! version is bumped, so `x = x + 1` reads the old version.

use serval_ir::expr::{Expr, ExprKind, SsaSymbol, WithDesignator};
use serval_ir::symbol::Namespace;
use serval_ir::types::Type;

use crate::equation::AssignmentKind;
use crate::executor::{Executor, SymexError};
use crate::guard::Guard;
use crate::renaming::is_propagatable;
use crate::state::State;

impl Executor<'_> {
    pub(crate) fn symex_assign(
        &mut self,
        state: &mut State,
        lhs: Expr,
        rhs: Expr,
    ) -> Result<(), SymexError> {
        let lhs = self.clean_expr(state, lhs, true)?;
        let rhs = self.clean_expr(state, rhs, false)?;
        let kind = if state.top_frame().hidden_function {
            AssignmentKind::Hidden
        } else {
            AssignmentKind::State
        };
        let full_lhs = lhs.clone();
        let mut guard = Guard::true_guard();
        self.symex_assign_rec(state, lhs, full_lhs, rhs, &mut guard, kind)
    }

    pub(crate) fn symex_assign_rec(
        &mut self,
        state: &mut State,
        lhs: Expr,
        full_lhs: Expr,
        rhs: Expr,
        guard: &mut Guard,
        kind: AssignmentKind,
    ) -> Result<(), SymexError> {
        let Expr {
            kind: lhs_kind,
            typ: lhs_type,
        } = lhs;
        match lhs_kind {
            ExprKind::Symbol(symbol) => {
                self.symex_assign_symbol(state, symbol, lhs_type, full_lhs, rhs, guard, kind)
            }

            ExprKind::Typecast(inner) => {
                let target_type = inner.typ.clone();
                self.symex_assign_rec(state, *inner, full_lhs, rhs.typecast(target_type), guard, kind)
            }

            ExprKind::Index { array, index } => {
                let updated = (*array).clone().with_index((*index).clone(), rhs);
                self.symex_assign_rec(state, *array, full_lhs, updated, guard, kind)
            }

            ExprKind::Member { compound, field } => {
                let updated = (*compound).clone().with_member(field, rhs);
                self.symex_assign_rec(state, *compound, full_lhs, updated, guard, kind)
            }

            ExprKind::ByteExtract { base, offset } => {
                let base_type = base.typ.clone();
                let updated = Expr {
                    kind: ExprKind::With {
                        base: base.clone(),
                        designator: WithDesignator::Byte(offset),
                        value: Box::new(rhs),
                    },
                    typ: base_type,
                };
                self.symex_assign_rec(state, *base, full_lhs, updated, guard, kind)
            }

            ExprKind::If {
                cond,
                then_value,
                else_value,
            } => {
                let cond = self.rename(state, *cond);
                let cond = self.do_simplify(cond);
                let saved = guard.clone();

                guard.add(cond.clone());
                if !guard.is_false() {
                    self.symex_assign_rec(
                        state,
                        (*then_value).clone(),
                        full_lhs.clone(),
                        rhs.clone(),
                        guard,
                        kind,
                    )?;
                }

                *guard = saved.clone();
                guard.add(self.do_simplify(cond.not()));
                if !guard.is_false() {
                    self.symex_assign_rec(state, *else_value, full_lhs, rhs, guard, kind)?;
                }

                *guard = saved;
                Ok(())
            }

            other => Err(SymexError::UnsupportedAssignmentTarget(format!(
                "{other:?}"
            ))),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn symex_assign_symbol(
        &mut self,
        state: &mut State,
        symbol: SsaSymbol,
        typ: Type,
        full_lhs: Expr,
        rhs: Expr,
        guard: &Guard,
        kind: AssignmentKind,
    ) -> Result<(), SymexError> {
        // Rename the rhs first: its reads see the pre-assignment versions.
        let rhs = self.rename(state, rhs);
        let rhs = self.do_simplify(rhs);

        let thread = state.source.thread as u64;
        let ns = Namespace::joined(self.outer_symbol_table, &state.symbol_table);

        // A conditional write selects between the new value and the target's
        // current version, so the equality below needs no guard.
        let rhs = if guard.is_true() {
            rhs
        } else {
            let l1 = state.renaming.l1_symbol(&symbol, &ns, thread);
            let old_version = state.renaming.read_version(&l1.level1_name());
            let old = Expr::ssa(l1.with_version(old_version), typ.clone());
            self.do_simplify(Expr::ite(guard.as_expr(), rhs, old))
        };

        let ssa_lhs = state.renaming.assign_symbol(&symbol, &ns, thread);
        if state.run_validation_checks {
            assert!(
                ssa_lhs.is_versioned(),
                "assignment target `{ssa_lhs}` is not fully renamed"
            );
        }
        let l1name = ssa_lhs.level1_name();

        // Propagation is only sound for unconditional writes on this path.
        if self.config.constant_propagation && guard.is_true() && is_propagatable(&rhs) {
            state.renaming.record_propagation(&l1name, Some(rhs.clone()));
        } else {
            state.renaming.record_propagation(&l1name, None);
        }

        if matches!(typ, Type::Pointer(_)) {
            state.value_set.assign(&l1name, &rhs);
        }

        let mut emit_guard = state.guard.clone();
        emit_guard.append(guard);
        self.equation.assignment(
            emit_guard.as_expr(),
            state.source.clone(),
            Expr::ssa(ssa_lhs, typ),
            full_lhs,
            rhs,
            kind,
        );
        Ok(())
    }

    /// Bind the caller-provided target stored in the frame to the returned
    /// value.
    pub(crate) fn return_assignment(
        &mut self,
        state: &mut State,
        value: Option<Expr>,
    ) -> Result<(), SymexError> {
        let return_lhs = state.top_frame().return_lhs.clone();
        if let (Some(value), Some(lhs)) = (value, return_lhs) {
            self.symex_assign(state, lhs, value)?;
        }
        Ok(())
    }
}
