//! Expression cleaning ahead of renaming.
//!
//! Three jobs, mirroring the dispatcher's pre-pass on operands: give every
//! non-deterministic choice a unique name, resolve dereferences against the
//! value set, and rewrite trivial byte extracts on assignment targets.

use serval_ir::expr::{Expr, ExprKind, WithDesignator};
use serval_ir::symbol::Symbol;
use serval_ir::types::Type;
use tracing::{debug, warn};

use crate::executor::{Executor, SymexError};
use crate::state::State;

impl Executor<'_> {
    pub(crate) fn clean_expr(
        &mut self,
        state: &mut State,
        expr: Expr,
        write: bool,
    ) -> Result<Expr, SymexError> {
        let Expr { kind, typ } = expr;
        let kind = match kind {
            ExprKind::Symbol(_)
            | ExprKind::IntConstant(_)
            | ExprKind::BoolConstant(_) => kind,

            ExprKind::Nondet => {
                state.nondet_counter += 1;
                let name = format!("symex::nondet{}", state.nondet_counter);
                state
                    .symbol_table
                    .insert(Symbol::static_object(&name, typ.clone()));
                ExprKind::Symbol(serval_ir::expr::SsaSymbol::new(name))
            }

            ExprKind::Dereference(pointer) => {
                let pointer = self.clean_expr(state, *pointer, false)?;
                return self.dereference(state, pointer, typ, write);
            }

            ExprKind::ByteExtract { base, offset } => {
                let base = self.clean_expr(state, *base, write)?;
                let offset = self.clean_expr(state, *offset, false)?;
                if offset.as_int_constant() == Some(0)
                    && base.typ.flattened_width() == typ.flattened_width()
                {
                    return Ok(base.typecast(typ));
                }
                ExprKind::ByteExtract {
                    base: Box::new(base),
                    offset: Box::new(offset),
                }
            }

            ExprKind::AddressOf(inner) => {
                let Expr {
                    kind: inner_kind,
                    typ: inner_typ,
                } = *inner;
                match inner_kind {
                    // &*p collapses to p.
                    ExprKind::Dereference(pointer) => {
                        return self.clean_expr(state, *pointer, false);
                    }
                    kind => {
                        let cleaned = self.clean_expr(
                            state,
                            Expr {
                                kind,
                                typ: inner_typ,
                            },
                            false,
                        )?;
                        ExprKind::AddressOf(Box::new(cleaned))
                    }
                }
            }

            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op,
                operand: Box::new(self.clean_expr(state, *operand, write)?),
            },

            ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
                op,
                lhs: Box::new(self.clean_expr(state, *lhs, write)?),
                rhs: Box::new(self.clean_expr(state, *rhs, write)?),
            },

            ExprKind::If {
                cond,
                then_value,
                else_value,
            } => ExprKind::If {
                cond: Box::new(self.clean_expr(state, *cond, false)?),
                then_value: Box::new(self.clean_expr(state, *then_value, write)?),
                else_value: Box::new(self.clean_expr(state, *else_value, write)?),
            },

            ExprKind::Index { array, index } => ExprKind::Index {
                array: Box::new(self.clean_expr(state, *array, write)?),
                index: Box::new(self.clean_expr(state, *index, false)?),
            },

            ExprKind::Member { compound, field } => ExprKind::Member {
                compound: Box::new(self.clean_expr(state, *compound, write)?),
                field,
            },

            ExprKind::With {
                base,
                designator,
                value,
            } => {
                let designator = match designator {
                    WithDesignator::Index(i) => {
                        WithDesignator::Index(Box::new(self.clean_expr(state, *i, false)?))
                    }
                    WithDesignator::Byte(i) => {
                        WithDesignator::Byte(Box::new(self.clean_expr(state, *i, false)?))
                    }
                    WithDesignator::Member(f) => WithDesignator::Member(f),
                };
                ExprKind::With {
                    base: Box::new(self.clean_expr(state, *base, write)?),
                    designator,
                    value: Box::new(self.clean_expr(state, *value, false)?),
                }
            }

            ExprKind::Typecast(inner) => {
                ExprKind::Typecast(Box::new(self.clean_expr(state, *inner, write)?))
            }

            ExprKind::Quantifier {
                kind,
                variable,
                variable_type,
                body,
            } => ExprKind::Quantifier {
                kind,
                variable,
                variable_type,
                body: Box::new(self.clean_expr(state, *body, false)?),
            },
        };
        Ok(Expr { kind, typ })
    }

    /// Resolve a dereference into its value-set candidates, folded into a
    /// conditional over pointer equalities. An empty candidate set yields a
    /// fresh failed object.
    fn dereference(
        &mut self,
        state: &mut State,
        pointer: Expr,
        typ: Type,
        write: bool,
    ) -> Result<Expr, SymexError> {
        let pointer_l1 = self.rename_l1(state, pointer.clone());
        let candidates = state.value_set.candidates_of(&pointer_l1);

        if candidates.is_empty() {
            state.dynamic_counter += 1;
            let name = format!("symex::failed_object{}", state.dynamic_counter);
            state
                .symbol_table
                .insert(Symbol::static_object(&name, typ.clone()));
            if self.config.allow_pointer_unsoundness {
                debug!(pointer = ?pointer_l1, write, "dereference with empty points-to set");
            } else {
                warn!(pointer = ?pointer_l1, write, "dereference with empty points-to set");
            }
            return Ok(Expr::symbol(name, typ));
        }

        let mut iter = candidates.into_iter().rev();
        let mut result = iter.next().expect("candidate set is non-empty");
        for candidate in iter {
            let test = pointer.clone().eq(candidate.clone().address_of());
            result = Expr::ite(test, candidate, result);
        }
        Ok(result)
    }
}
