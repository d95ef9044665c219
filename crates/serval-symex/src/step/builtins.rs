//! Lowerings for the `other` instruction kind: io, allocation, delete.

use serval_ir::expr::{Expr, SsaSymbol};
use serval_ir::program::OtherInstruction;
use serval_ir::symbol::{Namespace, Symbol};
use serval_ir::types::Type;
use tracing::debug;

use crate::executor::{Executor, SymexError};
use crate::state::State;

impl Executor<'_> {
    pub(crate) fn symex_other(
        &mut self,
        state: &mut State,
        other: OtherInstruction,
    ) -> Result<(), SymexError> {
        match other {
            OtherInstruction::Printf { format, arguments } => {
                let mut values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    let argument = self.clean_expr(state, argument, false)?;
                    let argument = self.rename(state, argument);
                    values.push(self.do_simplify(argument));
                }
                self.equation
                    .output(state.guard.as_expr(), state.source.clone(), format, values);
            }

            OtherInstruction::Output { id, value } => {
                let value = self.clean_expr(state, value, false)?;
                let value = self.rename(state, value);
                let value = self.do_simplify(value);
                self.equation
                    .output(state.guard.as_expr(), state.source.clone(), id, vec![value]);
            }

            // Reading input havocs the target: a fresh version with no
            // defining assignment.
            OtherInstruction::Input { id, target } => {
                let target = self.clean_expr(state, target, true)?;
                let Some(symbol) = target.as_symbol().cloned() else {
                    return Err(SymexError::UnsupportedAssignmentTarget(format!(
                        "{:?}",
                        target.kind
                    )));
                };
                let thread = state.source.thread as u64;
                let ns = Namespace::joined(self.outer_symbol_table, &state.symbol_table);
                let ssa = state.renaming.assign_symbol(&symbol, &ns, thread);
                state.renaming.record_propagation(&ssa.level1_name(), None);
                self.equation.input(
                    state.guard.as_expr(),
                    state.source.clone(),
                    id,
                    Expr::ssa(ssa, target.typ),
                );
            }

            OtherInstruction::Allocate { lhs, size } => {
                let size = self.clean_expr(state, size, false)?;
                let size = self.rename(state, size);
                let size = self.do_simplify(size);
                self.symex_allocate(state, lhs, Some(size))?;
            }

            OtherInstruction::New { lhs } => {
                self.symex_allocate(state, lhs, None)?;
            }

            OtherInstruction::Delete { pointer } => {
                // The pointee becomes invalid: havoc every candidate object.
                let pointer = self.clean_expr(state, pointer, false)?;
                let pointer = self.rename_l1(state, pointer);
                let candidates = state.value_set.candidates_of(&pointer);
                for candidate in candidates {
                    if let Some(symbol) = candidate.as_symbol() {
                        let l1name = symbol.level1_name();
                        state.renaming.havoc(&l1name);
                    }
                }
                debug!("delete lowered to havoc of pointee candidates");
            }
        }
        Ok(())
    }

    /// Mint a fresh dynamic object and bind the target pointer to its
    /// address. `size` is an element count; a constant size above one makes
    /// the object an array.
    fn symex_allocate(
        &mut self,
        state: &mut State,
        lhs: Expr,
        size: Option<Expr>,
    ) -> Result<(), SymexError> {
        state.dynamic_counter += 1;
        let pointee = match &lhs.typ {
            Type::Pointer(target) => (**target).clone(),
            other => other.clone(),
        };
        let object_type = match size.as_ref().and_then(|s| s.as_int_constant()) {
            Some(count) if count > 1 => Type::array(pointee.clone(), count as u64),
            _ => pointee,
        };
        let name = format!("symex_dynamic::dynamic_object{}", state.dynamic_counter);
        state
            .symbol_table
            .insert(Symbol::static_object(&name, object_type.clone()));
        debug!(object = %name, "allocated dynamic object");

        let lhs_type = lhs.typ.clone();
        let lhs = self.clean_expr(state, lhs, true)?;
        let object = Expr::ssa(SsaSymbol::new(name), object_type);
        let rhs = object.address_of().typecast(lhs_type);
        self.symex_assign(state, lhs, rhs)
    }
}
