//! Per-instruction semantics.
//!
//! The dispatcher applies, in order: the goto-merge check, the depth budget,
//! then the per-kind handler. A false guard short-circuits side-effectful
//! emission; end-of-function, dead and atomic-end still run their
//! bookkeeping so frames and sections stay balanced.

mod assign;
mod builtins;
mod call;
mod clean;
mod exceptions;
mod goto;
mod threads;

use serval_ir::expr::{BinaryOp, Expr, ExprKind, QuantifierKind, SsaSymbol};
use serval_ir::program::{FunctionSource, InstructionKind};
use serval_ir::symbol::{Namespace, Symbol};
use serval_ir::types::Type;
use tracing::trace;

use crate::executor::{transition_next, transition_to, Executor, SymexError};
use crate::state::State;

impl Executor<'_> {
    /// Execute the instruction at the state's program counter.
    pub(crate) fn step(
        &mut self,
        state: &mut State,
        fns: &dyn FunctionSource,
    ) -> Result<(), SymexError> {
        assert!(!state.threads.is_empty());
        assert!(
            !state.call_stack().is_empty(),
            "symex stepped with an empty call stack"
        );

        let instruction = {
            let function = fns
                .get_function(&state.source.function)
                .expect("current function is resolvable");
            function
                .body
                .get(state.source.pc)
                .expect("program counter is inside the current function")
                .clone()
        };

        if !self.config.doing_path_exploration {
            self.merge_gotos(state);
        }

        if self.config.max_depth != 0 && state.depth > self.config.max_depth {
            state.guard.add(Expr::false_expr());
        }
        state.depth += 1;

        if self.config.debug_level > 0 {
            trace!(
                function = %state.source.function,
                pc = state.source.pc,
                thread = state.source.thread,
                "step"
            );
        }

        match instruction.kind {
            InstructionKind::Skip | InstructionKind::Location => {
                if !state.guard.is_false() {
                    self.equation
                        .location(state.guard.as_expr(), state.source.clone());
                }
                transition_next(state, fns);
            }

            // Runs even under a false guard so the frame created by
            // start-thread is torn down.
            InstructionKind::EndFunction => {
                self.symex_end_of_function(state, fns);
            }

            InstructionKind::Goto { condition, target } => {
                self.symex_goto(state, fns, condition, target)?;
            }

            InstructionKind::Assume(cond) => {
                if !state.guard.is_false() {
                    let cond = self.clean_expr(state, cond, false)?;
                    let cond = self.rename(state, cond);
                    self.symex_assume(state, cond);
                }
                transition_next(state, fns);
            }

            InstructionKind::Assert(cond) => {
                if !state.guard.is_false() {
                    let message = instruction
                        .source
                        .comment
                        .clone()
                        .unwrap_or_else(|| "assertion".to_string());
                    let cond = self.clean_expr(state, cond, false)?;
                    self.vcc(state, cond, &message);
                }
                transition_next(state, fns);
            }

            InstructionKind::Return(value) => {
                if !state.guard.is_false() {
                    self.return_assignment(state, value)?;
                }
                let end = state.top_frame().end_of_function;
                transition_to(state, fns, end, false);
            }

            InstructionKind::Assign { lhs, rhs } => {
                if !state.guard.is_false() {
                    self.symex_assign(state, lhs, rhs)?;
                }
                transition_next(state, fns);
            }

            InstructionKind::FunctionCall {
                lhs,
                function,
                arguments,
            } => {
                if !state.guard.is_false() {
                    self.symex_function_call(state, fns, lhs, function, arguments)?;
                } else {
                    transition_next(state, fns);
                }
            }

            InstructionKind::Other(other) => {
                if !state.guard.is_false() {
                    self.symex_other(state, other)?;
                }
                transition_next(state, fns);
            }

            InstructionKind::Decl { name, typ } => {
                if !state.guard.is_false() {
                    self.symex_decl(state, &name, typ);
                }
                transition_next(state, fns);
            }

            // Bookkeeping regardless of the guard.
            InstructionKind::Dead { name } => {
                self.symex_dead(state, &name);
                transition_next(state, fns);
            }

            InstructionKind::StartThread { target } => {
                self.symex_start_thread(state, target);
                transition_next(state, fns);
            }

            // Behaves like assume(false).
            InstructionKind::EndThread => {
                if !state.guard.is_false() {
                    state.guard.add(Expr::false_expr());
                }
                transition_next(state, fns);
            }

            InstructionKind::AtomicBegin => {
                self.symex_atomic_begin(state);
                transition_next(state, fns);
            }

            InstructionKind::AtomicEnd => {
                self.symex_atomic_end(state);
                transition_next(state, fns);
            }

            InstructionKind::Catch { handlers } => {
                self.symex_catch(state, handlers);
                transition_next(state, fns);
            }

            InstructionKind::Throw { tag } => {
                let jumped = self.symex_throw(state, fns, &tag);
                if !jumped {
                    transition_next(state, fns);
                }
            }
        }
        Ok(())
    }

    /// Lift an assertion into the equation as a proof obligation.
    ///
    /// Assertions inside hidden (library) functions are suppressed entirely.
    pub(crate) fn vcc(&mut self, state: &mut State, expr: Expr, message: &str) {
        if state.top_frame().hidden_function {
            return;
        }
        state.total_vccs += 1;
        self.path_segment_vccs += 1;

        let mut expr = expr;
        if expr.has_quantifier() {
            // Negations pushed inward first, then universals dropped in
            // favor of fresh level-1 bound names.
            expr = self.do_simplify(expr);
            expr = self.rewrite_quantifiers(state, expr);
        }

        let expr = self.rename(state, expr);
        let expr = self.do_simplify(expr);
        if expr.is_true() {
            return;
        }

        let cond = state.guard.guard_expr(expr);
        state.remaining_vccs += 1;
        self.equation
            .assertion(state.guard.as_expr(), state.source.clone(), cond, message);
    }

    /// `forall X. P` becomes `P` with `X` re-declared at level 1; the
    /// rewrite descends into conjunctions and disjunctions only.
    fn rewrite_quantifiers(&mut self, state: &mut State, expr: Expr) -> Expr {
        let Expr { kind, typ } = expr;
        match kind {
            ExprKind::Quantifier {
                kind: QuantifierKind::Forall,
                variable,
                variable_type,
                body,
            } => {
                self.symex_decl(state, &variable.identifier, variable_type);
                self.rewrite_quantifiers(state, *body)
            }
            ExprKind::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                lhs,
                rhs,
            } => {
                let lhs = self.rewrite_quantifiers(state, *lhs);
                let rhs = self.rewrite_quantifiers(state, *rhs);
                Expr {
                    kind: ExprKind::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    typ,
                }
            }
            kind => Expr { kind, typ },
        }
    }

    /// Record an assumption. In a single-threaded program the condition goes
    /// to the equation; with several threads it folds into the guard instead,
    /// so it cannot gate events of threads that have not reached this point.
    pub(crate) fn symex_assume(&mut self, state: &mut State, cond: Expr) {
        let cond = self.do_simplify(cond);
        if cond.is_true() {
            return;
        }
        if state.threads.len() == 1 {
            self.equation
                .assumption(state.guard.as_expr(), state.source.clone(), cond);
        } else {
            state.guard.add(cond);
        }
        if state.atomic_section_id != 0 && state.guard.is_false() {
            self.symex_atomic_end(state);
        }
    }

    /// Introduce a fresh level-1 instance and level-2 version for a local.
    pub(crate) fn symex_decl(&mut self, state: &mut State, name: &str, typ: Type) {
        if self.outer_symbol_table.lookup(name).is_none() && !state.symbol_table.contains(name) {
            state.symbol_table.insert(Symbol::new(name, typ.clone()));
        }
        let thread = state.source.thread as u64;
        let (instance, previous) = state.renaming.enter_scope_binding(name, thread);
        let l1 = SsaSymbol::new(name).with_instance(instance, thread);
        let l1name = l1.level1_name();

        let frame = state.top_frame_mut();
        frame.saved_level1.push((name.to_string(), previous));
        frame.local_objects.push(l1name.clone());

        let version = state.renaming.write_version(&l1name);
        state.renaming.record_propagation(&l1name, None);
        state.value_set.remove(&l1name);

        let ssa = Expr::ssa(l1.with_version(version), typ);
        self.equation
            .decl(state.guard.as_expr(), state.source.clone(), ssa);
    }

    /// Invalidate a name; later reads are fresh non-deterministic values.
    pub(crate) fn symex_dead(&mut self, state: &mut State, name: &str) {
        let ns = Namespace::joined(self.outer_symbol_table, &state.symbol_table);
        let l1name = state.renaming.l1_key(name, &ns);
        state.renaming.havoc(&l1name);
        state.value_set.remove(&l1name);
    }
}
