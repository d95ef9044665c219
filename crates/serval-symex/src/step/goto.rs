//! Branching, loop unwinding and goto-merge with phi reconstruction.

use serval_ir::expr::Expr;
use serval_ir::program::{FunctionSource, LoopId};
use serval_ir::simplify::simplify;
use serval_ir::symbol::Namespace;
use tracing::debug;

use crate::equation::AssignmentKind;
use crate::executor::{transition_next, transition_to, Executor, SymexError};
use crate::guard::Guard;
use crate::path_storage::SavedPath;
use crate::renaming::{is_propagatable, parse_level1_name};
use crate::state::{GotoState, State};

impl Executor<'_> {
    pub(crate) fn symex_goto(
        &mut self,
        state: &mut State,
        fns: &dyn FunctionSource,
        condition: Expr,
        target: usize,
    ) -> Result<(), SymexError> {
        let pc = state.source.pc;
        if state.guard.is_false() {
            transition_next(state, fns);
            return Ok(());
        }

        let cond = self.clean_expr(state, condition, false)?;
        let cond = self.rename(state, cond);
        let cond = self.do_simplify(cond);

        if cond.is_false() {
            transition_next(state, fns);
            return Ok(());
        }

        if target <= pc {
            self.symex_goto_backward(state, fns, cond, target, pc)
        } else {
            self.symex_goto_forward(state, fns, cond, target, pc)
        }
    }

    /// Back edges drive loop unwinding: count the traversal, stop at the
    /// configured bound, otherwise keep unrolling on the taken side and save
    /// the fall-through for the forward merge point.
    fn symex_goto_backward(
        &mut self,
        state: &mut State,
        fns: &dyn FunctionSource,
        cond: Expr,
        target: usize,
        pc: usize,
    ) -> Result<(), SymexError> {
        let function = state.source.function.clone();

        if target == pc && self.config.self_loops_to_assumptions {
            self.symex_assume(state, Expr::false_expr());
            state.guard.add(Expr::false_expr());
            transition_next(state, fns);
            return Ok(());
        }

        let loop_id = LoopId {
            function: function.clone(),
            back_edge: pc,
        };
        let count = {
            let entry = state
                .top_frame_mut()
                .loop_iterations
                .entry(loop_id.clone())
                .or_insert(0);
            *entry += 1;
            *entry
        };

        if self.should_stop_unwind(&loop_id, count) {
            debug!(%loop_id, count, "loop unwind bound reached");
            self.loop_bound_exceeded(state, &loop_id, cond);
            transition_next(state, fns);
            return Ok(());
        }

        if cond.is_true() {
            transition_to(state, fns, target, true);
            return Ok(());
        }

        let mut taken_guard = state.guard.clone();
        taken_guard.add(cond.clone());
        let mut fall_guard = state.guard.clone();
        fall_guard.add(self.do_simplify(cond.not()));

        if self.config.doing_path_exploration {
            self.save_both_successors(state, fns, taken_guard, target, true, fall_guard, pc + 1);
            return Ok(());
        }

        let snapshot = state.snapshot_goto_state(fall_guard);
        state
            .goto_states
            .entry((function, pc + 1))
            .or_default()
            .push(snapshot);
        state.guard = taken_guard;
        transition_to(state, fns, target, true);
        Ok(())
    }

    fn symex_goto_forward(
        &mut self,
        state: &mut State,
        fns: &dyn FunctionSource,
        cond: Expr,
        target: usize,
        pc: usize,
    ) -> Result<(), SymexError> {
        let function = state.source.function.clone();

        if cond.is_true() {
            let pending_between = (pc + 1..target)
                .any(|i| state.goto_states.contains_key(&(function.clone(), i)));
            if !pending_between || self.config.doing_path_exploration {
                transition_to(state, fns, target, false);
                return Ok(());
            }
            // Saved states wait at program points this jump would skip.
            // Park the current state at the target and walk forward with a
            // dead guard so they still merge.
            let snapshot = state.snapshot_goto_state(state.guard.clone());
            state
                .goto_states
                .entry((function, target))
                .or_default()
                .push(snapshot);
            state.guard.add(Expr::false_expr());
            transition_next(state, fns);
            return Ok(());
        }

        let mut taken_guard = state.guard.clone();
        taken_guard.add(cond.clone());
        let mut fall_guard = state.guard.clone();
        fall_guard.add(self.do_simplify(cond.not()));

        if self.config.doing_path_exploration {
            self.save_both_successors(state, fns, taken_guard, target, false, fall_guard, pc + 1);
            return Ok(());
        }

        let snapshot = state.snapshot_goto_state(taken_guard);
        state
            .goto_states
            .entry((function, target))
            .or_default()
            .push(snapshot);
        state.guard = fall_guard;
        transition_next(state, fns);
        Ok(())
    }

    fn should_stop_unwind(&self, loop_id: &LoopId, count: u64) -> bool {
        match self.config.loop_unwind_bound(loop_id) {
            Some(bound) => count >= bound,
            None => false,
        }
    }

    fn loop_bound_exceeded(&mut self, state: &mut State, loop_id: &LoopId, cond: Expr) {
        let negated = self.do_simplify(cond.not());
        if self.config.unwinding_assertions {
            self.vcc(
                state,
                negated.clone(),
                &format!("unwinding assertion loop {loop_id}"),
            );
        }
        if !self.config.partial_loops {
            state.guard.add(negated);
        }
    }

    /// Path exploration: push both successors and pause the run; the caller
    /// resumes one of them on a fresh equation.
    #[allow(clippy::too_many_arguments)]
    fn save_both_successors(
        &mut self,
        state: &mut State,
        fns: &dyn FunctionSource,
        taken_guard: Guard,
        target: usize,
        backwards: bool,
        fall_guard: Guard,
        next: usize,
    ) {
        let mut taken = state.clone();
        taken.guard = taken_guard;
        transition_to(&mut taken, fns, target, backwards);

        let mut fall_through = state.clone();
        fall_through.guard = fall_guard;
        transition_to(&mut fall_through, fns, next, false);

        self.path_storage.push(SavedPath {
            state: taken,
            equation: self.equation.clone(),
        });
        self.path_storage.push(SavedPath {
            state: fall_through,
            equation: self.equation.clone(),
        });
        state.has_saved_jump_target = true;
        state.has_saved_next_instruction = true;
        self.should_pause_symex = true;
        self.path_segment_vccs = 0;
    }

    /// Merge every saved successor waiting at the current program point into
    /// the state.
    pub(crate) fn merge_gotos(&mut self, state: &mut State) {
        let key = (state.source.function.clone(), state.source.pc);
        let Some(list) = state.goto_states.shift_remove(&key) else {
            return;
        };
        for goto_state in list.into_iter().rev() {
            self.merge_goto(state, goto_state);
        }
    }

    fn merge_goto(&mut self, state: &mut State, goto_state: GotoState) {
        assert_eq!(
            goto_state.frame_depth,
            state.call_stack().len(),
            "goto merge with mismatched call stacks"
        );
        assert_eq!(
            goto_state.atomic_section_id, state.atomic_section_id,
            "goto merge across atomic sections"
        );
        if goto_state.guard.is_false() {
            return;
        }
        if state.guard.is_false() {
            state.adopt_goto_state(goto_state);
            return;
        }
        self.phi_function(state, &goto_state);
        state.value_set.merge(&goto_state.value_set);
        state.guard = Guard::disjunction(&state.guard, &goto_state.guard);
    }

    /// For every variable whose level-2 version differs between the two
    /// incoming states, allocate a fresh version and select between the
    /// incoming values under the saved branch's guard.
    fn phi_function(&mut self, state: &mut State, goto_state: &GotoState) {
        let diff_guard = goto_state.guard.diff(&state.guard).as_expr();

        let mut names: Vec<String> = goto_state.l2_current.keys().cloned().collect();
        for name in state.renaming.l2_current.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }

        for l1name in names {
            let parsed = parse_level1_name(&l1name);
            if parsed.identifier.starts_with("symex::")
                || parsed.identifier.starts_with("symex_dynamic::")
            {
                continue;
            }
            let goto_version = goto_state.l2_current.get(&l1name).copied();
            let state_version = state.renaming.l2_current.get(&l1name).copied();
            if goto_version == state_version {
                continue;
            }

            let typ = {
                let ns = Namespace::joined(self.outer_symbol_table, &state.symbol_table);
                match ns.lookup(&parsed.identifier) {
                    Some(symbol) => symbol.typ.clone(),
                    None => {
                        debug!(name = %l1name, "phi skipped for unknown symbol");
                        continue;
                    }
                }
            };

            // A side that never touched the variable contributes a fresh,
            // unconstrained version.
            let goto_version = match goto_version {
                Some(version) => version,
                None => state.renaming.fresh_unconstrained(&l1name),
            };
            let state_version = match state_version {
                Some(version) => version,
                None => state.renaming.fresh_unconstrained(&l1name),
            };

            let goto_value = self.phi_side_value(
                &goto_state.propagation,
                &parsed,
                goto_version,
                &typ,
            );
            let state_value = self.phi_side_value(
                &state.renaming.propagation,
                &parsed,
                state_version,
                &typ,
            );

            let rhs = simplify(Expr::ite(diff_guard.clone(), goto_value, state_value));
            let merged_version = state.renaming.write_version(&l1name);
            if self.config.constant_propagation && is_propagatable(&rhs) {
                state
                    .renaming
                    .record_propagation(&l1name, Some(rhs.clone()));
            } else {
                state.renaming.record_propagation(&l1name, None);
            }

            let lhs = Expr::ssa(parsed.clone().with_version(merged_version), typ);
            self.equation.assignment(
                Expr::true_expr(),
                state.source.clone(),
                lhs.clone(),
                lhs,
                rhs,
                AssignmentKind::Phi,
            );
        }
    }

    fn phi_side_value(
        &self,
        propagation: &indexmap::IndexMap<String, Expr>,
        parsed: &serval_ir::expr::SsaSymbol,
        version: u64,
        typ: &serval_ir::types::Type,
    ) -> Expr {
        if self.config.constant_propagation {
            if let Some(value) = propagation.get(&parsed.level1_name()) {
                return value.clone();
            }
        }
        Expr::ssa(parsed.clone().with_version(version), typ.clone())
    }
}
