//! Thread creation and atomic sections.

use serval_ir::symbol::Namespace;

use crate::executor::Executor;
use crate::state::{Frame, State, Thread};

impl Executor<'_> {
    /// Append a new thread whose program counter points at the code address
    /// embedded in the instruction. The new thread starts with a copy of the
    /// parent guard and outside any atomic section.
    pub(crate) fn symex_start_thread(&mut self, state: &mut State, target: usize) {
        if state.guard.is_false() {
            return;
        }

        // Address-taken locals of the spawning function escape to the new
        // thread; stale propagated values must not survive the spawn.
        let dirty_l1_names: Vec<String> = match state.dirty.get(&state.source.function) {
            Some(dirty) => {
                let ns = Namespace::joined(self.outer_symbol_table, &state.symbol_table);
                dirty
                    .iter()
                    .map(|identifier| state.renaming.l1_key(identifier, &ns))
                    .collect()
            }
            None => Vec::new(),
        };
        for l1name in dirty_l1_names {
            state.renaming.havoc(&l1name);
        }

        let new_thread = state.threads.len();
        let current = state.top_frame();
        let mut frame = Frame::new(current.function.clone(), current.end_of_function);
        frame.hidden_function = current.hidden_function;

        state.threads.push(Thread {
            function: state.source.function.clone(),
            pc: target,
            guard: state.guard.clone(),
            atomic_section_id: 0,
            call_stack: vec![frame],
        });
        self.equation
            .spawn(state.guard.as_expr(), state.source.clone(), new_thread);
    }

    pub(crate) fn symex_atomic_begin(&mut self, state: &mut State) {
        if state.guard.is_false() {
            return;
        }
        assert_eq!(state.atomic_section_id, 0, "nested atomic section");
        self.atomic_section_counter += 1;
        state.atomic_section_id = self.atomic_section_counter;
        self.equation.atomic_begin(
            state.guard.as_expr(),
            state.source.clone(),
            state.atomic_section_id,
        );
    }

    /// Closes the active atomic section. The reset happens even when the
    /// guard is false; an already-closed section is tolerated only on an
    /// infeasible path (an assume(false) inside the section closes it
    /// early).
    pub(crate) fn symex_atomic_end(&mut self, state: &mut State) {
        if state.atomic_section_id == 0 {
            assert!(
                state.guard.is_false(),
                "atomic_end outside an atomic section"
            );
            return;
        }
        let section = state.atomic_section_id;
        state.atomic_section_id = 0;
        if !state.guard.is_false() {
            self.equation
                .atomic_end(state.guard.as_expr(), state.source.clone(), section);
        }
    }
}
