//! Exception-flow lowering.
//!
//! Each frame carries a stack of handler groups. A `catch` with handlers
//! pushes a group; a bare `catch` pops one. A `throw` unwinds to the
//! innermost matching handler and jumps to it; with no matching handler the
//! path becomes infeasible.

use serval_ir::expr::Expr;
use serval_ir::program::FunctionSource;
use tracing::debug;

use crate::executor::{transition_to, Executor};
use crate::state::State;

impl Executor<'_> {
    pub(crate) fn symex_catch(&mut self, state: &mut State, handlers: Vec<(String, usize)>) {
        if state.guard.is_false() {
            return;
        }
        let frame = state.top_frame_mut();
        if handlers.is_empty() {
            let popped = frame.handlers.pop();
            debug_assert!(popped.is_some(), "catch pop without a pushed handler");
        } else {
            frame.handlers.push(handlers);
        }
    }

    /// Returns true when control was transferred to a handler.
    pub(crate) fn symex_throw(
        &mut self,
        state: &mut State,
        fns: &dyn FunctionSource,
        tag: &str,
    ) -> bool {
        if state.guard.is_false() {
            return false;
        }

        // Innermost matching handler, scanning frames from the top. An empty
        // handler tag catches everything.
        let mut found: Option<(usize, usize)> = None;
        'search: for (frame_index, frame) in state.call_stack().iter().enumerate().rev() {
            for group in frame.handlers.iter().rev() {
                for (handler_tag, target) in group {
                    if handler_tag.is_empty() || handler_tag == tag {
                        found = Some((frame_index, *target));
                        break 'search;
                    }
                }
            }
        }

        let Some((frame_index, target)) = found else {
            debug!(tag, "uncaught exception; path becomes infeasible");
            state.guard.add(Expr::false_expr());
            return false;
        };

        while state.call_stack().len() > frame_index + 1 {
            self.pop_frame(state);
        }
        state.source.function = state.top_frame().function.clone();
        transition_to(state, fns, target, false);
        true
    }
}
