//! Function calls, locality and frame teardown.
//!
//! Call entry assigns fresh level-1 instances to every parameter and local
//! of the callee before the parameters are bound, which is what makes
//! recursion sound: two activations of the same function never share SSA
//! names. Arguments are renamed in caller scope before locality flips the
//! bindings.

use serval_ir::expr::{Expr, SsaSymbol};
use serval_ir::program::{FunctionId, FunctionSource};
use serval_ir::symbol::{Namespace, Symbol};
use tracing::debug;

use crate::executor::{transition_next, transition_to, Executor, SymexError};
use crate::state::{Frame, State};
use crate::value_set::Dirty;

impl Executor<'_> {
    pub(crate) fn symex_function_call(
        &mut self,
        state: &mut State,
        fns: &dyn FunctionSource,
        lhs: Option<Expr>,
        function: FunctionId,
        arguments: Vec<Expr>,
    ) -> Result<(), SymexError> {
        let lhs = match lhs {
            Some(lhs) => Some(self.clean_expr(state, lhs, true)?),
            None => None,
        };
        let mut cleaned_arguments = Vec::with_capacity(arguments.len());
        for argument in arguments {
            cleaned_arguments.push(self.clean_expr(state, argument, false)?);
        }

        let has_body = fns
            .get_function(&function)
            .is_some_and(|callee| callee.has_body());
        if !has_body {
            self.no_body(state, &function, lhs)?;
            transition_next(state, fns);
            return Ok(());
        }
        let callee = fns.get_function(&function).expect("checked above");
        let end = callee
            .end_of_function()
            .ok_or_else(|| SymexError::MalformedFunction(function.clone()))?;

        // Recursion bound, counted over active frames of this function.
        let active = state
            .call_stack()
            .iter()
            .filter(|frame| frame.function == function)
            .count() as u64;
        if active > 0 {
            if let Some(bound) = self.config.recursion_unwind_bound(&function) {
                if active >= bound {
                    debug!(%function, active, "recursion unwind bound reached");
                    if self.config.unwinding_assertions {
                        self.vcc(
                            state,
                            Expr::false_expr(),
                            &format!("recursion unwinding assertion {function}"),
                        );
                    }
                    if self.config.partial_loops {
                        self.no_body(state, &function, lhs)?;
                    } else {
                        state.guard.add(Expr::false_expr());
                    }
                    transition_next(state, fns);
                    return Ok(());
                }
            }
        }

        // Arguments are values of the caller; rename them before locality.
        let renamed_arguments: Vec<Expr> = cleaned_arguments
            .into_iter()
            .map(|argument| {
                let renamed = self.rename(state, argument);
                self.do_simplify(renamed)
            })
            .collect();
        let return_lhs = lhs.map(|lhs| self.rename_l1(state, lhs));

        let mut frame = Frame::new(function.clone(), end);
        frame.calling_location = Some(state.source.clone());
        frame.return_lhs = return_lhs;
        frame.hidden_function = callee.hidden || state.top_frame().hidden_function;

        // Locality: fresh level-1 instances for parameters and locals.
        let thread = state.source.thread as u64;
        let parameters = callee.parameters.clone();
        let locals = callee.local_declarations();
        for (name, typ) in parameters.iter().chain(locals.iter()) {
            if self.outer_symbol_table.lookup(name).is_none()
                && !state.symbol_table.contains(name)
            {
                state.symbol_table.insert(Symbol::new(name, typ.clone()));
            }
            let (instance, previous) = state.renaming.enter_scope_binding(name, thread);
            let l1 = SsaSymbol::new(name.clone()).with_instance(instance, thread);
            frame.saved_level1.push((name.clone(), previous));
            frame.local_objects.push(l1.level1_name());
        }
        state.call_stack_mut().push(frame);

        if !state.dirty.contains_key(&function) {
            state
                .dirty
                .insert(function.clone(), Dirty::from_function(callee));
        }

        for (index, (name, typ)) in parameters.iter().enumerate() {
            let parameter = Expr::symbol(name.clone(), typ.clone());
            match renamed_arguments.get(index) {
                Some(argument) => self.symex_assign(state, parameter, argument.clone())?,
                None => {
                    // Missing argument: the parameter is unconstrained.
                    let ns = Namespace::joined(self.outer_symbol_table, &state.symbol_table);
                    let ssa = state
                        .renaming
                        .assign_symbol(&SsaSymbol::new(name.clone()), &ns, thread);
                    state.renaming.record_propagation(&ssa.level1_name(), None);
                }
            }
        }

        state.source.function = function;
        transition_to(state, fns, 0, false);
        Ok(())
    }

    /// A call without a body binds its target non-deterministically.
    pub(crate) fn no_body(
        &mut self,
        state: &mut State,
        function: &str,
        lhs: Option<Expr>,
    ) -> Result<(), SymexError> {
        debug!(function, "call to function without a body");
        if let Some(lhs) = lhs {
            let rhs = Expr::nondet(lhs.typ.clone());
            let rhs = self.clean_expr(state, rhs, false)?;
            self.symex_assign(state, lhs, rhs)?;
        }
        Ok(())
    }

    /// Tear one frame down: frame locals leave the renamer, shadowed
    /// level-1 bindings come back.
    pub(crate) fn pop_frame(&mut self, state: &mut State) -> Frame {
        let frame = state
            .call_stack_mut()
            .pop()
            .expect("pop_frame with an empty call stack");
        for l1name in &frame.local_objects {
            state.renaming.drop_local(l1name);
            state.value_set.remove(l1name);
        }
        for (identifier, previous) in frame.saved_level1.iter().rev() {
            state.renaming.restore_binding(identifier, *previous);
        }
        frame
    }

    /// End of function: runs even under a false guard so the frame is
    /// always torn down.
    pub(crate) fn symex_end_of_function(&mut self, state: &mut State, fns: &dyn FunctionSource) {
        let frame = self.pop_frame(state);
        if let Some(calling_location) = frame.calling_location {
            state.source = calling_location;
            transition_next(state, fns);
        }
        // A root frame leaves the stack empty; the driver takes over.
    }
}
