//! The driver of the forward simulator.
//!
//! Owns the outer loop: seat the entry frame, step the dispatcher until the
//! call stack of the last thread empties or a path-exploration branch pauses
//! the run, round-robining over program threads at thread completion.

use serval_ir::expr::Expr;
use serval_ir::program::{FunctionSource, LoopId};
use serval_ir::simplify::simplify;
use serval_ir::symbol::{Namespace, SymbolTable};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SymexConfig;
use crate::equation::{Equation, SourcePoint};
use crate::path_storage::{ExplorationStrategy, PathStorage, SavedPath};
use crate::state::{Frame, State};
use crate::value_set::Dirty;

#[derive(Debug, Error)]
pub enum SymexError {
    #[error("the program has no entry point (`{0}` is not defined)")]
    MissingEntryPoint(String),
    #[error("function `{0}` has no end-of-function marker")]
    MalformedFunction(String),
    #[error("unsupported assignment target: {0}")]
    UnsupportedAssignmentTarget(String),
    #[error("SSA equation validation failed: {0}")]
    ValidationFailed(String),
}

/// What a finished (or paused) run hands back to the caller.
#[derive(Debug, Clone)]
pub struct SymexOutcome {
    /// Names minted during the run, to be joined with the program's table.
    pub new_symbol_table: SymbolTable,
    pub total_vccs: u64,
    pub remaining_vccs: u64,
    /// True when the run stopped at a branch under path exploration.
    pub paused: bool,
}

pub struct Executor<'a> {
    pub(crate) config: SymexConfig,
    pub(crate) outer_symbol_table: &'a SymbolTable,
    pub(crate) equation: &'a mut Equation,
    pub(crate) path_storage: &'a mut PathStorage,
    /// Raised when successor states were pushed to path storage; the caller
    /// picks one and resumes.
    pub should_pause_symex: bool,
    pub(crate) atomic_section_counter: u64,
    /// VCCs generated since the last branch point.
    pub path_segment_vccs: u64,
    cached_total_vccs: Option<u64>,
    cached_remaining_vccs: Option<u64>,
}

impl<'a> Executor<'a> {
    pub fn new(
        config: SymexConfig,
        outer_symbol_table: &'a SymbolTable,
        equation: &'a mut Equation,
        path_storage: &'a mut PathStorage,
    ) -> Self {
        Executor {
            config,
            outer_symbol_table,
            equation,
            path_storage,
            should_pause_symex: false,
            atomic_section_counter: 0,
            path_segment_vccs: 0,
            cached_total_vccs: None,
            cached_remaining_vccs: None,
        }
    }

    pub fn total_vccs(&self) -> u64 {
        self.cached_total_vccs
            .expect("symex must have stepped before total_vccs is read")
    }

    pub fn remaining_vccs(&self) -> u64 {
        self.cached_remaining_vccs
            .expect("symex must have stepped before remaining_vccs is read")
    }

    pub(crate) fn do_simplify(&self, expr: Expr) -> Expr {
        if self.config.simplify {
            simplify(expr)
        } else {
            expr
        }
    }

    /// Fully rename an expression in the state's current scope.
    pub(crate) fn rename(&self, state: &mut State, expr: Expr) -> Expr {
        let thread = state.source.thread as u64;
        let ns = Namespace::joined(self.outer_symbol_table, &state.symbol_table);
        state
            .renaming
            .rename(expr, &ns, thread, self.config.constant_propagation)
    }

    pub(crate) fn rename_l1(&self, state: &mut State, expr: Expr) -> Expr {
        let thread = state.source.thread as u64;
        let ns = Namespace::joined(self.outer_symbol_table, &state.symbol_table);
        state.renaming.rename_level1(expr, &ns, thread)
    }

    /// Execute the whole program from its entry point on a fresh state.
    pub fn run_from_entry_point(
        &mut self,
        fns: &dyn FunctionSource,
        entry: &str,
    ) -> Result<SymexOutcome, SymexError> {
        let mut state = State::new();
        state.run_validation_checks = self.config.run_validation_checks;
        self.initialize_entry_point(&mut state, fns, entry)?;
        self.run_with_state(&mut state, fns)?;
        Ok(self.outcome(&state))
    }

    /// Continue a run from a state saved at a branch point. The saved
    /// state's equation died with its path; this executor's own equation is
    /// seeded with the saved prefix and takes over.
    pub fn resume_from_saved_state(
        &mut self,
        saved: &SavedPath,
        fns: &dyn FunctionSource,
    ) -> Result<SymexOutcome, SymexError> {
        *self.equation = saved.equation.clone();
        let mut state = saved.state.clone();
        self.should_pause_symex = false;
        self.path_segment_vccs = 0;
        self.run_with_state(&mut state, fns)?;
        Ok(self.outcome(&state))
    }

    /// Step until the call stack of the last thread empties or the run
    /// pauses.
    pub fn run_with_state(
        &mut self,
        state: &mut State,
        fns: &dyn FunctionSource,
    ) -> Result<(), SymexError> {
        while !state.call_stack().is_empty() {
            state.has_saved_jump_target = false;
            state.has_saved_next_instruction = false;
            self.threaded_step(state, fns)?;
            if self.should_pause_symex {
                return Ok(());
            }
        }
        if self.config.run_validation_checks {
            self.equation
                .validate()
                .map_err(SymexError::ValidationFailed)?;
        }
        Ok(())
    }

    fn initialize_entry_point(
        &mut self,
        state: &mut State,
        fns: &dyn FunctionSource,
        entry: &str,
    ) -> Result<(), SymexError> {
        let function = fns
            .get_function(entry)
            .ok_or_else(|| SymexError::MissingEntryPoint(entry.to_string()))?;
        let end = function
            .end_of_function()
            .ok_or_else(|| SymexError::MalformedFunction(entry.to_string()))?;
        info!(entry, "starting symbolic execution");

        state.source = SourcePoint::new(0, entry, 0);
        let mut frame = Frame::new(entry, end);
        frame.hidden_function = function.hidden;
        state.threads[0].function = entry.to_string();
        state.threads[0].call_stack.push(frame);
        state
            .dirty
            .insert(entry.to_string(), Dirty::from_function(function));
        transition_to(state, fns, 0, false);
        Ok(())
    }

    /// One dispatcher step plus the thread round-robin at thread completion.
    fn threaded_step(
        &mut self,
        state: &mut State,
        fns: &dyn FunctionSource,
    ) -> Result<(), SymexError> {
        self.step(state, fns)?;
        self.cached_total_vccs = Some(state.total_vccs);
        self.cached_remaining_vccs = Some(state.remaining_vccs);
        if self.should_pause_symex {
            return Ok(());
        }

        if state.call_stack().is_empty() && state.source.thread + 1 < state.threads.len() {
            let next = state.source.thread + 1;
            debug!(thread = next, "switching to thread");
            switch_to_thread(state, next);
            let pc = state.source.pc;
            transition_to(state, fns, pc, false);
        }
        Ok(())
    }

    fn outcome(&self, state: &State) -> SymexOutcome {
        SymexOutcome {
            new_symbol_table: state.symbol_table.clone(),
            total_vccs: state.total_vccs,
            remaining_vccs: state.remaining_vccs,
            paused: self.should_pause_symex,
        }
    }
}

/// Switch the active thread, saving and restoring pc, guard and atomic id.
/// Switching inside an atomic section is forbidden.
fn switch_to_thread(state: &mut State, thread: usize) {
    assert!(thread < state.threads.len());
    assert_eq!(
        state.atomic_section_id, 0,
        "thread switch inside an atomic section"
    );
    let current = state.source.thread;
    state.threads[current].function = state.source.function.clone();
    state.threads[current].pc = state.source.pc;
    state.threads[current].atomic_section_id = state.atomic_section_id;
    state.threads[current].guard = state.guard.clone();

    state.source.thread = thread;
    state.source.function = state.threads[thread].function.clone();
    state.source.pc = state.threads[thread].pc;
    state.guard = state.threads[thread].guard.clone();
    state.atomic_section_id = state.threads[thread].atomic_section_id;
}

/// Move the program counter, resetting the iteration counter of any loop
/// newly entered by this transition.
pub(crate) fn transition_to(
    state: &mut State,
    fns: &dyn FunctionSource,
    to: usize,
    is_backwards_goto: bool,
) {
    if !state.call_stack().is_empty() {
        let function_id = state.source.function.clone();
        if let Some(function) = fns.get_function(&function_id) {
            if let Some(instruction) = function.body.get(to) {
                let resets: Vec<usize> = instruction
                    .incoming_edges
                    .iter()
                    .copied()
                    .filter(|&edge| {
                        let incoming = &function.body[edge];
                        incoming.is_goto()
                            && incoming.is_backwards_goto(edge)
                            && (!is_backwards_goto || state.source.pc > edge)
                    })
                    .collect();
                let frame = state.top_frame_mut();
                for edge in resets {
                    frame.loop_iterations.insert(
                        LoopId {
                            function: function_id.clone(),
                            back_edge: edge,
                        },
                        0,
                    );
                }
            }
        }
    }
    state.source.pc = to;
}

pub(crate) fn transition_next(state: &mut State, fns: &dyn FunctionSource) {
    let next = state.source.pc + 1;
    transition_to(state, fns, next, false);
}

/// Execute every feasible path of a program, collecting one equation per
/// completed path. Without path exploration this is a single run; with it,
/// suspended successors are drained from path storage until none remain.
pub fn run_all_paths(
    config: &SymexConfig,
    outer_symbol_table: &SymbolTable,
    fns: &dyn FunctionSource,
    entry: &str,
) -> Result<Vec<PathResult>, SymexError> {
    let mut storage = PathStorage::new(ExplorationStrategy::Lifo);
    let mut results = Vec::new();

    let mut equation = Equation::new();
    let outcome = {
        let mut executor = Executor::new(
            config.clone(),
            outer_symbol_table,
            &mut equation,
            &mut storage,
        );
        executor.run_from_entry_point(fns, entry)?
    };
    if outcome.paused {
        debug!("initial run paused at a branch point");
    } else {
        results.push(PathResult { equation, outcome });
    }

    while let Some(saved) = storage.pop() {
        let mut equation = Equation::new();
        let outcome = {
            let mut executor = Executor::new(
                config.clone(),
                outer_symbol_table,
                &mut equation,
                &mut storage,
            );
            executor.resume_from_saved_state(&saved, fns)?
        };
        if !outcome.paused {
            results.push(PathResult { equation, outcome });
        }
    }
    Ok(results)
}

/// One completed path: its equation and counters.
#[derive(Debug)]
pub struct PathResult {
    pub equation: Equation,
    pub outcome: SymexOutcome,
}
