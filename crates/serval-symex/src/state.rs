//! Per-path execution state.
//!
//! One `State` is the full snapshot of a simulated path: per-thread call
//! stacks, the renamer tables, the guard, value sets and the queue of saved
//! branch successors waiting to merge. States are cloned wholesale when a
//! path is suspended, so everything here is owned.

use indexmap::IndexMap;
use serval_ir::expr::Expr;
use serval_ir::program::{FunctionId, LoopId};
use serval_ir::symbol::SymbolTable;

use crate::equation::SourcePoint;
use crate::guard::Guard;
use crate::renaming::RenamingTables;
use crate::value_set::{Dirty, ValueSet};

/// One active function call on a thread.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub function: FunctionId,
    /// Index of the function's end marker.
    pub end_of_function: usize,
    /// Where the call was made; `None` for a thread's root frame.
    pub calling_location: Option<SourcePoint>,
    /// Caller-provided assignment target for the return value, already
    /// cleaned and level-1 renamed in caller scope.
    pub return_lhs: Option<Expr>,
    pub hidden_function: bool,
    /// Back-edge traversal counts, keyed by loop.
    pub loop_iterations: IndexMap<LoopId, u64>,
    /// Level-1 names of this frame's parameters and locals, torn down on
    /// return.
    pub local_objects: Vec<String>,
    /// Level-1 bindings shadowed at call entry, restored on return.
    pub saved_level1: Vec<(String, Option<(u64, u64)>)>,
    /// Exception handler stack; each entry is one `catch` instruction's
    /// handler list.
    pub handlers: Vec<Vec<(String, usize)>>,
}

impl Frame {
    pub fn new(function: impl Into<FunctionId>, end_of_function: usize) -> Self {
        Frame {
            function: function.into(),
            end_of_function,
            calling_location: None,
            return_lhs: None,
            hidden_function: false,
            loop_iterations: IndexMap::new(),
            local_objects: Vec::new(),
            saved_level1: Vec::new(),
            handlers: Vec::new(),
        }
    }
}

/// A virtual thread of the simulated program.
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub function: FunctionId,
    pub pc: usize,
    pub guard: Guard,
    pub atomic_section_id: u64,
    pub call_stack: Vec<Frame>,
}

/// Suspended branch successor, waiting at its merge point.
#[derive(Debug, Clone, PartialEq)]
pub struct GotoState {
    pub guard: Guard,
    pub l2_current: IndexMap<String, u64>,
    pub propagation: IndexMap<String, Expr>,
    pub value_set: ValueSet,
    pub atomic_section_id: u64,
    /// Stack depth at the branch; merges require an identical call stack.
    pub frame_depth: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct State {
    /// Names minted during execution (nondet choices, dynamic objects).
    pub symbol_table: SymbolTable,
    pub source: SourcePoint,
    pub guard: Guard,
    pub threads: Vec<Thread>,
    pub renaming: RenamingTables,
    pub value_set: ValueSet,
    /// Per-function address-taken caches.
    pub dirty: IndexMap<FunctionId, Dirty>,
    /// Saved branch successors keyed by their merge point.
    pub goto_states: IndexMap<(FunctionId, usize), Vec<GotoState>>,
    pub atomic_section_id: u64,
    pub depth: u64,
    pub total_vccs: u64,
    pub remaining_vccs: u64,
    pub nondet_counter: u64,
    pub dynamic_counter: u64,
    pub has_saved_jump_target: bool,
    pub has_saved_next_instruction: bool,
    pub run_validation_checks: bool,
}

impl State {
    /// A fresh state with a single thread and an empty call stack; the
    /// driver seats the entry frame.
    pub fn new() -> Self {
        State {
            symbol_table: SymbolTable::new(),
            source: SourcePoint::new(0, String::new(), 0),
            guard: Guard::true_guard(),
            threads: vec![Thread {
                function: String::new(),
                pc: 0,
                guard: Guard::true_guard(),
                atomic_section_id: 0,
                call_stack: Vec::new(),
            }],
            renaming: RenamingTables::default(),
            value_set: ValueSet::default(),
            dirty: IndexMap::new(),
            goto_states: IndexMap::new(),
            atomic_section_id: 0,
            depth: 0,
            total_vccs: 0,
            remaining_vccs: 0,
            nondet_counter: 0,
            dynamic_counter: 0,
            has_saved_jump_target: false,
            has_saved_next_instruction: false,
            run_validation_checks: false,
        }
    }

    pub fn call_stack(&self) -> &[Frame] {
        &self.threads[self.source.thread].call_stack
    }

    pub fn call_stack_mut(&mut self) -> &mut Vec<Frame> {
        &mut self.threads[self.source.thread].call_stack
    }

    /// Top frame of the active thread. The call stack is non-empty for the
    /// whole lifetime of a thread; an empty stack here is a driver bug.
    pub fn top_frame(&self) -> &Frame {
        self.call_stack().last().expect("call stack is empty")
    }

    pub fn top_frame_mut(&mut self) -> &mut Frame {
        self.call_stack_mut()
            .last_mut()
            .expect("call stack is empty")
    }

    /// Snapshot the path-dependent parts of the state for a saved branch.
    pub fn snapshot_goto_state(&self, guard: Guard) -> GotoState {
        GotoState {
            guard,
            l2_current: self.renaming.l2_current.clone(),
            propagation: self.renaming.propagation.clone(),
            value_set: self.value_set.clone(),
            atomic_section_id: self.atomic_section_id,
            frame_depth: self.call_stack().len(),
        }
    }

    /// Replace the path-dependent parts with a saved successor's. Used when
    /// the current path is infeasible and the saved one takes over.
    pub fn adopt_goto_state(&mut self, goto_state: GotoState) {
        self.guard = goto_state.guard;
        self.renaming.l2_current = goto_state.l2_current;
        self.renaming.propagation = goto_state.propagation;
        self.value_set = goto_state.value_set;
        self.atomic_section_id = goto_state.atomic_section_id;
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_one_thread_and_no_frames() {
        let state = State::new();
        assert_eq!(state.threads.len(), 1);
        assert!(state.call_stack().is_empty());
        assert!(state.guard.is_true());
        assert_eq!(state.atomic_section_id, 0);
    }

    #[test]
    fn snapshot_and_adopt_round_trip() {
        let mut state = State::new();
        state.call_stack_mut().push(Frame::new("main", 10));
        let mut taken = Guard::true_guard();
        taken.add(serval_ir::expr::Expr::symbol(
            "c",
            serval_ir::types::Type::Bool,
        ));
        let snapshot = state.snapshot_goto_state(taken.clone());
        assert_eq!(snapshot.frame_depth, 1);

        state.guard.add(serval_ir::expr::Expr::false_expr());
        state.adopt_goto_state(snapshot);
        assert_eq!(state.guard, taken);
    }
}
