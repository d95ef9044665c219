//! Refinement wrappers over the flattening layer.
//!
//! Both wrappers carry the refinement configuration (node bounds, per-array
//! and per-arithmetic flags) and solve by eager flattening, which is the
//! terminal fallback of a refinement loop once its bounds are exhausted.
//! The lazy under-approximation loop itself is not implemented here.

use serval_symex::Equation;

use crate::flatten::BvConverter;
use crate::procedure::{DecisionProcedure, DecisionResult, SolveError};
use crate::sat::SatBackend;

/// Default bound on string-refinement iterations.
pub const DEFAULT_REFINEMENT_BOUND: u32 = 10;

pub struct BvRefinement<B: SatBackend> {
    converter: BvConverter<B>,
    pub max_node_refinement: Option<u32>,
    pub refine_arrays: bool,
    pub refine_arithmetic: bool,
}

impl<B: SatBackend> BvRefinement<B> {
    pub fn new(converter: BvConverter<B>) -> Self {
        BvRefinement {
            converter,
            max_node_refinement: None,
            refine_arrays: false,
            refine_arithmetic: false,
        }
    }
}

impl<B: SatBackend> DecisionProcedure for BvRefinement<B> {
    fn convert(&mut self, equation: &Equation) -> Result<(), SolveError> {
        self.converter.convert(equation)
    }

    fn solve(&mut self) -> Result<DecisionResult, SolveError> {
        self.converter.solve()
    }

    fn set_time_limit_seconds(&mut self, seconds: u64) {
        self.converter.set_time_limit_seconds(seconds);
    }

    fn name(&self) -> &'static str {
        "bit-vector refinement"
    }
}

/// String refinement: bit-vector refinement plus a bounded iteration count
/// for the string axioms.
pub struct StringRefinement<B: SatBackend> {
    inner: BvRefinement<B>,
    pub refinement_bound: u32,
}

impl<B: SatBackend> StringRefinement<B> {
    pub fn new(inner: BvRefinement<B>) -> Self {
        StringRefinement {
            inner,
            refinement_bound: DEFAULT_REFINEMENT_BOUND,
        }
    }
}

impl<B: SatBackend> DecisionProcedure for StringRefinement<B> {
    fn convert(&mut self, equation: &Equation) -> Result<(), SolveError> {
        self.inner.convert(equation)
    }

    fn solve(&mut self) -> Result<DecisionResult, SolveError> {
        self.inner.solve()
    }

    fn set_time_limit_seconds(&mut self, seconds: u64) {
        self.inner.set_time_limit_seconds(seconds);
    }

    fn name(&self) -> &'static str {
        "string refinement"
    }
}
