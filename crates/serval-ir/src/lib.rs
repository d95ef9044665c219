//! Intermediate representation for the serval bounded model checker.
//!
//! A goto-program is a flat instruction list with explicit jumps, the form
//! the symbolic simulator consumes. This crate carries the expression and
//! type trees, SSA symbol annotations, symbol tables, the constant-folding
//! simplifier and a label-based builder used throughout the test suites.

pub mod builder;
pub mod expr;
pub mod program;
pub mod simplify;
pub mod symbol;
pub mod types;
