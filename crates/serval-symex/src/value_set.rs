//! Lightweight points-to tracking.
//!
//! A flow-sensitive map from level-1 pointer names to the objects they may
//! reference, updated at pointer assignments and consulted when a
//! dereference has to be resolved into concrete candidates. Merges take the
//! pointwise union. The companion `Dirty` analysis records which locals have
//! their address taken in a function body.

use indexmap::{IndexMap, IndexSet};
use serval_ir::expr::{Expr, ExprKind, WithDesignator};
use serval_ir::program::{GotoFunction, InstructionKind, OtherInstruction};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueSet {
    entries: IndexMap<String, Vec<Expr>>,
}

impl ValueSet {
    /// Record the candidates a pointer may reference after an assignment.
    pub fn assign(&mut self, pointer_l1: &str, rhs: &Expr) {
        let candidates = self.candidates_of(rhs);
        self.entries.insert(pointer_l1.to_string(), candidates);
    }

    pub fn remove(&mut self, pointer_l1: &str) {
        self.entries.shift_remove(pointer_l1);
    }

    /// Dereference candidates for a pointer-valued expression.
    pub fn candidates_of(&self, expr: &Expr) -> Vec<Expr> {
        match &expr.kind {
            ExprKind::AddressOf(object) => vec![(**object).clone()],
            ExprKind::Symbol(symbol) => self
                .entries
                .get(&symbol.level1_name())
                .cloned()
                .unwrap_or_default(),
            ExprKind::If {
                then_value,
                else_value,
                ..
            } => {
                let mut candidates = self.candidates_of(then_value);
                for candidate in self.candidates_of(else_value) {
                    if !candidates.contains(&candidate) {
                        candidates.push(candidate);
                    }
                }
                candidates
            }
            ExprKind::Typecast(inner) => self.candidates_of(inner),
            _ => Vec::new(),
        }
    }

    pub fn lookup(&self, pointer_l1: &str) -> &[Expr] {
        self.entries
            .get(pointer_l1)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Pointwise union, used at goto merges.
    pub fn merge(&mut self, other: &ValueSet) {
        for (name, candidates) in &other.entries {
            let entry = self.entries.entry(name.clone()).or_default();
            for candidate in candidates {
                if !entry.contains(candidate) {
                    entry.push(candidate.clone());
                }
            }
        }
    }
}

/// Identifiers whose address is taken somewhere in a function body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dirty {
    addressed: IndexSet<String>,
}

impl Dirty {
    pub fn from_function(function: &GotoFunction) -> Self {
        let mut dirty = Dirty::default();
        for instruction in &function.body {
            match &instruction.kind {
                InstructionKind::Goto { condition, .. } => dirty.scan(condition),
                InstructionKind::Assume(e) | InstructionKind::Assert(e) => dirty.scan(e),
                InstructionKind::Return(Some(e)) => dirty.scan(e),
                InstructionKind::Assign { lhs, rhs } => {
                    dirty.scan(lhs);
                    dirty.scan(rhs);
                }
                InstructionKind::FunctionCall { lhs, arguments, .. } => {
                    if let Some(lhs) = lhs {
                        dirty.scan(lhs);
                    }
                    for argument in arguments {
                        dirty.scan(argument);
                    }
                }
                InstructionKind::Other(other) => match other {
                    OtherInstruction::Printf { arguments, .. } => {
                        for argument in arguments {
                            dirty.scan(argument);
                        }
                    }
                    OtherInstruction::Input { target, .. } => dirty.scan(target),
                    OtherInstruction::Output { value, .. } => dirty.scan(value),
                    OtherInstruction::Allocate { lhs, size } => {
                        dirty.scan(lhs);
                        dirty.scan(size);
                    }
                    OtherInstruction::New { lhs } => dirty.scan(lhs),
                    OtherInstruction::Delete { pointer } => dirty.scan(pointer),
                },
                _ => {}
            }
        }
        dirty
    }

    pub fn is_dirty(&self, identifier: &str) -> bool {
        self.addressed.contains(identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.addressed.iter().map(String::as_str)
    }

    fn scan(&mut self, expr: &Expr) {
        if let ExprKind::AddressOf(object) = &expr.kind {
            if let Some(symbol) = object.as_symbol() {
                self.addressed.insert(symbol.identifier.clone());
            }
        }
        self.scan_children(expr);
    }

    fn scan_children(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Unary { operand, .. } => self.scan(operand),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.scan(lhs);
                self.scan(rhs);
            }
            ExprKind::If {
                cond,
                then_value,
                else_value,
            } => {
                self.scan(cond);
                self.scan(then_value);
                self.scan(else_value);
            }
            ExprKind::Index { array, index } => {
                self.scan(array);
                self.scan(index);
            }
            ExprKind::Member { compound, .. } => self.scan(compound),
            ExprKind::With {
                base,
                designator,
                value,
            } => {
                self.scan(base);
                if let WithDesignator::Index(i) | WithDesignator::Byte(i) = designator {
                    self.scan(i);
                }
                self.scan(value);
            }
            ExprKind::ByteExtract { base, offset } => {
                self.scan(base);
                self.scan(offset);
            }
            ExprKind::AddressOf(inner)
            | ExprKind::Dereference(inner)
            | ExprKind::Typecast(inner) => self.scan(inner),
            ExprKind::Quantifier { body, .. } => self.scan(body),
            ExprKind::Symbol(_)
            | ExprKind::IntConstant(_)
            | ExprKind::BoolConstant(_)
            | ExprKind::Nondet => {}
        }
    }
}
