//! Bit-vector flattening onto a propositional back end.
//!
//! Every value is a flat vector of literals: booleans one bit, bit-vectors
//! their width, arrays and structs the concatenation of their parts.
//! Boolean structure becomes Tseitin-style gate clauses, arithmetic becomes
//! ripple-carry adders and shift-add multiplication, array access becomes
//! mux chains over the elements. SSA assignments are asserted as bitwise
//! equalities; the disjunction of the negated assertions is the query.

use indexmap::IndexMap;
use serval_ir::expr::{BinaryOp, Expr, ExprKind, UnaryOp, WithDesignator};
use serval_ir::types::Type;
use serval_symex::{Equation, StepKind};

use crate::config::ArraysUf;
use crate::procedure::{DecisionProcedure, DecisionResult, SolveError};
use crate::sat::{Literal, SatBackend, SatVerdict};

type Bv = Vec<Literal>;

pub struct BvConverter<B: SatBackend> {
    sat: B,
    symbols: IndexMap<String, Bv>,
    constant_true: Option<Literal>,
    violations: Vec<Literal>,
    converted_assertions: usize,
    #[allow(dead_code)]
    arrays_uf: ArraysUf,
    /// Advisory only; the in-tree DPLL core has no deadline support.
    time_limit: Option<u64>,
}

impl<B: SatBackend> BvConverter<B> {
    pub fn new(sat: B, arrays_uf: ArraysUf) -> Self {
        BvConverter {
            sat,
            symbols: IndexMap::new(),
            constant_true: None,
            violations: Vec::new(),
            converted_assertions: 0,
            arrays_uf,
            time_limit: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.sat
    }

    pub fn time_limit(&self) -> Option<u64> {
        self.time_limit
    }

    fn fresh(&mut self) -> Literal {
        Literal::positive(self.sat.new_variable())
    }

    fn lit_true(&mut self) -> Literal {
        if let Some(lit) = self.constant_true {
            return lit;
        }
        let lit = self.fresh();
        self.sat.add_clause(&[lit]);
        self.constant_true = Some(lit);
        lit
    }

    fn lit_false(&mut self) -> Literal {
        self.lit_true().negated()
    }

    fn constant(&mut self, value: bool) -> Literal {
        if value {
            self.lit_true()
        } else {
            self.lit_false()
        }
    }

    // Gate clauses.

    fn gate_and(&mut self, a: Literal, b: Literal) -> Literal {
        if a == b {
            return a;
        }
        if a == b.negated() {
            return self.lit_false();
        }
        let out = self.fresh();
        self.sat.add_clause(&[out.negated(), a]);
        self.sat.add_clause(&[out.negated(), b]);
        self.sat.add_clause(&[a.negated(), b.negated(), out]);
        out
    }

    fn gate_or(&mut self, a: Literal, b: Literal) -> Literal {
        if a == b {
            return a;
        }
        if a == b.negated() {
            return self.lit_true();
        }
        let out = self.fresh();
        self.sat.add_clause(&[a.negated(), out]);
        self.sat.add_clause(&[b.negated(), out]);
        self.sat.add_clause(&[out.negated(), a, b]);
        out
    }

    fn gate_xor(&mut self, a: Literal, b: Literal) -> Literal {
        if a == b {
            return self.lit_false();
        }
        if a == b.negated() {
            return self.lit_true();
        }
        let out = self.fresh();
        self.sat.add_clause(&[a.negated(), b.negated(), out.negated()]);
        self.sat.add_clause(&[a, b, out.negated()]);
        self.sat.add_clause(&[a, b.negated(), out]);
        self.sat.add_clause(&[a.negated(), b, out]);
        out
    }

    fn gate_iff(&mut self, a: Literal, b: Literal) -> Literal {
        self.gate_xor(a, b).negated()
    }

    fn gate_mux(&mut self, cond: Literal, then_lit: Literal, else_lit: Literal) -> Literal {
        if then_lit == else_lit {
            return then_lit;
        }
        let out = self.fresh();
        self.sat.add_clause(&[cond.negated(), then_lit.negated(), out]);
        self.sat.add_clause(&[cond.negated(), then_lit, out.negated()]);
        self.sat.add_clause(&[cond, else_lit.negated(), out]);
        self.sat.add_clause(&[cond, else_lit, out.negated()]);
        out
    }

    fn and_reduce(&mut self, lits: &[Literal]) -> Literal {
        match lits.split_first() {
            None => self.lit_true(),
            Some((&first, rest)) => {
                let mut acc = first;
                for &lit in rest {
                    acc = self.gate_and(acc, lit);
                }
                acc
            }
        }
    }

    fn or_reduce(&mut self, lits: &[Literal]) -> Literal {
        match lits.split_first() {
            None => self.lit_false(),
            Some((&first, rest)) => {
                let mut acc = first;
                for &lit in rest {
                    acc = self.gate_or(acc, lit);
                }
                acc
            }
        }
    }

    // Word-level building blocks.

    fn adder(&mut self, a: &Bv, b: &Bv, mut carry: Literal) -> (Bv, Literal) {
        debug_assert_eq!(a.len(), b.len());
        let mut sum = Vec::with_capacity(a.len());
        for (&x, &y) in a.iter().zip(b.iter()) {
            let xy = self.gate_xor(x, y);
            sum.push(self.gate_xor(xy, carry));
            let and_xy = self.gate_and(x, y);
            let and_c = self.gate_and(carry, xy);
            carry = self.gate_or(and_xy, and_c);
        }
        (sum, carry)
    }

    fn add_bv(&mut self, a: &Bv, b: &Bv) -> Bv {
        let zero = self.lit_false();
        self.adder(a, b, zero).0
    }

    fn sub_bv(&mut self, a: &Bv, b: &Bv) -> Bv {
        let not_b: Bv = b.iter().map(|lit| lit.negated()).collect();
        let one = self.lit_true();
        self.adder(a, &not_b, one).0
    }

    fn neg_bv(&mut self, a: &Bv) -> Bv {
        let zero_bits: Bv = a.iter().map(|_| self.lit_false()).collect();
        self.sub_bv(&zero_bits, a)
    }

    fn mul_bv(&mut self, a: &Bv, b: &Bv) -> Bv {
        let width = a.len();
        let mut acc: Bv = (0..width).map(|_| self.lit_false()).collect();
        for (shift, &b_bit) in b.iter().enumerate() {
            let mut addend = Vec::with_capacity(width);
            for position in 0..width {
                if position < shift {
                    addend.push(self.lit_false());
                } else {
                    addend.push(self.gate_and(a[position - shift], b_bit));
                }
            }
            acc = self.add_bv(&acc, &addend);
        }
        acc
    }

    fn eq_bv(&mut self, a: &Bv, b: &Bv) -> Result<Literal, SolveError> {
        if a.len() != b.len() {
            return Err(SolveError::Unsupported(format!(
                "equality over mismatched widths {} and {}",
                a.len(),
                b.len()
            )));
        }
        let bits: Vec<Literal> = a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| self.gate_iff(x, y))
            .collect();
        Ok(self.and_reduce(&bits))
    }

    /// Unsigned a < b: no carry out of a + ~b + 1.
    fn ult(&mut self, a: &Bv, b: &Bv) -> Literal {
        let not_b: Bv = b.iter().map(|lit| lit.negated()).collect();
        let one = self.lit_true();
        let (_, carry) = self.adder(a, &not_b, one);
        carry.negated()
    }

    fn slt(&mut self, a: &Bv, b: &Bv) -> Literal {
        let sign_a = *a.last().expect("non-empty vector");
        let sign_b = *b.last().expect("non-empty vector");
        let signs_differ = self.gate_xor(sign_a, sign_b);
        let unsigned_lt = self.ult(a, b);
        self.gate_mux(signs_differ, sign_a, unsigned_lt)
    }

    fn less_than(&mut self, a: &Bv, b: &Bv, signed: bool) -> Literal {
        if signed {
            self.slt(a, b)
        } else {
            self.ult(a, b)
        }
    }

    fn symbol_bv(&mut self, name: &str, width: usize) -> Bv {
        if let Some(bv) = self.symbols.get(name) {
            return bv.clone();
        }
        let bv: Bv = (0..width).map(|_| self.fresh()).collect();
        self.symbols.insert(name.to_string(), bv.clone());
        bv
    }

    fn constant_bv(&mut self, value: i128, width: usize) -> Bv {
        (0..width)
            .map(|bit| {
                let set = if bit < 128 {
                    (value >> bit) & 1 == 1
                } else {
                    value < 0
                };
                self.constant(set)
            })
            .collect()
    }

    fn mux_bv(&mut self, cond: Literal, then_bv: &Bv, else_bv: &Bv) -> Bv {
        then_bv
            .iter()
            .zip(else_bv.iter())
            .map(|(&t, &e)| self.gate_mux(cond, t, e))
            .collect()
    }

    pub fn convert_bool(&mut self, expr: &Expr) -> Result<Literal, SolveError> {
        let bv = self.convert_expr(expr)?;
        if bv.len() == 1 {
            Ok(bv[0])
        } else {
            Err(SolveError::Unsupported(format!(
                "expected a boolean, got width {}",
                bv.len()
            )))
        }
    }

    pub fn convert_expr(&mut self, expr: &Expr) -> Result<Bv, SolveError> {
        let width = expr.typ.flattened_width() as usize;
        match &expr.kind {
            ExprKind::BoolConstant(b) => Ok(vec![self.constant(*b)]),

            ExprKind::IntConstant(value) => Ok(self.constant_bv(*value, width)),

            ExprKind::Symbol(symbol) => Ok(self.symbol_bv(&symbol.full_name(), width)),

            ExprKind::Unary { op, operand } => {
                let operand_bv = self.convert_expr(operand)?;
                match op {
                    UnaryOp::Not => Ok(vec![operand_bv[0].negated()]),
                    UnaryOp::BitNot => Ok(operand_bv.iter().map(|lit| lit.negated()).collect()),
                    UnaryOp::Neg => Ok(self.neg_bv(&operand_bv)),
                }
            }

            ExprKind::Binary { op, lhs, rhs } => self.convert_binary(*op, lhs, rhs),

            ExprKind::If {
                cond,
                then_value,
                else_value,
            } => {
                let cond = self.convert_bool(cond)?;
                let then_bv = self.convert_expr(then_value)?;
                let else_bv = self.convert_expr(else_value)?;
                if then_bv.len() != else_bv.len() {
                    return Err(SolveError::Unsupported(
                        "conditional arms of different widths".to_string(),
                    ));
                }
                Ok(self.mux_bv(cond, &then_bv, &else_bv))
            }

            ExprKind::Index { array, index } => {
                let Type::Array { element, size } = &array.typ else {
                    return Err(SolveError::Unsupported(format!(
                        "index into non-array type {}",
                        array.typ
                    )));
                };
                let element_width = element.flattened_width() as usize;
                let array_bv = self.convert_expr(array)?;
                let slice = |i: usize| array_bv[i * element_width..(i + 1) * element_width].to_vec();
                if let Some(index) = index.as_int_constant() {
                    if index < 0 || index as u64 >= *size {
                        return Err(SolveError::Unsupported(format!(
                            "constant index {index} out of bounds for size {size}"
                        )));
                    }
                    return Ok(slice(index as usize));
                }
                let index_width = index.typ.flattened_width() as usize;
                let index_bv = self.convert_expr(index)?;
                let mut result = slice(0);
                for i in 1..*size as usize {
                    let i_bv = self.constant_bv(i as i128, index_width);
                    let hit = self.eq_bv(&index_bv, &i_bv)?;
                    let element_bv = slice(i);
                    result = self.mux_bv(hit, &element_bv, &result);
                }
                Ok(result)
            }

            ExprKind::Member { compound, field } => {
                let (offset, field_width) =
                    compound.typ.field_range(field).ok_or_else(|| {
                        SolveError::Unsupported(format!("unknown field `{field}`"))
                    })?;
                let compound_bv = self.convert_expr(compound)?;
                Ok(compound_bv[offset as usize..(offset + field_width) as usize].to_vec())
            }

            ExprKind::With {
                base,
                designator,
                value,
            } => self.convert_with(base, designator, value),

            ExprKind::ByteExtract { base, offset } => {
                let Some(offset) = offset.as_int_constant() else {
                    return Err(SolveError::Unsupported(
                        "byte extract with symbolic offset".to_string(),
                    ));
                };
                let base_bv = self.convert_expr(base)?;
                let start = offset as usize * 8;
                if start + width > base_bv.len() {
                    return Err(SolveError::Unsupported(
                        "byte extract past the end of the object".to_string(),
                    ));
                }
                Ok(base_bv[start..start + width].to_vec())
            }

            ExprKind::Typecast(inner) => {
                let inner_bv = self.convert_expr(inner)?;
                if expr.typ.is_bool() {
                    let non_zero = self.or_reduce(&inner_bv);
                    return Ok(vec![non_zero]);
                }
                if inner_bv.len() >= width {
                    return Ok(inner_bv[..width].to_vec());
                }
                let extension = if inner.typ.is_signed() {
                    *inner_bv.last().expect("non-empty vector")
                } else {
                    self.lit_false()
                };
                let mut out = inner_bv;
                out.resize(width, extension);
                Ok(out)
            }

            ExprKind::Nondet
            | ExprKind::AddressOf(_)
            | ExprKind::Dereference(_)
            | ExprKind::Quantifier { .. } => Err(SolveError::Unsupported(format!(
                "{:?} reached the flattening back end",
                expr.kind
            ))),
        }
    }

    fn convert_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Bv, SolveError> {
        let signed = lhs.typ.is_signed();
        let lhs_bv = self.convert_expr(lhs)?;
        let rhs_bv = self.convert_expr(rhs)?;
        match op {
            BinaryOp::And => Ok(vec![self.gate_and(lhs_bv[0], rhs_bv[0])]),
            BinaryOp::Or => Ok(vec![self.gate_or(lhs_bv[0], rhs_bv[0])]),
            BinaryOp::Implies => Ok(vec![self.gate_or(lhs_bv[0].negated(), rhs_bv[0])]),

            BinaryOp::Eq => Ok(vec![self.eq_bv(&lhs_bv, &rhs_bv)?]),
            BinaryOp::NotEq => Ok(vec![self.eq_bv(&lhs_bv, &rhs_bv)?.negated()]),
            BinaryOp::Lt => Ok(vec![self.less_than(&lhs_bv, &rhs_bv, signed)]),
            BinaryOp::Gt => Ok(vec![self.less_than(&rhs_bv, &lhs_bv, signed)]),
            BinaryOp::Le => Ok(vec![self.less_than(&rhs_bv, &lhs_bv, signed).negated()]),
            BinaryOp::Ge => Ok(vec![self.less_than(&lhs_bv, &rhs_bv, signed).negated()]),

            BinaryOp::Add => Ok(self.add_bv(&lhs_bv, &rhs_bv)),
            BinaryOp::Sub => Ok(self.sub_bv(&lhs_bv, &rhs_bv)),
            BinaryOp::Mul => Ok(self.mul_bv(&lhs_bv, &rhs_bv)),

            BinaryOp::BitAnd => Ok(lhs_bv
                .iter()
                .zip(rhs_bv.iter())
                .map(|(&a, &b)| self.gate_and(a, b))
                .collect()),
            BinaryOp::BitOr => Ok(lhs_bv
                .iter()
                .zip(rhs_bv.iter())
                .map(|(&a, &b)| self.gate_or(a, b))
                .collect()),
            BinaryOp::BitXor => Ok(lhs_bv
                .iter()
                .zip(rhs_bv.iter())
                .map(|(&a, &b)| self.gate_xor(a, b))
                .collect()),

            BinaryOp::Shl | BinaryOp::LShr | BinaryOp::AShr => {
                let Some(shift) = rhs.as_int_constant() else {
                    return Err(SolveError::Unsupported(
                        "shift by a symbolic amount".to_string(),
                    ));
                };
                let width = lhs_bv.len();
                let shift = (shift.max(0) as usize).min(width);
                match op {
                    BinaryOp::Shl => {
                        let mut out: Bv = (0..shift).map(|_| self.lit_false()).collect();
                        out.extend_from_slice(&lhs_bv[..width - shift]);
                        Ok(out)
                    }
                    BinaryOp::LShr => {
                        let mut out: Bv = lhs_bv[shift..].to_vec();
                        let zero = self.lit_false();
                        out.resize(width, zero);
                        Ok(out)
                    }
                    BinaryOp::AShr => {
                        let sign = *lhs_bv.last().expect("non-empty vector");
                        let mut out: Bv = lhs_bv[shift..].to_vec();
                        out.resize(width, sign);
                        Ok(out)
                    }
                    _ => unreachable!(),
                }
            }

            BinaryOp::Div | BinaryOp::Rem => Err(SolveError::Unsupported(
                "division is not flattened; use an SMT back end".to_string(),
            )),
        }
    }

    fn convert_with(
        &mut self,
        base: &Expr,
        designator: &WithDesignator,
        value: &Expr,
    ) -> Result<Bv, SolveError> {
        let base_bv = self.convert_expr(base)?;
        let value_bv = self.convert_expr(value)?;
        match designator {
            WithDesignator::Index(index) => {
                let Type::Array { element, size } = &base.typ else {
                    return Err(SolveError::Unsupported(format!(
                        "with-index over non-array type {}",
                        base.typ
                    )));
                };
                let element_width = element.flattened_width() as usize;
                if let Some(index) = index.as_int_constant() {
                    if index < 0 || index as u64 >= *size {
                        return Err(SolveError::Unsupported(format!(
                            "constant index {index} out of bounds for size {size}"
                        )));
                    }
                    let start = index as usize * element_width;
                    let mut out = base_bv;
                    out[start..start + element_width].copy_from_slice(&value_bv);
                    return Ok(out);
                }
                let index_width = index.typ.flattened_width() as usize;
                let index_bv = self.convert_expr(index)?;
                let mut out = Vec::with_capacity(base_bv.len());
                for i in 0..*size as usize {
                    let i_bv = self.constant_bv(i as i128, index_width);
                    let hit = self.eq_bv(&index_bv, &i_bv)?;
                    let old = &base_bv[i * element_width..(i + 1) * element_width];
                    let old = old.to_vec();
                    out.extend(self.mux_bv(hit, &value_bv, &old));
                }
                Ok(out)
            }
            WithDesignator::Member(field) => {
                let (offset, field_width) = base.typ.field_range(field).ok_or_else(|| {
                    SolveError::Unsupported(format!("unknown field `{field}`"))
                })?;
                let mut out = base_bv;
                out[offset as usize..(offset + field_width) as usize]
                    .copy_from_slice(&value_bv);
                Ok(out)
            }
            WithDesignator::Byte(offset) => {
                let Some(offset) = offset.as_int_constant() else {
                    return Err(SolveError::Unsupported(
                        "byte update with symbolic offset".to_string(),
                    ));
                };
                let start = offset as usize * 8;
                if start + value_bv.len() > base_bv.len() {
                    return Err(SolveError::Unsupported(
                        "byte update past the end of the object".to_string(),
                    ));
                }
                let mut out = base_bv;
                out[start..start + value_bv.len()].copy_from_slice(&value_bv);
                Ok(out)
            }
        }
    }
}

impl<B: SatBackend> DecisionProcedure for BvConverter<B> {
    fn convert(&mut self, equation: &Equation) -> Result<(), SolveError> {
        for step in equation.steps() {
            match &step.kind {
                StepKind::Assignment { lhs, rhs, .. } => {
                    let lhs_bv = self.convert_expr(lhs)?;
                    let rhs_bv = self.convert_expr(rhs)?;
                    if lhs_bv.len() != rhs_bv.len() {
                        return Err(SolveError::Unsupported(format!(
                            "assignment with mismatched widths {} and {}",
                            lhs_bv.len(),
                            rhs_bv.len()
                        )));
                    }
                    for (&l, &r) in lhs_bv.iter().zip(rhs_bv.iter()) {
                        self.sat.add_clause(&[l.negated(), r]);
                        self.sat.add_clause(&[l, r.negated()]);
                    }
                }
                StepKind::Assumption { cond } => {
                    let guard = self.convert_bool(&step.guard)?;
                    let cond = self.convert_bool(cond)?;
                    self.sat.add_clause(&[guard.negated(), cond]);
                }
                StepKind::Assertion { cond, .. } => {
                    let obligation = self.convert_bool(cond)?;
                    self.violations.push(obligation.negated());
                    self.converted_assertions += 1;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn solve(&mut self) -> Result<DecisionResult, SolveError> {
        if self.converted_assertions == 0 {
            return Ok(DecisionResult::Unsatisfiable);
        }
        let violations = std::mem::take(&mut self.violations);
        if !violations.is_empty() {
            self.sat.add_clause(&violations);
        }
        match self.sat.solve()? {
            SatVerdict::Satisfiable => Ok(DecisionResult::Satisfiable),
            SatVerdict::Unsatisfiable => Ok(DecisionResult::Unsatisfiable),
        }
    }

    fn set_time_limit_seconds(&mut self, seconds: u64) {
        self.time_limit = Some(seconds);
    }

    fn name(&self) -> &'static str {
        "bit-vector flattening over SAT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sat::SatCheck;
    use serval_ir::expr::SsaSymbol;
    use serval_symex::{AssignmentKind, SourcePoint};

    fn converter() -> BvConverter<SatCheck> {
        BvConverter::new(SatCheck::new(), ArraysUf::Auto)
    }

    fn u8t() -> Type {
        Type::unsigned(8)
    }

    fn sym(name: &str, version: u64, typ: Type) -> Expr {
        Expr::ssa(
            SsaSymbol::new(name).with_instance(0, 0).with_version(version),
            typ,
        )
    }

    fn src() -> SourcePoint {
        SourcePoint::new(0, "main", 0)
    }

    fn equation_with_assertion(assertion: Expr) -> Equation {
        let mut eq = Equation::new();
        eq.assignment(
            Expr::true_expr(),
            src(),
            sym("x", 1, u8t()),
            sym("x", 1, u8t()),
            Expr::int(1, u8t()),
            AssignmentKind::State,
        );
        eq.assignment(
            Expr::true_expr(),
            src(),
            sym("y", 1, u8t()),
            sym("y", 1, u8t()),
            sym("x", 1, u8t()).add(Expr::int(1, u8t())),
            AssignmentKind::State,
        );
        eq.assertion(Expr::true_expr(), src(), assertion, "assertion");
        eq
    }

    #[test]
    fn holding_assertion_is_unsatisfiable() {
        let mut conv = converter();
        let eq = equation_with_assertion(sym("y", 1, u8t()).eq(Expr::int(2, u8t())));
        conv.convert(&eq).unwrap();
        assert_eq!(conv.solve().unwrap(), DecisionResult::Unsatisfiable);
    }

    #[test]
    fn violated_assertion_is_satisfiable() {
        let mut conv = converter();
        let eq = equation_with_assertion(sym("y", 1, u8t()).eq(Expr::int(3, u8t())));
        conv.convert(&eq).unwrap();
        assert_eq!(conv.solve().unwrap(), DecisionResult::Satisfiable);
    }

    #[test]
    fn assumptions_prune_violations() {
        // x unconstrained, assume x == 5, assert x == 5: cannot be violated.
        let mut eq = Equation::new();
        eq.assumption(
            Expr::true_expr(),
            src(),
            sym("x", 1, u8t()).eq(Expr::int(5, u8t())),
        );
        eq.assertion(
            Expr::true_expr(),
            src(),
            sym("x", 1, u8t()).eq(Expr::int(5, u8t())),
            "assertion",
        );
        let mut conv = converter();
        conv.convert(&eq).unwrap();
        assert_eq!(conv.solve().unwrap(), DecisionResult::Unsatisfiable);
    }

    #[test]
    fn no_assertions_means_nothing_to_violate() {
        let mut conv = converter();
        let mut eq = Equation::new();
        eq.assignment(
            Expr::true_expr(),
            src(),
            sym("x", 1, u8t()),
            sym("x", 1, u8t()),
            Expr::int(1, u8t()),
            AssignmentKind::State,
        );
        conv.convert(&eq).unwrap();
        assert_eq!(conv.solve().unwrap(), DecisionResult::Unsatisfiable);
    }

    #[test]
    fn signed_comparison_respects_sign() {
        // x == -1 (signed), assert x < 0 holds.
        let t = Type::signed(8);
        let mut eq = Equation::new();
        eq.assignment(
            Expr::true_expr(),
            src(),
            sym("x", 1, t.clone()),
            sym("x", 1, t.clone()),
            Expr::int(-1, t.clone()),
            AssignmentKind::State,
        );
        eq.assertion(
            Expr::true_expr(),
            src(),
            sym("x", 1, t.clone()).lt(Expr::int(0, t.clone())),
            "assertion",
        );
        let mut conv = converter();
        conv.convert(&eq).unwrap();
        assert_eq!(conv.solve().unwrap(), DecisionResult::Unsatisfiable);
    }

    #[test]
    fn ite_selects_between_values() {
        // c unconstrained; y := ite(c, 1, 2); assert y >= 1 holds.
        let mut eq = Equation::new();
        let cond = Expr::ssa(
            SsaSymbol::new("c").with_instance(0, 0).with_version(1),
            Type::Bool,
        );
        eq.assignment(
            Expr::true_expr(),
            src(),
            sym("y", 1, u8t()),
            sym("y", 1, u8t()),
            Expr::ite(cond, Expr::int(1, u8t()), Expr::int(2, u8t())),
            AssignmentKind::State,
        );
        eq.assertion(
            Expr::true_expr(),
            src(),
            sym("y", 1, u8t()).ge(Expr::int(1, u8t())),
            "assertion",
        );
        let mut conv = converter();
        conv.convert(&eq).unwrap();
        assert_eq!(conv.solve().unwrap(), DecisionResult::Unsatisfiable);
    }

    #[test]
    fn array_with_and_index_round_trip() {
        // a' := with(a, 1, 7); assert a'[1] == 7 holds.
        let arr_t = Type::array(Type::unsigned(8), 3);
        let idx_t = Type::unsigned(8);
        let a = sym("a", 1, arr_t.clone());
        let updated = sym("a", 2, arr_t);
        let mut eq = Equation::new();
        eq.assignment(
            Expr::true_expr(),
            src(),
            updated.clone(),
            updated.clone(),
            a.with_index(Expr::int(1, idx_t.clone()), Expr::int(7, Type::unsigned(8))),
            AssignmentKind::State,
        );
        eq.assertion(
            Expr::true_expr(),
            src(),
            updated
                .index(Expr::int(1, idx_t))
                .eq(Expr::int(7, Type::unsigned(8))),
            "assertion",
        );
        let mut conv = converter();
        conv.convert(&eq).unwrap();
        assert_eq!(conv.solve().unwrap(), DecisionResult::Unsatisfiable);
    }
}
