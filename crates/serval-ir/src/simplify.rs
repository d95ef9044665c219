//! Expression simplification.
//!
//! A recursive constant folder. Negations are pushed inward (through
//! connectives, relations and quantifiers), which the assertion path relies
//! on before rewriting quantifiers.

use crate::expr::{BinaryOp, Expr, ExprKind, QuantifierKind, UnaryOp, WithDesignator};
use crate::types::Type;

/// Wrap a constant into the value range of `typ`.
pub fn cast_constant(value: i128, typ: &Type) -> i128 {
    let Some(width) = typ.width() else {
        return value;
    };
    if width == 0 || width >= 128 {
        return value;
    }
    let mask = (1u128 << width) - 1;
    let truncated = (value as u128) & mask;
    match typ {
        Type::Signed(w) => {
            let sign_bit = 1u128 << (w - 1);
            if truncated >= sign_bit {
                truncated as i128 - (1i128 << w)
            } else {
                truncated as i128
            }
        }
        _ => truncated as i128,
    }
}

pub fn simplify(expr: Expr) -> Expr {
    let Expr { kind, typ } = expr;
    match kind {
        ExprKind::Symbol(_)
        | ExprKind::IntConstant(_)
        | ExprKind::BoolConstant(_)
        | ExprKind::Nondet => Expr { kind, typ },

        ExprKind::Unary { op, operand } => simplify_unary(op, simplify(*operand), typ),

        ExprKind::Binary { op, lhs, rhs } => {
            simplify_binary(op, simplify(*lhs), simplify(*rhs), typ)
        }

        ExprKind::If {
            cond,
            then_value,
            else_value,
        } => {
            let cond = simplify(*cond);
            let then_value = simplify(*then_value);
            let else_value = simplify(*else_value);
            if cond.is_true() {
                then_value
            } else if cond.is_false() {
                else_value
            } else if then_value == else_value {
                then_value
            } else {
                Expr {
                    kind: ExprKind::If {
                        cond: Box::new(cond),
                        then_value: Box::new(then_value),
                        else_value: Box::new(else_value),
                    },
                    typ,
                }
            }
        }

        ExprKind::Index { array, index } => {
            let array = simplify(*array);
            let index = simplify(*index);
            simplify_index(array, index, typ)
        }

        ExprKind::Member { compound, field } => {
            let compound = simplify(*compound);
            simplify_member(compound, field, typ)
        }

        ExprKind::With {
            base,
            designator,
            value,
        } => {
            let base = simplify(*base);
            let value = simplify(*value);
            let designator = match designator {
                WithDesignator::Index(i) => WithDesignator::Index(Box::new(simplify(*i))),
                WithDesignator::Byte(i) => WithDesignator::Byte(Box::new(simplify(*i))),
                WithDesignator::Member(f) => WithDesignator::Member(f),
            };
            Expr {
                kind: ExprKind::With {
                    base: Box::new(base),
                    designator,
                    value: Box::new(value),
                },
                typ,
            }
        }

        ExprKind::ByteExtract { base, offset } => {
            let base = simplify(*base);
            let offset = simplify(*offset);
            if offset.as_int_constant() == Some(0)
                && base.typ.flattened_width() == typ.flattened_width()
            {
                return simplify(base.typecast(typ));
            }
            Expr {
                kind: ExprKind::ByteExtract {
                    base: Box::new(base),
                    offset: Box::new(offset),
                },
                typ,
            }
        }

        ExprKind::AddressOf(inner) => Expr {
            kind: ExprKind::AddressOf(Box::new(simplify(*inner))),
            typ,
        },

        ExprKind::Dereference(inner) => Expr {
            kind: ExprKind::Dereference(Box::new(simplify(*inner))),
            typ,
        },

        ExprKind::Typecast(inner) => {
            let inner = simplify(*inner);
            if inner.typ == typ {
                return inner;
            }
            match inner.kind {
                ExprKind::IntConstant(v) => {
                    if typ.is_bool() {
                        Expr::bool_const(v != 0)
                    } else {
                        Expr::int(cast_constant(v, &typ), typ)
                    }
                }
                ExprKind::BoolConstant(b) if typ.is_bitvector() => {
                    Expr::int(i128::from(u8::from(b)), typ)
                }
                _ => Expr {
                    kind: ExprKind::Typecast(Box::new(inner)),
                    typ,
                },
            }
        }

        ExprKind::Quantifier {
            kind,
            variable,
            variable_type,
            body,
        } => {
            let body = simplify(*body);
            if body.is_constant() {
                body
            } else {
                Expr {
                    kind: ExprKind::Quantifier {
                        kind,
                        variable,
                        variable_type,
                        body: Box::new(body),
                    },
                    typ,
                }
            }
        }
    }
}

fn simplify_unary(op: UnaryOp, operand: Expr, typ: Type) -> Expr {
    match op {
        UnaryOp::Not => simplify_not(operand),
        UnaryOp::Neg => {
            if let Some(v) = operand.as_int_constant() {
                return Expr::int(cast_constant(v.wrapping_neg(), &typ), typ);
            }
            let Expr {
                kind: operand_kind,
                typ: operand_typ,
            } = operand;
            match operand_kind {
                ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: inner,
                } => *inner,
                kind => Expr {
                    kind: ExprKind::Unary {
                        op,
                        operand: Box::new(Expr {
                            kind,
                            typ: operand_typ,
                        }),
                    },
                    typ,
                },
            }
        }
        UnaryOp::BitNot => {
            if let Some(v) = operand.as_int_constant() {
                return Expr::int(cast_constant(!v, &typ), typ);
            }
            Expr {
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                typ,
            }
        }
    }
}

fn simplify_not(operand: Expr) -> Expr {
    if let Some(b) = operand.as_bool_constant() {
        return Expr::bool_const(!b);
    }
    match operand.kind {
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand: inner,
        } => *inner,
        ExprKind::Binary { op, lhs, rhs } => {
            let flipped = match op {
                BinaryOp::Eq => Some(BinaryOp::NotEq),
                BinaryOp::NotEq => Some(BinaryOp::Eq),
                BinaryOp::Lt => Some(BinaryOp::Ge),
                BinaryOp::Le => Some(BinaryOp::Gt),
                BinaryOp::Gt => Some(BinaryOp::Le),
                BinaryOp::Ge => Some(BinaryOp::Lt),
                _ => None,
            };
            if let Some(flipped) = flipped {
                return simplify_binary(flipped, *lhs, *rhs, Type::Bool);
            }
            match op {
                BinaryOp::And => simplify_binary(
                    BinaryOp::Or,
                    simplify_not(*lhs),
                    simplify_not(*rhs),
                    Type::Bool,
                ),
                BinaryOp::Or => simplify_binary(
                    BinaryOp::And,
                    simplify_not(*lhs),
                    simplify_not(*rhs),
                    Type::Bool,
                ),
                BinaryOp::Implies => simplify_binary(
                    BinaryOp::And,
                    *lhs,
                    simplify_not(*rhs),
                    Type::Bool,
                ),
                _ => Expr {
                    kind: ExprKind::Binary { op, lhs, rhs },
                    typ: Type::Bool,
                }
                .not(),
            }
        }
        ExprKind::Quantifier {
            kind,
            variable,
            variable_type,
            body,
        } => {
            let dual = match kind {
                QuantifierKind::Forall => QuantifierKind::Exists,
                QuantifierKind::Exists => QuantifierKind::Forall,
            };
            Expr {
                kind: ExprKind::Quantifier {
                    kind: dual,
                    variable,
                    variable_type,
                    body: Box::new(simplify_not(*body)),
                },
                typ: Type::Bool,
            }
        }
        kind => Expr {
            kind,
            typ: operand.typ,
        }
        .not(),
    }
}

fn fold_int_binary(op: BinaryOp, a: i128, b: i128, typ: &Type) -> Option<Expr> {
    let value = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        BinaryOp::Rem => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::Shl => {
            if b < 0 || b >= 128 {
                return None;
            }
            a.wrapping_shl(b as u32)
        }
        BinaryOp::LShr => {
            let width = typ.width()?;
            if b < 0 || b as u32 >= width {
                return None;
            }
            let mask = if width >= 128 {
                u128::MAX
            } else {
                (1u128 << width) - 1
            };
            (((a as u128) & mask) >> b) as i128
        }
        BinaryOp::AShr => {
            if b < 0 || b >= 128 {
                return None;
            }
            a >> b
        }
        BinaryOp::Eq => return Some(Expr::bool_const(a == b)),
        BinaryOp::NotEq => return Some(Expr::bool_const(a != b)),
        BinaryOp::Lt => return Some(Expr::bool_const(a < b)),
        BinaryOp::Le => return Some(Expr::bool_const(a <= b)),
        BinaryOp::Gt => return Some(Expr::bool_const(a > b)),
        BinaryOp::Ge => return Some(Expr::bool_const(a >= b)),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Implies => return None,
    };
    Some(Expr::int(cast_constant(value, typ), typ.clone()))
}

/// Fold a relational operator over an `ite` with constant arms, provided
/// the other side is constant too. `ite(c, 1, 2) >= 1` becomes `true`.
fn fold_relational_over_ite(op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
    let (cond, arms, other, ite_on_left) = match (&lhs.kind, &rhs.kind) {
        (
            ExprKind::If {
                cond,
                then_value,
                else_value,
            },
            _,
        ) if then_value.is_constant() && else_value.is_constant() && rhs.is_constant() => {
            (cond, (then_value, else_value), rhs, true)
        }
        (
            _,
            ExprKind::If {
                cond,
                then_value,
                else_value,
            },
        ) if then_value.is_constant() && else_value.is_constant() && lhs.is_constant() => {
            (cond, (then_value, else_value), lhs, false)
        }
        _ => return None,
    };
    let fold_arm = |arm: &Expr| {
        if ite_on_left {
            simplify_binary(op, arm.clone(), other.clone(), Type::Bool)
        } else {
            simplify_binary(op, other.clone(), arm.clone(), Type::Bool)
        }
    };
    let then_result = fold_arm(arms.0);
    let else_result = fold_arm(arms.1);
    if then_result.is_constant() && else_result.is_constant() {
        Some(simplify(Expr::ite(
            (**cond).clone(),
            then_result,
            else_result,
        )))
    } else {
        None
    }
}

fn simplify_binary(op: BinaryOp, lhs: Expr, rhs: Expr, typ: Type) -> Expr {
    match op {
        BinaryOp::And => {
            if lhs.is_false() || rhs.is_false() {
                return Expr::false_expr();
            }
            if lhs.is_true() {
                return rhs;
            }
            if rhs.is_true() || lhs == rhs {
                return lhs;
            }
        }
        BinaryOp::Or => {
            if lhs.is_true() || rhs.is_true() {
                return Expr::true_expr();
            }
            if lhs.is_false() {
                return rhs;
            }
            if rhs.is_false() || lhs == rhs {
                return lhs;
            }
        }
        BinaryOp::Implies => {
            if lhs.is_false() || rhs.is_true() {
                return Expr::true_expr();
            }
            if lhs.is_true() {
                return rhs;
            }
            if rhs.is_false() {
                return simplify_not(lhs);
            }
        }
        _ => {}
    }

    if let (Some(a), Some(b)) = (lhs.as_int_constant(), rhs.as_int_constant()) {
        if let Some(folded) = fold_int_binary(op, a, b, &typ) {
            return folded;
        }
    }

    if let (Some(a), Some(b)) = (lhs.as_bool_constant(), rhs.as_bool_constant()) {
        match op {
            BinaryOp::Eq => return Expr::bool_const(a == b),
            BinaryOp::NotEq => return Expr::bool_const(a != b),
            _ => {}
        }
    }

    if op.is_relational() && lhs == rhs {
        match op {
            BinaryOp::Eq | BinaryOp::Le | BinaryOp::Ge => return Expr::true_expr(),
            BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::Gt => return Expr::false_expr(),
            _ => {}
        }
    }

    if op.is_relational() {
        if let Some(folded) = fold_relational_over_ite(op, &lhs, &rhs) {
            return folded;
        }
    }

    // Arithmetic identities.
    match op {
        BinaryOp::Add => {
            if rhs.as_int_constant() == Some(0) {
                return lhs;
            }
            if lhs.as_int_constant() == Some(0) {
                return rhs;
            }
        }
        BinaryOp::Sub => {
            if rhs.as_int_constant() == Some(0) {
                return lhs;
            }
        }
        BinaryOp::Mul => {
            if rhs.as_int_constant() == Some(1) {
                return lhs;
            }
            if lhs.as_int_constant() == Some(1) {
                return rhs;
            }
            if lhs.as_int_constant() == Some(0) || rhs.as_int_constant() == Some(0) {
                return Expr::int(0, typ);
            }
        }
        BinaryOp::BitAnd => {
            if lhs.as_int_constant() == Some(0) || rhs.as_int_constant() == Some(0) {
                return Expr::int(0, typ);
            }
        }
        BinaryOp::BitOr | BinaryOp::BitXor => {
            if rhs.as_int_constant() == Some(0) {
                return lhs;
            }
            if lhs.as_int_constant() == Some(0) {
                return rhs;
            }
        }
        _ => {}
    }

    Expr {
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        typ,
    }
}

fn simplify_index(array: Expr, index: Expr, typ: Type) -> Expr {
    if let ExprKind::With {
        base,
        designator: WithDesignator::Index(written),
        value,
    } = &array.kind
    {
        if **written == index {
            return (**value).clone();
        }
        if let (Some(_), Some(_)) = (written.as_int_constant(), index.as_int_constant()) {
            // Distinct constant indices: the update cannot alias this read.
            return simplify_index((**base).clone(), index, typ);
        }
    }
    Expr {
        kind: ExprKind::Index {
            array: Box::new(array),
            index: Box::new(index),
        },
        typ,
    }
}

fn simplify_member(compound: Expr, field: String, typ: Type) -> Expr {
    if let ExprKind::With {
        base,
        designator: WithDesignator::Member(written),
        value,
    } = &compound.kind
    {
        if *written == field {
            return (**value).clone();
        }
        return simplify_member((**base).clone(), field, typ);
    }
    Expr {
        kind: ExprKind::Member {
            compound: Box::new(compound),
            field,
        },
        typ,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i32t() -> Type {
        Type::signed(32)
    }

    #[test]
    fn constant_arithmetic_folds() {
        let e = Expr::int(1, i32t()).add(Expr::int(1, i32t()));
        assert_eq!(simplify(e), Expr::int(2, i32t()));

        let e = Expr::int(7, i32t()).mul(Expr::int(3, i32t()));
        assert_eq!(simplify(e), Expr::int(21, i32t()));
    }

    #[test]
    fn division_by_zero_is_left_alone() {
        let e = Expr::int(1, i32t()).sub(Expr::int(0, i32t()));
        assert_eq!(simplify(e), Expr::int(1, i32t()));

        let div = Expr {
            kind: ExprKind::Binary {
                op: BinaryOp::Div,
                lhs: Box::new(Expr::int(1, i32t())),
                rhs: Box::new(Expr::int(0, i32t())),
            },
            typ: i32t(),
        };
        let simplified = simplify(div.clone());
        assert!(matches!(simplified.kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn wrapping_respects_width() {
        let t = Type::unsigned(8);
        let e = Expr::int(250, t.clone()).add(Expr::int(10, t.clone()));
        assert_eq!(simplify(e), Expr::int(4, t.clone()));

        let t = Type::signed(8);
        let e = Expr::int(127, t.clone()).add(Expr::int(1, t.clone()));
        assert_eq!(simplify(e), Expr::int(-128, t));
    }

    #[test]
    fn boolean_connectives_short_circuit() {
        let x = Expr::symbol("x", Type::Bool);
        assert_eq!(simplify(x.clone().and(Expr::false_expr())), Expr::false_expr());
        assert_eq!(simplify(Expr::true_expr().and(x.clone())), x);
        assert_eq!(simplify(x.clone().or(Expr::true_expr())), Expr::true_expr());
        assert_eq!(
            simplify(Expr::false_expr().implies(x.clone())),
            Expr::true_expr()
        );
    }

    #[test]
    fn negation_is_pushed_through_relations() {
        let t = i32t();
        let cmp = Expr::symbol("x", t.clone()).lt(Expr::int(3, t.clone()));
        let negated = simplify(cmp.not());
        assert!(matches!(
            negated.kind,
            ExprKind::Binary {
                op: BinaryOp::Ge,
                ..
            }
        ));
    }

    #[test]
    fn negation_dualizes_quantifiers() {
        let t = i32t();
        let body = Expr::symbol("i", t.clone()).ge(Expr::int(0, t.clone()));
        let q = Expr::forall(crate::expr::SsaSymbol::new("i"), t, body);
        let negated = simplify(q.not());
        assert!(matches!(
            negated.kind,
            ExprKind::Quantifier {
                kind: QuantifierKind::Exists,
                ..
            }
        ));
    }

    #[test]
    fn relational_over_constant_armed_ite_folds() {
        let t = i32t();
        let cond = Expr::symbol("c", Type::Bool);
        let ite = Expr::ite(cond, Expr::int(1, t.clone()), Expr::int(2, t.clone()));
        let cmp = ite.ge(Expr::int(1, t));
        assert_eq!(simplify(cmp), Expr::true_expr());
    }

    #[test]
    fn identical_operands_fold_relationally() {
        let t = i32t();
        let x = Expr::symbol("x", t.clone());
        assert_eq!(simplify(x.clone().eq(x.clone())), Expr::true_expr());
        assert_eq!(simplify(x.clone().lt(x)), Expr::false_expr());
    }

    #[test]
    fn index_over_with_resolves_constant_indices() {
        let t = Type::array(Type::unsigned(8), 4);
        let idx_t = Type::unsigned(32);
        let a = Expr::symbol("a", t);
        let updated = a
            .clone()
            .with_index(Expr::int(1, idx_t.clone()), Expr::int(42, Type::unsigned(8)));

        let same = updated.clone().index(Expr::int(1, idx_t.clone()));
        assert_eq!(simplify(same), Expr::int(42, Type::unsigned(8)));

        let other = updated.index(Expr::int(0, idx_t.clone()));
        let expected = a.index(Expr::int(0, idx_t));
        assert_eq!(simplify(other), expected);
    }

    #[test]
    fn typecast_of_constant_reclamps() {
        let e = Expr::int(300, Type::signed(32)).typecast(Type::unsigned(8));
        assert_eq!(simplify(e), Expr::int(44, Type::unsigned(8)));

        let e = Expr::int(0, Type::signed(32)).typecast(Type::Bool);
        assert_eq!(simplify(e), Expr::false_expr());
    }

    #[test]
    fn ite_with_equal_arms_collapses() {
        let t = i32t();
        let c = Expr::symbol("c", Type::Bool);
        let e = Expr::ite(c, Expr::int(5, t.clone()), Expr::int(5, t.clone()));
        assert_eq!(simplify(e), Expr::int(5, t));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_expr() -> impl Strategy<Value = Expr> {
        let t = Type::signed(8);
        let leaf_type = t.clone();
        let leaf = prop_oneof![
            (-100i128..100).prop_map(move |v| Expr::int(v, leaf_type.clone())),
            any::<bool>().prop_map(Expr::bool_const),
            (0u8..4).prop_map(|i| Expr::symbol(format!("v{i}"), Type::signed(8))),
        ];
        leaf.prop_recursive(4, 32, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(a, b)| a.add(b)),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| a.sub(b)),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| a.mul(b)),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| a.eq(b)),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| a.lt(b)),
                inner
                    .clone()
                    .prop_map(|a| a.eq(Expr::int(0, Type::signed(8))).not()),
            ]
        })
    }

    proptest! {
        #[test]
        fn simplification_reaches_a_fixpoint(expr in arb_expr()) {
            let once = simplify(expr);
            prop_assert_eq!(simplify(once.clone()), once);
        }

        #[test]
        fn constant_trees_fold_to_a_leaf(a in -20i128..20, b in -20i128..20) {
            let t = Type::signed(8);
            let e = Expr::int(a, t.clone())
                .add(Expr::int(b, t.clone()))
                .mul(Expr::int(2, t));
            prop_assert!(simplify(e).is_constant());
        }
    }
}
