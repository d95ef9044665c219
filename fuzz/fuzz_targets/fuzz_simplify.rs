#![no_main]
use libfuzzer_sys::fuzz_target;

use serval_ir::expr::{BinaryOp, Expr, ExprKind, UnaryOp};
use serval_ir::simplify::simplify;
use serval_ir::types::Type;

// Decode an expression tree from the fuzz input: one opcode byte plus one
// payload byte per node, depth-bounded.
fn decode(data: &mut &[u8], depth: usize) -> Expr {
    let t = Type::signed(8);
    let Some((&op, rest)) = data.split_first() else {
        return Expr::int(0, t);
    };
    *data = rest;
    let payload = data.first().copied().unwrap_or(0);
    if !data.is_empty() {
        *data = &data[1..];
    }
    if depth == 0 {
        return Expr::int(i128::from(payload as i8), t);
    }
    match op % 12 {
        0 => Expr::int(i128::from(payload as i8), t),
        1 => Expr::bool_const(payload & 1 == 1),
        2 => Expr::symbol(format!("v{}", payload % 4), t),
        3 => decode(data, depth - 1).add(decode(data, depth - 1)),
        4 => decode(data, depth - 1).sub(decode(data, depth - 1)),
        5 => decode(data, depth - 1).mul(decode(data, depth - 1)),
        6 => decode(data, depth - 1).eq(decode(data, depth - 1)),
        7 => decode(data, depth - 1).lt(decode(data, depth - 1)),
        8 => {
            let lhs = Expr {
                kind: ExprKind::Binary {
                    op: BinaryOp::And,
                    lhs: Box::new(bool_of(decode(data, depth - 1))),
                    rhs: Box::new(bool_of(decode(data, depth - 1))),
                },
                typ: Type::Bool,
            };
            lhs
        }
        9 => Expr {
            kind: ExprKind::Unary {
                op: UnaryOp::Not,
                operand: Box::new(bool_of(decode(data, depth - 1))),
            },
            typ: Type::Bool,
        },
        10 => Expr::ite(
            bool_of(decode(data, depth - 1)),
            decode(data, depth - 1),
            decode(data, depth - 1),
        ),
        _ => decode(data, depth - 1).typecast(Type::unsigned(8)),
    }
}

fn bool_of(expr: Expr) -> Expr {
    if expr.typ.is_bool() {
        expr
    } else {
        expr.typecast(Type::Bool)
    }
}

fuzz_target!(|data: &[u8]| {
    let mut cursor = data;
    let expr = decode(&mut cursor, 6);
    let once = simplify(expr);
    // Simplification is a fixpoint: a second pass changes nothing.
    let twice = simplify(once.clone());
    assert_eq!(once, twice);
});
