use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Type;

/// A program symbol annotated with the three SSA renaming levels.
///
/// Level 0 is the bare identifier. Level 1 adds a per-call `instance` and the
/// owning `thread`; level 2 adds a `version` bumped on every write. Symbols
/// with static lifetime skip the level-1 tags and render as `x#c`; everything
/// else renders as `x!i@k#c`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SsaSymbol {
    pub identifier: String,
    pub instance: Option<u64>,
    pub thread: Option<u64>,
    pub version: Option<u64>,
}

impl SsaSymbol {
    pub fn new(identifier: impl Into<String>) -> Self {
        SsaSymbol {
            identifier: identifier.into(),
            instance: None,
            thread: None,
            version: None,
        }
    }

    pub fn with_instance(mut self, instance: u64, thread: u64) -> Self {
        self.instance = Some(instance);
        self.thread = Some(thread);
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Name up to level 1, e.g. `x!0@0`.
    pub fn level1_name(&self) -> String {
        let mut name = self.identifier.clone();
        if let Some(instance) = self.instance {
            name.push('!');
            name.push_str(&instance.to_string());
        }
        if let Some(thread) = self.thread {
            name.push('@');
            name.push_str(&thread.to_string());
        }
        name
    }

    /// Fully-renamed name, e.g. `x!0@0#2`.
    pub fn full_name(&self) -> String {
        let mut name = self.level1_name();
        if let Some(version) = self.version {
            name.push('#');
            name.push_str(&version.to_string());
        }
        name
    }

    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }

    /// Strip back to the level-0 identifier.
    pub fn original(&self) -> SsaSymbol {
        SsaSymbol::new(self.identifier.clone())
    }
}

impl fmt::Display for SsaSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    LShr,
    AShr,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Implies,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantifierKind {
    Forall,
    Exists,
}

/// Selects what a `with` expression updates within its base value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WithDesignator {
    Index(Box<Expr>),
    Member(String),
    /// Byte offset into the flattened value; the lowering target for
    /// byte-extract writes.
    Byte(Box<Expr>),
}

/// A typed expression tree with value-owned nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub typ: Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprKind {
    Symbol(SsaSymbol),
    IntConstant(i128),
    BoolConstant(bool),
    /// A non-deterministic choice; replaced by a fresh symbol during
    /// expression cleaning.
    Nondet,
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        compound: Box<Expr>,
        field: String,
    },
    With {
        base: Box<Expr>,
        designator: WithDesignator,
        value: Box<Expr>,
    },
    /// Reinterpret part of `base` starting at a byte offset as the
    /// expression's own type.
    ByteExtract {
        base: Box<Expr>,
        offset: Box<Expr>,
    },
    AddressOf(Box<Expr>),
    Dereference(Box<Expr>),
    /// Conversion to the expression's own type.
    Typecast(Box<Expr>),
    Quantifier {
        kind: QuantifierKind,
        variable: SsaSymbol,
        variable_type: Type,
        body: Box<Expr>,
    },
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    pub fn symbol(identifier: impl Into<String>, typ: Type) -> Self {
        Expr {
            kind: ExprKind::Symbol(SsaSymbol::new(identifier)),
            typ,
        }
    }

    pub fn ssa(symbol: SsaSymbol, typ: Type) -> Self {
        Expr {
            kind: ExprKind::Symbol(symbol),
            typ,
        }
    }

    pub fn int(value: i128, typ: Type) -> Self {
        Expr {
            kind: ExprKind::IntConstant(value),
            typ,
        }
    }

    pub fn bool_const(value: bool) -> Self {
        Expr {
            kind: ExprKind::BoolConstant(value),
            typ: Type::Bool,
        }
    }

    pub fn true_expr() -> Self {
        Expr::bool_const(true)
    }

    pub fn false_expr() -> Self {
        Expr::bool_const(false)
    }

    pub fn nondet(typ: Type) -> Self {
        Expr {
            kind: ExprKind::Nondet,
            typ,
        }
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, typ: Type) -> Self {
        Expr {
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            typ,
        }
    }

    pub fn add(self, rhs: Expr) -> Self {
        let typ = self.typ.clone();
        Expr::binary(BinaryOp::Add, self, rhs, typ)
    }

    pub fn sub(self, rhs: Expr) -> Self {
        let typ = self.typ.clone();
        Expr::binary(BinaryOp::Sub, self, rhs, typ)
    }

    pub fn mul(self, rhs: Expr) -> Self {
        let typ = self.typ.clone();
        Expr::binary(BinaryOp::Mul, self, rhs, typ)
    }

    pub fn eq(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Eq, self, rhs, Type::Bool)
    }

    pub fn not_eq(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::NotEq, self, rhs, Type::Bool)
    }

    pub fn lt(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Lt, self, rhs, Type::Bool)
    }

    pub fn le(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Le, self, rhs, Type::Bool)
    }

    pub fn gt(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Gt, self, rhs, Type::Bool)
    }

    pub fn ge(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Ge, self, rhs, Type::Bool)
    }

    pub fn and(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::And, self, rhs, Type::Bool)
    }

    pub fn or(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Or, self, rhs, Type::Bool)
    }

    pub fn implies(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Implies, self, rhs, Type::Bool)
    }

    pub fn not(self) -> Self {
        Expr {
            kind: ExprKind::Unary {
                op: UnaryOp::Not,
                operand: Box::new(self),
            },
            typ: Type::Bool,
        }
    }

    pub fn neg(self) -> Self {
        let typ = self.typ.clone();
        Expr {
            kind: ExprKind::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(self),
            },
            typ,
        }
    }

    pub fn ite(cond: Expr, then_value: Expr, else_value: Expr) -> Self {
        let typ = then_value.typ.clone();
        Expr {
            kind: ExprKind::If {
                cond: Box::new(cond),
                then_value: Box::new(then_value),
                else_value: Box::new(else_value),
            },
            typ,
        }
    }

    pub fn index(self, index: Expr) -> Self {
        let element = match &self.typ {
            Type::Array { element, .. } => (**element).clone(),
            other => other.clone(),
        };
        Expr {
            kind: ExprKind::Index {
                array: Box::new(self),
                index: Box::new(index),
            },
            typ: element,
        }
    }

    pub fn member(self, field: impl Into<String>) -> Self {
        let field = field.into();
        let typ = self
            .typ
            .field_type(&field)
            .cloned()
            .unwrap_or(Type::Unit);
        Expr {
            kind: ExprKind::Member {
                compound: Box::new(self),
                field,
            },
            typ,
        }
    }

    pub fn with_index(self, index: Expr, value: Expr) -> Self {
        let typ = self.typ.clone();
        Expr {
            kind: ExprKind::With {
                base: Box::new(self),
                designator: WithDesignator::Index(Box::new(index)),
                value: Box::new(value),
            },
            typ,
        }
    }

    pub fn with_member(self, field: impl Into<String>, value: Expr) -> Self {
        let typ = self.typ.clone();
        Expr {
            kind: ExprKind::With {
                base: Box::new(self),
                designator: WithDesignator::Member(field.into()),
                value: Box::new(value),
            },
            typ,
        }
    }

    pub fn byte_extract(self, offset: Expr, typ: Type) -> Self {
        Expr {
            kind: ExprKind::ByteExtract {
                base: Box::new(self),
                offset: Box::new(offset),
            },
            typ,
        }
    }

    pub fn address_of(self) -> Self {
        let typ = Type::pointer(self.typ.clone());
        Expr {
            kind: ExprKind::AddressOf(Box::new(self)),
            typ,
        }
    }

    pub fn deref(self) -> Self {
        let typ = match &self.typ {
            Type::Pointer(target) => (**target).clone(),
            other => other.clone(),
        };
        Expr {
            kind: ExprKind::Dereference(Box::new(self)),
            typ,
        }
    }

    pub fn typecast(self, typ: Type) -> Self {
        Expr {
            kind: ExprKind::Typecast(Box::new(self)),
            typ,
        }
    }

    pub fn forall(variable: SsaSymbol, variable_type: Type, body: Expr) -> Self {
        Expr {
            kind: ExprKind::Quantifier {
                kind: QuantifierKind::Forall,
                variable,
                variable_type,
                body: Box::new(body),
            },
            typ: Type::Bool,
        }
    }

    pub fn exists(variable: SsaSymbol, variable_type: Type, body: Expr) -> Self {
        Expr {
            kind: ExprKind::Quantifier {
                kind: QuantifierKind::Exists,
                variable,
                variable_type,
                body: Box::new(body),
            },
            typ: Type::Bool,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self.kind, ExprKind::BoolConstant(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self.kind, ExprKind::BoolConstant(false))
    }

    pub fn is_constant(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::IntConstant(_) | ExprKind::BoolConstant(_)
        )
    }

    pub fn as_int_constant(&self) -> Option<i128> {
        match self.kind {
            ExprKind::IntConstant(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool_constant(&self) -> Option<bool> {
        match self.kind {
            ExprKind::BoolConstant(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&SsaSymbol> {
        match &self.kind {
            ExprKind::Symbol(symbol) => Some(symbol),
            _ => None,
        }
    }

    /// Whether any subexpression is a quantifier.
    pub fn has_quantifier(&self) -> bool {
        match &self.kind {
            ExprKind::Quantifier { .. } => true,
            ExprKind::Symbol(_)
            | ExprKind::IntConstant(_)
            | ExprKind::BoolConstant(_)
            | ExprKind::Nondet => false,
            ExprKind::Unary { operand, .. } => operand.has_quantifier(),
            ExprKind::Binary { lhs, rhs, .. } => lhs.has_quantifier() || rhs.has_quantifier(),
            ExprKind::If {
                cond,
                then_value,
                else_value,
            } => cond.has_quantifier() || then_value.has_quantifier() || else_value.has_quantifier(),
            ExprKind::Index { array, index } => array.has_quantifier() || index.has_quantifier(),
            ExprKind::Member { compound, .. } => compound.has_quantifier(),
            ExprKind::With {
                base,
                designator,
                value,
            } => {
                let in_designator = match designator {
                    WithDesignator::Index(i) | WithDesignator::Byte(i) => i.has_quantifier(),
                    WithDesignator::Member(_) => false,
                };
                base.has_quantifier() || in_designator || value.has_quantifier()
            }
            ExprKind::ByteExtract { base, offset } => {
                base.has_quantifier() || offset.has_quantifier()
            }
            ExprKind::AddressOf(inner) | ExprKind::Dereference(inner) | ExprKind::Typecast(inner) => {
                inner.has_quantifier()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssa_names_render_all_present_levels() {
        let sym = SsaSymbol::new("x").with_instance(3, 1).with_version(7);
        assert_eq!(sym.level1_name(), "x!3@1");
        assert_eq!(sym.full_name(), "x!3@1#7");

        let global = SsaSymbol::new("g").with_version(2);
        assert_eq!(global.full_name(), "g#2");
    }

    #[test]
    fn original_strips_annotations() {
        let sym = SsaSymbol::new("x").with_instance(1, 0).with_version(4);
        assert_eq!(sym.original(), SsaSymbol::new("x"));
    }

    #[test]
    fn builders_preserve_operand_order() {
        let t = Type::signed(32);
        let x = Expr::symbol("x", t.clone());
        let one = Expr::int(1, t.clone());
        let sum = x.clone().add(one.clone());
        assert!(matches!(
            &sum.kind,
            ExprKind::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
        assert_eq!(sum.typ, t);

        let cmp = sum.eq(Expr::int(2, t.clone()));
        assert_eq!(cmp.typ, Type::Bool);
    }

    #[test]
    fn index_and_member_types_follow_the_compound() {
        let arr_t = Type::array(Type::unsigned(8), 4);
        let arr = Expr::symbol("a", arr_t);
        let elem = arr.index(Expr::int(0, Type::unsigned(32)));
        assert_eq!(elem.typ, Type::unsigned(8));

        let st = Type::Struct {
            fields: vec![("f".into(), Type::Bool)],
        };
        let m = Expr::symbol("s", st).member("f");
        assert_eq!(m.typ, Type::Bool);
    }

    #[test]
    fn address_of_and_deref_invert_pointer_types() {
        let t = Type::signed(16);
        let x = Expr::symbol("x", t.clone());
        let ptr = x.address_of();
        assert_eq!(ptr.typ, Type::pointer(t.clone()));
        assert_eq!(ptr.deref().typ, t);
    }

    #[test]
    fn quantifier_detection_descends() {
        let bound = SsaSymbol::new("i");
        let body = Expr::symbol("i", Type::signed(32)).ge(Expr::int(0, Type::signed(32)));
        let q = Expr::forall(bound, Type::signed(32), body);
        let wrapped = q.and(Expr::true_expr());
        assert!(wrapped.has_quantifier());
        assert!(!Expr::true_expr().has_quantifier());
    }
}
