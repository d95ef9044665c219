//! Three-level SSA renaming.
//!
//! Level 1 attaches a per-call instance and thread tag to procedure-local
//! symbols; level 2 attaches a version counter bumped on every write. The
//! version counters are monotone per level-1 name across the whole path, so
//! merged branches can never re-issue an SSA name that is already in the
//! equation. Constant propagation is a side table from level-1 names to
//! fully-renamed right-hand sides.

use indexmap::IndexMap;
use serval_ir::expr::{Expr, ExprKind, SsaSymbol, WithDesignator};
use serval_ir::symbol::Namespace;

/// Values the propagation table is allowed to hold: constants, and `ite`
/// trees with constant arms (SSA-final, hence stable along the path).
pub fn is_propagatable(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::IntConstant(_) | ExprKind::BoolConstant(_) => true,
        ExprKind::If {
            then_value,
            else_value,
            ..
        } => then_value.is_constant() && else_value.is_constant(),
        _ => false,
    }
}

/// Reconstruct the structured symbol from a rendered level-1 name
/// (`x!i@k` or plain `x`).
pub(crate) fn parse_level1_name(name: &str) -> SsaSymbol {
    if let Some((identifier, rest)) = name.rsplit_once('!') {
        if let Some((instance, thread)) = rest.split_once('@') {
            if let (Ok(instance), Ok(thread)) = (instance.parse(), thread.parse()) {
                return SsaSymbol::new(identifier).with_instance(instance, thread);
            }
        }
    }
    SsaSymbol::new(name)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenamingTables {
    /// Next level-1 instance per identifier; never reset.
    fresh_instances: IndexMap<String, u64>,
    /// Current level-1 binding per identifier: (instance, thread).
    level1: IndexMap<String, (u64, u64)>,
    /// High-water mark of issued versions per level-1 name; never reset.
    l2_counter: IndexMap<String, u64>,
    /// Version currently visible on this path, per level-1 name.
    pub l2_current: IndexMap<String, u64>,
    /// Propagated values per level-1 name.
    pub propagation: IndexMap<String, Expr>,
}

impl RenamingTables {
    fn fresh_instance(&mut self, identifier: &str) -> u64 {
        let entry = self.fresh_instances.entry(identifier.to_string()).or_insert(0);
        let instance = *entry;
        *entry += 1;
        instance
    }

    /// Bind `identifier` to a fresh level-1 instance, returning the new
    /// instance and the previous binding for later restoration.
    pub fn enter_scope_binding(
        &mut self,
        identifier: &str,
        thread: u64,
    ) -> (u64, Option<(u64, u64)>) {
        let instance = self.fresh_instance(identifier);
        let previous = self.level1.insert(identifier.to_string(), (instance, thread));
        (instance, previous)
    }

    pub fn restore_binding(&mut self, identifier: &str, previous: Option<(u64, u64)>) {
        match previous {
            Some(binding) => {
                self.level1.insert(identifier.to_string(), binding);
            }
            None => {
                self.level1.shift_remove(identifier);
            }
        }
    }

    fn is_static(ns: &Namespace<'_>, identifier: &str) -> bool {
        ns.lookup(identifier).is_some_and(|s| s.static_lifetime)
    }

    /// Apply level-1 renaming to a symbol. Statics and symbols that already
    /// carry an instance are untouched; unbound locals are bound lazily.
    pub fn l1_symbol(&mut self, sym: &SsaSymbol, ns: &Namespace<'_>, thread: u64) -> SsaSymbol {
        if sym.instance.is_some() || Self::is_static(ns, &sym.identifier) {
            return sym.clone();
        }
        let (instance, tag) = match self.level1.get(&sym.identifier) {
            Some(&binding) => binding,
            None => {
                let instance = self.fresh_instance(&sym.identifier);
                self.level1
                    .insert(sym.identifier.clone(), (instance, thread));
                (instance, thread)
            }
        };
        sym.clone().with_instance(instance, tag)
    }

    /// The level-1 name a symbol currently renames to, without binding it.
    pub fn l1_key(&self, identifier: &str, ns: &Namespace<'_>) -> String {
        if Self::is_static(ns, identifier) {
            return identifier.to_string();
        }
        match self.level1.get(identifier) {
            Some(&(instance, thread)) => SsaSymbol::new(identifier)
                .with_instance(instance, thread)
                .level1_name(),
            None => identifier.to_string(),
        }
    }

    /// Version visible to a read; a first read mints a fresh, unconstrained
    /// version.
    pub fn read_version(&mut self, l1name: &str) -> u64 {
        if let Some(version) = self.l2_current.get(l1name) {
            return *version;
        }
        self.bump(l1name)
    }

    /// Fresh version for a write.
    pub fn write_version(&mut self, l1name: &str) -> u64 {
        self.bump(l1name)
    }

    /// A version that was never assigned and is not made current; stands for
    /// an unconstrained value at a merge.
    pub fn fresh_unconstrained(&mut self, l1name: &str) -> u64 {
        let counter = self.l2_counter.entry(l1name.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    fn bump(&mut self, l1name: &str) -> u64 {
        let counter = self.l2_counter.entry(l1name.to_string()).or_insert(0);
        *counter += 1;
        let version = *counter;
        self.l2_current.insert(l1name.to_string(), version);
        version
    }

    /// Rename an assignment target: level 1, then a fresh level-2 version.
    pub fn assign_symbol(
        &mut self,
        sym: &SsaSymbol,
        ns: &Namespace<'_>,
        thread: u64,
    ) -> SsaSymbol {
        let l1 = self.l1_symbol(sym, ns, thread);
        let version = self.write_version(&l1.level1_name());
        l1.with_version(version)
    }

    /// Invalidate a name: later reads see a fresh, never-assigned version.
    pub fn havoc(&mut self, l1name: &str) {
        self.bump(l1name);
        self.propagation.shift_remove(l1name);
    }

    /// Drop a name from the path state entirely (frame teardown).
    pub fn drop_local(&mut self, l1name: &str) {
        self.l2_current.shift_remove(l1name);
        self.propagation.shift_remove(l1name);
    }

    pub fn record_propagation(&mut self, l1name: &str, value: Option<Expr>) {
        match value {
            Some(value) => {
                self.propagation.insert(l1name.to_string(), value);
            }
            None => {
                self.propagation.shift_remove(l1name);
            }
        }
    }

    /// Fully rename an expression to level 2. Purely functional on the
    /// expression; table updates are limited to lazy binds and read mints.
    pub fn rename(
        &mut self,
        expr: Expr,
        ns: &Namespace<'_>,
        thread: u64,
        propagate: bool,
    ) -> Expr {
        let mut bound = Vec::new();
        self.rename_rec(expr, ns, thread, propagate, &mut bound)
    }

    fn rename_rec(
        &mut self,
        expr: Expr,
        ns: &Namespace<'_>,
        thread: u64,
        propagate: bool,
        bound: &mut Vec<String>,
    ) -> Expr {
        let Expr { kind, typ } = expr;
        match kind {
            ExprKind::Symbol(sym) => {
                if sym.version.is_some() {
                    return Expr {
                        kind: ExprKind::Symbol(sym),
                        typ,
                    };
                }
                let l1 = self.l1_symbol(&sym, ns, thread);
                if bound.contains(&sym.identifier) {
                    // Quantified variables stay at level 1.
                    return Expr::ssa(l1, typ);
                }
                let l1name = l1.level1_name();
                if propagate {
                    if let Some(value) = self.propagation.get(&l1name) {
                        return value.clone();
                    }
                }
                let version = self.read_version(&l1name);
                Expr::ssa(l1.with_version(version), typ)
            }

            ExprKind::IntConstant(_) | ExprKind::BoolConstant(_) | ExprKind::Nondet => {
                Expr { kind, typ }
            }

            ExprKind::Unary { op, operand } => Expr {
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(self.rename_rec(*operand, ns, thread, propagate, bound)),
                },
                typ,
            },

            ExprKind::Binary { op, lhs, rhs } => Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(self.rename_rec(*lhs, ns, thread, propagate, bound)),
                    rhs: Box::new(self.rename_rec(*rhs, ns, thread, propagate, bound)),
                },
                typ,
            },

            ExprKind::If {
                cond,
                then_value,
                else_value,
            } => Expr {
                kind: ExprKind::If {
                    cond: Box::new(self.rename_rec(*cond, ns, thread, propagate, bound)),
                    then_value: Box::new(self.rename_rec(*then_value, ns, thread, propagate, bound)),
                    else_value: Box::new(self.rename_rec(*else_value, ns, thread, propagate, bound)),
                },
                typ,
            },

            ExprKind::Index { array, index } => Expr {
                kind: ExprKind::Index {
                    array: Box::new(self.rename_rec(*array, ns, thread, propagate, bound)),
                    index: Box::new(self.rename_rec(*index, ns, thread, propagate, bound)),
                },
                typ,
            },

            ExprKind::Member { compound, field } => Expr {
                kind: ExprKind::Member {
                    compound: Box::new(self.rename_rec(*compound, ns, thread, propagate, bound)),
                    field,
                },
                typ,
            },

            ExprKind::With {
                base,
                designator,
                value,
            } => {
                let designator = match designator {
                    WithDesignator::Index(i) => WithDesignator::Index(Box::new(
                        self.rename_rec(*i, ns, thread, propagate, bound),
                    )),
                    WithDesignator::Byte(i) => WithDesignator::Byte(Box::new(
                        self.rename_rec(*i, ns, thread, propagate, bound),
                    )),
                    WithDesignator::Member(f) => WithDesignator::Member(f),
                };
                Expr {
                    kind: ExprKind::With {
                        base: Box::new(self.rename_rec(*base, ns, thread, propagate, bound)),
                        designator,
                        value: Box::new(self.rename_rec(*value, ns, thread, propagate, bound)),
                    },
                    typ,
                }
            }

            ExprKind::ByteExtract { base, offset } => Expr {
                kind: ExprKind::ByteExtract {
                    base: Box::new(self.rename_rec(*base, ns, thread, propagate, bound)),
                    offset: Box::new(self.rename_rec(*offset, ns, thread, propagate, bound)),
                },
                typ,
            },

            // Taking an address is not a read of the object.
            ExprKind::AddressOf(inner) => Expr {
                kind: ExprKind::AddressOf(Box::new(self.rename_level1_rec(*inner, ns, thread))),
                typ,
            },

            ExprKind::Dereference(inner) => Expr {
                kind: ExprKind::Dereference(Box::new(
                    self.rename_rec(*inner, ns, thread, propagate, bound),
                )),
                typ,
            },

            ExprKind::Typecast(inner) => Expr {
                kind: ExprKind::Typecast(Box::new(
                    self.rename_rec(*inner, ns, thread, propagate, bound),
                )),
                typ,
            },

            ExprKind::Quantifier {
                kind,
                variable,
                variable_type,
                body,
            } => {
                let (instance, previous) = self.enter_scope_binding(&variable.identifier, thread);
                bound.push(variable.identifier.clone());
                let body = self.rename_rec(*body, ns, thread, propagate, bound);
                bound.pop();
                self.restore_binding(&variable.identifier, previous);
                let renamed = SsaSymbol::new(variable.identifier.clone())
                    .with_instance(instance, thread);
                Expr {
                    kind: ExprKind::Quantifier {
                        kind,
                        variable: renamed,
                        variable_type,
                        body: Box::new(body),
                    },
                    typ,
                }
            }
        }
    }

    /// Rename every symbol to level 1 only.
    pub fn rename_level1(&mut self, expr: Expr, ns: &Namespace<'_>, thread: u64) -> Expr {
        self.rename_level1_rec(expr, ns, thread)
    }

    fn rename_level1_rec(&mut self, expr: Expr, ns: &Namespace<'_>, thread: u64) -> Expr {
        let Expr { kind, typ } = expr;
        let kind = match kind {
            ExprKind::Symbol(sym) => {
                if sym.version.is_some() {
                    ExprKind::Symbol(sym)
                } else {
                    ExprKind::Symbol(self.l1_symbol(&sym, ns, thread))
                }
            }
            ExprKind::IntConstant(_) | ExprKind::BoolConstant(_) | ExprKind::Nondet => kind,
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op,
                operand: Box::new(self.rename_level1_rec(*operand, ns, thread)),
            },
            ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
                op,
                lhs: Box::new(self.rename_level1_rec(*lhs, ns, thread)),
                rhs: Box::new(self.rename_level1_rec(*rhs, ns, thread)),
            },
            ExprKind::If {
                cond,
                then_value,
                else_value,
            } => ExprKind::If {
                cond: Box::new(self.rename_level1_rec(*cond, ns, thread)),
                then_value: Box::new(self.rename_level1_rec(*then_value, ns, thread)),
                else_value: Box::new(self.rename_level1_rec(*else_value, ns, thread)),
            },
            ExprKind::Index { array, index } => ExprKind::Index {
                array: Box::new(self.rename_level1_rec(*array, ns, thread)),
                index: Box::new(self.rename_level1_rec(*index, ns, thread)),
            },
            ExprKind::Member { compound, field } => ExprKind::Member {
                compound: Box::new(self.rename_level1_rec(*compound, ns, thread)),
                field,
            },
            ExprKind::With {
                base,
                designator,
                value,
            } => {
                let designator = match designator {
                    WithDesignator::Index(i) => {
                        WithDesignator::Index(Box::new(self.rename_level1_rec(*i, ns, thread)))
                    }
                    WithDesignator::Byte(i) => {
                        WithDesignator::Byte(Box::new(self.rename_level1_rec(*i, ns, thread)))
                    }
                    WithDesignator::Member(f) => WithDesignator::Member(f),
                };
                ExprKind::With {
                    base: Box::new(self.rename_level1_rec(*base, ns, thread)),
                    designator,
                    value: Box::new(self.rename_level1_rec(*value, ns, thread)),
                }
            }
            ExprKind::ByteExtract { base, offset } => ExprKind::ByteExtract {
                base: Box::new(self.rename_level1_rec(*base, ns, thread)),
                offset: Box::new(self.rename_level1_rec(*offset, ns, thread)),
            },
            ExprKind::AddressOf(inner) => {
                ExprKind::AddressOf(Box::new(self.rename_level1_rec(*inner, ns, thread)))
            }
            ExprKind::Dereference(inner) => {
                ExprKind::Dereference(Box::new(self.rename_level1_rec(*inner, ns, thread)))
            }
            ExprKind::Typecast(inner) => {
                ExprKind::Typecast(Box::new(self.rename_level1_rec(*inner, ns, thread)))
            }
            quantifier @ ExprKind::Quantifier { .. } => quantifier,
        };
        Expr { kind, typ }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serval_ir::symbol::{Symbol, SymbolTable};
    use serval_ir::types::Type;

    fn local_table() -> SymbolTable {
        let mut table = SymbolTable::new();
        table.insert(Symbol::new("x", Type::signed(32)));
        let mut g = Symbol::new("g", Type::signed(32));
        g.static_lifetime = true;
        table.insert(g);
        table
    }

    #[test]
    fn read_before_write_mints_version_one() {
        let table = local_table();
        let ns = Namespace::new(&table);
        let mut tables = RenamingTables::default();
        let renamed = tables.rename(Expr::symbol("x", Type::signed(32)), &ns, 0, true);
        let sym = renamed.as_symbol().unwrap();
        assert_eq!(sym.full_name(), "x!0@0#1");
        // A second read sees the same version.
        let renamed = tables.rename(Expr::symbol("x", Type::signed(32)), &ns, 0, true);
        assert_eq!(renamed.as_symbol().unwrap().full_name(), "x!0@0#1");
    }

    #[test]
    fn writes_bump_and_reads_follow() {
        let table = local_table();
        let ns = Namespace::new(&table);
        let mut tables = RenamingTables::default();
        let w1 = tables.assign_symbol(&SsaSymbol::new("x"), &ns, 0);
        let w2 = tables.assign_symbol(&SsaSymbol::new("x"), &ns, 0);
        assert_eq!(w1.full_name(), "x!0@0#1");
        assert_eq!(w2.full_name(), "x!0@0#2");
        let read = tables.rename(Expr::symbol("x", Type::signed(32)), &ns, 0, false);
        assert_eq!(read.as_symbol().unwrap().full_name(), "x!0@0#2");
    }

    #[test]
    fn statics_carry_no_level1_tags() {
        let table = local_table();
        let ns = Namespace::new(&table);
        let mut tables = RenamingTables::default();
        let w = tables.assign_symbol(&SsaSymbol::new("g"), &ns, 3);
        assert_eq!(w.full_name(), "g#1");
    }

    #[test]
    fn havoc_never_reuses_a_version() {
        let table = local_table();
        let ns = Namespace::new(&table);
        let mut tables = RenamingTables::default();
        let w1 = tables.assign_symbol(&SsaSymbol::new("x"), &ns, 0);
        tables.havoc(&w1.level1_name());
        let read = tables.rename(Expr::symbol("x", Type::signed(32)), &ns, 0, false);
        assert_eq!(read.as_symbol().unwrap().version, Some(2));
        let w3 = tables.assign_symbol(&SsaSymbol::new("x"), &ns, 0);
        assert_eq!(w3.version, Some(3));
    }

    #[test]
    fn propagation_substitutes_recorded_values() {
        let table = local_table();
        let ns = Namespace::new(&table);
        let mut tables = RenamingTables::default();
        let w = tables.assign_symbol(&SsaSymbol::new("x"), &ns, 0);
        tables.record_propagation(&w.level1_name(), Some(Expr::int(5, Type::signed(32))));

        let on = tables.rename(Expr::symbol("x", Type::signed(32)), &ns, 0, true);
        assert_eq!(on, Expr::int(5, Type::signed(32)));

        let off = tables.rename(Expr::symbol("x", Type::signed(32)), &ns, 0, false);
        assert!(off.as_symbol().is_some());
    }

    #[test]
    fn address_of_subtrees_stay_at_level_one() {
        let table = local_table();
        let ns = Namespace::new(&table);
        let mut tables = RenamingTables::default();
        let addr = Expr::symbol("x", Type::signed(32)).address_of();
        let renamed = tables.rename(addr, &ns, 0, true);
        match renamed.kind {
            ExprKind::AddressOf(inner) => {
                let sym = inner.as_symbol().unwrap();
                assert_eq!(sym.instance, Some(0));
                assert_eq!(sym.version, None);
            }
            other => panic!("expected address-of, got {other:?}"),
        }
    }

    #[test]
    fn quantified_variables_get_fresh_instances_without_versions() {
        let table = local_table();
        let ns = Namespace::new(&table);
        let mut tables = RenamingTables::default();
        let t = Type::signed(32);
        let body = Expr::symbol("q", t.clone()).ge(Expr::int(0, t.clone()));
        let e = Expr::exists(SsaSymbol::new("q"), t.clone(), body);
        let renamed = tables.rename(e.clone(), &ns, 0, true);
        match &renamed.kind {
            ExprKind::Quantifier { variable, body, .. } => {
                assert_eq!(variable.instance, Some(0));
                match &body.kind {
                    ExprKind::Binary { lhs, .. } => {
                        let sym = lhs.as_symbol().unwrap();
                        assert_eq!(sym.instance, Some(0));
                        assert_eq!(sym.version, None);
                    }
                    other => panic!("unexpected body {other:?}"),
                }
            }
            other => panic!("expected quantifier, got {other:?}"),
        }
        // Renaming the same quantifier again issues a distinct instance.
        let renamed_again = tables.rename(e, &ns, 0, true);
        match &renamed_again.kind {
            ExprKind::Quantifier { variable, .. } => assert_eq!(variable.instance, Some(1)),
            other => panic!("expected quantifier, got {other:?}"),
        }
    }

    #[test]
    fn renaming_is_idempotent_on_versioned_symbols() {
        let table = local_table();
        let ns = Namespace::new(&table);
        let mut tables = RenamingTables::default();
        let versioned = Expr::ssa(
            SsaSymbol::new("x").with_instance(0, 0).with_version(7),
            Type::signed(32),
        );
        let renamed = tables.rename(versioned.clone(), &ns, 0, true);
        assert_eq!(renamed, versioned);
    }
}
