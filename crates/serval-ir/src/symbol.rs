use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::Type;

/// An entry in a symbol table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub typ: Type,
    /// Statics are shared across frames and threads and skip level-1 renaming.
    pub static_lifetime: bool,
    pub thread_local: bool,
    /// Symbols of auxiliary library code; assertions inside are suppressed.
    pub hidden: bool,
}

impl Symbol {
    pub fn new(name: impl Into<String>, typ: Type) -> Self {
        Symbol {
            name: name.into(),
            typ,
            static_lifetime: false,
            thread_local: false,
            hidden: false,
        }
    }

    pub fn static_object(name: impl Into<String>, typ: Type) -> Self {
        Symbol {
            name: name.into(),
            typ,
            static_lifetime: true,
            thread_local: false,
            hidden: false,
        }
    }
}

/// Ordered map of symbols. Iteration order is insertion order, which keeps
/// every downstream artifact deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: IndexMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a symbol, returning false if the name was already present.
    pub fn insert(&mut self, symbol: Symbol) -> bool {
        if self.symbols.contains_key(&symbol.name) {
            return false;
        }
        self.symbols.insert(symbol.name.clone(), symbol);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// A lookup view joining the goto-program's symbol table with the names a
/// symbolic execution run mints on the fly. Borrowed, so the view cannot
/// outlive either table.
#[derive(Clone, Copy)]
pub struct Namespace<'a> {
    outer: &'a SymbolTable,
    inner: Option<&'a SymbolTable>,
}

impl<'a> Namespace<'a> {
    pub fn new(outer: &'a SymbolTable) -> Self {
        Namespace { outer, inner: None }
    }

    pub fn joined(outer: &'a SymbolTable, inner: &'a SymbolTable) -> Self {
        Namespace {
            outer,
            inner: Some(inner),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&'a Symbol> {
        self.inner
            .and_then(|table| table.lookup(name))
            .or_else(|| self.outer.lookup(name))
    }
}
