//! Scoped variable resolution for the emitter.
//!
//! The table is a stack of scopes, innermost last. Each scope maps a name to
//! the constant-pool index of that name, which is also the slot the VM uses
//! for `LoadVar`/`StoreVar`. Leaving a block discards its scope; nothing is
//! merged back into the parent.

use hashbrown::HashMap;

use crate::ast::Name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    /// Top-level scope of one compiled unit.
    Unit,
    /// Body of an if/while/for/switch/match case or async block.
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub slot: u32,
    pub scope: ScopeKind,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    symbols: HashMap<Name, u32>,
}

#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// A table holding only the global scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                kind: ScopeKind::Global,
                symbols: HashMap::new(),
            }],
        }
    }

    pub fn enter_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope {
            kind,
            symbols: HashMap::new(),
        });
    }

    pub fn exit_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "Cannot pop global scope");
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Bind `name` in the innermost scope, replacing any binding it already
    /// has there.
    pub fn define(&mut self, name: Name, slot: u32) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.symbols.insert(name, slot);
        }
    }

    /// Look a name up from the innermost scope outward.
    pub fn resolve(&self, name: &str) -> Option<Symbol> {
        self.scopes.iter().rev().find_map(|scope| {
            scope.symbols.get(name).map(|&slot| Symbol {
                slot,
                scope: scope.kind,
            })
        })
    }

    /// Look a name up in the innermost scope only.
    pub fn resolve_local(&self, name: &str) -> Option<Symbol> {
        let scope = self.scopes.last()?;
        scope.symbols.get(name).map(|&slot| Symbol {
            slot,
            scope: scope.kind,
        })
    }

    /// Number of scopes, including the global one.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn current_kind(&self) -> ScopeKind {
        self.scopes.last().map_or(ScopeKind::Global, |scope| scope.kind)
    }
}
