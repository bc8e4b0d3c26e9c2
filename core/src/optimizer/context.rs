//! Dataflow facts carried through one optimization pass.

use std::rc::Rc;

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::ast::{BinaryOp, Expr, Literal, LiteralKey, Name};

/// One operand of a reusable binary expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Operand {
    Var(Name),
    Literal(LiteralKey),
}

impl Operand {
    fn of(expr: &Expr) -> Option<Self> {
        match expr {
            Expr::Var(name) => Some(Operand::Var(name.clone())),
            Expr::Literal(lit) => Some(Operand::Literal(lit.key())),
            _ => None,
        }
    }
}

/// Structural key of a binary expression whose operands are variables or
/// literals. Operand order is kept as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ExprKey {
    op: BinaryOp,
    left: Operand,
    right: Operand,
}

impl ExprKey {
    pub(crate) fn of(expr: &Expr) -> Option<Self> {
        match expr {
            Expr::Binary { op, left, right } => Some(ExprKey {
                op: *op,
                left: Operand::of(left)?,
                right: Operand::of(right)?,
            }),
            _ => None,
        }
    }

    fn mentions(&self, name: &str) -> bool {
        [&self.left, &self.right]
            .into_iter()
            .any(|operand| matches!(operand, Operand::Var(v) if v.as_str() == name))
    }

    fn operand_names(&self) -> SmallVec<[Name; 2]> {
        [&self.left, &self.right]
            .into_iter()
            .filter_map(|operand| match operand {
                Operand::Var(v) => Some(v.clone()),
                Operand::Literal(_) => None,
            })
            .collect()
    }
}

/// What is provably true about variables at the current program point.
///
/// A pass owns one `Facts` per straight-line region; branches work on a
/// clone so that nothing learned inside a branch leaks out of it.
#[derive(Debug, Clone, Default)]
pub(crate) struct Facts {
    constants: HashMap<Name, Literal>,
    copies: HashMap<Name, Name>,
    available: HashMap<ExprKey, Name>,
    /// Names that may change behind the pass's back (written by async
    /// bodies). Nothing is ever recorded about them.
    volatile: Rc<HashSet<Name>>,
}

impl Facts {
    pub(crate) fn with_volatile(volatile: HashSet<Name>) -> Self {
        Facts {
            volatile: Rc::new(volatile),
            ..Facts::default()
        }
    }

    /// Empty facts sharing this context's volatile names, for code that
    /// runs detached from the current program point.
    pub(crate) fn isolated(&self) -> Self {
        Facts {
            volatile: Rc::clone(&self.volatile),
            ..Facts::default()
        }
    }

    pub(crate) fn constant(&self, name: &str) -> Option<&Literal> {
        self.constants.get(name)
    }

    /// Follow the copy chain starting at `name` to its root.
    ///
    /// A visited set bounds the walk, so a cyclic chain stops at the first
    /// repeated name instead of looping.
    pub(crate) fn resolve(&self, name: &Name) -> Name {
        let mut current = name.clone();
        let mut visited: HashSet<Name> = HashSet::new();
        visited.insert(current.clone());
        while let Some(next) = self.copies.get(&current) {
            if !visited.insert(next.clone()) {
                break;
            }
            current = next.clone();
        }
        current
    }

    /// Variable currently holding the value of `key`, if any.
    pub(crate) fn available(&self, key: &ExprKey) -> Option<&Name> {
        self.available.get(key)
    }

    /// Forget everything known about `name` and everything that depends on
    /// it.
    pub(crate) fn invalidate(&mut self, name: &str) {
        self.constants.remove(name);
        self.copies.remove(name);
        self.copies.retain(|_, source| source.as_str() != name);
        self.available
            .retain(|key, holder| holder.as_str() != name && !key.mentions(name));
    }

    pub(crate) fn invalidate_all<'a>(&mut self, names: impl IntoIterator<Item = &'a Name>) {
        for name in names {
            self.invalidate(name);
        }
    }

    /// Record what storing `value` into `target` establishes. The target
    /// must already have been invalidated.
    pub(crate) fn record(&mut self, target: &Name, value: &Expr) {
        if self.volatile.contains(target) {
            return;
        }
        match value {
            Expr::Literal(lit) => {
                self.constants.insert(target.clone(), lit.clone());
            }
            Expr::Var(source) if source != target && !self.volatile.contains(source) => {
                self.copies.insert(target.clone(), source.clone());
            }
            _ => {
                if let Some(key) = ExprKey::of(value) {
                    let names = key.operand_names();
                    let stable = names
                        .iter()
                        .all(|n| n != target && !self.volatile.contains(n));
                    if stable {
                        self.available.entry(key).or_insert_with(|| target.clone());
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn insert_copy(&mut self, target: &str, source: &str) {
        self.copies.insert(target.into(), source.into());
    }
}
