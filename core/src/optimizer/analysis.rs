//! Read/write analysis over trees.
//!
//! Everything here is syntactic: a name is "written" by a construct if any
//! statement or pattern inside it stores to that name, whether or not the
//! store executes at runtime.

use hashbrown::{HashMap, HashSet};

use crate::ast::visit::Visitor;
use crate::ast::{Expr, Name, Pattern, Stmt};

/// Per-name read/write counts over a region of code.
#[derive(Debug, Default, Clone)]
pub(crate) struct Census {
    reads: HashMap<Name, usize>,
    writes: HashMap<Name, usize>,
}

impl Census {
    pub(crate) fn of_block(block: &[Stmt]) -> Self {
        let mut census = Census::default();
        census.visit_block(block);
        census
    }

    pub(crate) fn add_expr(&mut self, expr: &Expr) {
        self.visit_expr(expr);
    }

    pub(crate) fn add_block(&mut self, block: &[Stmt]) {
        self.visit_block(block);
    }

    pub(crate) fn reads(&self, name: &str) -> usize {
        self.reads.get(name).copied().unwrap_or(0)
    }

    pub(crate) fn writes(&self, name: &str) -> usize {
        self.writes.get(name).copied().unwrap_or(0)
    }

    /// Every name written at least once.
    pub(crate) fn written(&self) -> impl Iterator<Item = &Name> {
        self.writes.keys()
    }

    /// Every name read at least once.
    pub(crate) fn read(&self) -> impl Iterator<Item = &Name> {
        self.reads.keys()
    }

    fn write(&mut self, name: &Name) {
        *self.writes.entry(name.clone()).or_insert(0) += 1;
    }
}

impl Visitor for Census {
    fn visit_expr(&mut self, expr: &Expr) {
        if let Expr::Var(name) = expr {
            *self.reads.entry(name.clone()).or_insert(0) += 1;
        }
        self.super_visit_expr(expr);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Declare { target, .. } | Stmt::Assign { target, .. } => self.write(target),
            Stmt::For { key, value, .. } => {
                if let Some(key) = key {
                    self.write(key);
                }
                self.write(value);
            }
            _ => {}
        }
        self.super_visit_stmt(stmt);
    }

    fn visit_pattern(&mut self, pattern: &Pattern) {
        for name in pattern_bindings(pattern) {
            self.write(&name);
        }
    }
}

/// Names written anywhere inside `block`.
pub(crate) fn block_writes(block: &[Stmt]) -> HashSet<Name> {
    Census::of_block(block).written().cloned().collect()
}

/// Names written anywhere inside `expr` (match patterns, async bodies).
pub(crate) fn expr_writes(expr: &Expr) -> HashSet<Name> {
    let mut census = Census::default();
    census.add_expr(expr);
    census.written().cloned().collect()
}

/// Names written inside any `async` body of `block`, at any depth.
pub(crate) fn async_writes(block: &[Stmt]) -> HashSet<Name> {
    #[derive(Default)]
    struct AsyncWrites(HashSet<Name>);

    impl Visitor for AsyncWrites {
        fn visit_expr(&mut self, expr: &Expr) {
            if let Expr::Async(body) = expr {
                self.0.extend(block_writes(body));
            }
            self.super_visit_expr(expr);
        }
    }

    let mut collector = AsyncWrites::default();
    collector.visit_block(block);
    collector.0
}

/// Whether `expr` reads variable `name`.
pub(crate) fn reads_var(expr: &Expr, name: &str) -> bool {
    let mut census = Census::default();
    census.add_expr(expr);
    census.reads(name) > 0
}

/// Names a pattern binds when it matches, nested patterns included.
pub(crate) fn pattern_bindings(pattern: &Pattern) -> Vec<Name> {
    let mut names = Vec::new();
    collect_bindings(pattern, &mut names);
    names
}

fn collect_bindings(pattern: &Pattern, out: &mut Vec<Name>) {
    match pattern {
        Pattern::Literal(_) | Pattern::Wildcard => {}
        Pattern::Var(name) => out.push(name.clone()),
        Pattern::Object(fields) => {
            for field in fields {
                match &field.pattern {
                    Some(nested) => collect_bindings(nested, out),
                    None => out.push(field.key.clone()),
                }
            }
        }
        Pattern::Array { elements, rest } => {
            for element in elements {
                collect_bindings(element, out);
            }
            if let Some(rest) = rest {
                out.push(rest.clone());
            }
        }
    }
}

/// Whether evaluating `expr` can have no effect other than producing its
/// value.
///
/// Division can fault on a zero divisor, and field access, indexing, calls
/// and everything that runs nested code are treated as effectful.
pub(crate) fn is_pure(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(_) | Expr::Var(_) => true,
        Expr::Binary { op, left, right } => {
            *op != crate::ast::BinaryOp::Div && is_pure(left) && is_pure(right)
        }
        Expr::Unary { operand, .. } => is_pure(operand),
        Expr::Object(fields) => fields.iter().all(|field| is_pure(&field.value)),
        Expr::Array(elements) => elements.iter().all(is_pure),
        Expr::Field { .. }
        | Expr::Index { .. }
        | Expr::Call { .. }
        | Expr::Match { .. }
        | Expr::Async(_)
        | Expr::Await(_)
        | Expr::Unquote(_) => false,
    }
}
