//! Tree optimizer.
//!
//! The optimizer consumes a statement list and returns a rewritten one; it
//! cannot fail. Each call builds its own pass context, so one [`Optimizer`]
//! can be reused across unrelated units.
//!
//! ## Levels
//!
//! - [`OptLevel::None`] returns the tree unchanged.
//! - [`OptLevel::Basic`] folds literal operations, applies algebraic
//!   identities, propagates constants and copies, and removes code after a
//!   `return` and branches whose condition is a literal boolean.
//! - [`OptLevel::Aggressive`] adds common-subexpression reuse, loop-invariant
//!   code motion for `while` loops, strength reduction, integer self-operand
//!   identities and removal of redundant stores.
//!
//! ## Facts
//!
//! The pass tracks, per variable, a known literal value, the variable it is
//! a copy of, and the binary expressions whose value it holds. Writing a
//! variable drops every fact that mentions it. Loop and switch bodies first
//! drop facts about everything they write; branches work on private copies
//! of the facts.

mod analysis;
mod context;
mod fold;
mod pass;
mod stats;


pub use fold::{fold_binary, fold_unary};
pub use stats::OptimizationStats;

use tracing::debug;

use crate::ast::{Block, Expr, Name, Stmt};
use pass::Pass;

/// How much rewriting to do. Each level includes everything below it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptLevel {
    None,
    #[default]
    Basic,
    Aggressive,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Optimizer {
    level: OptLevel,
}

impl Optimizer {
    pub fn new(level: OptLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> OptLevel {
        self.level
    }

    pub fn optimize_statements(&self, stmts: Block) -> Block {
        self.optimize_body(&[], stmts)
    }

    /// Optimize a unit body whose implicit `bindings` are defined before it
    /// runs.
    pub fn optimize_body(&self, bindings: &[Name], stmts: Block) -> Block {
        self.optimize_body_with_stats(bindings, stmts).0
    }

    pub fn optimize_statements_with_stats(&self, stmts: Block) -> (Block, OptimizationStats) {
        self.optimize_body_with_stats(&[], stmts)
    }

    pub fn optimize_body_with_stats(
        &self,
        bindings: &[Name],
        stmts: Vec<Stmt>,
    ) -> (Block, OptimizationStats) {
        if self.level == OptLevel::None {
            return (stmts, OptimizationStats::default());
        }

        let mut pass = Pass::new(self.level, bindings, &stmts);
        let optimized = pass.run(stmts);
        if !pass.stats.is_empty() {
            debug!(level = ?self.level, stats = %pass.stats, "Optimized body");
        }
        (optimized, pass.stats)
    }

    /// Optimize one expression with nothing known about its variables.
    pub fn optimize_expression(&self, expr: Expr) -> Expr {
        if self.level == OptLevel::None {
            return expr;
        }
        let mut pass = Pass::new(self.level, &[], &[]);
        pass.run_expr(expr)
    }
}
