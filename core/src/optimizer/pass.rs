//! The rewriting walk over one unit body.

use hashbrown::HashSet;
use tracing::trace;

use crate::ast::{
    BinaryOp, Block, Expr, Literal, MatchCase, Name, ObjectField, Stmt, SwitchCase, UnaryOp,
};

use super::analysis::{
    Census, async_writes, block_writes, expr_writes, is_pure, pattern_bindings, reads_var,
};
use super::context::{ExprKey, Facts};
use super::fold::{Simplified, fold_binary, fold_unary, identity, self_identity, strength_reduce};
use super::{OptLevel, OptimizationStats};

pub(super) struct Pass<'a> {
    level: OptLevel,
    /// Reads and writes over the whole unit body, taken before rewriting.
    census: Census,
    /// Names bound by the unit before its body runs.
    bindings: &'a [Name],
    /// Names declared so far at the top level of the unit body. These stay
    /// in scope for everything after them.
    top_level: HashSet<Name>,
    /// Nesting of the block being rewritten; the unit body is depth 1.
    depth: usize,
    pub(super) stats: OptimizationStats,
}

impl<'a> Pass<'a> {
    pub(super) fn new(level: OptLevel, bindings: &'a [Name], body: &[Stmt]) -> Self {
        Pass {
            level,
            census: Census::of_block(body),
            bindings,
            top_level: HashSet::new(),
            depth: 0,
            stats: OptimizationStats::default(),
        }
    }

    pub(super) fn run(&mut self, body: Block) -> Block {
        let mut facts = Facts::with_volatile(async_writes(&body));
        self.block(body, &mut facts)
    }

    /// Rewrite a standalone expression with no surrounding facts.
    pub(super) fn run_expr(&mut self, expr: Expr) -> Expr {
        let mut census = Census::default();
        census.add_expr(&expr);
        self.census = census;
        let mut facts = Facts::default();
        self.expr(expr, &mut facts)
    }

    fn aggressive(&self) -> bool {
        self.level >= OptLevel::Aggressive
    }

    // === Statements ===

    fn block(&mut self, block: Block, facts: &mut Facts) -> Block {
        self.depth += 1;
        let mut out = Vec::with_capacity(block.len());
        let mut stmts = block.into_iter();
        while let Some(stmt) = stmts.next() {
            self.stmt(stmt, facts, &mut out);
            if out.last().is_some_and(Stmt::is_return) {
                let dead = stmts.len();
                if dead > 0 {
                    self.stats.dead_statements_removed += dead;
                    trace!(dead, "Removed unreachable statements after return");
                }
                break;
            }
        }
        if self.aggressive() {
            out = self.drop_overwritten_stores(out);
        }
        self.depth -= 1;
        out
    }

    fn stmt(&mut self, stmt: Stmt, facts: &mut Facts, out: &mut Block) {
        match stmt {
            Stmt::Declare { target, value } => {
                let value = self.expr(value, facts);
                if self.depth == 1 {
                    self.top_level.insert(target.clone());
                }
                facts.invalidate(&target);
                facts.record(&target, &value);
                out.push(Stmt::Declare { target, value });
            }
            Stmt::Assign { target, value } => {
                let value = self.expr(value, facts);
                if self.aggressive() && self.is_self_assignment(&target, &value) {
                    self.stats.redundant_stores_removed += 1;
                    trace!(%target, "Removed self-assignment");
                    return;
                }
                facts.invalidate(&target);
                facts.record(&target, &value);
                out.push(Stmt::Assign { target, value });
            }
            Stmt::Return(value) => out.push(Stmt::Return(self.expr(value, facts))),
            Stmt::Expr(value) => out.push(Stmt::Expr(self.expr(value, facts))),
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => self.if_stmt(cond, then_block, else_block, facts, out),
            Stmt::While { cond, body } => self.while_stmt(cond, body, facts, out),
            Stmt::For {
                key,
                value,
                iterable,
                body,
            } => {
                let iterable = self.expr(iterable, facts);
                let mut writes = block_writes(&body);
                writes.extend(key.iter().cloned());
                writes.insert(value.clone());
                facts.invalidate_all(&writes);

                let mut body_facts = facts.clone();
                let body = self.block(body, &mut body_facts);
                out.push(Stmt::For {
                    key,
                    value,
                    iterable,
                    body,
                });
            }
            Stmt::Switch {
                scrutinee,
                cases,
                default,
            } => self.switch_stmt(scrutinee, cases, default, facts, out),
            // Validation and leftover macro statements carry no runtime code
            // the optimizer could improve.
            stmt @ (Stmt::Validate(_) | Stmt::Macro(_)) => out.push(stmt),
        }
    }

    /// `x = x` is only dropped when `x` is certainly in scope: an implicit
    /// binding or an earlier top-level declaration. Anything else still
    /// reaches the emitter's undeclared-assignment check.
    fn is_self_assignment(&self, target: &Name, value: &Expr) -> bool {
        matches!(value, Expr::Var(source) if source == target)
            && (self.top_level.contains(target) || self.bindings.contains(target))
    }

    fn if_stmt(
        &mut self,
        cond: Expr,
        then_block: Block,
        else_block: Block,
        facts: &mut Facts,
        out: &mut Block,
    ) {
        let cond = self.expr(cond, facts);

        if let Some(taken) = cond.as_literal().and_then(Literal::as_bool) {
            let (kept, dropped) = if taken {
                (then_block, else_block)
            } else {
                (else_block, then_block)
            };
            self.stats.dead_branches_removed += 1;
            trace!(taken, dropped = dropped.len(), "Eliminated dead branch");

            let declared: Vec<Name> = kept
                .iter()
                .filter_map(|stmt| match stmt {
                    Stmt::Declare { target, .. } => Some(target.clone()),
                    _ => None,
                })
                .collect();
            let kept = self.block(kept, facts);
            if declared.is_empty() {
                out.extend(kept);
            } else {
                // Keep the block so its declarations stay scoped to it.
                facts.invalidate_all(&declared);
                out.push(Stmt::If {
                    cond: Expr::bool(true),
                    then_block: kept,
                    else_block: Vec::new(),
                });
            }
            return;
        }

        let mut writes = block_writes(&then_block);
        writes.extend(block_writes(&else_block));

        let mut then_facts = facts.clone();
        let then_block = self.block(then_block, &mut then_facts);
        let mut else_facts = facts.clone();
        let else_block = self.block(else_block, &mut else_facts);

        facts.invalidate_all(&writes);
        out.push(Stmt::If {
            cond,
            then_block,
            else_block,
        });
    }

    fn while_stmt(&mut self, cond: Expr, body: Block, facts: &mut Facts, out: &mut Block) {
        let body = if self.aggressive() {
            let (hoisted, body) = self.hoist_invariants(&cond, body);
            for stmt in hoisted {
                self.stmt(stmt, facts, out);
            }
            body
        } else {
            body
        };

        let mut writes = block_writes(&body);
        writes.extend(expr_writes(&cond));
        facts.invalidate_all(&writes);

        let cond = self.expr(cond, facts);
        if cond.as_literal().and_then(Literal::as_bool) == Some(false) {
            self.stats.dead_branches_removed += 1;
            trace!(statements = body.len(), "Removed loop that never runs");
            return;
        }

        let mut body_facts = facts.clone();
        let body = self.block(body, &mut body_facts);
        out.push(Stmt::While { cond, body });
    }

    fn switch_stmt(
        &mut self,
        scrutinee: Expr,
        cases: Vec<SwitchCase>,
        default: Block,
        facts: &mut Facts,
        out: &mut Block,
    ) {
        let scrutinee = self.expr(scrutinee, facts);

        let mut writes = block_writes(&default);
        for case in &cases {
            writes.extend(expr_writes(&case.value));
            writes.extend(block_writes(&case.body));
        }
        facts.invalidate_all(&writes);

        let cases = cases
            .into_iter()
            .map(|case| {
                let mut case_facts = facts.clone();
                let value = self.expr(case.value, &mut case_facts);
                let body = self.block(case.body, &mut case_facts);
                SwitchCase { value, body }
            })
            .collect();
        let mut default_facts = facts.clone();
        let default = self.block(default, &mut default_facts);

        out.push(Stmt::Switch {
            scrutinee,
            cases,
            default,
        });
    }

    // === Loop-Invariant Code Motion ===

    /// Split a `while` body into statements that can run once before the
    /// loop and the statements that stay in it.
    ///
    /// A top-level declaration or assignment moves out when all of these
    /// hold:
    /// - its value is pure and reads nothing the loop (body or condition)
    ///   writes;
    /// - its target is not read by the condition, is written exactly once in
    ///   the loop, and is not read by any statement before it in the body;
    /// - its target is not read anywhere outside the loop, so running the
    ///   store when the loop body never executes is unobservable;
    /// - for a declaration, nothing outside the loop writes the target and
    ///   the unit does not bind it implicitly.
    fn hoist_invariants(&mut self, cond: &Expr, body: Block) -> (Block, Block) {
        let mut loop_census = Census::default();
        loop_census.add_expr(cond);
        loop_census.add_block(&body);
        let mut cond_census = Census::default();
        cond_census.add_expr(cond);

        let movable: Vec<bool> = body
            .iter()
            .enumerate()
            .map(|(index, stmt)| {
                let (target, value, declares) = match stmt {
                    Stmt::Declare { target, value } => (target, value, true),
                    Stmt::Assign { target, value } => (target, value, false),
                    _ => return false,
                };
                if !is_pure(value) {
                    return false;
                }
                let mut value_census = Census::default();
                value_census.add_expr(value);
                if value_census.read().any(|name| loop_census.writes(name) > 0) {
                    return false;
                }
                if cond_census.reads(target) > 0 || loop_census.writes(target) != 1 {
                    return false;
                }
                if Census::of_block(&body[..index]).reads(target) > 0 {
                    return false;
                }
                if self.census.reads(target) != loop_census.reads(target) {
                    return false;
                }
                !declares
                    || (self.census.writes(target) == loop_census.writes(target)
                        && !self.bindings.contains(target))
            })
            .collect();

        let mut hoisted = Vec::new();
        let mut kept = Vec::with_capacity(body.len());
        for (stmt, movable) in body.into_iter().zip(movable) {
            if movable {
                if let Stmt::Declare { target, .. } | Stmt::Assign { target, .. } = &stmt {
                    trace!(%target, "Hoisted loop invariant");
                }
                self.stats.invariants_hoisted += 1;
                hoisted.push(stmt);
            } else {
                kept.push(stmt);
            }
        }
        (hoisted, kept)
    }

    // === Peephole ===

    /// Of two consecutive assignments to one variable, the first is dead
    /// when its value is pure and the second does not read the variable.
    fn drop_overwritten_stores(&mut self, block: Block) -> Block {
        let mut kept = Vec::with_capacity(block.len());
        let mut stmts = block.into_iter().peekable();
        while let Some(stmt) = stmts.next() {
            if let (
                Stmt::Assign { target, value },
                Some(Stmt::Assign {
                    target: next_target,
                    value: next_value,
                }),
            ) = (&stmt, stmts.peek())
            {
                if target == next_target && is_pure(value) && !reads_var(next_value, target) {
                    self.stats.redundant_stores_removed += 1;
                    trace!(%target, "Removed overwritten store");
                    continue;
                }
            }
            kept.push(stmt);
        }
        kept
    }

    // === Expressions ===

    fn expr(&mut self, expr: Expr, facts: &mut Facts) -> Expr {
        match expr {
            Expr::Literal(_) | Expr::Unquote(_) => expr,
            Expr::Var(name) => self.propagate(name, facts),
            Expr::Binary { op, left, right } => {
                let left = self.expr(*left, facts);
                let right = self.expr(*right, facts);
                self.binary(op, left, right, facts)
            }
            Expr::Unary { op, operand } => {
                let operand = self.expr(*operand, facts);
                self.unary(op, operand)
            }
            Expr::Object(fields) => Expr::Object(
                fields
                    .into_iter()
                    .map(|field| ObjectField {
                        key: field.key,
                        value: self.expr(field.value, facts),
                    })
                    .collect(),
            ),
            Expr::Array(elements) => Expr::Array(
                elements
                    .into_iter()
                    .map(|element| self.expr(element, facts))
                    .collect(),
            ),
            Expr::Field { object, field } => Expr::Field {
                object: Box::new(self.expr(*object, facts)),
                field,
            },
            Expr::Index { array, index } => {
                let array = self.expr(*array, facts);
                let index = self.expr(*index, facts);
                Expr::Index {
                    array: Box::new(array),
                    index: Box::new(index),
                }
            }
            Expr::Call { name, args } => Expr::Call {
                name,
                args: args.into_iter().map(|arg| self.expr(arg, facts)).collect(),
            },
            Expr::Match { scrutinee, cases } => self.match_expr(*scrutinee, cases, facts),
            Expr::Async(body) => {
                let mut detached = facts.isolated();
                Expr::Async(self.block(body, &mut detached))
            }
            Expr::Await(inner) => Expr::Await(Box::new(self.expr(*inner, facts))),
        }
    }

    fn propagate(&mut self, name: Name, facts: &Facts) -> Expr {
        if let Some(lit) = facts.constant(&name) {
            self.stats.constants_propagated += 1;
            trace!(%name, value = %lit, "Propagated constant");
            return Expr::Literal(lit.clone());
        }

        let root = facts.resolve(&name);
        if root == name {
            return Expr::Var(name);
        }
        self.stats.copies_propagated += 1;
        trace!(%name, %root, "Propagated copy");
        match facts.constant(&root) {
            Some(lit) => {
                self.stats.constants_propagated += 1;
                Expr::Literal(lit.clone())
            }
            None => Expr::Var(root),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: Expr, right: Expr, facts: &Facts) -> Expr {
        if self.aggressive() {
            if let Some(lit) = self_identity(op, &left, &right) {
                self.stats.identities_simplified += 1;
                trace!(%op, result = %lit, "Simplified self-operand identity");
                return Expr::Literal(lit);
            }
        }

        if let (Some(l), Some(r)) = (left.as_literal(), right.as_literal()) {
            if let Some(lit) = fold_binary(op, l, r) {
                self.stats.constants_folded += 1;
                trace!(%op, result = %lit, "Folded constant");
                return Expr::Literal(lit);
            }
        }

        if let Some(simplified) = identity(op, &left, &right) {
            self.stats.identities_simplified += 1;
            trace!(%op, "Simplified algebraic identity");
            return match simplified {
                Simplified::Left => left,
                Simplified::Right => right,
                Simplified::Constant(lit) => Expr::Literal(lit),
            };
        }

        if !self.aggressive() {
            return Expr::binary(op, left, right);
        }

        let expr = match strength_reduce(op, &left, &right) {
            Some(reduced) => {
                self.stats.strength_reductions += 1;
                trace!("Reduced multiplication by two to addition");
                reduced
            }
            None => Expr::binary(op, left, right),
        };

        if let Some(holder) = ExprKey::of(&expr).and_then(|key| facts.available(&key)) {
            self.stats.subexpressions_eliminated += 1;
            trace!(%holder, "Reused common subexpression");
            return Expr::Var(holder.clone());
        }
        expr
    }

    fn unary(&mut self, op: UnaryOp, operand: Expr) -> Expr {
        if let Some(lit) = operand.as_literal().and_then(|lit| fold_unary(op, lit)) {
            self.stats.constants_folded += 1;
            trace!(%op, result = %lit, "Folded constant");
            return Expr::Literal(lit);
        }
        Expr::unary(op, operand)
    }

    /// Every name a match may store to is unknown from the scrutinee on;
    /// each case starts from that state and keeps its own facts.
    fn match_expr(&mut self, scrutinee: Expr, cases: Vec<MatchCase>, facts: &mut Facts) -> Expr {
        let scrutinee = self.expr(scrutinee, facts);

        let mut writes: HashSet<Name> = HashSet::new();
        for case in &cases {
            writes.extend(pattern_bindings(&case.pattern));
            if let Some(guard) = &case.guard {
                writes.extend(expr_writes(guard));
            }
            writes.extend(expr_writes(&case.body));
        }
        facts.invalidate_all(&writes);

        let cases = cases
            .into_iter()
            .map(|case| {
                let mut case_facts = facts.clone();
                let guard = case.guard.map(|guard| self.expr(guard, &mut case_facts));
                let body = self.expr(case.body, &mut case_facts);
                MatchCase {
                    pattern: case.pattern,
                    guard,
                    body,
                }
            })
            .collect();

        Expr::Match {
            scrutinee: Box::new(scrutinee),
            cases,
        }
    }
}
