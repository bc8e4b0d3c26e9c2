use super::{Expr, Pattern, Stmt};

/// Trait for visiting trees without mutation.
///
/// The default implementations handle recursion automatically; override a
/// `visit_*` method to observe a node kind and call the matching
/// `super_visit_*` to keep descending.
///
/// # Example
///
/// ```
/// use quill_core::ast::{BinaryOp, Expr, visit::Visitor};
///
/// struct VarCounter(usize);
///
/// impl Visitor for VarCounter {
///     fn visit_expr(&mut self, expr: &Expr) {
///         if let Expr::Var(_) = expr {
///             self.0 += 1;
///         }
///         self.super_visit_expr(expr);
///     }
/// }
///
/// let expr = Expr::binary(BinaryOp::Add, Expr::var("a"), Expr::var("b"));
/// let mut counter = VarCounter(0);
/// counter.visit_expr(&expr);
/// assert_eq!(counter.0, 2);
/// ```
pub trait Visitor {
    fn visit_expr(&mut self, expr: &Expr) {
        self.super_visit_expr(expr)
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        self.super_visit_stmt(stmt)
    }

    fn visit_pattern(&mut self, pattern: &Pattern) {
        self.super_visit_pattern(pattern)
    }

    fn visit_block(&mut self, block: &[Stmt]) {
        for stmt in block {
            self.visit_stmt(stmt);
        }
    }

    /// Default recursion into sub-expressions.
    ///
    /// Override `visit_expr` instead of this method.
    fn super_visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) | Expr::Var(_) => {}
            Expr::Binary { left, right, .. } => {
                self.visit_expr(left);
                self.visit_expr(right);
            }
            Expr::Unary { operand, .. } => self.visit_expr(operand),
            Expr::Object(fields) => {
                for field in fields {
                    self.visit_expr(&field.value);
                }
            }
            Expr::Array(elements) => {
                for element in elements {
                    self.visit_expr(element);
                }
            }
            Expr::Field { object, .. } => self.visit_expr(object),
            Expr::Index { array, index } => {
                self.visit_expr(array);
                self.visit_expr(index);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    self.visit_expr(arg);
                }
            }
            Expr::Match { scrutinee, cases } => {
                self.visit_expr(scrutinee);
                for case in cases {
                    self.visit_pattern(&case.pattern);
                    if let Some(guard) = &case.guard {
                        self.visit_expr(guard);
                    }
                    self.visit_expr(&case.body);
                }
            }
            Expr::Async(body) => self.visit_block(body),
            Expr::Await(inner) | Expr::Unquote(inner) => self.visit_expr(inner),
        }
    }

    /// Default recursion into a statement's expressions and blocks.
    ///
    /// Override `visit_stmt` instead of this method.
    fn super_visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Declare { value, .. } | Stmt::Assign { value, .. } => self.visit_expr(value),
            Stmt::Return(expr) | Stmt::Expr(expr) | Stmt::Validate(expr) => self.visit_expr(expr),
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                self.visit_expr(cond);
                self.visit_block(then_block);
                self.visit_block(else_block);
            }
            Stmt::While { cond, body } => {
                self.visit_expr(cond);
                self.visit_block(body);
            }
            Stmt::For { iterable, body, .. } => {
                self.visit_expr(iterable);
                self.visit_block(body);
            }
            Stmt::Switch {
                scrutinee,
                cases,
                default,
            } => {
                self.visit_expr(scrutinee);
                for case in cases {
                    self.visit_expr(&case.value);
                    self.visit_block(&case.body);
                }
                self.visit_block(default);
            }
            Stmt::Macro(invocation) => {
                for arg in &invocation.args {
                    self.visit_expr(arg);
                }
            }
        }
    }

    fn super_visit_pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Literal(_) | Pattern::Var(_) | Pattern::Wildcard => {}
            Pattern::Object(fields) => {
                for field in fields {
                    if let Some(nested) = &field.pattern {
                        self.visit_pattern(nested);
                    }
                }
            }
            Pattern::Array { elements, .. } => {
                for element in elements {
                    self.visit_pattern(element);
                }
            }
        }
    }
}
