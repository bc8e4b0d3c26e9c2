//! Literal folding and algebraic identities.
//!
//! These are local rewrites: they look at one operator node whose operands
//! have already been optimized and never consult dataflow facts.

use crate::ast::{BinaryOp, Expr, Literal, UnaryOp};

use super::analysis::is_pure;

/// Evaluate `left op right` at compile time.
///
/// Returns `None` whenever the result must be left to the runtime: mixed
/// kinds, strings and nulls, integer division by zero, and integer overflow.
pub fn fold_binary(op: BinaryOp, left: &Literal, right: &Literal) -> Option<Literal> {
    use BinaryOp::*;

    match (left, right) {
        (Literal::Int(a), Literal::Int(b)) => {
            let (a, b) = (*a, *b);
            match op {
                Add => a.checked_add(b).map(Literal::Int),
                Sub => a.checked_sub(b).map(Literal::Int),
                Mul => a.checked_mul(b).map(Literal::Int),
                Div if b != 0 => a.checked_div(b).map(Literal::Int),
                Div => None,
                Eq => Some(Literal::Bool(a == b)),
                Ne => Some(Literal::Bool(a != b)),
                Lt => Some(Literal::Bool(a < b)),
                Le => Some(Literal::Bool(a <= b)),
                Gt => Some(Literal::Bool(a > b)),
                Ge => Some(Literal::Bool(a >= b)),
                And | Or => None,
            }
        }
        (Literal::Float(a), Literal::Float(b)) => {
            let (a, b) = (*a, *b);
            match op {
                Eq => Some(Literal::Bool(a == b)),
                Ne => Some(Literal::Bool(a != b)),
                Lt => Some(Literal::Bool(a < b)),
                Le => Some(Literal::Bool(a <= b)),
                Gt => Some(Literal::Bool(a > b)),
                Ge => Some(Literal::Bool(a >= b)),
                _ => None,
            }
        }
        (Literal::Bool(a), Literal::Bool(b)) => match op {
            And => Some(Literal::Bool(*a && *b)),
            Or => Some(Literal::Bool(*a || *b)),
            Eq => Some(Literal::Bool(a == b)),
            Ne => Some(Literal::Bool(a != b)),
            _ => None,
        },
        _ => None,
    }
}

pub fn fold_unary(op: UnaryOp, operand: &Literal) -> Option<Literal> {
    match (op, operand) {
        (UnaryOp::Neg, Literal::Int(v)) => v.checked_neg().map(Literal::Int),
        (UnaryOp::Neg, Literal::Float(v)) => Some(Literal::Float(-v)),
        (UnaryOp::Not, Literal::Bool(v)) => Some(Literal::Bool(!v)),
        _ => None,
    }
}

/// Result of an algebraic identity.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Simplified {
    Left,
    Right,
    Constant(Literal),
}

/// Identity that applies to `left op right` when exactly one side is a
/// literal.
///
/// Rewrites that drop an operand only fire when the dropped operand is
/// pure, and arithmetic identities only recognize integer `0` and `1`.
pub(crate) fn identity(op: BinaryOp, left: &Expr, right: &Expr) -> Option<Simplified> {
    use BinaryOp::*;

    let (l, r) = (left.as_literal(), right.as_literal());
    if l.is_some() == r.is_some() {
        return None;
    }
    let int = |lit: Option<&Literal>| lit.and_then(Literal::as_int);
    let boolean = |lit: Option<&Literal>| lit.and_then(Literal::as_bool);

    match op {
        Add if int(r) == Some(0) => Some(Simplified::Left),
        Add if int(l) == Some(0) => Some(Simplified::Right),
        Sub if int(r) == Some(0) => Some(Simplified::Left),
        Mul if int(r) == Some(1) => Some(Simplified::Left),
        Mul if int(l) == Some(1) => Some(Simplified::Right),
        Mul if int(r) == Some(0) && is_pure(left) => Some(Simplified::Constant(Literal::Int(0))),
        Mul if int(l) == Some(0) && is_pure(right) => Some(Simplified::Constant(Literal::Int(0))),
        Div if int(r) == Some(1) => Some(Simplified::Left),
        And if boolean(l) == Some(true) => Some(Simplified::Right),
        And if boolean(r) == Some(false) && is_pure(left) => {
            Some(Simplified::Constant(Literal::Bool(false)))
        }
        And if boolean(l) == Some(false) && is_pure(right) => {
            Some(Simplified::Constant(Literal::Bool(false)))
        }
        Or if boolean(l) == Some(true) && is_pure(right) => {
            Some(Simplified::Constant(Literal::Bool(true)))
        }
        Or if boolean(l) == Some(false) => Some(Simplified::Right),
        _ => None,
    }
}

/// `x op x` where both sides are the same integer literal.
///
/// Restricted to integers: for floats `x == x` fails on NaN. Division is
/// never rewritten since `0 / 0` must fault at runtime.
pub(crate) fn self_identity(op: BinaryOp, left: &Expr, right: &Expr) -> Option<Literal> {
    use BinaryOp::*;

    let (Some(Literal::Int(a)), Some(Literal::Int(b))) = (left.as_literal(), right.as_literal())
    else {
        return None;
    };
    if a != b {
        return None;
    }
    match op {
        Sub => Some(Literal::Int(0)),
        Eq | Le | Ge => Some(Literal::Bool(true)),
        Ne | Lt | Gt => Some(Literal::Bool(false)),
        _ => None,
    }
}

/// `x * 2` or `2 * x` as `x + x`, for a pure non-literal `x`.
pub(crate) fn strength_reduce(op: BinaryOp, left: &Expr, right: &Expr) -> Option<Expr> {
    if op != BinaryOp::Mul {
        return None;
    }
    let doubled = |lit: &Expr, other: &Expr| {
        lit.as_literal().and_then(Literal::as_int) == Some(2)
            && other.as_literal().is_none()
            && is_pure(other)
    };
    let operand = if doubled(right, left) {
        left
    } else if doubled(left, right) {
        right
    } else {
        return None;
    };
    Some(Expr::binary(BinaryOp::Add, operand.clone(), operand.clone()))
}
