//! Tree model shared by the macro expander, the optimizer and the emitter.
//!
//! The tree is a plain owned tagged union: every child is held by unique
//! ownership (`Box` or `Vec`), and rewriting passes consume a tree and
//! return a new one. There is exactly one representation per node kind.
//!
//! Top-level [`Item`]s group handler bodies (routes, commands, cron tasks,
//! event handlers, queue workers) together with type declarations and macro
//! definitions/invocations that are resolved before compilation.

mod literal;
mod ops;
pub mod visit;

pub use literal::{Literal, LiteralKey};
pub use ops::{BinaryOp, UnaryOp};

use ecow::EcoString;

/// Identifier type used throughout the tree (variables, fields, macro names).
pub type Name = EcoString;

/// A statement block.
pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Var(Name),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Object literal. Keys are unique within one literal.
    Object(Vec<ObjectField>),
    Array(Vec<Expr>),
    Field {
        object: Box<Expr>,
        field: Name,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        name: Name,
        args: Vec<Expr>,
    },
    /// First matching case wins, top to bottom.
    Match {
        scrutinee: Box<Expr>,
        cases: Vec<MatchCase>,
    },
    /// Block evaluated to a deferred result.
    Async(Block),
    Await(Box<Expr>),
    /// Meta-level splice, only valid inside macro bodies.
    Unquote(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectField {
    pub key: Name,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Literal(Literal),
    /// Always matches and binds the scrutinee.
    Var(Name),
    Wildcard,
    Object(Vec<FieldPattern>),
    Array {
        elements: Vec<Pattern>,
        rest: Option<Name>,
    },
}

/// `key` alone binds the field to a variable named `key`; `key: pattern`
/// matches the field value against a nested pattern instead.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPattern {
    pub key: Name,
    pub pattern: Option<Pattern>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `$x = value`: introduces a binding.
    Declare { target: Name, value: Expr },
    /// `x = value`: mutates an existing binding.
    Assign { target: Name, value: Expr },
    Return(Expr),
    If {
        cond: Expr,
        then_block: Block,
        else_block: Block,
    },
    While {
        cond: Expr,
        body: Block,
    },
    For {
        key: Option<Name>,
        value: Name,
        iterable: Expr,
        body: Block,
    },
    Switch {
        scrutinee: Expr,
        cases: Vec<SwitchCase>,
        default: Block,
    },
    Expr(Expr),
    /// Validation placeholder; compiles to nothing.
    Validate(Expr),
    /// Statement-level macro invocation, removed by expansion.
    Macro(MacroInvocation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub value: Expr,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    pub name: Name,
    pub params: Vec<Name>,
    pub body: Vec<MacroNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroInvocation {
    pub name: Name,
    pub args: Vec<Expr>,
}

/// A node of a macro body. Expanding an item-level invocation keeps the
/// items it produces; expanding a statement-level one keeps the statements.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroNode {
    Item(Item),
    Stmt(Stmt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub method: Name,
    pub path: EcoString,
    pub injections: Vec<Name>,
    /// Authentication scheme, when the route requires one.
    pub auth: Option<Name>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: Name,
    pub params: Vec<Name>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CronTask {
    pub name: Name,
    pub schedule: EcoString,
    pub injections: Vec<Name>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventHandler {
    pub event_type: Name,
    pub injections: Vec<Name>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueWorker {
    pub queue: Name,
    pub injections: Vec<Name>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: Name,
    pub fields: Vec<Name>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Route(Route),
    Command(Command),
    Cron(CronTask),
    Event(EventHandler),
    Queue(QueueWorker),
    TypeDef(TypeDef),
    MacroDef(MacroDef),
    MacroInvocation(MacroInvocation),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub items: Vec<Item>,
}

// === Convenience constructors ===

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Expr::Literal(Literal::Float(value))
    }

    pub fn bool(value: bool) -> Self {
        Expr::Literal(Literal::Bool(value))
    }

    pub fn str(value: impl Into<EcoString>) -> Self {
        Expr::Literal(Literal::Str(value.into()))
    }

    pub fn null() -> Self {
        Expr::Literal(Literal::Null)
    }

    pub fn var(name: impl Into<Name>) -> Self {
        Expr::Var(name.into())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn call(name: impl Into<Name>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn field(object: Expr, field: impl Into<Name>) -> Self {
        Expr::Field {
            object: Box::new(object),
            field: field.into(),
        }
    }

    pub fn index(array: Expr, index: Expr) -> Self {
        Expr::Index {
            array: Box::new(array),
            index: Box::new(index),
        }
    }

    /// Returns the literal if this expression is one.
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expr::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// Node kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Literal(_) => "literal",
            Expr::Var(_) => "variable",
            Expr::Binary { .. } => "binary operation",
            Expr::Unary { .. } => "unary operation",
            Expr::Object(_) => "object literal",
            Expr::Array(_) => "array literal",
            Expr::Field { .. } => "field access",
            Expr::Index { .. } => "index",
            Expr::Call { .. } => "function call",
            Expr::Match { .. } => "match",
            Expr::Async(_) => "async block",
            Expr::Await(_) => "await",
            Expr::Unquote(_) => "unquote",
        }
    }
}

impl Stmt {
    pub fn declare(target: impl Into<Name>, value: Expr) -> Self {
        Stmt::Declare {
            target: target.into(),
            value,
        }
    }

    pub fn assign(target: impl Into<Name>, value: Expr) -> Self {
        Stmt::Assign {
            target: target.into(),
            value,
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Stmt::Return(_))
    }

    /// Node kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Stmt::Declare { .. } => "declaration",
            Stmt::Assign { .. } => "assignment",
            Stmt::Return(_) => "return",
            Stmt::If { .. } => "if",
            Stmt::While { .. } => "while",
            Stmt::For { .. } => "for",
            Stmt::Switch { .. } => "switch",
            Stmt::Expr(_) => "expression statement",
            Stmt::Validate(_) => "validation",
            Stmt::Macro(_) => "macro invocation",
        }
    }
}

impl Item {
    /// Name used for logging and compiled-unit bookkeeping.
    pub fn display_name(&self) -> EcoString {
        match self {
            Item::Route(route) => ecow::eco_format!("{} {}", route.method, route.path),
            Item::Command(cmd) => cmd.name.clone(),
            Item::Cron(task) => task.name.clone(),
            Item::Event(handler) => handler.event_type.clone(),
            Item::Queue(worker) => worker.queue.clone(),
            Item::TypeDef(def) => def.name.clone(),
            Item::MacroDef(def) => def.name.clone(),
            Item::MacroInvocation(inv) => inv.name.clone(),
        }
    }
}
