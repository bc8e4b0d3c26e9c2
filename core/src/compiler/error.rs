//! Bytecode compilation errors.

use ecow::EcoString;
use thiserror::Error;

use crate::api::{Diagnostic, Severity};
use crate::macros::MacroError;

/// Errors that make a program invalid regardless of how it is executed.
///
/// These are terminal for the unit being compiled and must be reported to
/// the author of the handler; they never warrant retrying with a simpler
/// execution strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemanticError {
    #[error("variable '{name}' is already declared in this scope")]
    Redeclaration { name: EcoString },

    #[error("cannot assign to undeclared variable '{name}'")]
    UndeclaredAssignment { name: EcoString },
}

/// Errors that can occur while compiling a module or unit to bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    Macro(#[from] MacroError),

    #[error("undefined variable '{name}'")]
    UndefinedVariable { name: EcoString },

    #[error("unsupported expression: {kind}")]
    UnsupportedExpression { kind: &'static str },

    #[error("unsupported statement: {kind}")]
    UnsupportedStatement { kind: &'static str },

    #[error("constant of kind {kind} cannot be serialized")]
    UnsupportedConstant { kind: &'static str },

    #[error("module contains no items to compile")]
    EmptyModule,

    #[error("module has {items} item(s) but no route to compile")]
    NoRoute { items: usize },

    #[error("{what} does not fit in a 32-bit operand")]
    OperandOverflow { what: &'static str },
}

impl CompileError {
    /// Whether this error belongs to the semantic class (invalid program)
    /// rather than the structural one (unsupported construct or limit).
    pub fn is_semantic(&self) -> bool {
        matches!(self, CompileError::Semantic(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            CompileError::Semantic(SemanticError::Redeclaration { .. }) => "E010",
            CompileError::Semantic(SemanticError::UndeclaredAssignment { .. }) => "E011",
            CompileError::Macro(err) => err.code(),
            CompileError::UndefinedVariable { .. } => "E020",
            CompileError::UnsupportedExpression { .. } => "E021",
            CompileError::UnsupportedStatement { .. } => "E022",
            CompileError::UnsupportedConstant { .. } => "E023",
            CompileError::EmptyModule => "E024",
            CompileError::NoRoute { .. } => "E025",
            CompileError::OperandOverflow { .. } => "E026",
        }
    }

    /// Convert to a Diagnostic for API boundary.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let help = match self {
            CompileError::Semantic(SemanticError::Redeclaration { name }) => {
                Some(format!("use `{name} = ...` to update the existing binding"))
            }
            CompileError::Semantic(SemanticError::UndeclaredAssignment { name }) => {
                Some(format!("declare it first with `${name} = ...`"))
            }
            CompileError::Macro(err) => return err.to_diagnostic(),
            CompileError::UnsupportedExpression { kind: "unquote" } => {
                Some("unquote is only valid inside macro bodies".into())
            }
            CompileError::UnsupportedStatement { kind: "macro invocation" } => {
                Some("expand macros before compiling".into())
            }
            _ => None,
        };

        Diagnostic {
            severity: Severity::Error,
            message: self.to_string(),
            help,
            code: Some(self.code().into()),
        }
    }
}
