use ecow::EcoString;
use thiserror::Error;

use crate::api::{Diagnostic, Severity};

/// Macro expansion errors. Any of these aborts expansion of the whole module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacroError {
    #[error("undefined macro '{name}'")]
    UndefinedMacro { name: EcoString },

    #[error("macro '{name}' expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        name: EcoString,
        expected: usize,
        actual: usize,
    },

    #[error("expansion of macro '{name}' exceeded the nesting limit of {limit}")]
    ExpansionDepthExceeded { name: EcoString, limit: usize },
}

impl MacroError {
    pub fn code(&self) -> &'static str {
        match self {
            MacroError::UndefinedMacro { .. } => "E001",
            MacroError::ArityMismatch { .. } => "E002",
            MacroError::ExpansionDepthExceeded { .. } => "E003",
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let help = match self {
            MacroError::UndefinedMacro { .. } => None,
            MacroError::ArityMismatch { .. } => None,
            MacroError::ExpansionDepthExceeded { .. } => {
                Some("a macro that expands to an invocation of itself never terminates".into())
            }
        };
        Diagnostic {
            severity: Severity::Error,
            message: self.to_string(),
            help,
            code: Some(self.code().into()),
        }
    }
}
