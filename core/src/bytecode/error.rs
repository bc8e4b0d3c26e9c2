use thiserror::Error;

use crate::api::{Diagnostic, Severity};

/// Errors raised while reading a bytecode buffer back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("bad magic tag {found:02x?}")]
    BadMagic { found: [u8; 4] },

    #[error("unsupported bytecode version {found}")]
    UnsupportedVersion { found: u32 },

    #[error("buffer truncated at offset {offset} while reading {what}")]
    Truncated { offset: usize, what: &'static str },

    #[error("unknown constant tag {tag:#04x} at offset {offset}")]
    UnknownConstantTag { tag: u8, offset: usize },

    #[error("string constant at offset {offset} is not valid UTF-8")]
    InvalidString { offset: usize },

    #[error("unknown opcode {byte:#04x} at offset {offset}")]
    UnknownOpcode { byte: u8, offset: usize },

    #[error("{extra} trailing byte(s) after the instruction section")]
    TrailingBytes { extra: usize },
}

impl DecodeError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error,
            message: self.to_string(),
            help: None,
            code: Some("E030".into()),
        }
    }
}
