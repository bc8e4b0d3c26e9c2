//! Statement- and item-level macro expansion.
//!
//! Macros are expanded on the tree before optimization: every invocation is
//! replaced by a copy of the macro body with its parameters substituted.
//! `${param}` placeholders in string literals, assignment targets and route
//! paths are interpolated as part of the same walk.

mod error;
mod expander;

#[cfg(test)]
mod expander_test;

pub use error::MacroError;
pub use expander::{DEFAULT_MAX_DEPTH, MacroExpander};
