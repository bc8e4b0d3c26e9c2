//! Compiler backend for the Quill handler language.
//!
//! Takes a parsed [`ast::Module`], expands its macros, optimizes each
//! handler body and lowers it to the `GLYP` stack-machine bytecode format.
//! [`api::Engine`] drives the whole pipeline; the stages are also usable on
//! their own.

pub mod api;
pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod macros;
pub mod optimizer;
