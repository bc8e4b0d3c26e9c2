//! Bytecode compiler for handler bodies.
//!
//! This module lowers (optimized) trees into the stack-machine instruction
//! stream consumed by the VM, one compilation unit at a time.
//!
//! ## Design
//!
//! - Variables are addressed by the constant-pool index of their name
//! - Scopes are tracked by a [`SymbolTable`] of nested name -> slot maps
//! - Forward jumps are emitted with placeholder targets and patched once the
//!   target offset is known; targets stay relative to the instruction section
//!   until final assembly rebases them past the header
//! - `async` bodies are emitted inline behind an `Async` instruction that
//!   carries their byte length

mod emitter;
mod error;
pub mod symbols;


pub use emitter::{BytecodeCompiler, UnitKind, route_params};
pub use error::{CompileError, SemanticError};
pub use symbols::{ScopeKind, Symbol, SymbolTable};
