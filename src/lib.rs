//! Quill - a compiler backend for HTTP handler programs
//!
//! # Overview
//!
//! Quill turns the parsed form of a handler module into compact bytecode for
//! a stack machine. Handlers are routes, commands, cron tasks, event handlers
//! and queue workers; modules may also define macros that generate any of
//! these.
//!
//! The pipeline has three stages:
//!
//! 1. **Macro expansion**: definitions are collected and every invocation
//!    is replaced by its substituted body.
//! 2. **Optimization**: constant folding, propagation and dead-code removal,
//!    with more passes at [`OptLevel::Aggressive`].
//! 3. **Emission**: each body becomes a `GLYP` buffer holding a constant
//!    pool and an instruction section with absolute jump targets.
//!
//! # Quick Start
//!
//! ```
//! use quill::{CompilationOptions, Engine, OptLevel};
//! use quill::ast::{BinaryOp, Expr, Item, Module, Route, Stmt};
//! use quill::bytecode::Program;
//!
//! let module = Module {
//!     items: vec![Item::Route(Route {
//!         method: "GET".into(),
//!         path: "/users/:id".into(),
//!         injections: vec![],
//!         auth: None,
//!         body: vec![Stmt::Return(Expr::binary(
//!             BinaryOp::Mul,
//!             Expr::int(6),
//!             Expr::int(7),
//!         ))],
//!     })],
//! };
//!
//! let options = CompilationOptions {
//!     opt_level: OptLevel::Aggressive,
//!     ..Default::default()
//! };
//! let bytecode = Engine::new(options).compile(module).unwrap();
//!
//! let program = Program::decode(&bytecode).unwrap();
//! assert!(program.constants.contains(&quill::ast::Literal::Int(42)));
//! ```
//!
//! # Errors
//!
//! Every failure is a [`CompileError`]. Use [`CompileError::to_diagnostic`]
//! for a host-neutral [`Diagnostic`], or [`report`] for a rendered one.

pub mod report;

// Re-export public API from quill_core
pub use quill_core::api::{CompilationOptions, CompiledUnit, Diagnostic, Engine, Severity};

// Re-export the pipeline stages
pub use quill_core::compiler::{BytecodeCompiler, CompileError, SemanticError, UnitKind};
pub use quill_core::macros::{MacroError, MacroExpander};
pub use quill_core::optimizer::{OptLevel, OptimizationStats, Optimizer};
pub use quill_core::{ast, bytecode};

pub use report::{render_diagnostic, report};
