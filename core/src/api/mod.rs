//! Public API for the quill handler compiler.
//!
//! The [`Engine`] runs the whole pipeline on a parsed module: macro
//! expansion, optimization and bytecode emission.
//!
//! # Example
//!
//! ```
//! use quill_core::api::{CompilationOptions, Engine};
//! use quill_core::ast::{Expr, Item, Module, Route, Stmt};
//!
//! let module = Module {
//!     items: vec![Item::Route(Route {
//!         method: "GET".into(),
//!         path: "/health".into(),
//!         injections: vec![],
//!         auth: None,
//!         body: vec![Stmt::Return(Expr::str("ok"))],
//!     })],
//! };
//!
//! let engine = Engine::new(CompilationOptions::default());
//! let bytecode = engine.compile(module).unwrap();
//! assert_eq!(&bytecode[..4], b"GLYP");
//! ```

pub mod engine;
pub mod error;
pub mod options;

pub use engine::{CompiledUnit, Engine};
pub use error::{Diagnostic, Severity};
pub use options::CompilationOptions;
