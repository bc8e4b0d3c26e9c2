//! The compilation pipeline.

use ecow::EcoString;
use tracing::debug;

use super::CompilationOptions;
use crate::ast::{Item, Module};
use crate::compiler::{BytecodeCompiler, CompileError, UnitKind};
use crate::macros::MacroExpander;
use crate::optimizer::Optimizer;

/// One compiled handler of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    pub kind: UnitKind,
    /// Route method and path, or the name of the command, task, event or
    /// queue.
    pub name: EcoString,
    pub bytecode: Vec<u8>,
}

/// Runs macro expansion, optimization and emission over parsed modules.
///
/// The engine only holds options. Each call builds its own expander and
/// emitter, so one engine can serve any number of compilations, including
/// concurrent ones.
///
/// # Example
///
/// ```
/// use quill_core::api::{CompilationOptions, Engine};
/// use quill_core::ast::{Command, Expr, Item, Module, Stmt};
/// use quill_core::compiler::UnitKind;
///
/// let module = Module {
///     items: vec![Item::Command(Command {
///         name: "greet".into(),
///         params: vec!["who".into()],
///         body: vec![Stmt::Return(Expr::var("who"))],
///     })],
/// };
///
/// let units = Engine::default().compile_units(module).unwrap();
/// assert_eq!(units.len(), 1);
/// assert_eq!(units[0].kind, UnitKind::Command);
/// assert_eq!(units[0].name.as_str(), "greet");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Engine {
    options: CompilationOptions,
}

impl Engine {
    pub fn new(options: CompilationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompilationOptions {
        &self.options
    }

    /// Compile the first route of `module`.
    ///
    /// A module holding type declarations but no route compiles to a
    /// halt-only buffer. A module with nothing in it after expansion is
    /// [`CompileError::EmptyModule`]; one with other items but no route is
    /// [`CompileError::NoRoute`].
    pub fn compile(&self, module: Module) -> Result<Vec<u8>, CompileError> {
        let module = self.expand(module)?;
        let mut compiler = self.compiler();

        if let Some(route) = module.items.iter().find_map(|item| match item {
            Item::Route(route) => Some(route),
            _ => None,
        }) {
            return compiler.compile_route(route);
        }

        if module
            .items
            .iter()
            .any(|item| matches!(item, Item::TypeDef(_)))
        {
            debug!("Module declares types only");
            return compiler.compile_halt();
        }

        if module.items.is_empty() {
            return Err(CompileError::EmptyModule);
        }
        Err(CompileError::NoRoute {
            items: module.items.len(),
        })
    }

    /// Compile every executable item of `module`, in order.
    ///
    /// Type declarations produce no unit. The first failing unit aborts the
    /// whole module.
    pub fn compile_units(&self, module: Module) -> Result<Vec<CompiledUnit>, CompileError> {
        let module = self.expand(module)?;
        if module.items.is_empty() {
            return Err(CompileError::EmptyModule);
        }

        let mut compiler = self.compiler();
        let mut units = Vec::with_capacity(module.items.len());
        for item in &module.items {
            let (kind, bytecode) = match item {
                Item::Route(route) => (UnitKind::Route, compiler.compile_route(route)?),
                Item::Command(cmd) => (UnitKind::Command, compiler.compile_command(cmd)?),
                Item::Cron(task) => (UnitKind::CronTask, compiler.compile_cron_task(task)?),
                Item::Event(handler) => (
                    UnitKind::EventHandler,
                    compiler.compile_event_handler(handler)?,
                ),
                Item::Queue(worker) => (
                    UnitKind::QueueWorker,
                    compiler.compile_queue_worker(worker)?,
                ),
                Item::TypeDef(_) | Item::MacroDef(_) | Item::MacroInvocation(_) => continue,
            };
            units.push(CompiledUnit {
                kind,
                name: item.display_name(),
                bytecode,
            });
        }
        debug!(units = units.len(), "Compiled module");
        Ok(units)
    }

    fn expand(&self, module: Module) -> Result<Module, CompileError> {
        let mut expander = MacroExpander::with_max_depth(self.options.max_macro_depth);
        Ok(expander.expand_module(module)?)
    }

    fn compiler(&self) -> BytecodeCompiler {
        BytecodeCompiler::with_optimizer(Optimizer::new(self.options.opt_level))
    }
}
