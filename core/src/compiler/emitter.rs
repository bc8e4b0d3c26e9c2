//! Bytecode emitter implementation.

use ecow::eco_format;
use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::error::{CompileError, SemanticError};
use super::symbols::{ScopeKind, SymbolTable};
use crate::ast::{
    BinaryOp, Command, CronTask, EventHandler, Expr, Literal, LiteralKey, MatchCase, Name, Pattern,
    QueueWorker, Route, Stmt, UnaryOp,
};
use crate::bytecode::{OPERAND_WIDTH, Opcode, assemble};
use crate::optimizer::{OptLevel, Optimizer};

/// Jump sites waiting for a common target.
type PendingJumps = SmallVec<[usize; 4]>;

/// Kind of compilation unit, for logging and bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Route,
    Command,
    CronTask,
    EventHandler,
    QueueWorker,
}

impl core::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            UnitKind::Route => "route",
            UnitKind::Command => "command",
            UnitKind::CronTask => "cron task",
            UnitKind::EventHandler => "event handler",
            UnitKind::QueueWorker => "queue worker",
        })
    }
}

/// Bytecode compiler that lowers handler bodies into a stack-machine
/// instruction stream.
///
/// One instance compiles one unit at a time: every `compile_*` entry point
/// resets the constant pool, instruction buffer, label counter and symbol
/// table first, so consecutive units never share state. Bodies are run
/// through the configured [`Optimizer`] before emission.
pub struct BytecodeCompiler {
    /// Constant pool, in index order.
    constants: Vec<Literal>,

    /// Constant deduplication map: value -> index
    constant_map: HashMap<LiteralKey, u32>,

    /// Instruction section. Jump operands are offsets into this buffer until
    /// final assembly rebases them.
    code: Vec<u8>,

    symbols: SymbolTable,

    /// Counter for compiler-generated hidden variable names.
    label_counter: usize,

    optimizer: Optimizer,
}

impl Default for BytecodeCompiler {
    fn default() -> Self {
        Self::new(OptLevel::default())
    }
}

impl BytecodeCompiler {
    pub fn new(level: OptLevel) -> Self {
        Self::with_optimizer(Optimizer::new(level))
    }

    pub fn with_optimizer(optimizer: Optimizer) -> Self {
        Self {
            constants: Vec::new(),
            constant_map: HashMap::new(),
            code: Vec::new(),
            symbols: SymbolTable::new(),
            label_counter: 0,
            optimizer,
        }
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    /// Drop all per-unit state. The optimizer settings are kept.
    pub fn reset(&mut self) {
        self.constants.clear();
        self.constant_map.clear();
        self.code.clear();
        self.symbols = SymbolTable::new();
        self.label_counter = 0;
    }

    // === Compilation Units ===

    pub fn compile_route(&mut self, route: &Route) -> Result<Vec<u8>, CompileError> {
        let mut bindings = route_params(&route.path);
        bindings.extend(route.injections.iter().cloned());
        bindings.extend(["query", "input", "ws"].map(Name::from));
        if route.auth.is_some() {
            bindings.push("auth".into());
        }
        let name = eco_format!("{} {}", route.method, route.path);
        self.compile_unit(UnitKind::Route, &name, &bindings, &route.body)
    }

    pub fn compile_command(&mut self, command: &Command) -> Result<Vec<u8>, CompileError> {
        self.compile_unit(
            UnitKind::Command,
            &command.name,
            &command.params,
            &command.body,
        )
    }

    pub fn compile_cron_task(&mut self, task: &CronTask) -> Result<Vec<u8>, CompileError> {
        self.compile_unit(UnitKind::CronTask, &task.name, &task.injections, &task.body)
    }

    pub fn compile_event_handler(
        &mut self,
        handler: &EventHandler,
    ) -> Result<Vec<u8>, CompileError> {
        let mut bindings: Vec<Name> = vec!["event".into(), "input".into()];
        bindings.extend(handler.injections.iter().cloned());
        self.compile_unit(
            UnitKind::EventHandler,
            &handler.event_type,
            &bindings,
            &handler.body,
        )
    }

    pub fn compile_queue_worker(&mut self, worker: &QueueWorker) -> Result<Vec<u8>, CompileError> {
        let mut bindings: Vec<Name> = vec!["message".into(), "input".into()];
        bindings.extend(worker.injections.iter().cloned());
        self.compile_unit(
            UnitKind::QueueWorker,
            &worker.queue,
            &bindings,
            &worker.body,
        )
    }

    /// Compile a bare body with the given implicit bindings in scope.
    pub fn compile_body(
        &mut self,
        bindings: &[Name],
        body: &[Stmt],
    ) -> Result<Vec<u8>, CompileError> {
        self.compile_unit(UnitKind::Command, "<body>", bindings, body)
    }

    /// Minimal buffer for modules that declare types only.
    pub fn compile_halt(&mut self) -> Result<Vec<u8>, CompileError> {
        self.reset();
        self.emit(Opcode::Halt);
        self.finish()
    }

    fn compile_unit(
        &mut self,
        kind: UnitKind,
        name: &str,
        bindings: &[Name],
        body: &[Stmt],
    ) -> Result<Vec<u8>, CompileError> {
        self.reset();
        debug!(%kind, name, "compiling unit");

        self.symbols.enter_scope(ScopeKind::Unit);
        for binding in bindings {
            let slot = self.name_slot(binding)?;
            self.symbols.define(binding.clone(), slot);
        }

        let body = self.optimizer.optimize_body(bindings, body.to_vec());
        self.compile_block(&body)?;
        if !body.last().is_some_and(Stmt::is_return) {
            self.emit(Opcode::Halt);
        }

        let bytes = self.finish()?;
        debug!(
            %kind,
            name,
            bytes = bytes.len(),
            constants = self.constants.len(),
            "compiled unit"
        );
        Ok(bytes)
    }

    fn finish(&mut self) -> Result<Vec<u8>, CompileError> {
        assemble(&self.constants, core::mem::take(&mut self.code))
    }

    // === Instruction Emission ===

    fn emit(&mut self, opcode: Opcode) {
        debug_assert_eq!(opcode.operand_width(), 0, "{opcode} takes an operand");
        self.code.push(opcode.byte());
    }

    fn emit_with_operand(&mut self, opcode: Opcode, operand: u32) {
        debug_assert_eq!(opcode.operand_width(), OPERAND_WIDTH);
        self.code.push(opcode.byte());
        self.code.extend_from_slice(&operand.to_le_bytes());
    }

    fn emit_count(
        &mut self,
        opcode: Opcode,
        count: usize,
        what: &'static str,
    ) -> Result<(), CompileError> {
        let count = u32::try_from(count).map_err(|_| CompileError::OperandOverflow { what })?;
        self.emit_with_operand(opcode, count);
        Ok(())
    }

    // === Jump Patching Infrastructure ===

    /// Emit a jump-family instruction with a zero target and return its
    /// position for `patch_jump`.
    fn jump_placeholder(&mut self, opcode: Opcode) -> usize {
        let at = self.code.len();
        self.emit_with_operand(opcode, 0);
        at
    }

    /// Current offset within the instruction section (for use as a jump label).
    fn label(&self) -> Result<u32, CompileError> {
        u32::try_from(self.code.len()).map_err(|_| CompileError::OperandOverflow {
            what: "jump target",
        })
    }

    /// Overwrite the operand of the instruction at `at`.
    fn patch_jump(&mut self, at: usize, target: u32) {
        self.code[at + 1..at + 1 + OPERAND_WIDTH].copy_from_slice(&target.to_le_bytes());
    }

    fn patch_all(&mut self, sites: &[usize], target: u32) {
        for &site in sites {
            self.patch_jump(site, target);
        }
    }

    // === Constant Pool Management ===

    /// Add a constant to the pool (or reuse existing) and return its index.
    fn add_constant(&mut self, value: Literal) -> Result<u32, CompileError> {
        let key = value.key();
        if let Some(&existing) = self.constant_map.get(&key) {
            return Ok(existing);
        }

        let index =
            u32::try_from(self.constants.len()).map_err(|_| CompileError::OperandOverflow {
                what: "constant pool index",
            })?;
        self.constants.push(value);
        self.constant_map.insert(key, index);
        Ok(index)
    }

    /// Variables live in the slot of their name's pool entry.
    fn name_slot(&mut self, name: &str) -> Result<u32, CompileError> {
        self.add_constant(Literal::Str(name.into()))
    }

    fn push_constant(&mut self, value: Literal) -> Result<(), CompileError> {
        let index = self.add_constant(value)?;
        self.emit_with_operand(Opcode::Push, index);
        Ok(())
    }

    /// Define a compiler-generated variable in the current scope.
    fn hidden_var(&mut self, prefix: &str) -> Result<u32, CompileError> {
        let name = eco_format!("{}_{}", prefix, self.label_counter);
        self.label_counter += 1;
        let slot = self.name_slot(&name)?;
        self.symbols.define(name, slot);
        Ok(slot)
    }

    /// Bind a user-visible name in the current scope and return its slot.
    fn bind(&mut self, name: &Name) -> Result<u32, CompileError> {
        let slot = self.name_slot(name)?;
        self.symbols.define(name.clone(), slot);
        Ok(slot)
    }

    // === Statements ===

    fn compile_block(&mut self, block: &[Stmt]) -> Result<(), CompileError> {
        for stmt in block {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    /// Compile a block inside its own child scope.
    fn compile_scoped_block(&mut self, block: &[Stmt]) -> Result<(), CompileError> {
        self.symbols.enter_scope(ScopeKind::Block);
        let result = self.compile_block(block);
        self.symbols.exit_scope();
        result
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Declare { target, value } => {
                if self.symbols.resolve_local(target).is_some() {
                    return Err(SemanticError::Redeclaration {
                        name: target.clone(),
                    }
                    .into());
                }
                self.compile_expr(value)?;
                let slot = self.name_slot(target)?;
                self.emit_with_operand(Opcode::StoreVar, slot);
                // A name owned by an enclosing scope keeps resolving there.
                if self.symbols.resolve(target).is_none() {
                    self.symbols.define(target.clone(), slot);
                }
            }

            Stmt::Assign { target, value } => {
                if self.symbols.resolve(target).is_none() {
                    return Err(SemanticError::UndeclaredAssignment {
                        name: target.clone(),
                    }
                    .into());
                }
                self.compile_expr(value)?;
                let slot = self.name_slot(target)?;
                self.emit_with_operand(Opcode::StoreVar, slot);
            }

            Stmt::Return(value) => {
                self.compile_expr(value)?;
                self.emit(Opcode::Return);
            }

            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                self.compile_expr(cond)?;
                let to_else = self.jump_placeholder(Opcode::JumpIfFalse);
                self.compile_scoped_block(then_block)?;
                let to_end = self.jump_placeholder(Opcode::Jump);

                let else_label = self.label()?;
                self.patch_jump(to_else, else_label);
                if !else_block.is_empty() {
                    self.compile_scoped_block(else_block)?;
                }
                let end_label = self.label()?;
                self.patch_jump(to_end, end_label);
            }

            Stmt::While { cond, body } => {
                let loop_start = self.label()?;
                self.compile_expr(cond)?;
                let to_end = self.jump_placeholder(Opcode::JumpIfFalse);
                self.compile_scoped_block(body)?;
                self.emit_with_operand(Opcode::Jump, loop_start);
                let end_label = self.label()?;
                self.patch_jump(to_end, end_label);
            }

            Stmt::For {
                key,
                value,
                iterable,
                body,
            } => {
                self.symbols.enter_scope(ScopeKind::Block);
                let result = self.compile_for(key.as_ref(), value, iterable, body);
                self.symbols.exit_scope();
                result?;
            }

            Stmt::Switch {
                scrutinee,
                cases,
                default,
            } => {
                let switch_slot = self.hidden_var("__switch")?;
                self.compile_expr(scrutinee)?;
                self.emit_with_operand(Opcode::StoreVar, switch_slot);

                let mut to_end = PendingJumps::new();
                for case in cases {
                    self.emit_with_operand(Opcode::LoadVar, switch_slot);
                    self.compile_expr(&case.value)?;
                    self.emit(Opcode::Eq);
                    let to_next = self.jump_placeholder(Opcode::JumpIfFalse);
                    self.compile_scoped_block(&case.body)?;
                    to_end.push(self.jump_placeholder(Opcode::Jump));
                    let next_label = self.label()?;
                    self.patch_jump(to_next, next_label);
                }
                if !default.is_empty() {
                    self.compile_scoped_block(default)?;
                }
                let end_label = self.label()?;
                self.patch_all(&to_end, end_label);
            }

            Stmt::Expr(expr) => {
                self.compile_expr(expr)?;
                self.emit(Opcode::Pop);
            }

            Stmt::Validate(_) => {}

            Stmt::Macro(_) => {
                return Err(CompileError::UnsupportedStatement {
                    kind: stmt.kind_name(),
                });
            }
        }
        Ok(())
    }

    /// Body of a `for` loop; the caller owns the loop scope.
    fn compile_for(
        &mut self,
        key: Option<&Name>,
        value: &Name,
        iterable: &Expr,
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        self.compile_expr(iterable)?;
        self.emit(Opcode::GetIter);
        let iter_slot = self.hidden_var("__iter")?;
        self.emit_with_operand(Opcode::StoreVar, iter_slot);

        let value_slot = self.bind(value)?;
        let key_slot = key.map(|key| self.bind(key)).transpose()?;

        let loop_start = self.label()?;
        self.emit_with_operand(Opcode::LoadVar, iter_slot);
        self.emit(Opcode::IterHasNext);
        let to_end = self.jump_placeholder(Opcode::JumpIfFalse);

        self.emit_with_operand(Opcode::LoadVar, iter_slot);
        self.emit_with_operand(Opcode::IterNext, u32::from(key_slot.is_some()));
        self.emit_with_operand(Opcode::StoreVar, value_slot);
        if let Some(key_slot) = key_slot {
            self.emit_with_operand(Opcode::StoreVar, key_slot);
        }

        self.compile_block(body)?;
        self.emit_with_operand(Opcode::Jump, loop_start);
        let end_label = self.label()?;
        self.patch_jump(to_end, end_label);
        Ok(())
    }

    // === Expressions ===

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal(literal) => self.push_constant(literal.clone())?,

            Expr::Var(name) => {
                let symbol =
                    self.symbols
                        .resolve(name)
                        .ok_or_else(|| CompileError::UndefinedVariable {
                            name: name.clone(),
                        })?;
                self.emit_with_operand(Opcode::LoadVar, symbol.slot);
            }

            Expr::Binary { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(binary_opcode(*op));
            }

            Expr::Unary { op, operand } => {
                self.compile_expr(operand)?;
                self.emit(match op {
                    UnaryOp::Neg => Opcode::Neg,
                    UnaryOp::Not => Opcode::Not,
                });
            }

            Expr::Object(fields) => {
                for field in fields {
                    self.push_constant(Literal::Str(field.key.clone()))?;
                    self.compile_expr(&field.value)?;
                }
                self.emit_count(Opcode::BuildObject, fields.len(), "object field count")?;
            }

            Expr::Array(elements) => {
                for element in elements {
                    self.compile_expr(element)?;
                }
                self.emit_count(Opcode::BuildArray, elements.len(), "array length")?;
            }

            Expr::Field { object, field } => {
                self.compile_expr(object)?;
                self.push_constant(Literal::Str(field.clone()))?;
                self.emit(Opcode::GetField);
            }

            Expr::Index { array, index } => {
                self.compile_expr(array)?;
                self.compile_expr(index)?;
                self.emit(Opcode::GetIndex);
            }

            Expr::Call { name, args } => {
                self.push_constant(Literal::Str(name.clone()))?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit_count(Opcode::Call, args.len(), "argument count")?;
            }

            Expr::Match { scrutinee, cases } => self.compile_match(scrutinee, cases)?,

            Expr::Async(body) => {
                let header = self.jump_placeholder(Opcode::Async);
                let body_start = self.code.len();
                self.compile_scoped_block(body)?;
                if !body.last().is_some_and(Stmt::is_return) {
                    self.emit(Opcode::Halt);
                }
                let body_len = u32::try_from(self.code.len() - body_start).map_err(|_| {
                    CompileError::OperandOverflow {
                        what: "async body length",
                    }
                })?;
                self.patch_jump(header, body_len);
                trace!(body_len, "emitted async body");
            }

            Expr::Await(inner) => {
                self.compile_expr(inner)?;
                self.emit(Opcode::Await);
            }

            Expr::Unquote(_) => {
                return Err(CompileError::UnsupportedExpression {
                    kind: expr.kind_name(),
                });
            }
        }
        Ok(())
    }

    // === Match Expressions ===

    /// Lower a match to a chain of pattern tests. Each case leaves its body's
    /// value on the stack; when no case matches the result is `null`.
    fn compile_match(&mut self, scrutinee: &Expr, cases: &[MatchCase]) -> Result<(), CompileError> {
        let match_slot = self.hidden_var("__match")?;
        self.compile_expr(scrutinee)?;
        self.emit_with_operand(Opcode::StoreVar, match_slot);

        let mut to_end = PendingJumps::new();
        for case in cases {
            self.symbols.enter_scope(ScopeKind::Block);
            let result = self.compile_match_case(case, match_slot);
            self.symbols.exit_scope();
            let to_next = result?;

            to_end.push(self.jump_placeholder(Opcode::Jump));
            let next_label = self.label()?;
            self.patch_all(&to_next, next_label);
        }

        self.push_constant(Literal::Null)?;
        let end_label = self.label()?;
        self.patch_all(&to_end, end_label);
        Ok(())
    }

    fn compile_match_case(
        &mut self,
        case: &MatchCase,
        match_slot: u32,
    ) -> Result<PendingJumps, CompileError> {
        let mut to_next = self.compile_pattern(&case.pattern, match_slot)?;
        if let Some(guard) = &case.guard {
            self.compile_expr(guard)?;
            to_next.push(self.jump_placeholder(Opcode::JumpIfFalse));
        }
        self.compile_expr(&case.body)?;
        Ok(to_next)
    }

    /// Emit the test for `pattern` against the value in `slot`, binding
    /// names as it goes. Returns the jumps to take when the pattern fails.
    fn compile_pattern(
        &mut self,
        pattern: &Pattern,
        slot: u32,
    ) -> Result<PendingJumps, CompileError> {
        let mut to_next = PendingJumps::new();
        match pattern {
            Pattern::Literal(literal) => {
                self.emit_with_operand(Opcode::LoadVar, slot);
                self.push_constant(literal.clone())?;
                self.emit(Opcode::Eq);
                to_next.push(self.jump_placeholder(Opcode::JumpIfFalse));
            }

            Pattern::Var(name) => {
                self.emit_with_operand(Opcode::LoadVar, slot);
                let var_slot = self.bind(name)?;
                self.emit_with_operand(Opcode::StoreVar, var_slot);
            }

            Pattern::Wildcard => {}

            Pattern::Object(fields) => {
                for field in fields {
                    self.emit_with_operand(Opcode::LoadVar, slot);
                    self.push_constant(Literal::Str(field.key.clone()))?;
                    self.emit(Opcode::GetField);

                    match &field.pattern {
                        Some(nested) => {
                            let prefix = eco_format!("__field_{}", field.key);
                            let temp = self.hidden_var(&prefix)?;
                            self.emit_with_operand(Opcode::StoreVar, temp);
                            to_next.extend(self.compile_pattern(nested, temp)?);
                        }
                        None => {
                            let var_slot = self.bind(&field.key)?;
                            self.emit_with_operand(Opcode::StoreVar, var_slot);
                        }
                    }
                }
            }

            Pattern::Array { elements, rest } => {
                for (index, element) in elements.iter().enumerate() {
                    self.emit_with_operand(Opcode::LoadVar, slot);
                    let index = i64::try_from(index).map_err(|_| {
                        CompileError::OperandOverflow {
                            what: "array pattern index",
                        }
                    })?;
                    self.push_constant(Literal::Int(index))?;
                    self.emit(Opcode::GetIndex);

                    let prefix = eco_format!("__elem_{}", index);
                    let temp = self.hidden_var(&prefix)?;
                    self.emit_with_operand(Opcode::StoreVar, temp);
                    to_next.extend(self.compile_pattern(element, temp)?);
                }

                // Binds the whole matched array, not the remaining suffix.
                if let Some(rest) = rest {
                    self.emit_with_operand(Opcode::LoadVar, slot);
                    let rest_slot = self.bind(rest)?;
                    self.emit_with_operand(Opcode::StoreVar, rest_slot);
                }
            }
        }
        Ok(to_next)
    }
}

fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Eq => Opcode::Eq,
        BinaryOp::Ne => Opcode::Ne,
        BinaryOp::Lt => Opcode::Lt,
        BinaryOp::Le => Opcode::Le,
        BinaryOp::Gt => Opcode::Gt,
        BinaryOp::Ge => Opcode::Ge,
        BinaryOp::And => Opcode::And,
        BinaryOp::Or => Opcode::Or,
    }
}

/// Path parameter names, in order of appearance.
///
/// Both `/users/:id` and `/users/{id}` segment syntaxes are recognized.
pub fn route_params(path: &str) -> Vec<Name> {
    path.split('/')
        .filter_map(|segment| {
            let name = match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(inner) => inner,
                None => &segment[segment.find(':')? + 1..],
            };
            (!name.is_empty()).then(|| Name::from(name))
        })
        .collect()
}
