//! Shared helpers for integration tests: module builders and a small
//! reference stack machine that executes emitted bytecode.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use quill::ast::{Command, Expr, Item, Literal, Module, Route, Stmt};
use quill::bytecode::{Opcode, Program};

/// Cap on executed instructions, so a miscompiled loop fails the test
/// instead of hanging it.
const STEP_LIMIT: usize = 100_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
    Iter(Rc<RefCell<IterState>>),
    Future,
}

#[derive(Debug, PartialEq)]
pub struct IterState {
    entries: Vec<(Value, Value)>,
    next: usize,
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(s.to_string())
    }

    pub fn object(fields: &[(&str, Value)]) -> Value {
        Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        )
    }

    fn from_literal(literal: &Literal) -> Value {
        match literal {
            Literal::Int(v) => Value::Int(*v),
            Literal::Float(v) => Value::Float(*v),
            Literal::Str(s) => Value::Str(s.to_string()),
            Literal::Bool(v) => Value::Bool(*v),
            Literal::Null => Value::Null,
        }
    }
}

/// Everything observable about one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// `Some` when the unit returned, `None` when it halted.
    pub result: Result<Option<Value>, String>,
    /// Host calls in the order they were made, with their arguments.
    pub calls: Vec<(String, Vec<Value>)>,
}

/// Run a compiled buffer with `bindings` preloaded into their slots.
///
/// Host functions: `next()` returns 1, 2, 3, ... on successive calls and
/// `len(array)` returns the array length. Every other call returns `null`.
/// All calls are recorded.
pub fn run(bytes: &[u8], bindings: &[(&str, Value)]) -> Outcome {
    let program = Program::decode(bytes).expect("emitted bytecode must decode");
    let mut vm = Machine {
        program: &program,
        stack: Vec::new(),
        vars: HashMap::new(),
        calls: Vec::new(),
        counter: 0,
    };
    for (name, value) in bindings {
        // Bindings the body never mentions may have no slot.
        if let Some(slot) = vm.slot_of(name) {
            vm.vars.insert(slot, value.clone());
        }
    }
    let result = vm.execute();
    Outcome {
        result,
        calls: vm.calls,
    }
}

struct Machine<'p> {
    program: &'p Program,
    stack: Vec<Value>,
    vars: HashMap<u32, Value>,
    calls: Vec<(String, Vec<Value>)>,
    counter: i64,
}

impl Machine<'_> {
    fn slot_of(&self, name: &str) -> Option<u32> {
        self.program
            .constants
            .iter()
            .position(|c| matches!(c, Literal::Str(s) if s.as_str() == name))
            .map(|index| index as u32)
    }

    fn pop(&mut self) -> Result<Value, String> {
        self.stack.pop().ok_or_else(|| "stack underflow".to_string())
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, String> {
        if self.stack.len() < n {
            return Err("stack underflow".into());
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn execute(&mut self) -> Result<Option<Value>, String> {
        let end = self.program.code_end();
        let mut pc = self.program.code_start;

        for _ in 0..STEP_LIMIT {
            if pc >= end {
                return Ok(None);
            }
            let instr = *self
                .program
                .instruction_at(pc)
                .ok_or_else(|| format!("no instruction at {pc}"))?;
            let operand = instr.operand.unwrap_or(0);
            let mut next = pc + instr.size();

            match instr.opcode {
                Opcode::Push => {
                    let constant = self
                        .program
                        .constants
                        .get(operand as usize)
                        .ok_or("constant index out of range")?;
                    self.stack.push(Value::from_literal(constant));
                }
                Opcode::Pop => {
                    self.pop()?;
                }
                Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::Eq
                | Opcode::Ne
                | Opcode::Lt
                | Opcode::Gt
                | Opcode::Ge
                | Opcode::Le
                | Opcode::And
                | Opcode::Or => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    self.stack.push(binary(instr.opcode, left, right)?);
                }
                Opcode::Not => match self.pop()? {
                    Value::Bool(b) => self.stack.push(Value::Bool(!b)),
                    other => return Err(format!("cannot negate {other:?}")),
                },
                Opcode::Neg => match self.pop()? {
                    Value::Int(v) => {
                        self.stack
                            .push(Value::Int(v.checked_neg().ok_or("integer overflow")?));
                    }
                    Value::Float(v) => self.stack.push(Value::Float(-v)),
                    other => return Err(format!("cannot negate {other:?}")),
                },
                Opcode::LoadVar => {
                    let value = self
                        .vars
                        .get(&operand)
                        .cloned()
                        .ok_or_else(|| format!("slot {operand} is unset"))?;
                    self.stack.push(value);
                }
                Opcode::StoreVar => {
                    let value = self.pop()?;
                    self.vars.insert(operand, value);
                }
                Opcode::Jump => next = operand as usize,
                Opcode::JumpIfFalse | Opcode::JumpIfTrue => {
                    let cond = match self.pop()? {
                        Value::Bool(b) => b,
                        other => return Err(format!("condition is not a bool: {other:?}")),
                    };
                    if cond == (instr.opcode == Opcode::JumpIfTrue) {
                        next = operand as usize;
                    }
                }
                Opcode::GetIter => {
                    let entries = match self.pop()? {
                        Value::Array(items) => items
                            .into_iter()
                            .enumerate()
                            .map(|(i, v)| (Value::Int(i as i64), v))
                            .collect(),
                        Value::Object(fields) => fields
                            .into_iter()
                            .map(|(k, v)| (Value::Str(k), v))
                            .collect(),
                        other => return Err(format!("cannot iterate {other:?}")),
                    };
                    self.stack
                        .push(Value::Iter(Rc::new(RefCell::new(IterState { entries, next: 0 }))));
                }
                Opcode::IterHasNext => match self.pop()? {
                    Value::Iter(state) => {
                        let state = state.borrow();
                        self.stack
                            .push(Value::Bool(state.next < state.entries.len()));
                    }
                    other => return Err(format!("not an iterator: {other:?}")),
                },
                Opcode::IterNext => match self.pop()? {
                    Value::Iter(state) => {
                        let mut state = state.borrow_mut();
                        let (key, value) = state
                            .entries
                            .get(state.next)
                            .cloned()
                            .ok_or("iterator exhausted")?;
                        state.next += 1;
                        if operand == 1 {
                            self.stack.push(key);
                        }
                        self.stack.push(value);
                    }
                    other => return Err(format!("not an iterator: {other:?}")),
                },
                Opcode::GetIndex => {
                    let index = self.pop()?;
                    let value = match (self.pop()?, index) {
                        (Value::Array(items), Value::Int(i)) => usize::try_from(i)
                            .ok()
                            .and_then(|i| items.get(i).cloned())
                            .unwrap_or(Value::Null),
                        _ => Value::Null,
                    };
                    self.stack.push(value);
                }
                Opcode::GetField => {
                    let key = self.pop()?;
                    let value = match (self.pop()?, key) {
                        (Value::Object(fields), Value::Str(key)) => fields
                            .into_iter()
                            .find(|(k, _)| *k == key)
                            .map_or(Value::Null, |(_, v)| v),
                        (_, Value::Str(_)) => Value::Null,
                        (_, key) => return Err(format!("bad field key {key:?}")),
                    };
                    self.stack.push(value);
                }
                Opcode::Return => return self.pop().map(Some),
                Opcode::Call => {
                    let args = self.pop_n(operand as usize)?;
                    let name = match self.pop()? {
                        Value::Str(name) => name,
                        other => return Err(format!("bad function name {other:?}")),
                    };
                    let result = match (name.as_str(), args.as_slice()) {
                        ("next", []) => {
                            self.counter += 1;
                            Value::Int(self.counter)
                        }
                        ("len", [Value::Array(items)]) => Value::Int(items.len() as i64),
                        _ => Value::Null,
                    };
                    self.calls.push((name, args));
                    self.stack.push(result);
                }
                Opcode::BuildObject => {
                    let flat = self.pop_n(2 * operand as usize)?;
                    let mut fields = Vec::with_capacity(operand as usize);
                    for pair in flat.chunks(2) {
                        match &pair[0] {
                            Value::Str(key) => fields.push((key.clone(), pair[1].clone())),
                            other => return Err(format!("bad object key {other:?}")),
                        }
                    }
                    self.stack.push(Value::Object(fields));
                }
                Opcode::BuildArray => {
                    let items = self.pop_n(operand as usize)?;
                    self.stack.push(Value::Array(items));
                }
                // Deferred bodies are not run by this machine.
                Opcode::Async => {
                    next += operand as usize;
                    self.stack.push(Value::Future);
                }
                Opcode::Await => {
                    self.pop()?;
                    self.stack.push(Value::Null);
                }
                Opcode::Halt => return Ok(None),
            }
            pc = next;
        }
        Err("step limit exceeded".into())
    }
}

fn binary(op: Opcode, left: Value, right: Value) -> Result<Value, String> {
    use Value::*;
    let value = match (op, &left, &right) {
        (Opcode::Eq, _, _) => Bool(left == right),
        (Opcode::Ne, _, _) => Bool(left != right),

        (Opcode::Add, Int(a), Int(b)) => Int(a.checked_add(*b).ok_or("integer overflow")?),
        (Opcode::Sub, Int(a), Int(b)) => Int(a.checked_sub(*b).ok_or("integer overflow")?),
        (Opcode::Mul, Int(a), Int(b)) => Int(a.checked_mul(*b).ok_or("integer overflow")?),
        (Opcode::Div, Int(_), Int(0)) | (Opcode::Mod, Int(_), Int(0)) => {
            return Err("division by zero".into());
        }
        (Opcode::Div, Int(a), Int(b)) => Int(a.checked_div(*b).ok_or("integer overflow")?),
        (Opcode::Mod, Int(a), Int(b)) => Int(a.checked_rem(*b).ok_or("integer overflow")?),

        (Opcode::Add, Float(a), Float(b)) => Float(a + b),
        (Opcode::Sub, Float(a), Float(b)) => Float(a - b),
        (Opcode::Mul, Float(a), Float(b)) => Float(a * b),
        (Opcode::Div, Float(a), Float(b)) => Float(a / b),
        (Opcode::Add, Str(a), Str(b)) => Str(format!("{a}{b}")),

        (Opcode::Lt, Int(a), Int(b)) => Bool(a < b),
        (Opcode::Gt, Int(a), Int(b)) => Bool(a > b),
        (Opcode::Le, Int(a), Int(b)) => Bool(a <= b),
        (Opcode::Ge, Int(a), Int(b)) => Bool(a >= b),
        (Opcode::Lt, Float(a), Float(b)) => Bool(a < b),
        (Opcode::Gt, Float(a), Float(b)) => Bool(a > b),
        (Opcode::Le, Float(a), Float(b)) => Bool(a <= b),
        (Opcode::Ge, Float(a), Float(b)) => Bool(a >= b),
        (Opcode::Lt, Str(a), Str(b)) => Bool(a < b),
        (Opcode::Gt, Str(a), Str(b)) => Bool(a > b),

        (Opcode::And, Bool(a), Bool(b)) => Bool(*a && *b),
        (Opcode::Or, Bool(a), Bool(b)) => Bool(*a || *b),

        _ => return Err(format!("{op} not defined for {left:?} and {right:?}")),
    };
    Ok(value)
}

// ============================================================================
// Builders
// ============================================================================

pub fn route(method: &str, path: &str, body: Vec<Stmt>) -> Route {
    Route {
        method: method.into(),
        path: path.into(),
        injections: vec![],
        auth: None,
        body,
    }
}

pub fn command(name: &str, params: &[&str], body: Vec<Stmt>) -> Command {
    Command {
        name: name.into(),
        params: params.iter().map(|p| (*p).into()).collect(),
        body,
    }
}

pub fn module(items: Vec<Item>) -> Module {
    Module { items }
}

/// `log(args...)` as a statement.
pub fn log(args: Vec<Expr>) -> Stmt {
    Stmt::Expr(Expr::call("log", args))
}
