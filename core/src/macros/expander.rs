//! Macro expansion.

use ecow::EcoString;
use hashbrown::HashMap;
use tracing::{debug, trace};

use super::error::MacroError;
use crate::ast::{
    Block, Command, CronTask, EventHandler, Expr, Item, MacroDef, MacroInvocation, MacroNode,
    MatchCase, Module, Name, ObjectField, QueueWorker, Route, Stmt, SwitchCase,
};

/// Nesting limit used when none is configured.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Formal parameter name -> actual argument.
type Substitutions = HashMap<Name, Expr>;

/// Expands macro invocations by tree substitution.
///
/// Arguments are substituted as trees, not evaluated: an argument with side
/// effects runs once per use of its parameter. Invocations produced by an
/// expansion are expanded in turn, depth first, up to `max_depth` levels.
#[derive(Debug, Clone)]
pub struct MacroExpander {
    macros: HashMap<Name, MacroDef>,
    max_depth: usize,
}

impl Default for MacroExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl MacroExpander {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            macros: HashMap::new(),
            max_depth,
        }
    }

    /// Register a macro. A later definition with the same name replaces the
    /// earlier one.
    pub fn register(&mut self, def: MacroDef) {
        self.macros.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.macros.get(name)
    }

    /// Expand one invocation into the nodes its macro body produces.
    pub fn expand(&self, invocation: &MacroInvocation) -> Result<Vec<MacroNode>, MacroError> {
        self.expand_at(invocation, 0)
    }

    /// Expand every macro in `module`.
    ///
    /// Definitions are collected first, so an invocation may precede the
    /// definition it uses. Definition items are dropped, item-level
    /// invocations are replaced by the items they produce, and
    /// statement-level invocations inside handler bodies are replaced by the
    /// statements they produce. The first error aborts the whole module.
    pub fn expand_module(&mut self, module: Module) -> Result<Module, MacroError> {
        for item in &module.items {
            if let Item::MacroDef(def) = item {
                self.register(def.clone());
            }
        }

        let mut items = Vec::with_capacity(module.items.len());
        for item in module.items {
            match item {
                Item::MacroDef(_) => {}
                Item::MacroInvocation(invocation) => {
                    let expanded = self.expand(&invocation)?;
                    items.extend(expanded.into_iter().filter_map(|node| match node {
                        MacroNode::Item(item) => Some(item),
                        MacroNode::Stmt(_) => None,
                    }));
                }
                item => items.push(self.expand_item(item, 0)?),
            }
        }

        debug!(
            macros = self.macros.len(),
            items = items.len(),
            "Expanded module macros"
        );
        Ok(Module { items })
    }

    /// Expand statement-level invocations in `block`, at any nesting depth.
    pub fn expand_block(&self, block: Block) -> Result<Block, MacroError> {
        self.block(block, 0)
    }

    fn expand_at(
        &self,
        invocation: &MacroInvocation,
        depth: usize,
    ) -> Result<Vec<MacroNode>, MacroError> {
        let name = &invocation.name;
        if depth >= self.max_depth {
            return Err(MacroError::ExpansionDepthExceeded {
                name: name.clone(),
                limit: self.max_depth,
            });
        }
        let def = self
            .macros
            .get(name)
            .ok_or_else(|| MacroError::UndefinedMacro { name: name.clone() })?;
        if def.params.len() != invocation.args.len() {
            return Err(MacroError::ArityMismatch {
                name: name.clone(),
                expected: def.params.len(),
                actual: invocation.args.len(),
            });
        }
        trace!(%name, depth, "Expanding macro");

        let subs: Substitutions = def
            .params
            .iter()
            .cloned()
            .zip(invocation.args.iter().cloned())
            .collect();

        let mut nodes = Vec::with_capacity(def.body.len());
        for node in &def.body {
            match substitute_node(node, &subs) {
                MacroNode::Item(Item::MacroInvocation(nested))
                | MacroNode::Stmt(Stmt::Macro(nested)) => {
                    nodes.extend(self.expand_at(&nested, depth + 1)?);
                }
                MacroNode::Item(item) => {
                    nodes.push(MacroNode::Item(self.expand_item(item, depth + 1)?));
                }
                MacroNode::Stmt(stmt) => {
                    nodes.push(MacroNode::Stmt(self.stmt(stmt, depth + 1)?));
                }
            }
        }
        Ok(nodes)
    }

    // === Nested invocations ===

    fn expand_item(&self, item: Item, depth: usize) -> Result<Item, MacroError> {
        Ok(match item {
            Item::Route(route) => Item::Route(Route {
                body: self.block(route.body, depth)?,
                ..route
            }),
            Item::Command(cmd) => Item::Command(Command {
                body: self.block(cmd.body, depth)?,
                ..cmd
            }),
            Item::Cron(task) => Item::Cron(CronTask {
                body: self.block(task.body, depth)?,
                ..task
            }),
            Item::Event(handler) => Item::Event(EventHandler {
                body: self.block(handler.body, depth)?,
                ..handler
            }),
            Item::Queue(worker) => Item::Queue(QueueWorker {
                body: self.block(worker.body, depth)?,
                ..worker
            }),
            other => other,
        })
    }

    fn block(&self, block: Block, depth: usize) -> Result<Block, MacroError> {
        let mut out = Vec::with_capacity(block.len());
        for stmt in block {
            match stmt {
                Stmt::Macro(invocation) => {
                    let expanded = self.expand_at(&invocation, depth)?;
                    out.extend(expanded.into_iter().filter_map(|node| match node {
                        MacroNode::Stmt(stmt) => Some(stmt),
                        MacroNode::Item(_) => None,
                    }));
                }
                stmt => out.push(self.stmt(stmt, depth)?),
            }
        }
        Ok(out)
    }

    fn stmt(&self, stmt: Stmt, depth: usize) -> Result<Stmt, MacroError> {
        Ok(match stmt {
            Stmt::Declare { target, value } => Stmt::Declare {
                target,
                value: self.expr(value, depth)?,
            },
            Stmt::Assign { target, value } => Stmt::Assign {
                target,
                value: self.expr(value, depth)?,
            },
            Stmt::Return(value) => Stmt::Return(self.expr(value, depth)?),
            Stmt::Expr(value) => Stmt::Expr(self.expr(value, depth)?),
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => Stmt::If {
                cond: self.expr(cond, depth)?,
                then_block: self.block(then_block, depth)?,
                else_block: self.block(else_block, depth)?,
            },
            Stmt::While { cond, body } => Stmt::While {
                cond: self.expr(cond, depth)?,
                body: self.block(body, depth)?,
            },
            Stmt::For {
                key,
                value,
                iterable,
                body,
            } => Stmt::For {
                key,
                value,
                iterable: self.expr(iterable, depth)?,
                body: self.block(body, depth)?,
            },
            Stmt::Switch {
                scrutinee,
                cases,
                default,
            } => Stmt::Switch {
                scrutinee: self.expr(scrutinee, depth)?,
                cases: cases
                    .into_iter()
                    .map(|case| {
                        Ok(SwitchCase {
                            value: self.expr(case.value, depth)?,
                            body: self.block(case.body, depth)?,
                        })
                    })
                    .collect::<Result<_, MacroError>>()?,
                default: self.block(default, depth)?,
            },
            Stmt::Validate(value) => Stmt::Validate(self.expr(value, depth)?),
            other => other,
        })
    }

    /// Expressions only matter for the statement blocks they carry: async
    /// bodies, possibly nested inside other expressions.
    fn expr(&self, expr: Expr, depth: usize) -> Result<Expr, MacroError> {
        Ok(match expr {
            Expr::Async(body) => Expr::Async(self.block(body, depth)?),
            Expr::Binary { op, left, right } => Expr::Binary {
                op,
                left: Box::new(self.expr(*left, depth)?),
                right: Box::new(self.expr(*right, depth)?),
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op,
                operand: Box::new(self.expr(*operand, depth)?),
            },
            Expr::Object(fields) => Expr::Object(
                fields
                    .into_iter()
                    .map(|field| {
                        Ok(ObjectField {
                            key: field.key,
                            value: self.expr(field.value, depth)?,
                        })
                    })
                    .collect::<Result<_, MacroError>>()?,
            ),
            Expr::Array(elements) => Expr::Array(
                elements
                    .into_iter()
                    .map(|element| self.expr(element, depth))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Field { object, field } => Expr::Field {
                object: Box::new(self.expr(*object, depth)?),
                field,
            },
            Expr::Index { array, index } => Expr::Index {
                array: Box::new(self.expr(*array, depth)?),
                index: Box::new(self.expr(*index, depth)?),
            },
            Expr::Call { name, args } => Expr::Call {
                name,
                args: args
                    .into_iter()
                    .map(|arg| self.expr(arg, depth))
                    .collect::<Result<_, _>>()?,
            },
            Expr::Match { scrutinee, cases } => Expr::Match {
                scrutinee: Box::new(self.expr(*scrutinee, depth)?),
                cases: cases
                    .into_iter()
                    .map(|case| {
                        Ok(MatchCase {
                            pattern: case.pattern,
                            guard: case.guard.map(|g| self.expr(g, depth)).transpose()?,
                            body: self.expr(case.body, depth)?,
                        })
                    })
                    .collect::<Result<_, MacroError>>()?,
            },
            Expr::Await(inner) => Expr::Await(Box::new(self.expr(*inner, depth)?)),
            other @ (Expr::Literal(_) | Expr::Var(_) | Expr::Unquote(_)) => other,
        })
    }
}

// === Substitution ===

fn substitute_node(node: &MacroNode, subs: &Substitutions) -> MacroNode {
    match node {
        MacroNode::Item(item) => MacroNode::Item(substitute_item(item, subs)),
        MacroNode::Stmt(stmt) => MacroNode::Stmt(substitute_stmt(stmt, subs)),
    }
}

fn substitute_item(item: &Item, subs: &Substitutions) -> Item {
    match item {
        Item::Route(route) => Item::Route(Route {
            path: interpolate(&route.path, subs),
            body: substitute_block(&route.body, subs),
            ..route.clone()
        }),
        Item::Command(cmd) => Item::Command(Command {
            body: substitute_block(&cmd.body, subs),
            ..cmd.clone()
        }),
        Item::Cron(task) => Item::Cron(CronTask {
            body: substitute_block(&task.body, subs),
            ..task.clone()
        }),
        Item::Event(handler) => Item::Event(EventHandler {
            body: substitute_block(&handler.body, subs),
            ..handler.clone()
        }),
        Item::Queue(worker) => Item::Queue(QueueWorker {
            body: substitute_block(&worker.body, subs),
            ..worker.clone()
        }),
        Item::MacroInvocation(invocation) => {
            Item::MacroInvocation(substitute_invocation(invocation, subs))
        }
        Item::TypeDef(_) | Item::MacroDef(_) => item.clone(),
    }
}

fn substitute_invocation(invocation: &MacroInvocation, subs: &Substitutions) -> MacroInvocation {
    MacroInvocation {
        name: invocation.name.clone(),
        args: invocation
            .args
            .iter()
            .map(|arg| substitute_expr(arg, subs))
            .collect(),
    }
}

fn substitute_block(block: &[Stmt], subs: &Substitutions) -> Block {
    block.iter().map(|stmt| substitute_stmt(stmt, subs)).collect()
}

fn substitute_stmt(stmt: &Stmt, subs: &Substitutions) -> Stmt {
    match stmt {
        Stmt::Declare { target, value } => Stmt::Declare {
            target: interpolate(target, subs),
            value: substitute_expr(value, subs),
        },
        Stmt::Assign { target, value } => Stmt::Assign {
            target: interpolate(target, subs),
            value: substitute_expr(value, subs),
        },
        Stmt::Return(value) => Stmt::Return(substitute_expr(value, subs)),
        Stmt::If {
            cond,
            then_block,
            else_block,
        } => Stmt::If {
            cond: substitute_expr(cond, subs),
            then_block: substitute_block(then_block, subs),
            else_block: substitute_block(else_block, subs),
        },
        Stmt::While { cond, body } => Stmt::While {
            cond: substitute_expr(cond, subs),
            body: substitute_block(body, subs),
        },
        Stmt::For {
            key,
            value,
            iterable,
            body,
        } => Stmt::For {
            key: key.clone(),
            value: value.clone(),
            iterable: substitute_expr(iterable, subs),
            body: substitute_block(body, subs),
        },
        Stmt::Switch {
            scrutinee,
            cases,
            default,
        } => Stmt::Switch {
            scrutinee: substitute_expr(scrutinee, subs),
            cases: cases
                .iter()
                .map(|case| SwitchCase {
                    value: substitute_expr(&case.value, subs),
                    body: substitute_block(&case.body, subs),
                })
                .collect(),
            default: substitute_block(default, subs),
        },
        Stmt::Expr(value) => Stmt::Expr(substitute_expr(value, subs)),
        Stmt::Validate(value) => Stmt::Validate(substitute_expr(value, subs)),
        Stmt::Macro(invocation) => Stmt::Macro(substitute_invocation(invocation, subs)),
    }
}

fn boxed(expr: &Expr, subs: &Substitutions) -> Box<Expr> {
    Box::new(substitute_expr(expr, subs))
}

fn substitute_expr(expr: &Expr, subs: &Substitutions) -> Expr {
    match expr {
        Expr::Var(name) => subs.get(name).cloned().unwrap_or_else(|| expr.clone()),
        Expr::Literal(crate::ast::Literal::Str(s)) => Expr::str(interpolate(s, subs)),
        Expr::Literal(_) => expr.clone(),
        Expr::Binary { op, left, right } => Expr::Binary {
            op: *op,
            left: boxed(left, subs),
            right: boxed(right, subs),
        },
        Expr::Unary { op, operand } => Expr::Unary {
            op: *op,
            operand: boxed(operand, subs),
        },
        Expr::Object(fields) => Expr::Object(
            fields
                .iter()
                .map(|field| ObjectField {
                    key: field.key.clone(),
                    value: substitute_expr(&field.value, subs),
                })
                .collect(),
        ),
        Expr::Array(elements) => Expr::Array(
            elements
                .iter()
                .map(|element| substitute_expr(element, subs))
                .collect(),
        ),
        Expr::Field { object, field } => Expr::Field {
            object: boxed(object, subs),
            field: field.clone(),
        },
        Expr::Index { array, index } => Expr::Index {
            array: boxed(array, subs),
            index: boxed(index, subs),
        },
        Expr::Call { name, args } => Expr::Call {
            name: name.clone(),
            args: args.iter().map(|arg| substitute_expr(arg, subs)).collect(),
        },
        Expr::Match { scrutinee, cases } => Expr::Match {
            scrutinee: boxed(scrutinee, subs),
            cases: cases
                .iter()
                .map(|case| MatchCase {
                    pattern: case.pattern.clone(),
                    guard: case.guard.as_ref().map(|g| substitute_expr(g, subs)),
                    body: substitute_expr(&case.body, subs),
                })
                .collect(),
        },
        Expr::Async(body) => Expr::Async(substitute_block(body, subs)),
        Expr::Await(inner) => Expr::Await(boxed(inner, subs)),
        // The splice itself disappears once its operand is substituted.
        Expr::Unquote(inner) => substitute_expr(inner, subs),
    }
}

/// Replace `${param}` placeholders in `text`.
///
/// A parameter bound to a literal splices the literal's printed form; one
/// bound to a variable splices the variable's name. Any other placeholder is
/// left as written. Substituted text is not scanned again.
fn interpolate(text: &str, subs: &Substitutions) -> EcoString {
    if !text.contains("${") {
        return text.into();
    }

    let mut out = EcoString::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(len) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let placeholder = &rest[start..start + 2 + len + 1];
        match subs.get(&after[..len]) {
            Some(Expr::Literal(lit)) => out.push_str(&lit.to_string()),
            Some(Expr::Var(name)) => out.push_str(name),
            _ => out.push_str(placeholder),
        }
        rest = &after[len + 1..];
    }
    out.push_str(rest);
    out
}
