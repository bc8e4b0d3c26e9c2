use pretty_assertions::assert_eq;

use super::*;
use crate::ast::{
    BinaryOp, Expr, Item, MacroDef, MacroInvocation, MacroNode, Module, Route, Stmt, SwitchCase,
};

fn def(name: &str, params: &[&str], body: Vec<MacroNode>) -> MacroDef {
    MacroDef {
        name: name.into(),
        params: params.iter().map(|p| (*p).into()).collect(),
        body,
    }
}

fn invoke(name: &str, args: Vec<Expr>) -> MacroInvocation {
    MacroInvocation {
        name: name.into(),
        args,
    }
}

fn route(method: &str, path: &str, body: Vec<Stmt>) -> Route {
    Route {
        method: method.into(),
        path: path.into(),
        injections: vec![],
        auth: None,
        body,
    }
}

fn stmts(nodes: Vec<MacroNode>) -> Vec<Stmt> {
    nodes
        .into_iter()
        .map(|node| match node {
            MacroNode::Stmt(stmt) => stmt,
            MacroNode::Item(item) => panic!("expected statement, got {:?}", item),
        })
        .collect()
}

/// `pair(a, b)`: logs both parameters, then returns their sum.
fn pair_macro() -> MacroDef {
    def(
        "pair",
        &["a", "b"],
        vec![
            MacroNode::Stmt(Stmt::Expr(Expr::call(
                "log",
                vec![Expr::str("a=${a}, b=${b}")],
            ))),
            MacroNode::Stmt(Stmt::If {
                cond: Expr::var("a"),
                then_block: vec![Stmt::Return(Expr::binary(
                    BinaryOp::Add,
                    Expr::var("a"),
                    Expr::var("b"),
                ))],
                else_block: vec![],
            }),
        ],
    )
}

// ============================================================================
// Invocation checks
// ============================================================================

#[test]
fn test_undefined_macro() {
    let expander = MacroExpander::new();
    let err = expander.expand(&invoke("missing", vec![])).unwrap_err();
    assert_eq!(
        err,
        MacroError::UndefinedMacro {
            name: "missing".into()
        }
    );
    assert_eq!(err.code(), "E001");
}

#[test]
fn test_arity_mismatch() {
    let mut expander = MacroExpander::new();
    expander.register(pair_macro());

    let err = expander
        .expand(&invoke("pair", vec![Expr::int(1)]))
        .unwrap_err();
    assert_eq!(
        err,
        MacroError::ArityMismatch {
            name: "pair".into(),
            expected: 2,
            actual: 1,
        }
    );
    assert_eq!(
        err.to_string(),
        "macro 'pair' expects 2 argument(s), got 1"
    );
}

#[test]
fn test_later_registration_replaces_earlier() {
    let mut expander = MacroExpander::new();
    expander.register(def("m", &[], vec![MacroNode::Stmt(Stmt::Return(Expr::int(1)))]));
    expander.register(def("m", &[], vec![MacroNode::Stmt(Stmt::Return(Expr::int(2)))]));

    let nodes = expander.expand(&invoke("m", vec![])).unwrap();
    assert_eq!(stmts(nodes), vec![Stmt::Return(Expr::int(2))]);
}

// ============================================================================
// Substitution
// ============================================================================

#[test]
fn test_parameters_substituted_everywhere() {
    let mut expander = MacroExpander::new();
    expander.register(pair_macro());

    let nodes = expander
        .expand(&invoke("pair", vec![Expr::int(5), Expr::var("user")]))
        .unwrap();
    assert_eq!(
        stmts(nodes),
        vec![
            Stmt::Expr(Expr::call("log", vec![Expr::str("a=5, b=user")])),
            Stmt::If {
                cond: Expr::int(5),
                then_block: vec![Stmt::Return(Expr::binary(
                    BinaryOp::Add,
                    Expr::int(5),
                    Expr::var("user"),
                ))],
                else_block: vec![],
            },
        ]
    );
}

#[test]
fn test_arguments_are_substituted_not_evaluated() {
    let mut expander = MacroExpander::new();
    expander.register(def(
        "twice",
        &["x"],
        vec![MacroNode::Stmt(Stmt::Return(Expr::binary(
            BinaryOp::Add,
            Expr::var("x"),
            Expr::var("x"),
        )))],
    ));

    let call = Expr::call("next_id", vec![]);
    let nodes = expander.expand(&invoke("twice", vec![call.clone()])).unwrap();
    assert_eq!(
        stmts(nodes),
        vec![Stmt::Return(Expr::binary(BinaryOp::Add, call.clone(), call))]
    );
}

#[test]
fn test_interpolation_of_literal_kinds() {
    let mut expander = MacroExpander::new();
    expander.register(def(
        "show",
        &["v"],
        vec![MacroNode::Stmt(Stmt::Return(Expr::str("[${v}]")))],
    ));

    let cases = [
        (Expr::float(1.5), "[1.5]"),
        (Expr::bool(true), "[true]"),
        (Expr::null(), "[null]"),
        (Expr::str("raw"), "[raw]"),
        (Expr::var("name"), "[name]"),
        // Other shapes are left as written.
        (Expr::call("f", vec![]), "[${v}]"),
    ];
    for (arg, expected) in cases {
        let nodes = expander.expand(&invoke("show", vec![arg])).unwrap();
        assert_eq!(stmts(nodes), vec![Stmt::Return(Expr::str(expected))]);
    }
}

#[test]
fn test_unknown_and_unterminated_placeholders_are_kept() {
    let mut expander = MacroExpander::new();
    expander.register(def(
        "show",
        &["v"],
        vec![MacroNode::Stmt(Stmt::Return(Expr::str(
            "${other} ${v} ${v",
        )))],
    ));

    let nodes = expander.expand(&invoke("show", vec![Expr::int(3)])).unwrap();
    assert_eq!(stmts(nodes), vec![Stmt::Return(Expr::str("${other} 3 ${v"))]);
}

#[test]
fn test_unquote_is_spliced() {
    let mut expander = MacroExpander::new();
    expander.register(def(
        "ret",
        &["e"],
        vec![MacroNode::Stmt(Stmt::Return(Expr::Unquote(Box::new(
            Expr::var("e"),
        ))))],
    ));

    let sum = Expr::binary(BinaryOp::Add, Expr::int(1), Expr::int(2));
    let nodes = expander.expand(&invoke("ret", vec![sum.clone()])).unwrap();
    assert_eq!(stmts(nodes), vec![Stmt::Return(sum)]);
}

#[test]
fn test_assignment_targets_are_interpolated() {
    let mut expander = MacroExpander::new();
    expander.register(def(
        "counter",
        &["name"],
        vec![MacroNode::Stmt(Stmt::declare("${name}_count", Expr::int(0)))],
    ));

    let nodes = expander
        .expand(&invoke("counter", vec![Expr::str("users")]))
        .unwrap();
    assert_eq!(stmts(nodes), vec![Stmt::declare("users_count", Expr::int(0))]);
}

// ============================================================================
// Nesting
// ============================================================================

#[test]
fn test_nested_invocations_expand_depth_first() {
    let mut expander = MacroExpander::new();
    expander.register(def(
        "inner",
        &["y"],
        vec![MacroNode::Stmt(Stmt::Expr(Expr::call(
            "log",
            vec![Expr::var("y")],
        )))],
    ));
    expander.register(def(
        "outer",
        &["x"],
        vec![
            MacroNode::Stmt(Stmt::Macro(invoke("inner", vec![Expr::var("x")]))),
            MacroNode::Stmt(Stmt::While {
                cond: Expr::var("x"),
                body: vec![Stmt::Macro(invoke("inner", vec![Expr::int(2)]))],
            }),
        ],
    ));

    let nodes = expander
        .expand(&invoke("outer", vec![Expr::var("flag")]))
        .unwrap();
    assert_eq!(
        stmts(nodes),
        vec![
            Stmt::Expr(Expr::call("log", vec![Expr::var("flag")])),
            Stmt::While {
                cond: Expr::var("flag"),
                body: vec![Stmt::Expr(Expr::call("log", vec![Expr::int(2)]))],
            },
        ]
    );
}

#[test]
fn test_self_invoking_macro_hits_depth_limit() {
    let mut expander = MacroExpander::with_max_depth(8);
    expander.register(def(
        "forever",
        &[],
        vec![MacroNode::Stmt(Stmt::Macro(invoke("forever", vec![])))],
    ));

    let err = expander.expand(&invoke("forever", vec![])).unwrap_err();
    assert_eq!(
        err,
        MacroError::ExpansionDepthExceeded {
            name: "forever".into(),
            limit: 8,
        }
    );
    assert!(err.to_diagnostic().help.is_some());
}

// ============================================================================
// Modules
// ============================================================================

#[test]
fn test_module_expansion_generates_routes() {
    let crud = def(
        "listing",
        &["resource"],
        vec![MacroNode::Item(Item::Route(route(
            "GET",
            "/api/${resource}",
            vec![Stmt::Return(Expr::str("list ${resource}"))],
        )))],
    );
    let module = Module {
        items: vec![
            // Used before it is defined.
            Item::MacroInvocation(invoke("listing", vec![Expr::str("users")])),
            Item::MacroDef(crud),
            Item::MacroInvocation(invoke("listing", vec![Expr::str("orders")])),
        ],
    };

    let expanded = MacroExpander::new().expand_module(module).unwrap();
    assert_eq!(
        expanded.items,
        vec![
            Item::Route(route(
                "GET",
                "/api/users",
                vec![Stmt::Return(Expr::str("list users"))]
            )),
            Item::Route(route(
                "GET",
                "/api/orders",
                vec![Stmt::Return(Expr::str("list orders"))]
            )),
        ]
    );
}

#[test]
fn test_statement_invocations_in_handler_bodies() {
    let audit = def(
        "audit",
        &["what"],
        vec![MacroNode::Stmt(Stmt::Expr(Expr::call(
            "record",
            vec![Expr::str("audit: ${what}")],
        )))],
    );
    let body = vec![Stmt::If {
        cond: Expr::var("admin"),
        then_block: vec![Stmt::Macro(invoke("audit", vec![Expr::str("login")]))],
        else_block: vec![],
    }];
    let module = Module {
        items: vec![
            Item::MacroDef(audit),
            Item::Route(route("POST", "/login", body)),
        ],
    };

    let expanded = MacroExpander::new().expand_module(module).unwrap();
    assert_eq!(
        expanded.items,
        vec![Item::Route(route(
            "POST",
            "/login",
            vec![Stmt::If {
                cond: Expr::var("admin"),
                then_block: vec![Stmt::Expr(Expr::call(
                    "record",
                    vec![Expr::str("audit: login")]
                ))],
                else_block: vec![],
            }]
        ))]
    );
}

#[test]
fn test_invocations_inside_async_bodies() {
    let mut expander = MacroExpander::new();
    expander.register(def(
        "ping",
        &[],
        vec![MacroNode::Stmt(Stmt::Expr(Expr::call("ping", vec![])))],
    ));

    let block = vec![Stmt::declare(
        "job",
        Expr::Async(vec![Stmt::Macro(invoke("ping", vec![]))]),
    )];
    assert_eq!(
        expander.expand_block(block).unwrap(),
        vec![Stmt::declare(
            "job",
            Expr::Async(vec![Stmt::Expr(Expr::call("ping", vec![]))]),
        )]
    );
}

#[test]
fn test_invocations_inside_switch_cases_and_validation() {
    let mut expander = MacroExpander::new();
    expander.register(def(
        "ping",
        &[],
        vec![MacroNode::Stmt(Stmt::Expr(Expr::call("ping", vec![])))],
    ));
    let pending = || Expr::Async(vec![Stmt::Macro(invoke("ping", vec![]))]);
    let expanded = || Expr::Async(vec![Stmt::Expr(Expr::call("ping", vec![]))]);

    let block = vec![
        Stmt::Validate(pending()),
        Stmt::Switch {
            scrutinee: Expr::var("job"),
            cases: vec![SwitchCase {
                value: pending(),
                body: vec![],
            }],
            default: vec![],
        },
    ];
    assert_eq!(
        expander.expand_block(block).unwrap(),
        vec![
            Stmt::Validate(expanded()),
            Stmt::Switch {
                scrutinee: Expr::var("job"),
                cases: vec![SwitchCase {
                    value: expanded(),
                    body: vec![],
                }],
                default: vec![],
            },
        ]
    );
}

#[test]
fn test_any_error_aborts_the_module() {
    let module = Module {
        items: vec![
            Item::Route(route("GET", "/ok", vec![Stmt::Return(Expr::int(1))])),
            Item::Route(route(
                "GET",
                "/broken",
                vec![Stmt::Macro(invoke("nope", vec![]))],
            )),
        ],
    };

    let err = MacroExpander::new().expand_module(module).unwrap_err();
    assert!(matches!(err, MacroError::UndefinedMacro { .. }));
}
