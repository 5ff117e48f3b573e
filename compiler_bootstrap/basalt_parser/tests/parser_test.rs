//! Parser integration tests

use basalt_lexer::Lexer;
use basalt_parser::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn parse(source: &str) -> Unit {
    let mut diagnostics = basalt_common::Diagnostics::new();
    let tokens = Lexer::new(source, "test.bas", &mut diagnostics)
        .tokenize()
        .expect("lex failed");
    Parser::new(tokens, "test.bas", &mut diagnostics).parse().expect("parse failed")
}

fn parse_err(source: &str) -> basalt_common::BasaltError {
    let mut diagnostics = basalt_common::Diagnostics::new();
    let tokens = Lexer::new(source, "test.bas", &mut diagnostics)
        .tokenize()
        .expect("lex failed");
    Parser::new(tokens, "test.bas", &mut diagnostics).parse().expect_err("parse should fail")
}

#[test]
fn parses_function_definition() {
    let unit = parse("main :: () -> s64 { ret 0; }");
    assert_eq!(unit.top.len(), 1);

    match &unit.defn(unit.top[0]).kind {
        DefnKind::Function { name, params, body, ty, .. } => {
            assert_eq!(name, "main");
            assert!(params.is_empty());
            assert!(body.is_some());
            assert_eq!(unit.types.display(*ty), "() -> s64");
        }
        other => panic!("expected function, got {:?}", other),
    }
}

#[test]
fn parses_external_function_declaration() {
    let unit = parse("getchar :: () -> s32;");
    match &unit.defn(unit.top[0]).kind {
        DefnKind::Function { body, .. } => assert!(body.is_none()),
        other => panic!("expected function, got {:?}", other),
    }
}

#[test]
fn parses_parameters_into_function_scope() {
    let unit = parse("add :: (a: s64, b: s64) -> s64 { ret a + b; }");
    match &unit.defn(unit.top[0]).kind {
        DefnKind::Function { params, scope, .. } => {
            assert_eq!(params.len(), 2);
            assert!(unit.scopes.lookup_local(*scope, "a").is_some());
            assert!(unit.scopes.lookup_local(*scope, "b").is_some());
        }
        other => panic!("expected function, got {:?}", other),
    }
}

#[test]
fn parses_struct_definition() {
    let unit = parse("Box :: struct { x: s32, y: s32 }");
    match &unit.defn(unit.top[0]).kind {
        DefnKind::Struct { name, fields, ty, .. } => {
            assert_eq!(name, "Box");
            assert_eq!(fields.len(), 2);
            assert!(unit.types.is_struct(ty.ty));

            match &unit.defn(fields[1]).kind {
                DefnKind::Field { name, index, .. } => {
                    assert_eq!(name, "y");
                    assert_eq!(*index, 1);
                }
                other => panic!("expected field, got {:?}", other),
            }
        }
        other => panic!("expected struct, got {:?}", other),
    }
}

#[test]
fn parses_enum_with_auto_increment_values() {
    let unit = parse("Color :: enum { Red, Green = 5, Blue }");
    match &unit.defn(unit.top[0]).kind {
        DefnKind::Enum { variants, underlying, .. } => {
            assert_eq!(unit.types.display(*underlying), "s64");

            let values: Vec<i64> = variants
                .iter()
                .map(|&v| match unit.defn(v).kind {
                    DefnKind::Variant { value, .. } => value,
                    _ => panic!("expected variant"),
                })
                .collect();

            assert_eq!(values, vec![0, 5, 6]);
        }
        other => panic!("expected enum, got {:?}", other),
    }
}

#[test]
fn enum_variants_bind_in_the_enclosing_scope() {
    let unit = parse("Color :: enum { Red, Green }");
    assert!(unit.scopes.lookup(unit.root_scope, "Red").is_some());
    assert!(unit.scopes.lookup(unit.root_scope, "Green").is_some());
}

#[test]
fn parses_global_with_initializer() {
    let unit = parse("counter :: mut s64 = 41;");
    match &unit.defn(unit.top[0]).kind {
        DefnKind::Var { name, ty, init, global, .. } => {
            assert_eq!(name, "counter");
            assert!(ty.is_mut());
            assert!(init.is_some());
            assert!(global);
        }
        other => panic!("expected global, got {:?}", other),
    }
}

#[test]
fn parses_load_definition() {
    let unit = parse("load \"lib/io.bas\";");
    match &unit.defn(unit.top[0]).kind {
        DefnKind::Load { path } => assert_eq!(path, "lib/io.bas"),
        other => panic!("expected load, got {:?}", other),
    }
}

#[test]
fn parses_rune_decorators() {
    let unit = parse("$public main :: () -> s64 { ret 0; }");
    assert!(unit.has_rune(unit.top[0], Rune::Public));
}

#[test]
fn unknown_type_names_defer() {
    let unit = parse("make :: () -> Box;");
    match &unit.defn(unit.top[0]).kind {
        DefnKind::Function { ty, .. } => match unit.types.get(ty.ty) {
            Type::Function { ret, .. } => assert!(unit.types.is_deferred(ret.ty)),
            other => panic!("expected function type, got {:?}", other),
        },
        other => panic!("expected function, got {:?}", other),
    }
}

#[test]
fn parses_statement_forms() {
    let unit = parse(
        r#"
        loopy :: (n: s64) -> s64 {
            let i: mut s64 = 0;
            until i >= n {
                if i == 3 { restart; } else stop;
                i = i + 1;
            }
            $unreachable;
            ret i;
        }
        "#,
    );

    let body = match &unit.defn(unit.top[0]).kind {
        DefnKind::Function { body, .. } => body.unwrap(),
        _ => panic!("expected function"),
    };

    let stmts = match &unit.stmt(body).kind {
        StmtKind::Block { stmts, .. } => stmts.clone(),
        _ => panic!("expected block"),
    };

    assert!(matches!(unit.stmt(stmts[0]).kind, StmtKind::Local(_)));
    assert!(matches!(unit.stmt(stmts[1]).kind, StmtKind::Until { body: Some(_), .. }));
    assert!(matches!(unit.stmt(stmts[2]).kind, StmtKind::Rune(Rune::Unreachable)));
    assert!(matches!(unit.stmt(stmts[3]).kind, StmtKind::Ret(Some(_))));
}

#[test]
fn until_without_body() {
    let unit = parse("spin :: (f: bool) -> void { until f; }");
    let body = match &unit.defn(unit.top[0]).kind {
        DefnKind::Function { body, .. } => body.unwrap(),
        _ => panic!("expected function"),
    };

    let stmts = match &unit.stmt(body).kind {
        StmtKind::Block { stmts, .. } => stmts.clone(),
        _ => panic!("expected block"),
    };

    assert!(matches!(unit.stmt(stmts[0]).kind, StmtKind::Until { body: None, .. }));
}

#[test]
fn precedence_shapes_the_tree() {
    // a + b * c parses as a + (b * c)
    let unit = parse("f :: (a: s64, b: s64, c: s64) -> s64 { ret a + b * c; }");

    let body = match &unit.defn(unit.top[0]).kind {
        DefnKind::Function { body, .. } => body.unwrap(),
        _ => panic!("expected function"),
    };
    let ret = match &unit.stmt(body).kind {
        StmtKind::Block { stmts, .. } => stmts[0],
        _ => panic!("expected block"),
    };
    let expr = match unit.stmt(ret).kind {
        StmtKind::Ret(Some(expr)) => expr,
        _ => panic!("expected ret"),
    };

    match &unit.expr(expr).kind {
        ExprKind::Binary { op: BinOp::Add, rhs, .. } => {
            assert!(matches!(
                unit.expr(*rhs).kind,
                ExprKind::Binary { op: BinOp::Mul, .. }
            ));
        }
        other => panic!("expected addition at the root, got {:?}", other),
    }
}

#[test]
fn assignment_is_right_associative() {
    let unit = parse("f :: (a: mut s64, b: mut s64) -> void { a = b = 1; }");

    let body = match &unit.defn(unit.top[0]).kind {
        DefnKind::Function { body, .. } => body.unwrap(),
        _ => panic!("expected function"),
    };
    let stmt = match &unit.stmt(body).kind {
        StmtKind::Block { stmts, .. } => stmts[0],
        _ => panic!("expected block"),
    };
    let expr = match unit.stmt(stmt).kind {
        StmtKind::Expr(expr) => expr,
        _ => panic!("expected expression statement"),
    };

    match &unit.expr(expr).kind {
        ExprKind::Binary { op: BinOp::Assign, rhs, .. } => {
            assert!(matches!(
                unit.expr(*rhs).kind,
                ExprKind::Binary { op: BinOp::Assign, .. }
            ));
        }
        other => panic!("expected assignment at the root, got {:?}", other),
    }
}

#[test]
fn parses_postfix_chains() {
    let unit = parse("f :: (p: *Box) -> s32 { ret g(p)[0].x; }");

    // Tree shape: Access(Subscript(Call(Ref g, [Ref p]), Int 0), "x")
    let body = match &unit.defn(unit.top[0]).kind {
        DefnKind::Function { body, .. } => body.unwrap(),
        _ => panic!("expected function"),
    };
    let ret = match &unit.stmt(body).kind {
        StmtKind::Block { stmts, .. } => stmts[0],
        _ => panic!("expected block"),
    };
    let expr = match unit.stmt(ret).kind {
        StmtKind::Ret(Some(expr)) => expr,
        _ => panic!("expected ret"),
    };

    let base = match &unit.expr(expr).kind {
        ExprKind::Access { base, name, .. } => {
            assert_eq!(name, "x");
            *base
        }
        other => panic!("expected access, got {:?}", other),
    };

    let base = match &unit.expr(base).kind {
        ExprKind::Subscript { base, .. } => *base,
        other => panic!("expected subscript, got {:?}", other),
    };

    assert!(matches!(unit.expr(base).kind, ExprKind::Call { .. }));
}

#[test]
fn parses_cast_and_sizeof() {
    let unit = parse("f :: (x: s64) -> s8 { ret cast<s8>(x + sizeof<[4]s32>); }");

    let body = match &unit.defn(unit.top[0]).kind {
        DefnKind::Function { body, .. } => body.unwrap(),
        _ => panic!("expected function"),
    };
    let ret = match &unit.stmt(body).kind {
        StmtKind::Block { stmts, .. } => stmts[0],
        _ => panic!("expected block"),
    };
    let expr = match unit.stmt(ret).kind {
        StmtKind::Ret(Some(expr)) => expr,
        _ => panic!("expected ret"),
    };

    match &unit.expr(expr).kind {
        ExprKind::Cast { .. } => {
            assert_eq!(unit.types.display(unit.expr_type(expr)), "s8");
        }
        other => panic!("expected cast, got {:?}", other),
    }
}

#[test]
fn duplicate_definitions_are_fatal() {
    let err = parse_err("x :: s64 = 1; x :: s64 = 2;");
    assert!(err.message().contains("duplicate"));
}

#[test]
fn duplicate_type_names_are_fatal() {
    let err = parse_err("T :: struct { a: s8 } T :: struct { b: s8 }");
    assert!(err.message().contains("duplicate"));
}

#[test]
fn reserved_identifier_binding_is_fatal() {
    let err = parse_err("until :: s64 = 0;");
    assert!(err.message().contains("reserved"));
}

#[test]
fn zero_length_array_is_fatal() {
    let err = parse_err("x :: [0]s64;");
    assert!(err.message().contains("array size"));
}

// Strategy producing canonical surface type strings: what `TypeCtx::display`
// would print back unchanged.
fn type_string() -> impl Strategy<Value = String> {
    let builtin = prop_oneof![
        Just("void"), Just("bool"), Just("char"),
        Just("s8"), Just("s16"), Just("s32"), Just("s64"),
        Just("u8"), Just("u16"), Just("u32"), Just("u64"),
        Just("f32"), Just("f64"),
    ]
    .prop_map(str::to_string);

    builtin.prop_recursive(3, 12, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|t| format!("*{}", t)),
            inner.clone().prop_map(|t| format!("*mut {}", t)),
            (1u32..16, inner).prop_map(|(n, t)| format!("[{}]{}", n, t)),
        ]
    })
}

proptest! {
    // Round-trip: parsing the rendered form of a type yields a type that
    // renders identically.
    #[test]
    fn type_display_round_trips(repr in type_string()) {
        let unit = parse(&format!("x :: {};", repr));
        let ty = unit.defn_type(unit.top[0]).unwrap();
        prop_assert_eq!(unit.types.display(ty), repr);
    }
}
