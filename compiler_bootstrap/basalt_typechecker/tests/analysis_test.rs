//! Symbol and semantic analysis integration tests

use basalt_common::Diagnostics;
use basalt_lexer::Lexer;
use basalt_parser::{BinOp, DefnKind, ExprKind, Parser, StmtKind, Unit};
use basalt_typechecker::{has_deferred_types, SemanticAnalysis, SymbolAnalysis};
use pretty_assertions::assert_eq;

fn parse(source: &str) -> Unit {
    let mut diagnostics = Diagnostics::new();
    let tokens = Lexer::new(source, "test.bas", &mut diagnostics)
        .tokenize()
        .expect("lex failed");
    Parser::new(tokens, "test.bas", &mut diagnostics).parse().expect("parse failed")
}

/// Run both analysis passes; returns the analyzed unit and diagnostics on
/// success, the first fatal error message otherwise.
fn analyze(source: &str) -> Result<(Unit, Diagnostics), String> {
    let mut unit = parse(source);
    let mut diagnostics = Diagnostics::new();

    SymbolAnalysis::run(&mut unit, &mut diagnostics).map_err(|e| e.message().to_string())?;
    SemanticAnalysis::run(&mut unit, &mut diagnostics).map_err(|e| e.message().to_string())?;

    Ok((unit, diagnostics))
}

fn analyze_ok(source: &str) -> Unit {
    let (unit, diagnostics) = analyze(source).expect("analysis failed");
    assert!(!diagnostics.has_errors(), "unexpected errors: {:?}", diagnostics.messages);
    unit
}

fn analyze_err(source: &str) -> String {
    analyze(source).expect_err("analysis should fail")
}

#[test]
fn deferred_types_are_resolved() {
    let unit = analyze_ok(
        r#"
        Box :: struct { x: s32, y: s32 }
        make :: () -> Box;
        use :: (b: *Box) -> s32 { ret b.x; }
        "#,
    );

    assert!(!has_deferred_types(&unit));
}

#[test]
fn unresolved_type_is_fatal() {
    let err = analyze_err("make :: () -> Missing;");
    assert!(err.contains("unresolved type"), "{}", err);
}

#[test]
fn value_binding_is_not_a_type() {
    let err = analyze_err("x :: s64 = 0; f :: () -> x;");
    assert!(err.contains("does not name a type"), "{}", err);
}

#[test]
fn unresolved_reference_is_fatal() {
    let err = analyze_err("f :: () -> s64 { ret missing; }");
    assert!(err.contains("unresolved reference"), "{}", err);
}

#[test]
fn type_reference_is_not_a_value() {
    let err = analyze_err("T :: struct { a: s8 } f :: () -> s64 { ret T; }");
    assert!(err.contains("invalid reference"), "{}", err);
}

#[test]
fn field_access_resolves_through_pointers() {
    let unit = analyze_ok(
        r#"
        Point :: struct { x: s64, y: s64 }
        get_y :: (p: *Point) -> s64 { ret p.y; }
        "#,
    );

    // Find the access expression and check its resolved field index.
    let mut found = false;
    for defn in &unit.top {
        if let DefnKind::Function { body: Some(body), .. } = &unit.defn(*defn).kind {
            if let StmtKind::Block { stmts, .. } = &unit.stmt(*body).kind {
                if let StmtKind::Ret(Some(expr)) = unit.stmt(stmts[0]).kind {
                    if let ExprKind::Access { field: Some(field), .. } = &unit.expr(expr).kind {
                        if let DefnKind::Field { index, .. } = unit.defn(*field).kind {
                            assert_eq!(index, 1);
                            found = true;
                        }
                    }
                }
            }
        }
    }

    assert!(found, "field access was not resolved");
}

#[test]
fn missing_field_is_fatal() {
    let err = analyze_err(
        "Point :: struct { x: s64 } f :: (p: Point) -> s64 { ret p.z; }",
    );
    assert!(err.contains("does not exist"), "{}", err);
}

#[test]
fn access_requires_struct_base() {
    let err = analyze_err("f :: (x: s64) -> s64 { ret x.y; }");
    assert!(err.contains("must be a struct"), "{}", err);
}

#[test]
fn main_must_return_s64() {
    // A `main` that returns anything but s64 is rejected.
    let (_, diagnostics) = analyze("$public main :: () -> s8;").unwrap();
    assert!(diagnostics.has_errors());
    assert!(diagnostics
        .messages
        .iter()
        .any(|d| d.message.contains("'main' must return 's64'")));
}

#[test]
fn main_must_be_public() {
    let (_, diagnostics) = analyze("main :: () -> s64 { ret 0; }").unwrap();
    assert!(diagnostics
        .messages
        .iter()
        .any(|d| d.message.contains("'main' must be marked with $public")));
}

#[test]
fn stop_outside_loop_is_fatal() {
    let err = analyze_err("foo :: () -> s64 { stop; }");
    assert!(err.contains("'stop' outside of loop"), "{}", err);
}

#[test]
fn restart_outside_loop_is_fatal() {
    let err = analyze_err("foo :: () -> s64 { restart; }");
    assert!(err.contains("'restart' outside of loop"), "{}", err);
}

#[test]
fn stop_inside_loop_is_accepted() {
    analyze_ok("foo :: () -> void { until false { stop; } }");
}

#[test]
fn ret_value_from_void_function_is_fatal() {
    let err = analyze_err("foo :: () -> void { ret; } bar :: () -> s64 { ret; }");
    assert!(err.contains("does not return 'void'"), "{}", err);
}

#[test]
fn implicit_widening_inserts_a_cast() {
    let unit = analyze_ok("f :: (x: s8) -> s64 { ret x; }");

    for defn in &unit.top {
        if let DefnKind::Function { body: Some(body), .. } = &unit.defn(*defn).kind {
            if let StmtKind::Block { stmts, .. } = &unit.stmt(*body).kind {
                if let StmtKind::Ret(Some(expr)) = unit.stmt(stmts[0]).kind {
                    assert!(
                        matches!(unit.expr(expr).kind, ExprKind::Cast { .. }),
                        "expected an inserted cast around the return value"
                    );
                    assert_eq!(unit.types.display(unit.expr_type(expr)), "s64");
                    return;
                }
            }
        }
    }

    panic!("return statement not found");
}

#[test]
fn narrowing_return_is_fatal() {
    let err = analyze_err("f :: (x: s64) -> s8 { ret x; }");
    assert!(err.contains("return type mismatch"), "{}", err);
}

#[test]
fn assignment_requires_mutable_lvalue() {
    let err = analyze_err("f :: (x: s64) -> void { x = 1; }");
    assert!(err.contains("must be mutable"), "{}", err);
}

#[test]
fn assignment_requires_lvalue() {
    let err = analyze_err("f :: () -> void { 1 = 2; }");
    assert!(err.contains("must be an lvalue"), "{}", err);
}

#[test]
fn assignment_to_mut_parameter_is_accepted() {
    analyze_ok("f :: (x: mut s64) -> s64 { x = x + 3; ret x; }");
}

#[test]
fn comparisons_produce_bool() {
    let unit = analyze_ok("f :: (a: s64, b: s64) -> bool { ret a < b; }");

    for defn in &unit.top {
        if let DefnKind::Function { body: Some(body), .. } = &unit.defn(*defn).kind {
            if let StmtKind::Block { stmts, .. } = &unit.stmt(*body).kind {
                if let StmtKind::Ret(Some(expr)) = unit.stmt(stmts[0]).kind {
                    if let ExprKind::Binary { op, .. } = unit.expr(expr).kind {
                        assert_eq!(op, BinOp::Lt);
                        assert_eq!(unit.types.display(unit.expr_type(expr)), "bool");
                        return;
                    }
                }
            }
        }
    }

    panic!("comparison not found");
}

#[test]
fn if_condition_must_be_boolean_evaluable() {
    let err = analyze_err(
        "B :: struct { v: s64 } f :: (b: B) -> void { if b { ret; } }",
    );
    assert!(err.contains("'if' condition must be a boolean"), "{}", err);
}

#[test]
fn pointer_arithmetic_is_loosely_typed() {
    analyze_ok("f :: (p: *s64, n: s64) -> *s64 { ret p + n; }");
    analyze_ok("f :: (p: *s64, n: s64) -> *s64 { ret p - n; }");
}

#[test]
fn pointer_addition_to_non_additive_operator_is_fatal() {
    let err = analyze_err("f :: (p: *s64, n: s64) -> *s64 { ret p * n; }");
    assert!(err.contains("operand type mismatch"), "{}", err);
}

#[test]
fn call_argument_count_is_checked() {
    let err = analyze_err("g :: (a: s64) -> s64; f :: () -> s64 { ret g(); }");
    assert!(err.contains("argument count mismatch"), "{}", err);
}

#[test]
fn call_arguments_are_implicitly_cast() {
    analyze_ok("g :: (a: s64) -> s64; f :: (x: s8) -> s64 { ret g(x); }");
}

#[test]
fn call_target_must_be_a_function() {
    let err = analyze_err("x :: s64 = 1; f :: () -> s64 { ret x(); }");
    assert!(err.contains("not a function"), "{}", err);
}

#[test]
fn explicit_narrowing_cast_is_accepted() {
    analyze_ok("f :: (x: s64) -> s8 { ret cast<s8>(x); }");
}

#[test]
fn unsupported_cast_is_fatal() {
    let err = analyze_err(
        "B :: struct { v: s64 } f :: (b: B) -> s64 { ret cast<s64>(b); }",
    );
    assert!(err.contains("unsupported cast"), "{}", err);
}

#[test]
fn dereference_requires_pointer() {
    let err = analyze_err("f :: (x: s64) -> s64 { ret *x; }");
    assert!(err.contains("'*' operator incompatible"), "{}", err);
}

#[test]
fn address_of_requires_lvalue() {
    let err = analyze_err("f :: () -> *s64 { ret &(1 + 2); }");
    assert!(err.contains("'&' base must be an lvalue"), "{}", err);
}

#[test]
fn globals_require_constant_initializers() {
    let err = analyze_err("g :: () -> s64; x :: s64 = g();");
    assert!(err.contains("non-constants"), "{}", err);
}

#[test]
fn variant_references_are_constant_values() {
    analyze_ok(
        r#"
        Color :: enum { Red, Green, Blue }
        favorite :: Color = Green;
        f :: () -> s64 { ret cast<s64>(favorite); }
        "#,
    );
}
