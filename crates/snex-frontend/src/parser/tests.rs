// src/parser/tests.rs

use super::*;
use crate::AstPrinter;

fn parse(source: &str) -> ParsedUnit {
    match Parser::new(source).parse_program() {
        Ok(unit) => unit,
        Err(e) => panic!("parse failed: {:?}", e.error),
    }
}

fn parse_err(source: &str) -> ParseError {
    match Parser::new(source).parse_program() {
        Ok(_) => panic!("expected a parse error"),
        Err(e) => e,
    }
}

fn items(unit: &ParsedUnit) -> Vec<NodeId> {
    match unit.ast.kind(unit.ast.root()) {
        NodeKind::Program(items) => items.clone(),
        other => panic!("root is not a program: {other:?}"),
    }
}

fn function_body(unit: &ParsedUnit, index: usize) -> Vec<NodeId> {
    let item = items(unit)[index];
    let NodeKind::FunctionDef(def) = unit.ast.kind(item) else {
        panic!("item {index} is not a function");
    };
    match unit.ast.kind(def.body) {
        NodeKind::Block(stmts) => stmts.clone(),
        _ => unreachable!(),
    }
}

fn expr_of(unit: &ParsedUnit, stmt: NodeId) -> NodeId {
    match unit.ast.kind(stmt) {
        NodeKind::ExprStmt(e) | NodeKind::Return(Some(e)) => *e,
        other => panic!("not an expression statement: {other:?}"),
    }
}

#[test]
fn parses_root_declarations_and_functions() {
    let unit = parse(
        "float gain = 0.5f;\n\
         span<float, 4> data = { 1.0f, 2.0f, 3.0f, 4.0f };\n\
         void processFrame(block frame) { }\n",
    );
    let items = items(&unit);
    assert_eq!(items.len(), 3);
    assert!(matches!(unit.ast.kind(items[0]), NodeKind::VarDecl(_)));
    let NodeKind::VarDecl(decl) = unit.ast.kind(items[1]) else {
        panic!()
    };
    assert_eq!(decl.ty.name, TypeName::Span);
    assert_eq!(decl.ty.args.len(), 2);
    assert!(matches!(
        decl.init.map(|i| unit.ast.kind(i)),
        Some(NodeKind::InitList(v)) if v.len() == 4
    ));
    assert!(matches!(unit.ast.kind(items[2]), NodeKind::FunctionDef(_)));
}

#[test]
fn multiple_declarators_become_separate_nodes() {
    let unit = parse("int a = 1, b, c = 3;");
    assert_eq!(items(&unit).len(), 3);
}

#[test]
fn precedence_product_over_sum_over_comparison() {
    let unit = parse("int f(int a, int b) { return a + b * 2 < 7 && a == 1; }");
    let body = function_body(&unit, 0);
    let expr = expr_of(&unit, body[0]);
    let printer = AstPrinter::new(&unit.ast, &unit.interner);
    assert_eq!(printer.inline_expr(expr), "(((a + (b * 2)) < 7) && (a == 1))");
}

#[test]
fn ternary_and_assignment_are_right_associative() {
    let unit = parse("void f() { a = b = c ? 1 : d ? 2 : 3; }");
    let body = function_body(&unit, 0);
    let printer = AstPrinter::new(&unit.ast, &unit.interner);
    assert_eq!(
        printer.inline_expr(expr_of(&unit, body[0])),
        "a = b = (c ? 1 : (d ? 2 : 3))"
    );
}

#[test]
fn cast_versus_parenthesized_expression() {
    let unit = parse("float f(int x) { return (float)x + (x); }");
    let body = function_body(&unit, 0);
    let expr = expr_of(&unit, body[0]);
    let NodeKind::Binary { lhs, rhs, .. } = unit.ast.kind(expr) else {
        panic!()
    };
    assert!(matches!(unit.ast.kind(*lhs), NodeKind::Cast { .. }));
    assert!(matches!(unit.ast.kind(*rhs), NodeKind::Identifier(_)));
}

#[test]
fn struct_template_and_nested_closing_brackets() {
    let unit = parse(
        "template <typename T, int N> struct Delay { span<T, N> buffer; int pos = 0; \
         T tick(T in) { return in; } };\n\
         template <typename T> struct Box { T v; };\n\
         Delay<span<float, 2>, 8> d;\n\
         Box<span<float, 2>> b;\n",
    );
    let items = items(&unit);
    assert_eq!(items.len(), 4);
    let NodeKind::StructDef(def) = unit.ast.kind(items[0]) else {
        panic!()
    };
    assert_eq!(def.template_params.len(), 2);
    assert_eq!(def.members.len(), 3);
    let NodeKind::VarDecl(decl) = unit.ast.kind(items[2]) else {
        panic!()
    };
    assert!(matches!(&decl.ty.args[0], TemplateArgExpr::Type(t) if t.name == TypeName::Span));
    assert!(matches!(&decl.ty.args[1], TemplateArgExpr::Const(_)));
    // `>>` closes both lists
    let NodeKind::VarDecl(boxed) = unit.ast.kind(items[3]) else {
        panic!()
    };
    assert_eq!(boxed.ty.args.len(), 1);
}

#[test]
fn foreach_and_classic_for() {
    let unit = parse(
        "void f(block b) { for (auto& s : b) s *= 0.5f; for (int i = 0; i < 4; i++) { } }",
    );
    let body = function_body(&unit, 0);
    assert!(matches!(unit.ast.kind(body[0]), NodeKind::ForEach(e) if e.var_ty.is_ref));
    assert!(matches!(
        unit.ast.kind(body[1]),
        NodeKind::For {
            init: Some(_),
            cond: Some(_),
            step: Some(_),
            ..
        }
    ));
}

#[test]
fn dangling_else_binds_to_nearest_if() {
    let unit = parse("void f(int a) { if (a) if (a > 1) a = 2; else a = 3; }");
    let body = function_body(&unit, 0);
    let NodeKind::If {
        then_branch,
        else_branch,
        ..
    } = unit.ast.kind(body[0])
    else {
        panic!()
    };
    assert!(else_branch.is_none());
    assert!(matches!(
        unit.ast.kind(*then_branch),
        NodeKind::If {
            else_branch: Some(_),
            ..
        }
    ));
}

#[test]
fn switch_collects_cases() {
    let unit = parse(
        "int f(int m) { switch (m) { case 0: return 1; case 1: case 2: m++; break; default: break; } return m; }",
    );
    let body = function_body(&unit, 0);
    let NodeKind::Switch { cases, .. } = unit.ast.kind(body[0]) else {
        panic!()
    };
    assert_eq!(cases.len(), 4);
    assert!(cases[1].body.is_empty());
    assert!(cases[3].value.is_none());
}

#[test]
fn method_calls_and_qualified_paths() {
    let unit = parse("namespace Dsp { float k = 2.0f; }\nfloat f(float x) { return Math.sin(x) * Dsp::k; }");
    let body = function_body(&unit, 1);
    let expr = expr_of(&unit, body[0]);
    let printer = AstPrinter::new(&unit.ast, &unit.interner);
    assert_eq!(printer.inline_expr(expr), "(Math.sin(x) * Dsp::k)");
}

#[test]
fn explicit_template_call() {
    let unit = parse("template <typename T> T twice(T v) { return v * 2; }\nint f() { return twice<int>(3); }");
    let body = function_body(&unit, 1);
    let expr = expr_of(&unit, body[0]);
    assert!(matches!(
        unit.ast.kind(expr),
        NodeKind::Call { callee: Callee::Path { template_args, .. }, .. } if template_args.len() == 1
    ));
}

#[test]
fn missing_semicolon_reports_statement_start() {
    let source = "int f() {\n    int a = 1;\n    int b = 2;\n    a = b\n    return a;\n}\n";
    let err = parse_err(source);
    assert!(matches!(err.error, ParserError::MissingSemicolon { .. }));
    assert_eq!((err.span.line, err.span.column), (4, 5));
}

#[test]
fn lexer_errors_surface_through_the_parser() {
    let err = parse_err("int x = 1;\nint y = 2 @ 3;");
    assert!(matches!(err.error, ParserError::Lexer(_)));
    assert_eq!((err.span.line, err.span.column), (2, 11));
}

#[test]
fn destructor_must_match_struct_name() {
    parse("struct S { int v; ~S() { v = 0; } };");
    let err = parse_err("struct S { ~T() {} };");
    assert!(matches!(err.error, ParserError::UnexpectedToken { .. }));
}

#[test]
fn integer_out_of_range() {
    let err = parse_err("int x = 99999999999;");
    assert!(matches!(err.error, ParserError::IntegerOutOfRange { .. }));
    parse("int y = 0xFFFFFFFF;");
}

#[test]
fn standalone_expression() {
    let (unit, expr) = Parser::new("input * 0.5 + 1.0")
        .parse_standalone_expression()
        .unwrap();
    assert!(matches!(unit.ast.kind(expr), NodeKind::Binary { op: BinaryOp::Add, .. }));
}

#[test]
fn deep_parentheses_are_rejected_at_the_limit() {
    let nested = |n: usize| format!("{}x{}", "(".repeat(n), ")".repeat(n));

    assert!(Parser::new(&nested(40)).parse_standalone_expression().is_ok());

    let err = match Parser::new(&nested(500)).parse_standalone_expression() {
        Ok(_) => panic!("expected a nesting error"),
        Err(e) => e,
    };
    assert!(matches!(err.error, ParserError::NestingTooDeep { limit: 64, .. }), "{:?}", err.error);
    // The 64th '(' opens one level too many; the error points past it
    assert_eq!((err.span.line, err.span.column), (1, 65));
}

#[test]
fn deep_statements_and_operator_chains_are_rejected() {
    let blocks = format!("void f() {{ {} {} }}", "{".repeat(300), "}".repeat(300));
    let err = parse_err(&blocks);
    assert!(matches!(err.error, ParserError::NestingTooDeep { .. }), "{:?}", err.error);

    let long_sum = format!("int f(int x) {{ return x{}; }}", " + x".repeat(1000));
    let err = parse_err(&long_sum);
    assert!(matches!(err.error, ParserError::NestingTooDeep { limit: 256, .. }), "{:?}", err.error);

    parse(&format!("int f(int x) {{ return x{}; }}", " + x".repeat(100)));
}
