// src/optimizer/tests.rs

use snex_frontend::{BinaryOp, Literal, NodeId, NodeKind, Parser};
use snex_runtime::NativeRegistry;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::abort::AbortToken;
use crate::compilation::{Compilation, OptimizationLevel, SemaOptions};
use crate::errors::{SemaError, SemaErrorKind, SemanticError};

use super::Outcome;

fn compile(source: &str, optimization: OptimizationLevel) -> Result<Compilation, SemaError> {
    let unit = match Parser::new(source).parse_program() {
        Ok(unit) => unit,
        Err(e) => panic!("parse failed: {:?}", e.error),
    };
    let options = SemaOptions {
        optimization,
        ..SemaOptions::default()
    };
    let mut c = Compilation::new(unit, &NativeRegistry::new(), options);
    c.run()?;
    Ok(c)
}

fn compile_ok(source: &str) -> Compilation {
    match compile(source, OptimizationLevel::Full) {
        Ok(c) => c,
        Err(e) => panic!("compilation failed: {}", e.error),
    }
}

/// Body of the first user function.
fn body(c: &Compilation) -> NodeId {
    let (_, def) = c.user_functions()[0];
    match c.ast.kind(def) {
        NodeKind::FunctionDef(f) => f.body,
        _ => unreachable!(),
    }
}

fn find(c: &Compilation, node: NodeId, pred: &dyn Fn(&NodeKind) -> bool) -> Vec<NodeId> {
    let mut out = Vec::new();
    if pred(c.ast.kind(node)) {
        out.push(node);
    }
    for child in c.ast.children(node) {
        out.extend(find(c, child, pred));
    }
    out
}

fn returned(c: &Compilation) -> NodeKind {
    let returns = find(c, body(c), &|k| matches!(k, NodeKind::Return(Some(_))));
    match c.ast.kind(returns[0]) {
        NodeKind::Return(Some(e)) => c.ast.kind(*e).clone(),
        _ => unreachable!(),
    }
}

#[test]
fn folds_arithmetic_on_literals() {
    let c = compile_ok("int f() { return 2 * 3 + 1; }");
    assert_eq!(returned(&c), NodeKind::Literal(Literal::Int(7)));
    assert!(c.stats.folded >= 2);
}

#[test]
fn propagates_named_constants() {
    let c = compile_ok("const float gain = 0.5f;\nfloat f() { return gain * 4.0f; }");
    assert_eq!(returned(&c), NodeKind::Literal(Literal::Float(2.0)));
}

#[test]
fn folding_respects_the_level() {
    let c = match compile("int f() { return 2 * 3; }", OptimizationLevel::None) {
        Ok(c) => c,
        Err(e) => panic!("{}", e.error),
    };
    assert!(matches!(returned(&c), NodeKind::Binary { .. }));
}

#[test]
fn constant_division_by_zero_is_an_error() {
    let err = compile("int f() { return 1 / 0; }", OptimizationLevel::ConstantFolding)
        .err()
        .map(|e| e.error);
    assert!(matches!(err, Some(SemanticError::DivisionByZero { .. })), "{err:?}");
    assert!(compile("int f() { return 1 / 0; }", OptimizationLevel::None).is_ok());
}

#[test]
fn float_division_by_literal_zero_is_an_error() {
    let err = compile("float f(float x) { return x / 0.0f; }", OptimizationLevel::Full)
        .err()
        .map(|e| e.error);
    assert!(matches!(err, Some(SemanticError::DivisionByZero { .. })), "{err:?}");

    let err = compile("double f(double x) { return x / (1.0 - 1.0); }", OptimizationLevel::Full)
        .err()
        .map(|e| e.error);
    assert!(matches!(err, Some(SemanticError::DivisionByZero { .. })), "{err:?}");
}

#[test]
fn float_division_by_constant_becomes_multiplication() {
    let c = compile_ok("float f(float x) { return x / 4.0f; }");
    let NodeKind::Binary { op, rhs, .. } = returned(&c) else {
        panic!("expected a binary expression")
    };
    assert_eq!(op, BinaryOp::Mul);
    assert_eq!(c.ast.kind(rhs), &NodeKind::Literal(Literal::Float(0.25)));
}

#[test]
fn constant_conditions_remove_branches() {
    let c = compile_ok("int f(int a) { if (0) { return a; } else { return a + 1; } }");
    assert!(find(&c, body(&c), &|k| matches!(k, NodeKind::If { .. })).is_empty());
    assert!(matches!(returned(&c), NodeKind::Binary { op: BinaryOp::Add, .. }));
}

#[test]
fn statements_after_return_are_dropped() {
    let c = compile_ok("int f(int a) { return a; a = 2; return 3; }");
    let NodeKind::Block(items) = c.ast.kind(body(&c)) else {
        unreachable!()
    };
    assert_eq!(items.len(), 1);
}

#[test]
fn subtraction_of_constant_becomes_addition() {
    let c = compile_ok("int f(int a) { return a - 2; }");
    let NodeKind::Binary { op, rhs, .. } = returned(&c) else {
        panic!("expected a binary expression")
    };
    assert_eq!(op, BinaryOp::Add);
    assert_eq!(c.ast.kind(rhs), &NodeKind::Literal(Literal::Int(-2)));
}

#[test]
fn constants_move_to_the_right() {
    let c = compile_ok("float f(float a) { return 2.0f * a; }");
    let NodeKind::Binary { lhs, rhs, .. } = returned(&c) else {
        panic!("expected a binary expression")
    };
    assert!(matches!(c.ast.kind(lhs), NodeKind::Identifier(_)));
    assert!(matches!(c.ast.kind(rhs), NodeKind::Literal(_)));
}

#[test]
fn small_range_loops_are_unrolled() {
    let c = compile_ok(
        "span<float, 4> s;\n\
         float f() { float sum = 0.0f; for (auto& x : s) sum += x; return sum; }",
    );
    assert!(find(&c, body(&c), &|k| matches!(k, NodeKind::ForEach(_))).is_empty());
    assert_eq!(c.stats.loops_unrolled, 1);
    let subscripts = find(&c, body(&c), &|k| matches!(k, NodeKind::Subscript { .. }));
    assert_eq!(subscripts.len(), 4);
}

#[test]
fn loops_with_control_flow_or_over_the_limit_stay() {
    let c = compile_ok(
        "span<float, 4> s;\n\
         float f() { float sum = 0.0f; for (auto x : s) { if (x > 1.0f) break; sum += x; } return sum; }",
    );
    assert_eq!(c.stats.loops_unrolled, 0);

    let c = compile_ok(
        "span<float, 64> s;\n\
         float f() { float sum = 0.0f; for (auto x : s) sum += x; return sum; }",
    );
    assert_eq!(c.stats.loops_unrolled, 0);
}

#[test]
fn span_size_is_inlined_at_every_level() {
    let c = match compile("span<int, 5> s;\nint f() { return s.size(); }", OptimizationLevel::None) {
        Ok(c) => c,
        Err(e) => panic!("{}", e.error),
    };
    assert_eq!(returned(&c), NodeKind::Literal(Literal::Int(5)));
    assert_eq!(c.stats.inlined, 1);
}

#[test]
fn second_sweep_changes_nothing() {
    let mut c = compile_ok(
        "span<float, 2> s;\n\
         float f(float a) { float y = 1.0f - a / 4.0f; for (auto& x : s) y += 2.0f * x; \
         return Math.map(y, 0.0f, 2.0f); }",
    );
    assert!(c.stats.rewrites > 0);
    assert_eq!(c.optimize_sweep().ok(), Some(0));
}

#[test]
fn unrolling_stops_when_aborted() {
    let source = "span<float, 4> s;\n\
                  float f() { float sum = 0.0f; for (auto& x : s) sum += x; return sum; }";
    let mut c = match compile(source, OptimizationLevel::None) {
        Ok(c) => c,
        Err(e) => panic!("{}", e.error),
    };
    let each = find(&c, body(&c), &|k| matches!(k, NodeKind::ForEach(_)))[0];

    c.options.abort = AbortToken::new(None, Some(Arc::new(AtomicBool::new(true))));
    let err = match c.unroll_loop(each) {
        Ok(outcome) => panic!("expected a timeout, got {outcome:?}"),
        Err(e) => e,
    };
    assert_eq!(err.kind(), SemaErrorKind::Timeout);
    assert_eq!(c.stats.loops_unrolled, 0);

    c.options.abort = AbortToken::never();
    assert!(matches!(c.unroll_loop(each), Ok(Outcome::Replaced(_))));
}

#[test]
fn rewrite_cap_is_a_compile_time_error() {
    let source = "int f() { return 1 + 2 + 3 + 4 + 5; }";
    let unit = match Parser::new(source).parse_program() {
        Ok(unit) => unit,
        Err(e) => panic!("parse failed: {:?}", e.error),
    };
    let options = SemaOptions {
        optimization: OptimizationLevel::ConstantFolding,
        max_rewrites: 2,
        ..SemaOptions::default()
    };
    let mut c = Compilation::new(unit, &NativeRegistry::new(), options);
    let err = match c.run() {
        Ok(()) => panic!("expected the rewrite cap to trip"),
        Err(e) => e,
    };
    assert!(matches!(err.error, SemanticError::RewriteLimit { rewrites: 3, .. }), "{:?}", err.error);
    assert_eq!(err.kind(), SemaErrorKind::CompileTimeEvaluation);

    // The same unit folds fine under the default cap
    let c = compile_ok(source);
    assert_eq!(returned(&c), NodeKind::Literal(Literal::Int(15)));
}
