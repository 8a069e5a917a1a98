// tests/diagnostics.rs
//! Error kinds and locations reported by `compile`.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use snex::{CompileConfig, Diagnostic, ErrorKind, Severity, compile};

fn first_error(source: &str, config: &CompileConfig) -> Diagnostic {
    let result = compile(source, config);
    assert!(result.object.is_none(), "expected a failed compile");
    assert_eq!(result.diagnostics.len(), 1);
    result.diagnostics[0].clone()
}

#[test]
fn missing_semicolon_points_at_the_unterminated_statement() {
    let source = "int f(int a) {\n    int b = a;\n    int c = b * 2;\n    b = c\n    return b;\n}\n";
    let diag = first_error(source, &CompileConfig::default());
    assert_eq!(diag.kind, ErrorKind::Syntax);
    assert_eq!(diag.severity, Severity::Error);
    assert_eq!((diag.line, diag.column), (4, 5));
    assert_eq!(diag.code.as_deref(), Some("E1005"));
}

#[test]
fn unknown_identifier_is_located_at_its_token() {
    let source = "float gain = 1.0f;\nfloat f(float x) {\n  return x * gian;\n}\n";
    let diag = first_error(source, &CompileConfig::default());
    assert_eq!(diag.kind, ErrorKind::TypeResolution);
    assert_eq!((diag.line, diag.column), (3, 14));
    assert!(diag.message.contains("gian"), "{}", diag.message);
}

#[test]
fn unterminated_comment_is_a_syntax_error() {
    let diag = first_error("int x = 1;\n/* never closed\nint y = 2;", &CompileConfig::default());
    assert_eq!(diag.kind, ErrorKind::Syntax);
    assert_eq!((diag.line, diag.column), (2, 1));
}

#[test]
fn runaway_nesting_is_a_syntax_error() {
    let depth = 2000;
    let source = format!(
        "int f(int x) {{\n  return {}x{};\n}}\n",
        "(".repeat(depth),
        ")".repeat(depth)
    );
    let diag = first_error(&source, &CompileConfig::default());
    assert_eq!(diag.kind, ErrorKind::Syntax);
    assert_eq!(diag.code.as_deref(), Some("E1012"));
    assert_eq!((diag.line, diag.column), (2, 73));
}

#[test]
fn constant_division_by_zero_is_a_compile_time_error() {
    let diag = first_error("int f() { return 4 / (2 - 2); }", &CompileConfig::default());
    assert_eq!(diag.kind, ErrorKind::CompileTimeEvaluation);
}

#[test]
fn float_division_by_literal_zero_is_a_compile_time_error() {
    let diag = first_error("float f(float x) {\n  return x / 0.0f;\n}", &CompileConfig::default());
    assert_eq!(diag.kind, ErrorKind::CompileTimeEvaluation);
    assert_eq!((diag.line, diag.column), (2, 14));
}

#[test]
fn non_constant_template_argument_is_a_compile_time_error() {
    let diag = first_error("int n = 4;\nspan<float, n> data;", &CompileConfig::default());
    assert_eq!(diag.kind, ErrorKind::CompileTimeEvaluation);
}

#[test]
fn exhausted_time_budget_times_out() {
    let source = "span<float, 4096> big;\n\
                  float f() { float sum = 0.0f; for (auto& x : big) { sum += x * 2.0f; } return sum; }\n";
    let mut config = CompileConfig::default().with_time_budget(Duration::ZERO);
    config.unroll_limit = 100_000;
    let start = Instant::now();
    let diag = first_error(source, &config);
    assert_eq!(diag.kind, ErrorKind::Timeout);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn raised_abort_flag_times_out() {
    let mut config = CompileConfig::default();
    config.abort = Some(Arc::new(AtomicBool::new(true)));
    let diag = first_error("int f(int x) { return x; }", &config);
    assert_eq!(diag.kind, ErrorKind::Timeout);
}
