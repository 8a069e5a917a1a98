// src/resolve/tests.rs

use snex_frontend::{NodeId, NodeKind, Parser};
use snex_identity::NamespacedIdentifier;
use snex_runtime::NativeRegistry;

use crate::compilation::{Compilation, SemaOptions};
use crate::errors::{SemaError, SemanticError};
use crate::functions::{FunctionId, HighLevelInliner, Inliner};
use crate::namespace::Entity;
use crate::types::{ConstValue, SnexType, TypeId};

fn resolve(source: &str) -> Result<Compilation, SemaError> {
    let unit = match Parser::new(source).parse_program() {
        Ok(unit) => unit,
        Err(e) => panic!("parse failed: {:?}", e.error),
    };
    let mut c = Compilation::new(unit, &NativeRegistry::new(), SemaOptions::default());
    c.resolve()?;
    Ok(c)
}

fn resolve_ok(source: &str) -> Compilation {
    match resolve(source) {
        Ok(c) => c,
        Err(e) => panic!("resolution failed: {}", e.error),
    }
}

fn resolve_err(source: &str) -> SemanticError {
    match resolve(source) {
        Ok(_) => panic!("expected a semantic error"),
        Err(e) => e.error,
    }
}

fn root_symbol_type(c: &mut Compilation, name: &str) -> TypeId {
    let path = NamespacedIdentifier::single(c.interner.intern(name));
    match c.namespaces.resolve(&NamespacedIdentifier::root(), &path) {
        Some((_, Entity::Symbol(s))) => c.scopes.symbol(*s).info.id,
        other => panic!("{name} is not a root variable: {other:?}"),
    }
}

fn calls(c: &Compilation) -> Vec<(NodeId, FunctionId)> {
    (0..c.ast.len() as u32)
        .map(NodeId::new)
        .filter(|id| matches!(c.ast.kind(*id), NodeKind::Call { .. }))
        .filter_map(|id| c.nodes.get(id).and_then(|i| i.call).map(|f| (id, f)))
        .collect()
}

#[test]
fn inner_declaration_shadows_outer() {
    let c = resolve_ok("int f() { int x = 1; { float x = 2.0f; x = x * 2.0f; } return x; }");
    assert_eq!(c.user_functions().len(), 1);
}

#[test]
fn struct_members_are_laid_out_with_alignment() {
    let mut c = resolve_ok("struct Pair { int a; double b; float c; };\nPair p;");
    let ty = root_symbol_type(&mut c, "p");
    let st = c.types.as_struct(ty).expect("struct type");
    let offsets: Vec<u32> = st.members.iter().map(|m| m.offset).collect();
    assert_eq!(offsets, [0, 8, 16]);
    assert_eq!(c.types.size_of(ty), 24);
    // The segment is padded to 16 bytes
    assert_eq!(c.root.size(), 32);
}

#[test]
fn template_instances_are_shared() {
    let mut c = resolve_ok(
        "template <typename T, int N> struct Delay { span<T, N> buffer; int pos = 0; };\n\
         Delay<float, 8> a;\n\
         Delay<float, 8> b;\n\
         Delay<float, 4> c;\n",
    );
    let a = root_symbol_type(&mut c, "a");
    let b = root_symbol_type(&mut c, "b");
    let other = root_symbol_type(&mut c, "c");
    assert_eq!(a, b);
    assert_ne!(a, other);
    assert_eq!(c.types.size_of(a), 8 * 4 + 4);
    assert_eq!(c.types.as_struct(a).map(|s| s.label.as_str()), Some("Delay<float, 8>"));
}

#[test]
fn plain_overload_beats_template() {
    let c = resolve_ok(
        "template <typename T> T pick(T x) { return x; }\n\
         int pick(int x) { return x + 1; }\n\
         int f() { return pick(1); }\n\
         float g() { return pick(1.0f); }\n",
    );
    let targets: Vec<String> = calls(&c)
        .into_iter()
        .map(|(_, f)| c.functions.get(f).label.clone())
        .collect();
    assert_eq!(targets, ["pick", "pick<float>"]);
}

#[test]
fn equally_good_overloads_are_ambiguous() {
    let err = resolve_err(
        "float h(float x, int y) { return x; }\n\
         float h(int x, float y) { return y; }\n\
         float f() { return h(1, 1); }\n",
    );
    assert!(matches!(err, SemanticError::AmbiguousCall { .. }), "{err:?}");
}

#[test]
fn root_constants_fold_into_types() {
    let mut c = resolve_ok("const int N = 4;\nspan<float, N * 2> buffer;");
    let ty = root_symbol_type(&mut c, "buffer");
    assert!(matches!(c.types.get(ty), SnexType::Span { size: 8, .. }));
}

#[test]
fn unknown_identifier_is_reported() {
    let err = resolve_err("int f() { return missing + 1; }");
    assert!(matches!(err, SemanticError::UnknownIdentifier { ref name, .. } if name == "missing"));
}

#[test]
fn break_outside_loop_is_rejected() {
    let err = resolve_err("void f() { break; }");
    assert!(matches!(err, SemanticError::ControlOutsideLoop { .. }), "{err:?}");
}

#[test]
fn assignment_to_const_is_rejected() {
    let err = resolve_err("void f(const float& x) { x = 1.0f; }");
    assert!(matches!(err, SemanticError::ConstAssignment { .. }), "{err:?}");
    let err = resolve_err("void f() { const int x = 2; x = 3; }");
    assert!(matches!(err, SemanticError::ConstAssignment { .. }), "{err:?}");
}

#[test]
fn constant_index_is_bounds_checked() {
    let err = resolve_err("span<float, 4> d;\nvoid f() { d[4] = 1.0f; }");
    assert!(
        matches!(err, SemanticError::IndexOutOfBounds { index: 4, size: 4, .. }),
        "{err:?}"
    );
}

#[test]
fn default_arguments_are_appended() {
    let c = resolve_ok(
        "float f(float a, float b = 2.0f) { return a + b; }\n\
         float g() { return f(1.0f); }\n",
    );
    let (call, _) = calls(&c)[0];
    let NodeKind::Call { args, .. } = c.ast.kind(call) else {
        unreachable!()
    };
    assert_eq!(args.len(), 2);
    assert_eq!(c.node_constant(args[1]), Some(ConstValue::Float(2.0)));
}

#[test]
fn implicit_conversions_become_casts() {
    let c = resolve_ok("double f(int i) { return i * 0.5; }");
    let casts = (0..c.ast.len() as u32)
        .map(NodeId::new)
        .filter(|id| matches!(c.ast.kind(*id), NodeKind::Cast { .. }))
        .count();
    assert_eq!(casts, 1);
}

#[test]
fn math_module_resolves_both_spellings() {
    let c = resolve_ok("double f() { return Math.sin(Math.PI) + Math::cos(0.0); }");
    let labels: Vec<String> = calls(&c)
        .into_iter()
        .map(|(_, f)| c.functions.get(f).label.clone())
        .collect();
    assert_eq!(labels, ["Math::sin", "Math::cos"]);
}

#[test]
fn span_size_uses_the_inliner() {
    let c = resolve_ok("span<int, 3> s;\nint f() { return s.size(); }");
    let (_, f) = calls(&c)[0];
    assert_eq!(
        c.functions.get(f).inliner(),
        Some(Inliner::HighLevel(HighLevelInliner::SpanSize))
    );
}

#[test]
fn methods_see_members_and_siblings() {
    let c = resolve_ok(
        "struct Osc { float phase = 0.0f; float step() { phase += 0.1f; return wrap(); } \
         float wrap() { return phase; } };\n\
         Osc osc;\n\
         float f() { return osc.step(); }\n",
    );
    assert_eq!(c.user_functions().len(), 3);
}

#[test]
fn namespaces_qualify_functions() {
    let c = resolve_ok(
        "namespace dsp { float gain(float x) { return x * 0.5f; } float twice(float x) { return gain(gain(x)); } }\n\
         float f() { return dsp::twice(1.0f); }\n",
    );
    let labels: Vec<String> = calls(&c)
        .into_iter()
        .map(|(_, f)| c.functions.get(f).label.clone())
        .collect();
    assert!(labels.iter().all(|l| l.starts_with("dsp::")), "{labels:?}");
}
