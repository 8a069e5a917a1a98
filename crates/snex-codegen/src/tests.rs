// src/tests.rs
//
// End-to-end lowering tests: parse, resolve, optimize, generate, then call
// the generated code.

use snex_frontend::Parser;
use snex_runtime::{Block, NativeRegistry, NativeSignature, NativeType};
use snex_sema::{Compilation, OptimizationLevel, SemaOptions};

use crate::errors::{CodegenError, CodegenErrorKind};
use crate::jit::JitOptions;
use crate::object::CompiledObject;

fn build_with(source: &str, optimization: OptimizationLevel, jit: &JitOptions) -> Result<CompiledObject, CodegenError> {
    let unit = match Parser::new(source).parse_program() {
        Ok(unit) => unit,
        Err(e) => panic!("parse failed: {:?}", e.error),
    };
    let options = SemaOptions {
        optimization,
        ..SemaOptions::default()
    };
    let mut c = Compilation::new(unit, &NativeRegistry::new(), options);
    if let Err(e) = c.run() {
        panic!("semantic analysis failed: {}", e.error);
    }
    crate::generate(c, jit)
}

fn build(source: &str) -> CompiledObject {
    match build_with(source, OptimizationLevel::Full, &JitOptions::default()) {
        Ok(obj) => obj,
        Err(e) => panic!("code generation failed: {e}"),
    }
}

fn sig(params: &[NativeType], ret: NativeType) -> NativeSignature {
    NativeSignature::new(params.to_vec(), ret)
}

fn int_fn(obj: &CompiledObject, name: &str) -> extern "C" fn(i32) -> i32 {
    let ptr = obj.function(name, &sig(&[NativeType::Int], NativeType::Int)).unwrap();
    unsafe { std::mem::transmute(ptr) }
}

fn float_fn(obj: &CompiledObject, name: &str) -> extern "C" fn(f32) -> f32 {
    let ptr = obj.function(name, &sig(&[NativeType::Float], NativeType::Float)).unwrap();
    unsafe { std::mem::transmute(ptr) }
}

#[test]
fn integer_arithmetic() {
    let obj = build("int f(int x) { return (x * 3 + 4) % 5 - (x << 1); }");
    let f = int_fn(&obj, "f");
    for x in [-7, 0, 1, 9, 100] {
        assert_eq!(f(x), (x * 3 + 4) % 5 - (x << 1), "x = {x}");
    }
}

#[test]
fn division_by_zero_yields_zero() {
    let obj = build("int f(int x) { return 100 / x + 100 % x; }");
    let f = int_fn(&obj, "f");
    assert_eq!(f(0), 0);
    assert_eq!(f(7), 14 + 2);
    assert_eq!(f(-1), -100);
}

#[test]
fn float_math_and_inliners() {
    let obj = build("float f(float x) { return Math.max(0.0f, Math.min(x, 2.0f)) + Math.abs(-x) * 0.5f; }");
    let f = float_fn(&obj, "f");
    assert_eq!(f(1.0), 1.5);
    assert_eq!(f(4.0), 4.0);
    assert_eq!(f(-2.0), 1.0);
}

#[test]
fn native_math_calls() {
    let obj = build("double f(double x) { return Math.sin(x) + Math.pow(x, 2.0); }");
    let ptr = obj
        .function("f", &sig(&[NativeType::Double], NativeType::Double))
        .unwrap();
    let f: extern "C" fn(f64) -> f64 = unsafe { std::mem::transmute(ptr) };
    let x = 0.75f64;
    assert!((f(x) - (x.sin() + x * x)).abs() < 1e-12);
}

#[test]
fn loops_and_short_circuit() {
    let obj = build(
        "int f(int n) {\n\
             int sum = 0;\n\
             for (int i = 0; i < n; i++) {\n\
                 if (i % 2 == 0 && i != 4) continue;\n\
                 sum += i;\n\
             }\n\
             int j = 0;\n\
             while (j < 3 || sum > 1000) { j++; sum--; }\n\
             do { sum += 10; } while (0);\n\
             return sum;\n\
         }",
    );
    let f = int_fn(&obj, "f");
    // odd numbers below 8 plus 4, minus 3, plus 10
    assert_eq!(f(8), 1 + 3 + 4 + 5 + 7 - 3 + 10);
    assert_eq!(f(0), 7);
}

#[test]
fn switch_falls_through_until_break() {
    let obj = build(
        "int f(int x) {\n\
             int r = 0;\n\
             switch (x) {\n\
                 case 1: r += 1;\n\
                 case 2: r += 10; break;\n\
                 case 3: r = 100; break;\n\
                 default: r = -1;\n\
             }\n\
             return r;\n\
         }",
    );
    let f = int_fn(&obj, "f");
    assert_eq!(f(1), 11);
    assert_eq!(f(2), 10);
    assert_eq!(f(3), 100);
    assert_eq!(f(9), -1);
}

#[test]
fn root_data_is_shared_between_functions() {
    let obj = build(
        "span<float, 4> values = { 1.0f, 2.0f, 3.0f, 4.0f };\n\
         float gain = 2.0f;\n\
         float sum(float unused) { float s = 0.0f; for (auto& v : values) s += v * gain; return s; }\n\
         float at(float x) { int i = (int)x; return values[i]; }\n",
    );
    assert_eq!(float_fn(&obj, "sum")(0.0), 20.0);

    let gain = obj.get_data_pointer("gain").unwrap() as *mut f32;
    unsafe { *gain = 0.5 };
    assert_eq!(float_fn(&obj, "sum")(0.0), 5.0);

    // Dynamic indices wrap into range
    let at = float_fn(&obj, "at");
    assert_eq!(at(1.0), 2.0);
    assert_eq!(at(5.0), 2.0);
    assert_eq!(at(-3.0), 1.0);
}

#[test]
fn struct_methods_update_their_object() {
    let obj = build(
        "struct Counter { int count = 5; int next() { count += step(); return count; } int step() { return 2; } };\n\
         Counter c;\n\
         int f(int unused) { c.next(); return c.next(); }\n",
    );
    let f = int_fn(&obj, "f");
    assert_eq!(f(0), 9);
    assert_eq!(f(0), 13);
    let layout = obj.data_layout();
    assert_eq!(layout.len(), 1);
    assert_eq!(layout[0].name, "c");
}

#[test]
fn block_arguments_are_processed_in_place() {
    let obj = build(
        "void process(block b) { for (auto& s : b) s *= 2.0f; b[0] = (float)b.size(); }",
    );
    let ptr = obj
        .function("process", &sig(&[NativeType::Block], NativeType::Void))
        .unwrap();
    let f: extern "C" fn(*mut Block<'_>) = unsafe { std::mem::transmute(ptr) };
    let mut samples = [1.0f32, 2.0, 3.0];
    let mut block = Block::from_slice(&mut samples);
    f(block.as_ptr());
    assert_eq!(samples, [3.0, 4.0, 6.0]);
}

#[test]
fn tiny_register_pool_spills_and_still_computes() {
    let source = "int f(int x) { return (x + 1) * (x + 2) + (x + 3) * ((x + 4) - (x + 5) * (x + 6)); }";
    let expected = |x: i32| (x + 1) * (x + 2) + (x + 3) * ((x + 4) - (x + 5) * (x + 6));
    let tiny = JitOptions {
        gp_registers: 1,
        fp_registers: 1,
        ..JitOptions::default()
    };
    let obj = build_with(source, OptimizationLevel::None, &tiny).unwrap();
    assert!(obj.stats().registers.spills > 0);
    let f = int_fn(&obj, "f");
    for x in [-3, 0, 2, 11] {
        assert_eq!(f(x), expected(x));
    }
}

#[test]
fn spill_budget_exhaustion_is_an_error() {
    let source = "int f(int x) { return (x + 1) * ((x + 2) * ((x + 3) * ((x + 4) * (x + 5)))); }";
    let starved = JitOptions {
        gp_registers: 0,
        fp_registers: 0,
        max_spill_bytes: 4,
        ..JitOptions::default()
    };
    let err = build_with(source, OptimizationLevel::None, &starved).err();
    assert!(
        matches!(err.as_ref().map(|e| &e.kind), Some(CodegenErrorKind::RegisterExhausted { .. })),
        "{err:?}"
    );
}

#[test]
fn signature_mismatch_is_reported() {
    let obj = build("float f(float x) { return x; }");
    let err = obj.function("f", &sig(&[NativeType::Int], NativeType::Int)).err();
    assert!(
        matches!(err.as_ref().map(|e| &e.kind), Some(CodegenErrorKind::SignatureMismatch { .. })),
        "{err:?}"
    );
    assert!(obj.get_function("missing", &sig(&[], NativeType::Void)).is_none());
}
