// tests/pipeline.rs
//! Whole-pipeline tests: compile source, then call the generated code.

use std::sync::Mutex;

use snex::{
    CompileConfig, CompiledObject, ErrorKind, JitOptions, NativeModule, NativeRegistry, NativeSignature, NativeType,
    NativeValue, OptimizationLevel, compile,
};

fn build_with(source: &str, config: &CompileConfig) -> CompiledObject {
    let result = compile(source, config);
    match result.object {
        Some(object) => object,
        None => panic!("compile failed: {:?}", result.diagnostics),
    }
}

fn build(source: &str) -> CompiledObject {
    build_with(source, &CompileConfig::default())
}

fn int_fn(object: &CompiledObject, name: &str) -> extern "C" fn(i32) -> i32 {
    let signature = NativeSignature::new(vec![NativeType::Int], NativeType::Int);
    let ptr = object.function(name, &signature).unwrap();
    unsafe { std::mem::transmute(ptr) }
}

fn double_fn(object: &CompiledObject, name: &str) -> extern "C" fn(f64) -> f64 {
    let signature = NativeSignature::new(vec![NativeType::Double], NativeType::Double);
    let ptr = object.function(name, &signature).unwrap();
    unsafe { std::mem::transmute(ptr) }
}

#[test]
fn constant_expressions_match_reference_arithmetic() {
    let cases: [(&str, f64); 5] = [
        ("1 + 2 * 3 - 4", (1 + 2 * 3 - 4) as f64),
        ("(7 % 3) << 2", ((7 % 3) << 2) as f64),
        ("1.5 * 2.0 - 0.25", 1.5 * 2.0 - 0.25),
        ("10.0 / 4.0", 10.0 / 4.0),
        ("(3 > 2) + (2 >= 5)", 1.0),
    ];
    for level in [OptimizationLevel::None, OptimizationLevel::ConstantFolding, OptimizationLevel::Full] {
        let config = CompileConfig::default().with_optimization(level);
        for (expr, expected) in cases {
            let source = format!("double get(double input) {{ return (double)({expr}); }}");
            let object = build_with(&source, &config);
            let got = double_fn(&object, "get")(0.0);
            assert!((got - expected).abs() < 1e-12, "{expr} at {level:?}: {got} != {expected}");
        }
    }
}

#[test]
fn plain_overload_is_preferred_over_template() {
    let object = build(
        "template <typename T> T pick(T x) { return x; }\n\
         int pick(int x) { return x * 10; }\n\
         int f(int a) { return pick(a); }\n\
         float g(float a) { return pick(a); }\n",
    );
    assert_eq!(int_fn(&object, "f")(2), 20);
    let signature = NativeSignature::new(vec![NativeType::Float], NativeType::Float);
    let g: extern "C" fn(f32) -> f32 = unsafe { std::mem::transmute(object.function("g", &signature).unwrap()) };
    assert_eq!(g(2.5), 2.5);
}

#[test]
fn templated_structs_are_instantiated() {
    let object = build(
        "template <typename T, int N> struct Delay {\n\
             span<T, N> buffer;\n\
             int pos = 0;\n\
             T process(T input) {\n\
                 T out = buffer[pos];\n\
                 buffer[pos] = input;\n\
                 pos = (pos + 1) % N;\n\
                 return out;\n\
             }\n\
         };\n\
         Delay<int, 3> delay;\n\
         int f(int x) { return delay.process(x); }\n",
    );
    let f = int_fn(&object, "f");
    let outputs: Vec<i32> = (1..=6).map(|x| f(x)).collect();
    assert_eq!(outputs, [0, 0, 0, 1, 2, 3]);
}

#[test]
fn root_variables_are_reachable_through_data_pointers() {
    let object = build(
        "namespace params { double gain = 0.5; }\n\
         int counter = 0;\n\
         double get(double input) { counter++; return input * params::gain; }\n",
    );
    let get = double_fn(&object, "get");
    assert_eq!(get(4.0), 2.0);

    let gain = object.get_data_pointer("params.gain").unwrap() as *mut f64;
    unsafe { *gain = 3.0 };
    assert_eq!(get(4.0), 12.0);

    let counter = object.get_data_pointer("counter").unwrap() as *const i32;
    assert_eq!(unsafe { *counter }, 2);
    assert!(object.get_data_pointer("missing").is_none());

    let names: Vec<&str> = object.data_layout().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["params::gain", "counter"]);
    assert_eq!(object.data_size() % 16, 0);
}

#[test]
fn tiny_register_pool_spills_to_the_stack() {
    let source = "int f(int a) {\n\
                      int b = a + 1;\n\
                      return (a * b + (a - b) * (a + b * (a - 2))) - ((b + 3) * (a + 4) + b);\n\
                  }";
    let reference = |a: i32| {
        let b = a + 1;
        (a * b + (a - b) * (a + b * (a - 2))) - ((b + 3) * (a + 4) + b)
    };
    let config = CompileConfig::default()
        .with_optimization(OptimizationLevel::None)
        .with_jit(JitOptions {
            gp_registers: 2,
            fp_registers: 2,
            ..JitOptions::default()
        });
    let object = build_with(source, &config);
    assert!(object.stats().registers.spills > 0);
    let f = int_fn(&object, "f");
    for a in [-5, 0, 3, 17] {
        assert_eq!(f(a), reference(a), "a = {a}");
    }
}

static DESTROYED: Mutex<Vec<i32>> = Mutex::new(Vec::new());

extern "C" fn record(id: i32) {
    DESTROYED.lock().unwrap().push(id);
}

fn host_registry() -> NativeRegistry {
    let mut host = NativeModule::new();
    host.register(
        "record",
        record as *const u8,
        NativeSignature::new(vec![NativeType::Int], NativeType::Void),
    );
    host.register_constant("OFFSET", NativeValue::Int(100));
    let mut registry = NativeRegistry::new();
    registry.register_module("Host", host);
    registry
}

#[test]
fn host_functions_constants_and_destructors() {
    let config = CompileConfig::default().with_externals(host_registry());
    let object = build_with(
        "struct Tracker { int id = 0; ~Tracker() { Host.record(id); } };\n\
         Tracker first = { 1 };\n\
         Tracker second = { 2 };\n\
         int f(int x) { Host.record(x + Host::OFFSET); return x; }\n",
        &config,
    );
    assert_eq!(int_fn(&object, "f")(5), 5);
    assert_eq!(*DESTROYED.lock().unwrap(), [105]);

    drop(object);
    // Reverse declaration order
    assert_eq!(*DESTROYED.lock().unwrap(), [105, 2, 1]);
}

#[test]
fn unknown_host_module_is_a_type_error() {
    let result = compile("int f(int x) { return Host.missing(x); }", &CompileConfig::default());
    assert!(!result.was_ok());
    assert_eq!(result.first_error().map(|d| d.kind), Some(ErrorKind::TypeResolution));
}
