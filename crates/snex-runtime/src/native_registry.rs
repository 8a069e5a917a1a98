// src/native_registry.rs
//! Registry for native functions and constants callable from SNEX code.
//!
//! Modules are addressed by the name the source uses as a receiver or
//! namespace: `Math.sin(x)`, `Host.gain(x)`, `Host::NUM_CHANNELS`.

use rustc_hash::FxHashMap;

/// Type representation for native function signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    Void,
    Int,
    Float,
    Double,
    /// Pointer to a [`DynBuffer`](crate::DynBuffer) of `f32`.
    Block,
}

impl NativeType {
    pub fn name(self) -> &'static str {
        match self {
            NativeType::Void => "void",
            NativeType::Int => "int",
            NativeType::Float => "float",
            NativeType::Double => "double",
            NativeType::Block => "block",
        }
    }
}

/// Signature of a native function
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeSignature {
    pub params: Vec<NativeType>,
    pub return_type: NativeType,
}

impl NativeSignature {
    pub fn new(params: impl Into<Vec<NativeType>>, return_type: NativeType) -> Self {
        Self {
            params: params.into(),
            return_type,
        }
    }
}

impl std::fmt::Display for NativeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.return_type.name())?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p.name())?;
        }
        write!(f, ")")
    }
}

/// A registered native function
#[derive(Clone)]
pub struct NativeFunction {
    pub ptr: *const u8,
    pub signature: NativeSignature,
}

// Safety: Function pointers are Send+Sync if they don't capture state
unsafe impl Send for NativeFunction {}
unsafe impl Sync for NativeFunction {}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("ptr", &self.ptr)
            .field("signature", &self.signature)
            .finish()
    }
}

/// Compile-time constant exported by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeValue {
    Int(i32),
    Float(f32),
    Double(f64),
}

/// A module containing native functions. A name may carry several
/// overloads with distinct signatures.
#[derive(Debug, Default, Clone)]
pub struct NativeModule {
    functions: FxHashMap<String, Vec<NativeFunction>>,
    constants: FxHashMap<String, NativeValue>,
}

impl NativeModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an overload. A second registration with an identical
    /// signature replaces the first.
    pub fn register(&mut self, name: &str, ptr: *const u8, signature: NativeSignature) {
        let overloads = self.functions.entry(name.to_string()).or_default();
        if let Some(existing) = overloads.iter_mut().find(|f| f.signature == signature) {
            existing.ptr = ptr;
        } else {
            overloads.push(NativeFunction { ptr, signature });
        }
    }

    pub fn register_constant(&mut self, name: &str, value: NativeValue) {
        self.constants.insert(name.to_string(), value);
    }

    /// First registered overload.
    pub fn get(&self, name: &str) -> Option<&NativeFunction> {
        self.functions.get(name)?.first()
    }

    pub fn overloads(&self, name: &str) -> &[NativeFunction] {
        self.functions.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn constant(&self, name: &str) -> Option<NativeValue> {
        self.constants.get(name).copied()
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(|s| s.as_str())
    }

    pub fn constants(&self) -> impl Iterator<Item = (&str, NativeValue)> {
        self.constants.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Registry of all native modules
#[derive(Debug, Default, Clone)]
pub struct NativeRegistry {
    modules: FxHashMap<String, NativeModule>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the builtin `Math` module.
    pub fn with_math() -> Self {
        let mut registry = Self::new();
        registry.register_module(crate::MATH_MODULE, crate::math::module());
        registry
    }

    pub fn register_module(&mut self, path: &str, module: NativeModule) {
        self.modules.insert(path.to_string(), module);
    }

    /// Mutable access to a module, creating it on first use.
    pub fn module_mut(&mut self, path: &str) -> &mut NativeModule {
        self.modules.entry(path.to_string()).or_default()
    }

    pub fn get_module(&self, path: &str) -> Option<&NativeModule> {
        self.modules.get(path)
    }

    pub fn lookup(&self, module_path: &str, func_name: &str) -> Option<&NativeFunction> {
        self.modules.get(module_path)?.get(func_name)
    }

    pub fn module_exists(&self, path: &str) -> bool {
        self.modules.contains_key(path)
    }

    /// Modules sorted by name, for deterministic registration order.
    pub fn modules(&self) -> Vec<(&str, &NativeModule)> {
        let mut out: Vec<_> = self.modules.iter().map(|(k, v)| (k.as_str(), v)).collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy_gain(x: f32) -> f32 {
        x * 2.0
    }

    extern "C" fn dummy_gain_double(x: f64) -> f64 {
        x * 2.0
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = NativeRegistry::new();
        let mut module = NativeModule::new();

        module.register(
            "gain",
            dummy_gain as *const u8,
            NativeSignature::new([NativeType::Float], NativeType::Float),
        );

        registry.register_module("Host", module);

        let func = registry.lookup("Host", "gain");
        assert!(func.is_some());
        assert_eq!(func.unwrap().signature.return_type, NativeType::Float);
    }

    #[test]
    fn lookup_nonexistent() {
        let registry = NativeRegistry::new();
        assert!(registry.lookup("Host", "missing").is_none());
    }

    #[test]
    fn overloads_are_kept_per_signature() {
        let mut module = NativeModule::new();
        let float_sig = NativeSignature::new([NativeType::Float], NativeType::Float);
        let double_sig = NativeSignature::new([NativeType::Double], NativeType::Double);
        module.register("gain", dummy_gain as *const u8, float_sig.clone());
        module.register("gain", dummy_gain_double as *const u8, double_sig);
        module.register("gain", dummy_gain as *const u8, float_sig);

        assert_eq!(module.overloads("gain").len(), 2);
        assert_eq!(module.overloads("other").len(), 0);
        assert_eq!(
            module.overloads("gain")[0].signature.to_string(),
            "float(float)"
        );
    }

    #[test]
    fn constants_live_beside_functions() {
        let mut registry = NativeRegistry::new();
        registry
            .module_mut("Host")
            .register_constant("NUM_CHANNELS", NativeValue::Int(2));
        assert_eq!(
            registry.get_module("Host").and_then(|m| m.constant("NUM_CHANNELS")),
            Some(NativeValue::Int(2))
        );
    }
}
