// src/jit.rs

use cranelift::prelude::*;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};
use rustc_hash::FxHashMap;

use crate::errors::{CodegenError, CodegenResult};

/// Options for JIT compilation
#[derive(Clone, Copy, Debug)]
pub struct JitOptions {
    /// Release mode: disable verifier
    pub release: bool,
    /// Capture disassembly of every compiled function
    pub disasm: bool,
    /// Size of the general purpose register pool (ints and pointers)
    pub gp_registers: usize,
    /// Size of the floating point register pool
    pub fp_registers: usize,
    /// Stack bytes a single function may use for spilled temporaries
    pub max_spill_bytes: u32,
}

impl JitOptions {
    /// Create options for debug mode (default)
    pub fn debug() -> Self {
        Self {
            release: false,
            disasm: false,
            gp_registers: 12,
            fp_registers: 14,
            max_spill_bytes: 4096,
        }
    }

    /// Create options for release mode
    pub fn release() -> Self {
        Self {
            release: true,
            ..Self::debug()
        }
    }

    /// Create options for disassembly output
    pub fn disasm() -> Self {
        Self {
            disasm: true,
            ..Self::debug()
        }
    }
}

impl Default for JitOptions {
    fn default() -> Self {
        Self::debug()
    }
}

/// JIT compiler context
pub struct JitContext {
    pub module: JITModule,
    pub ctx: codegen::Context,
    /// Functions declared with Export linkage (will be compiled)
    pub func_ids: FxHashMap<String, FuncId>,
    /// Functions declared with Import linkage (native functions)
    pub imported_func_ids: FxHashMap<String, FuncId>,
    disasm: bool,
    disasm_output: Vec<(String, String)>,
}

impl JitContext {
    /// Create a context whose module can link against `symbols`.
    pub fn with_options(options: &JitOptions, symbols: &[(String, *const u8)]) -> CodegenResult<Self> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("use_colocated_libcalls", "false")
            .map_err(CodegenError::cranelift)?;
        flag_builder
            .set("is_pic", "false")
            .map_err(CodegenError::cranelift)?;
        flag_builder
            .set("opt_level", "speed")
            .map_err(CodegenError::cranelift)?;
        if options.release {
            flag_builder
                .set("enable_verifier", "false")
                .map_err(CodegenError::cranelift)?;
        }

        let isa_builder = cranelift_native::builder().map_err(|msg| {
            CodegenError::internal_with_context("native ISA not available", msg)
        })?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(CodegenError::cranelift)?;

        let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        for (name, ptr) in symbols {
            builder.symbol(name.clone(), *ptr);
        }

        let module = JITModule::new(builder);
        let ctx = module.make_context();
        tracing::trace!(symbols = symbols.len(), release = options.release, "created jit context");

        Ok(Self {
            module,
            ctx,
            func_ids: FxHashMap::default(),
            imported_func_ids: FxHashMap::default(),
            disasm: options.disasm,
            disasm_output: Vec::new(),
        })
    }

    /// Get the pointer type for the target
    pub fn pointer_type(&self) -> Type {
        self.module.target_config().pointer_type()
    }

    /// Create a function signature with given parameters and return type
    pub fn create_signature(&self, params: &[Type], ret: Option<Type>) -> Signature {
        let mut sig = self.module.make_signature();
        for &param in params {
            sig.params.push(AbiParam::new(param));
        }
        if let Some(ret_type) = ret {
            sig.returns.push(AbiParam::new(ret_type));
        }
        sig
    }

    /// Declare a function in the module
    pub fn declare_function(&mut self, name: &str, sig: &Signature) -> CodegenResult<FuncId> {
        let func_id = self
            .module
            .declare_function(name, Linkage::Export, sig)
            .map_err(CodegenError::cranelift)?;
        self.func_ids.insert(name.to_string(), func_id);
        Ok(func_id)
    }

    /// Import an external function registered as a symbol at construction.
    pub fn import_function(&mut self, name: &str, sig: &Signature) -> CodegenResult<FuncId> {
        let func_id = self
            .module
            .declare_function(name, Linkage::Import, sig)
            .map_err(CodegenError::cranelift)?;
        self.imported_func_ids.insert(name.to_string(), func_id);
        Ok(func_id)
    }

    /// Define a function (after building IR)
    pub fn define_function(&mut self, func_id: FuncId) -> CodegenResult<()> {
        if self.disasm {
            self.ctx.set_disasm(true);
        }

        self.module
            .define_function(func_id, &mut self.ctx)
            .map_err(CodegenError::cranelift)?;

        if self.disasm
            && let Some(compiled) = self.ctx.compiled_code()
            && let Some(vcode) = &compiled.vcode
        {
            let func_name = self
                .func_ids
                .iter()
                .find(|(_, id)| **id == func_id)
                .map(|(name, _)| name.clone())
                .unwrap_or_else(|| format!("func_{:?}", func_id));
            self.disasm_output.push((func_name, vcode.clone()));
        }
        Ok(())
    }

    /// Get collected disassembly output
    pub fn get_disasm(&self) -> &[(String, String)] {
        &self.disasm_output
    }

    /// Finalize all functions and get code pointers
    pub fn finalize(&mut self) -> CodegenResult<()> {
        self.module.finalize_definitions().map_err(|e| {
            CodegenError::internal_with_context("finalization error", format!("{:?}", e))
        })
    }

    /// Get a function pointer by name
    pub fn get_function_ptr(&self, name: &str) -> Option<*const u8> {
        self.func_ids
            .get(name)
            .map(|&func_id| self.module.get_finalized_function(func_id))
    }

    pub fn get_function_ptr_by_id(&self, func_id: FuncId) -> *const u8 {
        self.module.get_finalized_function(func_id)
    }

    /// Clear the context for the next function
    pub fn clear(&mut self) {
        self.module.clear_context(&mut self.ctx);
    }

    /// Disjoint borrows of the function under construction and the module,
    /// so a `FunctionBuilder` and the module can be used together.
    pub fn split_for_compile(&mut self) -> (&mut cranelift_codegen::ir::Function, &mut JITModule) {
        (&mut self.ctx.func, &mut self.module)
    }

    /// Release the executable memory of every compiled function.
    ///
    /// # Safety
    /// No pointer obtained from this context may be called afterwards.
    pub unsafe fn free_memory(self) {
        // Safety: forwarded to the caller.
        unsafe { self.module.free_memory() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> JitContext {
        match JitContext::with_options(&JitOptions::default(), &[]) {
            Ok(jit) => jit,
            Err(e) => panic!("jit context: {e}"),
        }
    }

    #[test]
    fn pointer_type_is_native() {
        let jit = context();
        assert!(jit.pointer_type() == types::I64 || jit.pointer_type() == types::I32);
    }

    #[test]
    fn create_function_with_params() {
        let mut jit = context();

        // float mix(float a, float b) { return a * 0.5f + b; }
        let sig = jit.create_signature(&[types::F32, types::F32], Some(types::F32));
        let func_id = jit.declare_function("mix", &sig).unwrap();
        jit.ctx.func.signature = sig;

        let mut builder_ctx = FunctionBuilderContext::new();
        let mut builder = FunctionBuilder::new(&mut jit.ctx.func, &mut builder_ctx);
        let entry_block = builder.create_block();
        builder.append_block_params_for_function_params(entry_block);
        builder.switch_to_block(entry_block);
        builder.seal_block(entry_block);

        let a = builder.block_params(entry_block)[0];
        let b = builder.block_params(entry_block)[1];
        let half = builder.ins().f32const(0.5);
        let scaled = builder.ins().fmul(a, half);
        let sum = builder.ins().fadd(scaled, b);
        builder.ins().return_(&[sum]);
        builder.finalize();

        jit.define_function(func_id).unwrap();
        jit.clear();
        jit.finalize().unwrap();

        let fn_ptr = jit.get_function_ptr("mix").unwrap();
        let mix: extern "C" fn(f32, f32) -> f32 = unsafe { std::mem::transmute(fn_ptr) };
        assert_eq!(mix(2.0, 1.0), 2.0);
    }

    extern "C" fn twice(x: i32) -> i32 {
        x * 2
    }

    #[test]
    fn imported_symbols_are_callable() {
        let symbols = [("twice".to_string(), twice as *const u8)];
        let mut jit = JitContext::with_options(&JitOptions::release(), &symbols).unwrap();

        let sig = jit.create_signature(&[types::I32], Some(types::I32));
        let imported = jit.import_function("twice", &sig).unwrap();
        let func_id = jit.declare_function("quad", &sig).unwrap();
        jit.ctx.func.signature = sig;

        let (func, module) = jit.split_for_compile();
        let mut builder_ctx = FunctionBuilderContext::new();
        let mut builder = FunctionBuilder::new(func, &mut builder_ctx);
        let entry_block = builder.create_block();
        builder.append_block_params_for_function_params(entry_block);
        builder.switch_to_block(entry_block);
        builder.seal_block(entry_block);

        let callee = module.declare_func_in_func(imported, builder.func);
        let x = builder.block_params(entry_block)[0];
        let call = builder.ins().call(callee, &[x]);
        let once = builder.inst_results(call)[0];
        let call = builder.ins().call(callee, &[once]);
        let result = builder.inst_results(call)[0];
        builder.ins().return_(&[result]);
        builder.finalize();

        jit.define_function(func_id).unwrap();
        jit.finalize().unwrap();

        let quad: extern "C" fn(i32) -> i32 =
            unsafe { std::mem::transmute(jit.get_function_ptr("quad").unwrap()) };
        assert_eq!(quad(3), 12);
    }
}
