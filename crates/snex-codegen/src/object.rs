// src/object.rs
//
// The result of a compile: executable code, the root data segment the code
// addresses directly, and the host-visible function table.

use snex_runtime::NativeSignature;
use snex_sema::{OptimizerStats, RootClassData};

use crate::errors::{CodegenError, CodegenResult};
use crate::jit::JitContext;
use crate::registers::RegisterStats;

/// A host-callable function.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: String,
    /// `None` when a parameter or the return type cannot cross to the host.
    pub signature: Option<NativeSignature>,
    pub(crate) ptr: *const u8,
}

/// One named entry of the root data segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEntry {
    pub name: String,
    pub type_name: String,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodegenStats {
    pub functions: usize,
    pub registers: RegisterStats,
    pub optimizer: OptimizerStats,
}

/// Executable code plus its data segment.
///
/// Function pointers handed out stay valid while the object lives. Root
/// objects with destructors are destroyed in reverse declaration order on
/// drop, before the code is released.
pub struct CompiledObject {
    pub(crate) jit: Option<JitContext>,
    pub(crate) functions: Vec<CompiledFunction>,
    pub(crate) root: RootClassData,
    pub(crate) layout: Vec<DataEntry>,
    /// Destructor entry points with the root offset of their object.
    pub(crate) destructors: Vec<(*const u8, u32)>,
    pub(crate) stats: CodegenStats,
    pub(crate) disasm: Vec<(String, String)>,
}

// Safety: the raw pointers refer to code and data owned by this object,
// which never hands out interior references tied to a thread.
unsafe impl Send for CompiledObject {}

impl CompiledObject {
    /// Entry point of `name` with exactly `signature`.
    pub fn function(&self, name: &str, signature: &NativeSignature) -> CodegenResult<*const u8> {
        let mut found = None;
        for f in self.functions.iter().filter(|f| f.name == name) {
            if f.signature.as_ref() == Some(signature) {
                return Ok(f.ptr);
            }
            found.get_or_insert(f);
        }
        match found {
            Some(f) => Err(CodegenError::signature_mismatch(
                name,
                signature.to_string(),
                f.signature
                    .as_ref()
                    .map_or_else(|| "a non-native signature".to_string(), |s| s.to_string()),
            )),
            None => Err(CodegenError::not_found("function", name)),
        }
    }

    pub fn get_function(&self, name: &str, signature: &NativeSignature) -> Option<*const u8> {
        self.function(name, signature).ok()
    }

    /// Host-callable functions in declaration order.
    pub fn functions(&self) -> &[CompiledFunction] {
        &self.functions
    }

    /// Address of the root variable `name` (`x`, `Ns::x` or `Ns.x`).
    pub fn get_data_pointer(&self, name: &str) -> Option<*mut u8> {
        let qualified = name.replace('.', "::");
        let entry = self.layout.iter().find(|e| e.name == qualified)?;
        let base = self.root.base_ptr()?;
        // Safety: layout offsets lie inside the finalised buffer.
        Some(unsafe { base.add(entry.offset as usize) })
    }

    pub fn data_layout(&self) -> &[DataEntry] {
        &self.layout
    }

    pub fn data_size(&self) -> u32 {
        self.root.size()
    }

    pub fn stats(&self) -> &CodegenStats {
        &self.stats
    }

    /// Disassembly per function when compiled with `JitOptions::disasm`.
    pub fn disasm(&self) -> &[(String, String)] {
        &self.disasm
    }
}

impl std::fmt::Debug for CompiledObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledObject")
            .field("functions", &self.functions.len())
            .field("data_size", &self.root.size())
            .field("destructors", &self.destructors.len())
            .finish()
    }
}

impl Drop for CompiledObject {
    fn drop(&mut self) {
        if let Some(base) = self.root.base_ptr() {
            for &(ptr, offset) in self.destructors.iter().rev() {
                // Safety: destructors are compiled methods taking `this`,
                // and the code is still mapped until `free_memory` below.
                unsafe {
                    let destroy: extern "C" fn(*mut u8) = std::mem::transmute(ptr);
                    destroy(base.add(offset as usize));
                }
            }
        }
        tracing::trace!(destructors = self.destructors.len(), "released compiled object");
        if let Some(jit) = self.jit.take() {
            // Safety: every pointer into the code was handed out by this
            // object, whose lifetime ends here.
            unsafe { jit.free_memory() };
        }
    }
}
