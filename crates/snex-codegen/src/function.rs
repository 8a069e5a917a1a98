// src/function.rs
//
// Function signatures and the parts of a function body that are not
// statements: parameter binding, local storage and the implicit return.

use cranelift::prelude::{AbiParam, InstBuilder, Signature, Value};
use cranelift_jit::JITModule;
use cranelift_module::Module;

use snex_sema::{Compilation, FunctionData, SymbolId, TypeInfo};

use crate::context::{Cg, Local, scalar_type};
use crate::errors::{CodegenError, CodegenResult};

/// Machine signature of `data`. Methods take a leading `this` pointer;
/// references and aggregates are passed by address.
pub(crate) fn abi_signature(
    module: &JITModule,
    unit: &Compilation,
    data: &FunctionData,
) -> CodegenResult<Signature> {
    let ptr_ty = module.target_config().pointer_type();
    let abi = |info: TypeInfo| -> CodegenResult<_> {
        if info.is_ref || info.id.is_complex() {
            return Ok(ptr_ty);
        }
        scalar_type(info.id).ok_or_else(|| {
            CodegenError::type_mismatch("parameter", "int, float or double", unit.info_name(info))
        })
    };

    let mut sig = module.make_signature();
    if data.this_type.is_some() {
        sig.params.push(AbiParam::new(ptr_ty));
    }
    for arg in &data.args {
        sig.params.push(AbiParam::new(abi(arg.info)?));
    }
    if !data.ret.id.is_void() {
        if data.ret.id.is_complex() && !data.ret.is_ref {
            return Err(CodegenError::unsupported_with_context(
                "returning an aggregate by value",
                data.label.clone(),
            ));
        }
        sig.returns.push(AbiParam::new(abi(data.ret)?));
    }
    Ok(sig)
}

impl Cg<'_, '_> {
    /// Bind the entry block parameters to `this` and the argument symbols.
    pub fn bind_params(&mut self, data: &FunctionData, params: &[Value]) -> CodegenResult<()> {
        let mut params = params.iter().copied();
        if data.this_type.is_some() {
            self.this = params.next();
        }
        for (arg, value) in data.args.iter().zip(params) {
            let Some(symbol) = arg.symbol else { continue };
            if arg.info.is_ref {
                self.bind_ref(symbol, value);
            } else if arg.info.id.is_complex() {
                // Aggregates arrive by address; the callee owns a copy.
                let size = self.size_of(arg.info.id);
                let slot = self.local_slot(symbol, size);
                let dst = self.builder.ins().stack_addr(self.ptr_ty, slot, 0);
                self.copy_bytes(dst, value, size);
            } else {
                self.bind_scalar(symbol, value)?;
            }
        }
        Ok(())
    }

    /// Store a scalar into the local for `symbol`, creating it on first use.
    pub fn bind_scalar(&mut self, symbol: SymbolId, value: Value) -> CodegenResult<()> {
        match self.locals.get(&symbol).copied() {
            Some(Local::Var(var)) => self.builder.def_var(var, value),
            Some(Local::Slot(slot)) => {
                self.builder.ins().stack_store(value, slot, 0);
            }
            Some(Local::Ref(var)) => {
                let addr = self.builder.use_var(var);
                self.store(value, addr, 0);
            }
            None => {
                let unit = self.unit;
                let data = unit.scopes.symbol(symbol);
                let ty = self.cl_type(data.info.id)?;
                if data.addressable {
                    let slot = self.alloc_stack(ty.bytes());
                    self.builder.ins().stack_store(value, slot, 0);
                    self.locals.insert(symbol, Local::Slot(slot));
                } else {
                    let var = self.builder.declare_var(ty);
                    self.builder.def_var(var, value);
                    self.locals.insert(symbol, Local::Var(var));
                }
            }
        }
        Ok(())
    }

    /// Point the reference `symbol` at `addr`.
    pub fn bind_ref(&mut self, symbol: SymbolId, addr: Value) {
        let var = match self.locals.get(&symbol) {
            Some(Local::Ref(var)) => *var,
            _ => {
                let var = self.builder.declare_var(self.ptr_ty);
                self.locals.insert(symbol, Local::Ref(var));
                var
            }
        };
        self.builder.def_var(var, addr);
    }

    /// Stack storage of an aggregate local. Re-declarations of the same
    /// symbol (unrolled loop bodies) share one slot.
    pub fn local_slot(&mut self, symbol: SymbolId, size: u32) -> cranelift_codegen::ir::StackSlot {
        if let Some(Local::Slot(slot)) = self.locals.get(&symbol) {
            return *slot;
        }
        let slot = self.alloc_stack(size);
        self.locals.insert(symbol, Local::Slot(slot));
        slot
    }

    /// Return emitted when control reaches the end of a body.
    pub fn implicit_return(&mut self) -> CodegenResult<()> {
        if self.ret.id.is_void() {
            self.builder.ins().return_(&[]);
        } else if self.ret.is_ref {
            let size = self.size_of(self.ret.id);
            let addr = self.sink_address(size);
            self.builder.ins().return_(&[addr]);
        } else {
            let ty = self.cl_type(self.ret.id)?;
            let zero = self.zero(ty);
            self.builder.ins().return_(&[zero]);
        }
        Ok(())
    }
}
