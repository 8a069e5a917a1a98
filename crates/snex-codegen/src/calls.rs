// src/calls.rs
//
// Call lowering: direct calls to compiled functions, calls into host and
// runtime natives (imported on first use) and dispatch to inliners.

use cranelift::prelude::InstBuilder;
use cranelift_module::{FuncId, Linkage, Module};
use smallvec::SmallVec;

use snex_frontend::{Callee, NodeId, NodeKind};
use snex_sema::{FunctionData, FunctionId, FunctionKind, Inliner};

use crate::context::Cg;
use crate::errors::{CodegenError, CodegenResult};
use crate::function::abi_signature;
use crate::registers::Reg;

impl Cg<'_, '_> {
    /// Lower a call. Returns the result register, or `None` for void calls.
    /// Calls returning a reference yield the address.
    pub fn call(&mut self, node: NodeId) -> CodegenResult<Option<Reg>> {
        let unit = self.unit;
        let NodeKind::Call { callee, args } = unit.ast.kind(node) else {
            return Err(CodegenError::internal("call lowering on a non-call node"));
        };
        let function = unit
            .nodes
            .get(node)
            .and_then(|i| i.call)
            .ok_or_else(|| CodegenError::internal("call without a resolved target"))?;
        let data = unit.functions.get(function);
        let receiver = match callee {
            Callee::Method { receiver, .. } => Some(*receiver),
            Callee::Path { .. } => None,
        };

        match data.kind {
            FunctionKind::Inline(Inliner::Assembly(inliner)) => self.inline_assembly(inliner, receiver, args).map(Some),
            FunctionKind::Inline(Inliner::HighLevel(inliner)) => {
                self.inline_high_level(inliner, node, receiver, args).map(Some)
            }
            FunctionKind::User { .. } | FunctionKind::Native { .. } => {
                let func_id = self.callee_id(function, data)?;
                self.direct_call(func_id, data, receiver, args)
            }
        }
    }

    fn callee_id(&mut self, function: FunctionId, data: &FunctionData) -> CodegenResult<FuncId> {
        if let Some(&id) = self.links.defined.get(&function) {
            return Ok(id);
        }
        if let Some(&id) = self.links.imported.get(&function) {
            return Ok(id);
        }
        let name = self
            .links
            .native_symbols
            .get(&function)
            .cloned()
            .ok_or_else(|| CodegenError::not_found("function", data.label.clone()))?;
        let sig = abi_signature(self.module, self.unit, data)?;
        let id = self
            .module
            .declare_function(&name, Linkage::Import, &sig)
            .map_err(CodegenError::cranelift)?;
        tracing::trace!(name = %name, "imported native function");
        self.links.imported.insert(function, id);
        Ok(id)
    }

    fn direct_call(
        &mut self,
        func_id: FuncId,
        data: &FunctionData,
        receiver: Option<NodeId>,
        args: &[NodeId],
    ) -> CodegenResult<Option<Reg>> {
        let mut regs: SmallVec<[Reg; 6]> = SmallVec::new();
        if data.this_type.is_some() {
            let this = match receiver {
                Some(receiver) => self.address(receiver)?,
                // Implicit `this` of a call from inside another method
                None => {
                    let this = self
                        .this
                        .ok_or_else(|| CodegenError::unsupported_with_context("method call without an object", data.label.clone()))?;
                    self.push(this)?
                }
            };
            regs.push(this);
        }
        for (&arg, param) in args.iter().zip(&data.args) {
            let reg = if param.info.is_ref {
                self.address_or_temporary(arg)?
            } else if param.info.id.is_complex() {
                self.address(arg)?
            } else {
                self.eval(arg)?
            };
            regs.push(reg);
        }

        let mut values: SmallVec<[cranelift::prelude::Value; 6]> = SmallVec::with_capacity(regs.len());
        for reg in regs {
            values.push(self.take(reg)?);
        }
        let func_ref = self.func_ref(func_id);
        let inst = self.builder.ins().call(func_ref, &values);
        match self.builder.inst_results(inst).first().copied() {
            Some(result) => Ok(Some(self.push(result)?)),
            None => Ok(None),
        }
    }
}
