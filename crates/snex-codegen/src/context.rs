// src/context.rs
//
// Per-function codegen context. Methods are implemented across several
// files using split impl blocks:
// - function.rs: entry block, parameters, default return
// - stmt.rs: statements and control flow
// - expr.rs: scalar expressions, places and addresses
// - calls.rs: user and native calls
// - inliners.rs: assembly inliners

use cranelift::prelude::{
    Block, FunctionBuilder, InstBuilder, MemFlags, StackSlotData, StackSlotKind, Type, Value,
    Variable, types,
};
use cranelift_codegen::ir::{FuncRef, StackSlot};
use cranelift_jit::JITModule;
use cranelift_module::{FuncId, Module};
use rustc_hash::FxHashMap;

use snex_frontend::NodeId;
use snex_identity::Span;
use snex_sema::{Compilation, ConstValue, FunctionId, SnexType, SymbolId, TypeId, TypeInfo};

use crate::errors::{CodegenError, CodegenResult};
use crate::jit::JitOptions;
use crate::registers::RegisterPool;

/// Straight-line copies and fills up to this size; larger ones loop.
const UNROLLED_COPY_BYTES: u32 = 128;

pub(crate) fn scalar_type(ty: TypeId) -> Option<Type> {
    match ty {
        TypeId::INT => Some(types::I32),
        TypeId::FLOAT => Some(types::F32),
        TypeId::DOUBLE => Some(types::F64),
        _ => None,
    }
}

/// Control flow context for loops and switches (break/continue targets)
pub(crate) struct ControlFlow {
    breaks: Vec<Block>,
    continues: Vec<Block>,
}

impl ControlFlow {
    pub fn new() -> Self {
        Self {
            breaks: Vec::new(),
            continues: Vec::new(),
        }
    }

    pub fn push_loop(&mut self, exit: Block, cont: Block) {
        self.breaks.push(exit);
        self.continues.push(cont);
    }

    pub fn pop_loop(&mut self) {
        self.breaks.pop();
        self.continues.pop();
    }

    /// `break` inside a switch leaves the switch; `continue` still targets
    /// the enclosing loop.
    pub fn push_switch(&mut self, exit: Block) {
        self.breaks.push(exit);
    }

    pub fn pop_switch(&mut self) {
        self.breaks.pop();
    }

    pub fn break_target(&self) -> Option<Block> {
        self.breaks.last().copied()
    }

    pub fn continue_target(&self) -> Option<Block> {
        self.continues.last().copied()
    }
}

/// Where a local variable or parameter lives.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Local {
    /// Scalar held in a variable.
    Var(Variable),
    /// Aggregates and scalars whose address is taken.
    Slot(StackSlot),
    /// Reference; the variable holds the address of the referent.
    Ref(Variable),
}

/// Cranelift function ids of everything a unit can call.
#[derive(Debug, Default)]
pub(crate) struct FunctionLinks {
    pub defined: FxHashMap<FunctionId, FuncId>,
    pub imported: FxHashMap<FunctionId, FuncId>,
    /// Symbol name each native function was registered under.
    pub native_symbols: FxHashMap<FunctionId, String>,
}

pub(crate) struct Cg<'a, 'b> {
    pub builder: &'a mut FunctionBuilder<'b>,
    pub module: &'a mut JITModule,
    pub unit: &'a Compilation,
    pub links: &'a mut FunctionLinks,
    pub pool: RegisterPool,
    pub locals: FxHashMap<SymbolId, Local>,
    pub cf: ControlFlow,
    /// `this` pointer of a method.
    pub this: Option<Value>,
    /// Address of the root data segment.
    pub root_base: i64,
    pub ret: TypeInfo,
    pub ptr_ty: Type,
    func_refs: FxHashMap<FuncId, FuncRef>,
    /// Target of out-of-range accesses into empty `dyn` buffers.
    sink: Option<(StackSlot, u32)>,
}

impl<'a, 'b> Cg<'a, 'b> {
    pub fn new(
        builder: &'a mut FunctionBuilder<'b>,
        module: &'a mut JITModule,
        unit: &'a Compilation,
        links: &'a mut FunctionLinks,
        options: &JitOptions,
        ret: TypeInfo,
        root_base: i64,
    ) -> Self {
        let ptr_ty = module.target_config().pointer_type();
        Self {
            builder,
            module,
            unit,
            links,
            pool: RegisterPool::new(options.gp_registers, options.fp_registers, options.max_spill_bytes),
            locals: FxHashMap::default(),
            cf: ControlFlow::new(),
            this: None,
            root_base,
            ret,
            ptr_ty,
            func_refs: FxHashMap::default(),
            sink: None,
        }
    }

    pub fn span(&self, node: NodeId) -> Span {
        self.unit.ast.span(node)
    }

    /// Resolved type of `node`. Every node reaching codegen has one.
    pub fn node_type(&self, node: NodeId) -> CodegenResult<TypeInfo> {
        self.unit.nodes.ty(node).ok_or_else(|| {
            CodegenError::internal("node reached codegen without a type").with_span(self.span(node))
        })
    }

    pub fn node_symbol(&self, node: NodeId) -> CodegenResult<SymbolId> {
        self.unit
            .nodes
            .get(node)
            .and_then(|i| i.symbol)
            .ok_or_else(|| CodegenError::internal("node has no symbol").with_span(self.span(node)))
    }

    /// Cranelift type of a scalar SNEX type.
    pub fn cl_type(&self, ty: TypeId) -> CodegenResult<Type> {
        scalar_type(ty).ok_or_else(|| {
            CodegenError::type_mismatch("scalar", "int, float or double", self.unit.type_name(ty))
        })
    }

    pub fn size_of(&self, ty: TypeId) -> u32 {
        self.unit.types.size_of(ty)
    }

    pub fn alloc_stack(&mut self, size: u32) -> StackSlot {
        self.builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            size.max(1),
            4,
        ))
    }

    pub fn switch_and_seal(&mut self, block: Block) {
        self.builder.switch_to_block(block);
        self.builder.seal_block(block);
    }

    pub fn func_ref(&mut self, func_id: FuncId) -> FuncRef {
        if let Some(&r) = self.func_refs.get(&func_id) {
            return r;
        }
        let r = self.module.declare_func_in_func(func_id, self.builder.func);
        self.func_refs.insert(func_id, r);
        r
    }

    pub fn iconst_ptr(&mut self, value: i64) -> Value {
        self.builder.ins().iconst(self.ptr_ty, value)
    }

    /// Emit `value` converted to `ty`.
    pub fn const_value(&mut self, value: ConstValue, ty: TypeId) -> CodegenResult<Value> {
        let value = value.cast(ty).ok_or_else(|| {
            CodegenError::type_mismatch("constant", "a numeric type", self.unit.type_name(ty))
        })?;
        Ok(match value {
            ConstValue::Int(v) => self.builder.ins().iconst(types::I32, i64::from(v)),
            ConstValue::Float(v) => self.builder.ins().f32const(v),
            ConstValue::Double(v) => self.builder.ins().f64const(v),
        })
    }

    pub fn zero(&mut self, ty: Type) -> Value {
        match ty {
            types::F32 => self.builder.ins().f32const(0.0),
            types::F64 => self.builder.ins().f64const(0.0),
            _ => self.builder.ins().iconst(ty, 0),
        }
    }

    pub fn load(&mut self, ty: Type, addr: Value, offset: i32) -> Value {
        self.builder.ins().load(ty, MemFlags::new(), addr, offset)
    }

    pub fn store(&mut self, value: Value, addr: Value, offset: i32) {
        self.builder.ins().store(MemFlags::new(), value, addr, offset);
    }

    /// Address of a scratch area of at least `size` bytes that absorbs
    /// accesses into empty buffers.
    pub fn sink_address(&mut self, size: u32) -> Value {
        let slot = match self.sink {
            Some((slot, capacity)) if capacity >= size => slot,
            _ => {
                let capacity = size.max(16);
                let slot = self.alloc_stack(capacity);
                self.sink = Some((slot, capacity));
                slot
            }
        };
        self.builder.ins().stack_addr(self.ptr_ty, slot, 0)
    }

    /// Copy `size` bytes between non-overlapping aggregates. Sizes are
    /// multiples of four.
    pub fn copy_bytes(&mut self, dst: Value, src: Value, size: u32) {
        if size <= UNROLLED_COPY_BYTES {
            let mut offset = 0;
            while offset < size {
                let ty = if size - offset >= 8 { types::I64 } else { types::I32 };
                let word = self.load(ty, src, offset as i32);
                self.store(word, dst, offset as i32);
                offset += ty.bytes();
            }
            return;
        }
        self.word_loop(dst, size, Some(src));
    }

    pub fn zero_bytes(&mut self, dst: Value, size: u32) {
        if size <= UNROLLED_COPY_BYTES {
            let mut offset = 0;
            while offset < size {
                let ty = if size - offset >= 8 { types::I64 } else { types::I32 };
                let zero = self.builder.ins().iconst(ty, 0);
                self.store(zero, dst, offset as i32);
                offset += ty.bytes();
            }
            return;
        }
        self.word_loop(dst, size, None);
    }

    /// `for (i = 0; i < size; i += 4) dst[i] = src ? src[i] : 0`
    fn word_loop(&mut self, dst: Value, size: u32, src: Option<Value>) {
        let header = self.builder.create_block();
        let body = self.builder.create_block();
        let exit = self.builder.create_block();
        let offset = self.builder.append_block_param(header, self.ptr_ty);

        let start = self.iconst_ptr(0);
        self.builder.ins().jump(header, &[start.into()]);

        self.builder.switch_to_block(header);
        let done = self
            .builder
            .ins()
            .icmp_imm(cranelift::prelude::IntCC::UnsignedGreaterThanOrEqual, offset, i64::from(size));
        self.builder.ins().brif(done, exit, &[], body, &[]);

        self.switch_and_seal(body);
        let to = self.builder.ins().iadd(dst, offset);
        let word = match src {
            Some(src) => {
                let from = self.builder.ins().iadd(src, offset);
                self.load(types::I32, from, 0)
            }
            None => self.builder.ins().iconst(types::I32, 0),
        };
        self.store(word, to, 0);
        let next = self.builder.ins().iadd_imm(offset, 4);
        self.builder.ins().jump(header, &[next.into()]);

        self.builder.seal_block(header);
        self.switch_and_seal(exit);
    }

    /// Store the declared member defaults of `ty` at `addr`, recursively.
    /// The storage must already be zeroed.
    pub fn write_defaults(&mut self, addr: Value, ty: TypeId, offset: u32) -> CodegenResult<()> {
        match self.unit.types.get(ty) {
            SnexType::Struct(_) => {
                let members: Vec<(TypeId, u32, Option<ConstValue>)> = self
                    .unit
                    .types
                    .as_struct(ty)
                    .map(|st| st.members.iter().map(|m| (m.ty.id, m.offset, m.default)).collect())
                    .unwrap_or_default();
                for (member_ty, member_offset, default) in members {
                    match default {
                        Some(value) => {
                            let v = self.const_value(value, member_ty)?;
                            self.store(v, addr, (offset + member_offset) as i32);
                        }
                        None => self.write_defaults(addr, member_ty, offset + member_offset)?,
                    }
                }
            }
            SnexType::Span { elem, size } if self.unit.types.as_struct(elem).is_some() => {
                let stride = self.unit.types.stride_of(elem);
                for i in 0..size {
                    self.write_defaults(addr, elem, offset + i * stride)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
