// src/expr.rs
//
// Expression lowering. Scalar results live in the register pool until the
// consumer takes them; lvalues lower to a `Place`, aggregates to the
// address of their storage.

use cranelift::prelude::{FloatCC, InstBuilder, IntCC, Type, Value, Variable, types};

use snex_frontend::{BinaryOp, NodeId, NodeKind, UnaryOp};
use snex_runtime::{DYN_DATA_OFFSET, DYN_SIZE_OFFSET};
use snex_sema::{ConstValue, SnexType, Storage, TypeId, TypeInfo};

use crate::context::{Cg, Local};
use crate::errors::{CodegenError, CodegenResult};
use crate::registers::Reg;

/// Writable location of a scalar.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Place {
    Var(Variable),
    /// Address held in the register pool.
    Memory(Reg),
}

impl Cg<'_, '_> {
    pub fn push(&mut self, value: Value) -> CodegenResult<Reg> {
        self.pool.push(self.builder, value)
    }

    pub fn take(&mut self, reg: Reg) -> CodegenResult<Value> {
        self.pool.take(self.builder, reg)
    }

    /// Evaluate a scalar expression into a value.
    pub fn value(&mut self, node: NodeId) -> CodegenResult<Value> {
        let reg = self.eval(node)?;
        self.take(reg)
    }

    /// Evaluate a scalar expression into a register.
    pub fn eval(&mut self, node: NodeId) -> CodegenResult<Reg> {
        let span = self.span(node);
        self.eval_node(node).map_err(|e| e.with_span(span))
    }

    fn eval_node(&mut self, node: NodeId) -> CodegenResult<Reg> {
        let info = self.node_type(node)?;
        if let Some(value) = self.unit.node_constant(node) {
            let v = self.const_value(value, info.id)?;
            return self.push(v);
        }
        match self.unit.ast.kind(node).clone() {
            NodeKind::Identifier(_) | NodeKind::Member { .. } | NodeKind::Subscript { .. } => {
                let ty = self.cl_type(info.id)?;
                let place = self.place(node)?;
                let v = self.read_place(place, ty)?;
                self.release_place(place);
                self.push(v)
            }
            NodeKind::Binary { op, lhs, rhs } if op.is_logical() => self.logical(op, lhs, rhs),
            NodeKind::Binary { op, lhs, rhs } => {
                let ty = self.node_type(lhs)?.id;
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                let r = self.take(r)?;
                let l = self.take(l)?;
                let v = self.binop(op, ty, l, r)?;
                self.push(v)
            }
            NodeKind::Unary { op, operand } => self.unary(op, operand),
            NodeKind::IncDec {
                increment,
                prefix,
                target,
            } => self.inc_dec(increment, prefix, target, info),
            NodeKind::Assign { op, target, value } => self.assign(op, target, value, info),
            NodeKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => self.ternary(cond, then_expr, else_expr, info),
            NodeKind::Cast { expr, .. } => {
                let from = self.node_type(expr)?.id;
                let v = self.value(expr)?;
                let v = self.convert(v, from, info.id)?;
                self.push(v)
            }
            NodeKind::Call { .. } => {
                let reg = self
                    .call(node)?
                    .ok_or_else(|| CodegenError::type_mismatch("call", "a value", "void"))?;
                if !info.is_ref {
                    return Ok(reg);
                }
                let ty = self.cl_type(info.id)?;
                let addr = self.take(reg)?;
                let v = self.load(ty, addr, 0);
                self.push(v)
            }
            NodeKind::Literal(_) => Err(CodegenError::internal("literal without a constant")),
            NodeKind::InitList(_) => Err(CodegenError::unsupported("initializer list as a value")),
            _ => Err(CodegenError::unsupported("statement in expression position")),
        }
    }

    /// Evaluate for side effects only.
    pub fn effect(&mut self, node: NodeId) -> CodegenResult<()> {
        let span = self.span(node);
        self.effect_node(node).map_err(|e| e.with_span(span))
    }

    fn effect_node(&mut self, node: NodeId) -> CodegenResult<()> {
        match self.unit.ast.kind(node).clone() {
            NodeKind::Assign {
                op: None,
                target,
                value,
            } if !self.node_type(target)?.id.is_numeric() => self.assign_aggregate(target, value),
            NodeKind::Call { .. } => {
                if let Some(reg) = self.call(node)? {
                    self.pool.release(reg);
                }
                Ok(())
            }
            _ => {
                let reg = self.eval(node)?;
                self.pool.release(reg);
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Places and addresses

    pub fn place(&mut self, node: NodeId) -> CodegenResult<Place> {
        if matches!(self.unit.ast.kind(node), NodeKind::Identifier(_)) {
            let symbol = self.node_symbol(node)?;
            if let Some(Local::Var(var)) = self.locals.get(&symbol) {
                return Ok(Place::Var(*var));
            }
        }
        Ok(Place::Memory(self.address(node)?))
    }

    /// Read without releasing, so the place can be written afterwards.
    pub fn read_place(&mut self, place: Place, ty: Type) -> CodegenResult<Value> {
        match place {
            Place::Var(var) => Ok(self.builder.use_var(var)),
            Place::Memory(reg) => {
                let addr = self.pool.get(self.builder, reg)?;
                Ok(self.load(ty, addr, 0))
            }
        }
    }

    /// Write and release.
    pub fn write_place(&mut self, place: Place, value: Value) -> CodegenResult<()> {
        match place {
            Place::Var(var) => self.builder.def_var(var, value),
            Place::Memory(reg) => {
                let addr = self.take(reg)?;
                self.store(value, addr, 0);
            }
        }
        Ok(())
    }

    pub fn release_place(&mut self, place: Place) {
        if let Place::Memory(reg) = place {
            self.pool.release(reg);
        }
    }

    /// Address of the storage `node` designates.
    pub fn address(&mut self, node: NodeId) -> CodegenResult<Reg> {
        let span = self.span(node);
        self.address_node(node).map_err(|e| e.with_span(span))
    }

    fn address_node(&mut self, node: NodeId) -> CodegenResult<Reg> {
        match self.unit.ast.kind(node).clone() {
            NodeKind::Identifier(_) => {
                let addr = self.symbol_address(node)?;
                self.push(addr)
            }
            NodeKind::Member { base, .. } => {
                let offset = self
                    .unit
                    .nodes
                    .get(node)
                    .and_then(|i| i.offset)
                    .ok_or_else(|| CodegenError::internal("member access without an offset"))?;
                let base = self.address(base)?;
                let base = self.take(base)?;
                let addr = self.builder.ins().iadd_imm(base, i64::from(offset));
                self.push(addr)
            }
            NodeKind::Subscript { base, index } => self.element_address(base, index),
            NodeKind::Call { .. } if self.node_type(node)?.is_ref => self
                .call(node)?
                .ok_or_else(|| CodegenError::internal("reference call without a result")),
            _ => Err(CodegenError::unsupported("taking the address of a temporary")),
        }
    }

    /// Address of `node`, or of a temporary holding its value when it is
    /// not an lvalue. Used for `const&` arguments.
    pub fn address_or_temporary(&mut self, node: NodeId) -> CodegenResult<Reg> {
        if self.unit.nodes.get(node).is_some_and(|i| i.lvalue) {
            return self.address(node);
        }
        let ty = self.cl_type(self.node_type(node)?.id)?;
        let v = self.value(node)?;
        let slot = self.alloc_stack(ty.bytes());
        self.builder.ins().stack_store(v, slot, 0);
        let addr = self.builder.ins().stack_addr(self.ptr_ty, slot, 0);
        self.push(addr)
    }

    fn symbol_address(&mut self, node: NodeId) -> CodegenResult<Value> {
        let symbol = self.node_symbol(node)?;
        let unit = self.unit;
        let data = unit.scopes.symbol(symbol);
        match data.storage {
            Storage::Local | Storage::Param(_) => match self.locals.get(&symbol).copied() {
                Some(Local::Slot(slot)) => Ok(self.builder.ins().stack_addr(self.ptr_ty, slot, 0)),
                Some(Local::Ref(var)) => Ok(self.builder.use_var(var)),
                Some(Local::Var(_)) => Err(CodegenError::internal_with_context(
                    "register local has no address",
                    unit.path_name(&data.id),
                )),
                None => Err(CodegenError::not_found("local", unit.path_name(&data.id))),
            },
            Storage::Root(offset) => Ok(self.iconst_ptr(self.root_base + i64::from(offset))),
            Storage::Member(offset) => {
                let this = self.this.ok_or_else(|| {
                    CodegenError::internal_with_context("member outside of a method", unit.path_name(&data.id))
                })?;
                Ok(self.builder.ins().iadd_imm(this, i64::from(offset)))
            }
            Storage::Constant => Err(CodegenError::unsupported_with_context(
                "address of a constant",
                unit.path_name(&data.id),
            )),
        }
    }

    /// `base[index]`. Dynamic indices wrap into range; an empty `dyn`
    /// resolves to scratch storage.
    fn element_address(&mut self, base: NodeId, index: NodeId) -> CodegenResult<Reg> {
        let unit = self.unit;
        let base_ty = self.node_type(base)?.id;
        let elem = unit.types.element_type(base_ty).ok_or_else(|| {
            CodegenError::type_mismatch("subscript", "span or dyn", unit.type_name(base_ty))
        })?;
        let stride = unit.types.stride_of(elem);

        match unit.types.get(base_ty) {
            SnexType::Span { size, .. } => {
                let base = self.address(base)?;
                if let Some(ConstValue::Int(i)) = unit.node_constant(index)
                    && i >= 0
                    && (i as u32) < size
                {
                    let base = self.take(base)?;
                    let addr = self.builder.ins().iadd_imm(base, i64::from(i) * i64::from(stride));
                    return self.push(addr);
                }
                let index = self.eval(index)?;
                let i = self.take(index)?;
                let base = self.take(base)?;
                let wrapped = self.wrap_index(i, size);
                let offset = self.scale_index(wrapped, stride);
                let addr = self.builder.ins().iadd(base, offset);
                self.push(addr)
            }
            SnexType::Dyn { .. } => {
                let header = self.address(base)?;
                let index = self.eval(index)?;
                let i = self.take(index)?;
                let header = self.take(header)?;
                let data = self.load(self.ptr_ty, header, DYN_DATA_OFFSET);
                let size = self.load(types::I32, header, DYN_SIZE_OFFSET);

                let zero = self.builder.ins().iconst(types::I32, 0);
                let one = self.builder.ins().iconst(types::I32, 1);
                let nonneg = self.builder.ins().smax(i, zero);
                let divisor = self.builder.ins().umax(size, one);
                let wrapped = self.builder.ins().urem(nonneg, divisor);
                let offset = self.scale_index(wrapped, stride);
                let addr = self.builder.ins().iadd(data, offset);

                let empty = self.builder.ins().icmp_imm(IntCC::Equal, size, 0);
                let sink = self.sink_address(stride);
                let addr = self.builder.ins().select(empty, sink, addr);
                self.push(addr)
            }
            _ => Err(CodegenError::type_mismatch(
                "subscript",
                "span or dyn",
                unit.type_name(base_ty),
            )),
        }
    }

    /// `max(i, 0) % size` for a span of constant size.
    fn wrap_index(&mut self, i: Value, size: u32) -> Value {
        let zero = self.builder.ins().iconst(types::I32, 0);
        let nonneg = self.builder.ins().smax(i, zero);
        let size = size.max(1);
        if size.is_power_of_two() {
            return self.builder.ins().band_imm(nonneg, i64::from(size - 1));
        }
        let divisor = self.builder.ins().iconst(types::I32, i64::from(size));
        self.builder.ins().urem(nonneg, divisor)
    }

    fn scale_index(&mut self, i: Value, stride: u32) -> Value {
        let i = if self.ptr_ty == types::I32 {
            i
        } else {
            self.builder.ins().uextend(self.ptr_ty, i)
        };
        self.builder.ins().imul_imm(i, i64::from(stride))
    }

    // -----------------------------------------------------------------------
    // Operators

    /// Apply a non-logical binary operator to two values of type `ty`.
    pub fn binop(&mut self, op: BinaryOp, ty: TypeId, l: Value, r: Value) -> CodegenResult<Value> {
        if op.is_comparison() {
            return Ok(if ty.is_float() {
                self.float_compare(float_cc(op), l, r)
            } else {
                self.int_compare(int_cc(op), l, r)
            });
        }
        if ty.is_float() {
            let ins = self.builder.ins();
            return match op {
                BinaryOp::Add => Ok(ins.fadd(l, r)),
                BinaryOp::Sub => Ok(ins.fsub(l, r)),
                BinaryOp::Mul => Ok(ins.fmul(l, r)),
                BinaryOp::Div => Ok(ins.fdiv(l, r)),
                _ => Err(CodegenError::type_mismatch(
                    "binary operator",
                    format!("int operands for '{}'", op.as_str()),
                    self.unit.type_name(ty),
                )),
            };
        }
        match op {
            BinaryOp::Div => return Ok(self.checked_div(l, r, false)),
            BinaryOp::Mod => return Ok(self.checked_div(l, r, true)),
            BinaryOp::And | BinaryOp::Or => {
                return Err(CodegenError::internal("logical operator outside short-circuit lowering"));
            }
            _ => {}
        }
        let ins = self.builder.ins();
        Ok(match op {
            BinaryOp::Add => ins.iadd(l, r),
            BinaryOp::Sub => ins.isub(l, r),
            BinaryOp::Mul => ins.imul(l, r),
            BinaryOp::BitAnd => ins.band(l, r),
            BinaryOp::BitOr => ins.bor(l, r),
            BinaryOp::BitXor => ins.bxor(l, r),
            BinaryOp::Shl => ins.ishl(l, r),
            _ => ins.sshr(l, r),
        })
    }

    fn int_compare(&mut self, cc: IntCC, l: Value, r: Value) -> Value {
        let b = self.builder.ins().icmp(cc, l, r);
        self.builder.ins().uextend(types::I32, b)
    }

    fn float_compare(&mut self, cc: FloatCC, l: Value, r: Value) -> Value {
        let b = self.builder.ins().fcmp(cc, l, r);
        self.builder.ins().uextend(types::I32, b)
    }

    /// Integer division that never traps: `x / 0` and `x % 0` are 0,
    /// `x / -1` is `-x`.
    fn checked_div(&mut self, l: Value, r: Value, remainder: bool) -> Value {
        let by_zero = self.builder.ins().icmp_imm(IntCC::Equal, r, 0);
        let by_minus_one = self.builder.ins().icmp_imm(IntCC::Equal, r, -1);
        let unsafe_divisor = self.builder.ins().bor(by_zero, by_minus_one);
        let one = self.builder.ins().iconst(types::I32, 1);
        let divisor = self.builder.ins().select(unsafe_divisor, one, r);
        let zero = self.builder.ins().iconst(types::I32, 0);
        if remainder {
            let rem = self.builder.ins().srem(l, divisor);
            return self.builder.ins().select(unsafe_divisor, zero, rem);
        }
        let quotient = self.builder.ins().sdiv(l, divisor);
        let negated = self.builder.ins().ineg(l);
        let quotient = self.builder.ins().select(by_minus_one, negated, quotient);
        self.builder.ins().select(by_zero, zero, quotient)
    }

    /// Non-zero test as a branch condition.
    pub fn truthy(&mut self, v: Value, ty: TypeId) -> CodegenResult<Value> {
        if ty.is_float() {
            let zero = self.zero(self.cl_type(ty)?);
            Ok(self.builder.ins().fcmp(FloatCC::NotEqual, v, zero))
        } else {
            Ok(self.builder.ins().icmp_imm(IntCC::NotEqual, v, 0))
        }
    }

    /// Evaluate `node` as a branch condition.
    pub fn condition(&mut self, node: NodeId) -> CodegenResult<Value> {
        let ty = self.node_type(node)?.id;
        let v = self.value(node)?;
        self.truthy(v, ty)
    }

    fn logical(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> CodegenResult<Reg> {
        self.pool.spill_all(self.builder)?;
        let rhs_block = self.builder.create_block();
        let merge = self.builder.create_block();
        let result = self.builder.append_block_param(merge, types::I32);

        let l = self.condition(lhs)?;
        if op == BinaryOp::And {
            let zero = self.builder.ins().iconst(types::I32, 0);
            self.builder.ins().brif(l, rhs_block, &[], merge, &[zero.into()]);
        } else {
            let one = self.builder.ins().iconst(types::I32, 1);
            self.builder.ins().brif(l, merge, &[one.into()], rhs_block, &[]);
        }

        self.switch_and_seal(rhs_block);
        let r = self.condition(rhs)?;
        let r = self.builder.ins().uextend(types::I32, r);
        self.builder.ins().jump(merge, &[r.into()]);

        self.switch_and_seal(merge);
        self.push(result)
    }

    fn ternary(&mut self, cond: NodeId, then_expr: NodeId, else_expr: NodeId, info: TypeInfo) -> CodegenResult<Reg> {
        let ty = self.cl_type(info.id)?;
        self.pool.spill_all(self.builder)?;
        let then_block = self.builder.create_block();
        let else_block = self.builder.create_block();
        let merge = self.builder.create_block();
        let result = self.builder.append_block_param(merge, ty);

        let c = self.condition(cond)?;
        self.builder.ins().brif(c, then_block, &[], else_block, &[]);

        self.switch_and_seal(then_block);
        let v = self.value(then_expr)?;
        self.builder.ins().jump(merge, &[v.into()]);

        self.switch_and_seal(else_block);
        let v = self.value(else_expr)?;
        self.builder.ins().jump(merge, &[v.into()]);

        self.switch_and_seal(merge);
        self.push(result)
    }

    fn unary(&mut self, op: UnaryOp, operand: NodeId) -> CodegenResult<Reg> {
        let ty = self.node_type(operand)?.id;
        let v = self.value(operand)?;
        let result = match op {
            UnaryOp::Neg if ty.is_float() => self.builder.ins().fneg(v),
            UnaryOp::Neg => self.builder.ins().ineg(v),
            UnaryOp::Not => {
                let t = self.truthy(v, ty)?;
                let f = self.builder.ins().bxor_imm(t, 1);
                self.builder.ins().uextend(types::I32, f)
            }
            UnaryOp::BitNot => self.builder.ins().bnot(v),
        };
        self.push(result)
    }

    fn inc_dec(&mut self, increment: bool, prefix: bool, target: NodeId, info: TypeInfo) -> CodegenResult<Reg> {
        let ty = self.cl_type(info.id)?;
        let place = self.place(target)?;
        let old = self.read_place(place, ty)?;
        let new = match ty {
            types::F32 => {
                let one = self.builder.ins().f32const(if increment { 1.0 } else { -1.0 });
                self.builder.ins().fadd(old, one)
            }
            types::F64 => {
                let one = self.builder.ins().f64const(if increment { 1.0 } else { -1.0 });
                self.builder.ins().fadd(old, one)
            }
            _ => self.builder.ins().iadd_imm(old, if increment { 1 } else { -1 }),
        };
        self.write_place(place, new)?;
        self.push(if prefix { new } else { old })
    }

    fn assign(&mut self, op: Option<BinaryOp>, target: NodeId, value: NodeId, info: TypeInfo) -> CodegenResult<Reg> {
        if !info.id.is_numeric() {
            return Err(CodegenError::unsupported("aggregate assignment used as a value"));
        }
        let ty = self.cl_type(info.id)?;
        let place = self.place(target)?;
        let rhs = self.eval(value)?;
        let rhs = self.take(rhs)?;
        let result = match op {
            None => rhs,
            Some(op) => {
                // The value was coerced to the wider of both types
                let wide = self.node_type(value)?.id;
                let old = self.read_place(place, ty)?;
                let old = self.convert(old, info.id, wide)?;
                let combined = self.binop(op, wide, old, rhs)?;
                self.convert(combined, wide, info.id)?
            }
        };
        self.write_place(place, result)?;
        self.push(result)
    }

    /// Copy or list-initialize an aggregate lvalue.
    fn assign_aggregate(&mut self, target: NodeId, value: NodeId) -> CodegenResult<()> {
        let ty = self.node_type(target)?.id;
        let dst = self.address(target)?;
        if matches!(self.unit.ast.kind(value), NodeKind::InitList(_)) {
            self.init_aggregate(dst, value, ty)?;
            self.pool.release(dst);
            return Ok(());
        }
        let src = self.address(value)?;
        let src = self.take(src)?;
        let dst = self.take(dst)?;
        self.copy_bytes(dst, src, self.size_of(ty));
        Ok(())
    }

    /// Fill the aggregate at `dst` from an initializer list. Elements the
    /// list leaves out get their defaults.
    pub fn init_aggregate(&mut self, dst: Reg, list: NodeId, ty: TypeId) -> CodegenResult<()> {
        let addr = self.pool.get(self.builder, dst)?;
        let size = self.size_of(ty);
        self.zero_bytes(addr, size);
        self.write_defaults(addr, ty, 0)?;
        self.store_list(dst, list, ty, 0)
    }

    fn store_list(&mut self, dst: Reg, list: NodeId, ty: TypeId, offset: u32) -> CodegenResult<()> {
        let unit = self.unit;
        let NodeKind::InitList(items) = unit.ast.kind(list) else {
            return self.store_item(dst, list, ty, offset);
        };
        let slots = unit
            .aggregate_slots(ty, items.len(), unit.ast.span(list))
            .map_err(|e| CodegenError::internal_with_context("initializer list", e.to_string()))?;
        for (&item, (slot_ty, slot_offset)) in items.iter().zip(slots) {
            self.store_list(dst, item, slot_ty, offset + slot_offset)?;
        }
        Ok(())
    }

    fn store_item(&mut self, dst: Reg, item: NodeId, ty: TypeId, offset: u32) -> CodegenResult<()> {
        if ty.is_complex() {
            let src = self.address(item)?;
            let src = self.take(src)?;
            let base = self.pool.get(self.builder, dst)?;
            let to = self.builder.ins().iadd_imm(base, i64::from(offset));
            self.copy_bytes(to, src, self.size_of(ty));
            return Ok(());
        }
        let v = self.value(item)?;
        let base = self.pool.get(self.builder, dst)?;
        self.store(v, base, offset as i32);
        Ok(())
    }

    /// Numeric conversion between scalar types.
    pub fn convert(&mut self, v: Value, from: TypeId, to: TypeId) -> CodegenResult<Value> {
        if from == to {
            return Ok(v);
        }
        let ins = self.builder.ins();
        Ok(match (from, to) {
            (TypeId::INT, TypeId::FLOAT) => ins.fcvt_from_sint(types::F32, v),
            (TypeId::INT, TypeId::DOUBLE) => ins.fcvt_from_sint(types::F64, v),
            (TypeId::FLOAT, TypeId::INT) | (TypeId::DOUBLE, TypeId::INT) => ins.fcvt_to_sint_sat(types::I32, v),
            (TypeId::FLOAT, TypeId::DOUBLE) => ins.fpromote(types::F64, v),
            (TypeId::DOUBLE, TypeId::FLOAT) => ins.fdemote(types::F32, v),
            _ => {
                return Err(CodegenError::type_mismatch(
                    "conversion",
                    self.unit.type_name(to),
                    self.unit.type_name(from),
                ));
            }
        })
    }
}

fn int_cc(op: BinaryOp) -> IntCC {
    match op {
        BinaryOp::Eq => IntCC::Equal,
        BinaryOp::Ne => IntCC::NotEqual,
        BinaryOp::Lt => IntCC::SignedLessThan,
        BinaryOp::Le => IntCC::SignedLessThanOrEqual,
        BinaryOp::Gt => IntCC::SignedGreaterThan,
        _ => IntCC::SignedGreaterThanOrEqual,
    }
}

fn float_cc(op: BinaryOp) -> FloatCC {
    match op {
        BinaryOp::Eq => FloatCC::Equal,
        BinaryOp::Ne => FloatCC::NotEqual,
        BinaryOp::Lt => FloatCC::LessThan,
        BinaryOp::Le => FloatCC::LessThanOrEqual,
        BinaryOp::Gt => FloatCC::GreaterThan,
        _ => FloatCC::GreaterThanOrEqual,
    }
}
