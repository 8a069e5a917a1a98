// src/stmt.rs
//
// Statement lowering. Each statement function returns true when it ended
// the current block with a terminator (return, break, continue), so the
// caller stops emitting into it.

use cranelift::frontend::Switch;
use cranelift::prelude::{Block, InstBuilder, IntCC, types};
use rustc_hash::FxHashSet;

use snex_frontend::{ForEach, NodeId, NodeKind, SwitchCase, VarDecl};
use snex_runtime::{DYN_DATA_OFFSET, DYN_SIZE_OFFSET};
use snex_sema::{ConstValue, SnexType, Storage};

use crate::context::Cg;
use crate::errors::{CodegenError, CodegenResult};

impl Cg<'_, '_> {
    pub fn block(&mut self, stmts: &[NodeId]) -> CodegenResult<bool> {
        for &stmt in stmts {
            if self.statement(stmt)? {
                // Anything after a terminator is unreachable
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn statement(&mut self, node: NodeId) -> CodegenResult<bool> {
        let span = self.span(node);
        self.statement_node(node).map_err(|e| e.with_span(span))
    }

    fn statement_node(&mut self, node: NodeId) -> CodegenResult<bool> {
        let unit = self.unit;
        match unit.ast.kind(node) {
            NodeKind::Block(stmts) => self.block(stmts),
            NodeKind::VarDecl(decl) => {
                self.var_decl(node, decl)?;
                Ok(false)
            }
            NodeKind::ExprStmt(expr) => {
                self.effect(*expr)?;
                Ok(false)
            }
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.if_stmt(*cond, *then_branch, *else_branch),
            NodeKind::While { cond, body } => self.while_loop(*cond, *body),
            NodeKind::DoWhile { body, cond } => self.do_while(*body, *cond),
            NodeKind::For {
                init,
                cond,
                step,
                body,
            } => self.for_loop(*init, *cond, *step, *body),
            NodeKind::ForEach(each) => self.for_each(node, each),
            NodeKind::Switch { scrutinee, cases } => self.switch(*scrutinee, cases),
            NodeKind::Return(value) => {
                self.return_stmt(*value)?;
                Ok(true)
            }
            NodeKind::Break => {
                let target = self
                    .cf
                    .break_target()
                    .ok_or_else(|| CodegenError::internal("break outside of a loop or switch"))?;
                self.builder.ins().jump(target, &[]);
                Ok(true)
            }
            NodeKind::Continue => {
                let target = self
                    .cf
                    .continue_target()
                    .ok_or_else(|| CodegenError::internal("continue outside of a loop"))?;
                self.builder.ins().jump(target, &[]);
                Ok(true)
            }
            NodeKind::Empty
            | NodeKind::StructDef(_)
            | NodeKind::FunctionDef(_)
            | NodeKind::Namespace { .. }
            | NodeKind::Using { .. }
            | NodeKind::TemplateInstance { .. } => Ok(false),
            kind if kind.is_expression() => {
                self.effect(node)?;
                Ok(false)
            }
            _ => Err(CodegenError::unsupported("statement")),
        }
    }

    fn var_decl(&mut self, node: NodeId, decl: &VarDecl) -> CodegenResult<()> {
        let symbol = self.node_symbol(node)?;
        let unit = self.unit;
        let data = unit.scopes.symbol(symbol);
        if data.storage == Storage::Constant {
            return Ok(());
        }
        let info = data.info;

        if info.is_ref {
            let init = decl
                .init
                .ok_or_else(|| CodegenError::internal("reference without initializer"))?;
            let addr = self.address(init)?;
            let addr = self.take(addr)?;
            self.bind_ref(symbol, addr);
            return Ok(());
        }

        if info.id.is_complex() {
            let size = self.size_of(info.id);
            let slot = self.local_slot(symbol, size);
            let dst = self.builder.ins().stack_addr(self.ptr_ty, slot, 0);
            match decl.init {
                Some(init) if matches!(unit.ast.kind(init), NodeKind::InitList(_)) => {
                    let dst = self.push(dst)?;
                    self.init_aggregate(dst, init, info.id)?;
                    self.pool.release(dst);
                }
                Some(init) => {
                    let dst = self.push(dst)?;
                    let src = self.address(init)?;
                    let src = self.take(src)?;
                    let dst = self.take(dst)?;
                    self.copy_bytes(dst, src, size);
                }
                None => {
                    self.zero_bytes(dst, size);
                    self.write_defaults(dst, info.id, 0)?;
                }
            }
            return Ok(());
        }

        let init = match decl.init {
            Some(init) => match unit.ast.kind(init) {
                NodeKind::InitList(items) => items.first().copied(),
                _ => Some(init),
            },
            None => None,
        };
        let value = match init {
            Some(init) => self.value(init)?,
            None => self.zero(self.cl_type(info.id)?),
        };
        self.bind_scalar(symbol, value)
    }

    fn return_stmt(&mut self, value: Option<NodeId>) -> CodegenResult<()> {
        let Some(value) = value else {
            self.builder.ins().return_(&[]);
            return Ok(());
        };
        let v = if self.ret.is_ref {
            let addr = self.address(value)?;
            self.take(addr)?
        } else {
            self.value(value)?
        };
        self.builder.ins().return_(&[v]);
        Ok(())
    }

    fn if_stmt(&mut self, cond: NodeId, then_branch: NodeId, else_branch: Option<NodeId>) -> CodegenResult<bool> {
        let then_block = self.builder.create_block();
        let else_block = self.builder.create_block();
        let merge = self.builder.create_block();

        let c = self.condition(cond)?;
        let otherwise = if else_branch.is_some() { else_block } else { merge };
        self.builder.ins().brif(c, then_block, &[], otherwise, &[]);

        self.switch_and_seal(then_block);
        let then_done = self.statement(then_branch)?;
        if !then_done {
            self.builder.ins().jump(merge, &[]);
        }

        let else_done = match else_branch {
            Some(else_branch) => {
                self.switch_and_seal(else_block);
                let done = self.statement(else_branch)?;
                if !done {
                    self.builder.ins().jump(merge, &[]);
                }
                done
            }
            None => false,
        };

        if then_done && else_done {
            // Both arms left; `merge` stays out of the layout
            return Ok(true);
        }
        self.switch_and_seal(merge);
        Ok(false)
    }

    fn while_loop(&mut self, cond: NodeId, body: NodeId) -> CodegenResult<bool> {
        let header = self.builder.create_block();
        let body_block = self.builder.create_block();
        let exit = self.builder.create_block();

        self.builder.ins().jump(header, &[]);
        self.builder.switch_to_block(header);
        let c = self.condition(cond)?;
        self.builder.ins().brif(c, body_block, &[], exit, &[]);

        self.switch_and_seal(body_block);
        self.loop_body(body, exit, header)?;

        self.builder.seal_block(header);
        self.switch_and_seal(exit);
        Ok(false)
    }

    fn do_while(&mut self, body: NodeId, cond: NodeId) -> CodegenResult<bool> {
        let body_block = self.builder.create_block();
        let cond_block = self.builder.create_block();
        let exit = self.builder.create_block();

        self.builder.ins().jump(body_block, &[]);
        self.builder.switch_to_block(body_block);
        self.loop_body(body, exit, cond_block)?;

        self.switch_and_seal(cond_block);
        let c = self.condition(cond)?;
        self.builder.ins().brif(c, body_block, &[], exit, &[]);

        self.builder.seal_block(body_block);
        self.switch_and_seal(exit);
        Ok(false)
    }

    fn for_loop(
        &mut self,
        init: Option<NodeId>,
        cond: Option<NodeId>,
        step: Option<NodeId>,
        body: NodeId,
    ) -> CodegenResult<bool> {
        if let Some(init) = init
            && self.statement(init)?
        {
            return Ok(true);
        }
        let header = self.builder.create_block();
        let body_block = self.builder.create_block();
        let step_block = self.builder.create_block();
        let exit = self.builder.create_block();

        self.builder.ins().jump(header, &[]);
        self.builder.switch_to_block(header);
        match cond {
            Some(cond) => {
                let c = self.condition(cond)?;
                self.builder.ins().brif(c, body_block, &[], exit, &[]);
            }
            None => {
                self.builder.ins().jump(body_block, &[]);
            }
        }

        self.switch_and_seal(body_block);
        self.loop_body(body, exit, step_block)?;

        self.switch_and_seal(step_block);
        if let Some(step) = step {
            self.effect(step)?;
        }
        self.builder.ins().jump(header, &[]);

        self.builder.seal_block(header);
        self.switch_and_seal(exit);
        Ok(false)
    }

    /// Body of a loop whose `break` goes to `exit` and `continue` to `next`.
    /// Falls through to `next`.
    fn loop_body(&mut self, body: NodeId, exit: Block, next: Block) -> CodegenResult<()> {
        self.cf.push_loop(exit, next);
        let done = self.statement(body);
        self.cf.pop_loop();
        if !done? {
            self.builder.ins().jump(next, &[]);
        }
        Ok(())
    }

    /// Range loop over a `span` or `dyn` that was not unrolled.
    fn for_each(&mut self, node: NodeId, each: &ForEach) -> CodegenResult<bool> {
        let unit = self.unit;
        let symbol = self.node_symbol(node)?;
        let var = unit.scopes.symbol(symbol).info;
        let iterable_ty = self.node_type(each.iterable)?.id;
        let elem = unit.types.element_type(iterable_ty).ok_or_else(|| {
            CodegenError::type_mismatch("range loop", "span or dyn", unit.type_name(iterable_ty))
        })?;
        let stride = unit.types.stride_of(elem);

        let base = self.address(each.iterable)?;
        let base = self.take(base)?;
        let (data, count) = match unit.types.get(iterable_ty) {
            SnexType::Span { size, .. } => (base, self.builder.ins().iconst(types::I32, i64::from(size))),
            _ => {
                let data = self.load(self.ptr_ty, base, DYN_DATA_OFFSET);
                let count = self.load(types::I32, base, DYN_SIZE_OFFSET);
                (data, count)
            }
        };
        let data_var = self.builder.declare_var(self.ptr_ty);
        self.builder.def_var(data_var, data);
        let count_var = self.builder.declare_var(types::I32);
        self.builder.def_var(count_var, count);
        let index_var = self.builder.declare_var(types::I32);
        let zero = self.builder.ins().iconst(types::I32, 0);
        self.builder.def_var(index_var, zero);

        let header = self.builder.create_block();
        let body_block = self.builder.create_block();
        let step_block = self.builder.create_block();
        let exit = self.builder.create_block();

        self.builder.ins().jump(header, &[]);
        self.builder.switch_to_block(header);
        let i = self.builder.use_var(index_var);
        let n = self.builder.use_var(count_var);
        let more = self.builder.ins().icmp(IntCC::SignedLessThan, i, n);
        self.builder.ins().brif(more, body_block, &[], exit, &[]);

        self.switch_and_seal(body_block);
        let i = self.builder.use_var(index_var);
        let i = if self.ptr_ty == types::I32 {
            i
        } else {
            self.builder.ins().uextend(self.ptr_ty, i)
        };
        let offset = self.builder.ins().imul_imm(i, i64::from(stride));
        let data = self.builder.use_var(data_var);
        let addr = self.builder.ins().iadd(data, offset);
        if var.is_ref {
            self.bind_ref(symbol, addr);
        } else if elem.is_complex() {
            let size = self.size_of(elem);
            let slot = self.local_slot(symbol, size);
            let dst = self.builder.ins().stack_addr(self.ptr_ty, slot, 0);
            self.copy_bytes(dst, addr, size);
        } else {
            let v = self.load(self.cl_type(elem)?, addr, 0);
            self.bind_scalar(symbol, v)?;
        }
        self.loop_body(each.body, exit, step_block)?;

        self.switch_and_seal(step_block);
        let i = self.builder.use_var(index_var);
        let next = self.builder.ins().iadd_imm(i, 1);
        self.builder.def_var(index_var, next);
        self.builder.ins().jump(header, &[]);

        self.builder.seal_block(header);
        self.switch_and_seal(exit);
        Ok(false)
    }

    /// C switch: cases fall through to the next one unless they break.
    fn switch(&mut self, scrutinee: NodeId, cases: &[SwitchCase]) -> CodegenResult<bool> {
        let value = self.value(scrutinee)?;
        // Case values are matched on the zero-extended bit pattern
        let key = self.builder.ins().uextend(types::I64, value);

        let exit = self.builder.create_block();
        let blocks: Vec<_> = cases.iter().map(|_| self.builder.create_block()).collect();
        let mut switch = Switch::new();
        let mut seen = FxHashSet::default();
        let mut default = exit;
        for (case, &block) in cases.iter().zip(&blocks) {
            match case.value {
                Some(v) => {
                    let Some(ConstValue::Int(v)) = self.unit.node_constant(v) else {
                        return Err(CodegenError::internal("case label without an int constant")
                            .with_span(case.span));
                    };
                    if seen.insert(v) {
                        switch.set_entry(u128::from(v as u32), block);
                    }
                }
                None => default = block,
            }
        }
        switch.emit(self.builder, key, default);

        self.cf.push_switch(exit);
        let mut result = Ok(());
        for (i, case) in cases.iter().enumerate() {
            self.switch_and_seal(blocks[i]);
            match self.block(&case.body) {
                Ok(true) => {}
                Ok(false) => {
                    let next = blocks.get(i + 1).copied().unwrap_or(exit);
                    self.builder.ins().jump(next, &[]);
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.cf.pop_switch();
        result?;

        self.switch_and_seal(exit);
        Ok(false)
    }
}
