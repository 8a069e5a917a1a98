// src/inliners.rs
//
// Builtins expanded in place instead of called.

use cranelift::prelude::{InstBuilder, types};

use snex_frontend::{BinaryOp, NodeId};
use snex_runtime::DYN_SIZE_OFFSET;
use snex_sema::{AssemblyInliner, HighLevelInliner};

use crate::context::Cg;
use crate::errors::{CodegenError, CodegenResult};
use crate::registers::Reg;

impl Cg<'_, '_> {
    pub fn inline_assembly(
        &mut self,
        inliner: AssemblyInliner,
        receiver: Option<NodeId>,
        args: &[NodeId],
    ) -> CodegenResult<Reg> {
        if inliner == AssemblyInliner::DynSize {
            let receiver = receiver.ok_or_else(|| CodegenError::internal("size() without a receiver"))?;
            let header = self.address(receiver)?;
            let header = self.take(header)?;
            let size = self.load(types::I32, header, DYN_SIZE_OFFSET);
            return self.push(size);
        }

        let ty = match args.first() {
            Some(&first) => self.node_type(first)?.id,
            None => return Err(CodegenError::internal("inlined builtin without arguments")),
        };
        let mut regs = Vec::with_capacity(args.len());
        for &arg in args {
            regs.push(self.eval(arg)?);
        }
        let mut values = Vec::with_capacity(regs.len());
        for reg in regs {
            values.push(self.take(reg)?);
        }
        let arg = |i: usize| {
            values
                .get(i)
                .copied()
                .ok_or_else(|| CodegenError::internal("inlined builtin is missing an argument"))
        };

        let float = ty.is_float();
        let ins = self.builder.ins();
        let v = match inliner {
            AssemblyInliner::Abs if float => ins.fabs(arg(0)?),
            AssemblyInliner::Abs => ins.iabs(arg(0)?),
            AssemblyInliner::Min if float => ins.fmin(arg(0)?, arg(1)?),
            AssemblyInliner::Min => ins.smin(arg(0)?, arg(1)?),
            AssemblyInliner::Max if float => ins.fmax(arg(0)?, arg(1)?),
            AssemblyInliner::Max => ins.smax(arg(0)?, arg(1)?),
            AssemblyInliner::Sqrt => ins.sqrt(arg(0)?),
            AssemblyInliner::Floor => ins.floor(arg(0)?),
            AssemblyInliner::Ceil => ins.ceil(arg(0)?),
            // range(x, lo, hi) = max(lo, min(x, hi))
            AssemblyInliner::Range if float => {
                let upper = ins.fmin(arg(0)?, arg(2)?);
                self.builder.ins().fmax(arg(1)?, upper)
            }
            AssemblyInliner::Range => {
                let upper = ins.smin(arg(0)?, arg(2)?);
                self.builder.ins().smax(arg(1)?, upper)
            }
            AssemblyInliner::DynSize => return Err(CodegenError::internal("size() inlined with arguments")),
        };
        self.push(v)
    }

    /// Calls to high-level inliners the optimizer left in place.
    pub fn inline_high_level(
        &mut self,
        inliner: HighLevelInliner,
        node: NodeId,
        receiver: Option<NodeId>,
        args: &[NodeId],
    ) -> CodegenResult<Reg> {
        match inliner {
            HighLevelInliner::SpanSize => {
                let unit = self.unit;
                let receiver = receiver.ok_or_else(|| CodegenError::internal("size() without a receiver"))?;
                let ty = self.node_type(receiver)?.id;
                let (_, size) = unit.types.as_span(ty).ok_or_else(|| {
                    CodegenError::type_mismatch("size()", "span", unit.type_name(ty))
                })?;
                let v = self.builder.ins().iconst(types::I32, i64::from(size));
                self.push(v)
            }
            HighLevelInliner::MathMap => {
                // lo + x * (hi - lo)
                let ty = self.node_type(node)?.id;
                let [x, lo, hi] = args else {
                    return Err(CodegenError::internal("Math.map expects three arguments"));
                };
                let x = self.eval(*x)?;
                let lo = self.eval(*lo)?;
                let hi = self.eval(*hi)?;
                let hi = self.take(hi)?;
                let lo = self.take(lo)?;
                let x = self.take(x)?;
                let range = self.binop(BinaryOp::Sub, ty, hi, lo)?;
                let scaled = self.binop(BinaryOp::Mul, ty, x, range)?;
                let v = self.binop(BinaryOp::Add, ty, lo, scaled)?;
                self.push(v)
            }
        }
    }
}
