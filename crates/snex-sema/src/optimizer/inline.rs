// src/optimizer/inline.rs
//
// High-level inliners: calls replaced by ordinary expressions before code
// generation. These run at every optimization level.

use snex_frontend::{BinaryOp, Callee, NodeId, NodeKind};

use super::Outcome;
use crate::compilation::Compilation;
use crate::errors::SemaError;
use crate::functions::{HighLevelInliner, Inliner};
use crate::types::{ConstValue, TypeInfo};

impl Compilation {
    pub(crate) fn inline_call(&mut self, node: NodeId) -> Result<Outcome, SemaError> {
        let NodeKind::Call { callee, args } = self.ast.kind(node).clone() else {
            return Ok(Outcome::Unchanged);
        };
        let Some(function) = self.nodes.get(node).and_then(|i| i.call) else {
            return Ok(Outcome::Unchanged);
        };
        let data = self.functions.get(function);
        let Some(Inliner::HighLevel(inliner)) = data.inliner() else {
            return Ok(Outcome::Unchanged);
        };
        let owner = data.this_type;
        let span = self.ast.span(node);

        let replacement = match inliner {
            HighLevelInliner::SpanSize => {
                let Callee::Method { receiver, .. } = callee else {
                    return Ok(Outcome::Unchanged);
                };
                let size = owner.and_then(|ty| self.types.as_span(ty)).map(|(_, size)| size);
                let Some(size) = size.filter(|_| self.is_pure(receiver)) else {
                    return Ok(Outcome::Unchanged);
                };
                self.make_literal(ConstValue::Int(size as i32), span)
            }
            HighLevelInliner::MathMap => {
                // lo + x * (hi - lo); `lo` is evaluated twice
                let [x, lo, hi] = args.as_slice() else {
                    return Ok(Outcome::Unchanged);
                };
                if !self.is_pure(*lo) {
                    return Ok(Outcome::Unchanged);
                }
                let ty = self.nodes.ty(node).unwrap_or(TypeInfo::new(crate::types::TypeId::DOUBLE));
                let lo_copy = self.copy_resolved(*lo);
                let range = self.make_node(
                    NodeKind::Binary {
                        op: BinaryOp::Sub,
                        lhs: *hi,
                        rhs: lo_copy,
                    },
                    span,
                    ty,
                );
                let scaled = self.make_node(
                    NodeKind::Binary {
                        op: BinaryOp::Mul,
                        lhs: *x,
                        rhs: range,
                    },
                    span,
                    ty,
                );
                self.make_node(
                    NodeKind::Binary {
                        op: BinaryOp::Add,
                        lhs: *lo,
                        rhs: scaled,
                    },
                    span,
                    ty,
                )
            }
        };
        self.stats.inlined += 1;
        Ok(Outcome::Replaced(replacement))
    }
}
