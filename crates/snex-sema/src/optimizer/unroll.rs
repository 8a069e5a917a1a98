// src/optimizer/unroll.rs
//
// Range-loop unrolling. `for (auto& x : s)` over a span of at most
// `unroll_limit` elements becomes one block per element:
//
//     { auto& x = s[0]; body }
//     { auto& x = s[1]; body }
//     ...
//
// The copies declare the loop's own variable symbol, so the body needs no
// re-resolution.

use snex_frontend::{NodeId, NodeKind, VarDecl};

use super::Outcome;
use crate::compilation::Compilation;
use crate::errors::SemaError;
use crate::types::{ConstValue, TypeId, TypeInfo};

/// Unrolled loops stop growing the tree past this many nodes.
const MAX_UNROLLED_NODES: usize = 4096;

impl Compilation {
    pub(crate) fn unroll_loop(&mut self, node: NodeId) -> Result<Outcome, SemaError> {
        let NodeKind::ForEach(each) = self.ast.kind(node).clone() else {
            return Ok(Outcome::Unchanged);
        };
        let Some(iterable_ty) = self.nodes.ty(each.iterable) else {
            return Ok(Outcome::Unchanged);
        };
        let Some((elem, size)) = self.types.as_span(iterable_ty.id) else {
            return Ok(Outcome::Unchanged);
        };
        let size = size as usize;
        let Some(symbol) = self.nodes.get(node).and_then(|i| i.symbol) else {
            return Ok(Outcome::Unchanged);
        };
        if size > self.options.unroll_limit
            || size * self.ast.subtree_size(each.body) > MAX_UNROLLED_NODES
            || self.has_loop_control(each.body)
            || !self.is_pure(each.iterable)
        {
            return Ok(Outcome::Unchanged);
        }

        let span = self.ast.span(node);
        let var_info = self.scopes.symbol(symbol).info;
        let void = TypeInfo::new(TypeId::VOID);
        let mut blocks = Vec::with_capacity(size);
        for i in 0..size {
            self.options.abort.check(span)?;
            let base = self.copy_resolved(each.iterable);
            let index = self.make_literal(ConstValue::Int(i as i32), span);
            let element = self.make_node(
                NodeKind::Subscript { base, index },
                span,
                TypeInfo {
                    is_const: iterable_ty.is_const,
                    ..TypeInfo::new(elem)
                },
            );
            self.nodes.get_mut(element).lvalue = true;
            let decl = self.make_node(
                NodeKind::VarDecl(Box::new(VarDecl {
                    ty: each.var_ty.clone(),
                    name: each.var,
                    init: Some(element),
                })),
                span,
                var_info,
            );
            self.nodes.get_mut(decl).symbol = Some(symbol);
            let body = self.copy_resolved(each.body);
            blocks.push(self.make_node(NodeKind::Block(vec![decl, body]), span, void));
        }
        tracing::trace!(size, "unrolled range loop");
        self.stats.loops_unrolled += 1;
        Ok(Outcome::Replaced(self.make_node(NodeKind::Block(blocks), span, void)))
    }

    fn has_loop_control(&self, node: NodeId) -> bool {
        matches!(
            self.ast.kind(node),
            NodeKind::Break | NodeKind::Continue | NodeKind::Return(_)
        )
            || self.ast.children(node).iter().any(|c| self.has_loop_control(*c))
    }
}
