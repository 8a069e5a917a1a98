// src/optimizer/fold.rs
//
// Constant folding and propagation. Operands are already optimized, so a
// foldable expression sees literal children.

use snex_frontend::{NodeId, NodeKind};

use super::Outcome;
use crate::compilation::Compilation;
use crate::const_eval::{FoldError, fold_binary, fold_unary};
use crate::errors::SemaError;
use crate::sema_err;
use crate::types::ConstValue;

impl Compilation {
    pub(crate) fn fold_constant(&mut self, node: NodeId) -> Result<Outcome, SemaError> {
        let span = self.ast.span(node);
        let Some(ty) = self.nodes.ty(node) else {
            return Ok(Outcome::Unchanged);
        };
        let value = match self.ast.kind(node).clone() {
            // Named constants and constant members
            NodeKind::Identifier(_) | NodeKind::Member { .. } => self.node_constant(node),
            NodeKind::Binary { op, lhs, rhs } => {
                let (Some(a), Some(b)) = (self.literal_of(lhs), self.literal_of(rhs)) else {
                    return Ok(Outcome::Unchanged);
                };
                match fold_binary(op, a, b) {
                    Ok(value) => Some(value),
                    Err(FoldError::DivisionByZero) => return Err(sema_err!(DivisionByZero {}, span)),
                    Err(FoldError::InvalidOperand) => None,
                }
            }
            NodeKind::Unary { op, operand } => self
                .literal_of(operand)
                .and_then(|v| fold_unary(op, v).ok()),
            NodeKind::Cast { expr, .. } => self.literal_of(expr),
            _ => None,
        };
        let Some(value) = value.and_then(|v| v.cast(ty.id)) else {
            return Ok(Outcome::Unchanged);
        };
        tracing::trace!(?value, "folded constant");
        self.stats.folded += 1;
        Ok(Outcome::Replaced(self.make_literal(value, span)))
    }

    /// Value of `node` if it is a literal.
    pub(crate) fn literal_of(&self, node: NodeId) -> Option<ConstValue> {
        match self.ast.kind(node) {
            NodeKind::Literal(_) => self.node_constant(node),
            _ => None,
        }
    }
}
