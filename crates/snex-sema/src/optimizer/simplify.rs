// src/optimizer/simplify.rs
//
// Binary simplification. Constants are moved to the right-hand side,
// subtraction of a constant becomes addition of its negation and floating
// point division by a constant becomes multiplication by the reciprocal.
// A literal zero divisor is rejected.

use snex_frontend::{BinaryOp, NodeId, NodeKind};

use super::Outcome;
use crate::compilation::Compilation;
use crate::const_eval::fold_unary;
use crate::errors::SemaError;
use crate::sema_err;
use crate::types::{ConstValue, TypeId};

impl Compilation {
    pub(crate) fn simplify_binary(&mut self, node: NodeId) -> Result<Outcome, SemaError> {
        let NodeKind::Binary { op, lhs, rhs } = self.ast.kind(node).clone() else {
            return Ok(Outcome::Unchanged);
        };
        let Some(ty) = self.nodes.ty(node) else {
            return Ok(Outcome::Unchanged);
        };
        let span = self.ast.span(node);
        let left = self.literal_of(lhs);
        let right = self.literal_of(rhs);

        if op.is_commutative() && left.is_some() && right.is_none() {
            self.ast.set_kind(
                node,
                NodeKind::Binary {
                    op,
                    lhs: rhs,
                    rhs: lhs,
                },
            );
            return Ok(self.simplified(node));
        }
        let Some(c) = right.filter(|_| left.is_none()) else {
            return Ok(Outcome::Unchanged);
        };

        match op {
            // x + 0, x * 1
            BinaryOp::Add | BinaryOp::Sub if ty.id == TypeId::INT && c.is_zero() => Ok(self.simplified(lhs)),
            BinaryOp::Mul | BinaryOp::Div if ty.id == TypeId::INT && c == ConstValue::Int(1) => {
                Ok(self.simplified(lhs))
            }
            BinaryOp::Sub => {
                let Ok(negated) = fold_unary(snex_frontend::UnaryOp::Neg, c) else {
                    return Ok(Outcome::Unchanged);
                };
                let literal = self.make_literal(negated, span);
                self.ast.set_kind(
                    node,
                    NodeKind::Binary {
                        op: BinaryOp::Add,
                        lhs,
                        rhs: literal,
                    },
                );
                Ok(self.simplified(node))
            }
            BinaryOp::Div if ty.id.is_float() && c.is_zero() => {
                Err(sema_err!(DivisionByZero {}, self.ast.span(rhs)))
            }
            BinaryOp::Div if ty.id.is_float() => {
                let reciprocal = match c {
                    ConstValue::Float(v) => ConstValue::Float(1.0 / v),
                    ConstValue::Double(v) => ConstValue::Double(1.0 / v),
                    ConstValue::Int(_) => return Ok(Outcome::Unchanged),
                };
                let literal = self.make_literal(reciprocal, span);
                self.ast.set_kind(
                    node,
                    NodeKind::Binary {
                        op: BinaryOp::Mul,
                        lhs,
                        rhs: literal,
                    },
                );
                Ok(self.simplified(node))
            }
            _ => Ok(Outcome::Unchanged),
        }
    }

    fn simplified(&mut self, node: NodeId) -> Outcome {
        self.stats.simplified += 1;
        Outcome::Replaced(node)
    }
}
