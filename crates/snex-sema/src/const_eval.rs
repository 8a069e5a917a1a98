// src/const_eval.rs
//
// Restricted compile-time evaluator for template integer arguments, array
// sizes, case labels, default arguments and root initializers. It reads
// the raw AST and never rewrites it; the optimizer's folding rules share
// the arithmetic below.

use snex_frontend::{BinaryOp, Literal, NodeId, NodeKind, TypeName, UnaryOp};
use snex_identity::NamespacedIdentifier;

use crate::compilation::Compilation;
use crate::errors::SemaError;
use crate::namespace::Entity;
use crate::scope::{ScopeId, Storage};
use crate::sema_err;
use crate::types::{ConstValue, TypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldError {
    DivisionByZero,
    InvalidOperand,
}

pub fn literal_value(lit: Literal) -> ConstValue {
    match lit {
        Literal::Int(v) => ConstValue::Int(v),
        Literal::Float(v) => ConstValue::Float(v),
        Literal::Double(v) => ConstValue::Double(v),
        Literal::Bool(b) => ConstValue::Int(b as i32),
    }
}

pub fn value_literal(value: ConstValue) -> Literal {
    match value {
        ConstValue::Int(v) => Literal::Int(v),
        ConstValue::Float(v) => Literal::Float(v),
        ConstValue::Double(v) => Literal::Double(v),
    }
}

/// Common type of a binary operation: `int < float < double`.
pub fn wider(a: TypeId, b: TypeId) -> TypeId {
    if a == TypeId::DOUBLE || b == TypeId::DOUBLE {
        TypeId::DOUBLE
    } else if a == TypeId::FLOAT || b == TypeId::FLOAT {
        TypeId::FLOAT
    } else {
        TypeId::INT
    }
}

fn truth(b: bool) -> ConstValue {
    ConstValue::Int(b as i32)
}

/// Evaluate `lhs op rhs`. Operands are promoted to their common type;
/// comparisons and logical operators produce `int`. Integer arithmetic
/// wraps.
pub fn fold_binary(op: BinaryOp, lhs: ConstValue, rhs: ConstValue) -> Result<ConstValue, FoldError> {
    if op.is_logical() {
        let (l, r) = (lhs.is_truthy(), rhs.is_truthy());
        return Ok(truth(match op {
            BinaryOp::And => l && r,
            _ => l || r,
        }));
    }
    let common = wider(lhs.ty(), rhs.ty());
    let (Some(lhs), Some(rhs)) = (lhs.cast(common), rhs.cast(common)) else {
        return Err(FoldError::InvalidOperand);
    };

    if op.is_comparison() {
        let ord = lhs.as_f64().partial_cmp(&rhs.as_f64());
        let (l, r) = (lhs.as_f64(), rhs.as_f64());
        // Integers compare exactly through i64 to avoid rounding.
        let result = match (lhs, rhs) {
            (ConstValue::Int(a), ConstValue::Int(b)) => compare(op, a.cmp(&b)),
            _ => match ord {
                Some(o) => compare(op, o),
                // NaN: only `!=` holds
                None => op == BinaryOp::Ne && l != r,
            },
        };
        return Ok(truth(result));
    }

    match (lhs, rhs) {
        (ConstValue::Int(a), ConstValue::Int(b)) => Ok(ConstValue::Int(match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::Div | BinaryOp::Mod if b == 0 => return Err(FoldError::DivisionByZero),
            BinaryOp::Div => a.wrapping_div(b),
            BinaryOp::Mod => a.wrapping_rem(b),
            BinaryOp::BitAnd => a & b,
            BinaryOp::BitOr => a | b,
            BinaryOp::BitXor => a ^ b,
            BinaryOp::Shl => a.wrapping_shl(b as u32),
            BinaryOp::Shr => a.wrapping_shr(b as u32),
            _ => return Err(FoldError::InvalidOperand),
        })),
        _ if op.is_integer_only() => Err(FoldError::InvalidOperand),
        (l, r) => {
            let (a, b) = (l.as_f64(), r.as_f64());
            if op == BinaryOp::Div && b == 0.0 {
                return Err(FoldError::DivisionByZero);
            }
            let value = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => return Err(FoldError::InvalidOperand),
            };
            // Single precision operations round once, like the native ones.
            Ok(match common {
                TypeId::FLOAT => ConstValue::Float(match op {
                    BinaryOp::Add => l_f32(l) + l_f32(r),
                    BinaryOp::Sub => l_f32(l) - l_f32(r),
                    BinaryOp::Mul => l_f32(l) * l_f32(r),
                    _ => l_f32(l) / l_f32(r),
                }),
                _ => ConstValue::Double(value),
            })
        }
    }
}

fn l_f32(v: ConstValue) -> f32 {
    match v {
        ConstValue::Float(f) => f,
        other => other.as_f64() as f32,
    }
}

fn compare(op: BinaryOp, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        BinaryOp::Eq => ord == Equal,
        BinaryOp::Ne => ord != Equal,
        BinaryOp::Lt => ord == Less,
        BinaryOp::Le => ord != Greater,
        BinaryOp::Gt => ord == Greater,
        BinaryOp::Ge => ord != Less,
        _ => false,
    }
}

pub fn fold_unary(op: UnaryOp, value: ConstValue) -> Result<ConstValue, FoldError> {
    Ok(match (op, value) {
        (UnaryOp::Neg, ConstValue::Int(v)) => ConstValue::Int(v.wrapping_neg()),
        (UnaryOp::Neg, ConstValue::Float(v)) => ConstValue::Float(-v),
        (UnaryOp::Neg, ConstValue::Double(v)) => ConstValue::Double(-v),
        (UnaryOp::Not, v) => truth(!v.is_truthy()),
        (UnaryOp::BitNot, ConstValue::Int(v)) => ConstValue::Int(!v),
        (UnaryOp::BitNot, _) => return Err(FoldError::InvalidOperand),
    })
}

/// Scalar type named by a cast target, if it is one.
pub fn scalar_type_name(name: &TypeName) -> Option<TypeId> {
    match name {
        TypeName::Int | TypeName::Bool => Some(TypeId::INT),
        TypeName::Float => Some(TypeId::FLOAT),
        TypeName::Double => Some(TypeId::DOUBLE),
        _ => None,
    }
}

impl Compilation {
    /// Evaluate `node` as a compile-time constant in `scope`.
    pub fn evaluate_constant(&self, node: NodeId, scope: ScopeId) -> Result<ConstValue, SemaError> {
        let span = self.ast.span(node);
        let not_constant = |what: &str| {
            sema_err!(
                NotConstant {
                    what: what.to_string(),
                },
                span
            )
        };
        let fold_err = |e: FoldError, what: &str| match e {
            FoldError::DivisionByZero => sema_err!(DivisionByZero {}, span),
            FoldError::InvalidOperand => sema_err!(
                InvalidOperand {
                    op: what.to_string(),
                    ty: "constant".to_string(),
                },
                span
            ),
        };

        match self.ast.kind(node) {
            NodeKind::Literal(lit) => Ok(literal_value(*lit)),
            NodeKind::Identifier(path) => self
                .constant_symbol(path, scope)
                .ok_or_else(|| not_constant(&format!("'{}'", self.path_name(path)))),
            NodeKind::Member { base, field } => {
                if let NodeKind::Identifier(ns) = self.ast.kind(*base)
                    && let Some(value) = self.constant_symbol(&ns.child(*field), scope)
                {
                    return Ok(value);
                }
                Err(not_constant("member access"))
            }
            NodeKind::Unary { op, operand } => {
                let value = self.evaluate_constant(*operand, scope)?;
                fold_unary(*op, value).map_err(|e| fold_err(e, op.as_str()))
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let l = self.evaluate_constant(*lhs, scope)?;
                let r = self.evaluate_constant(*rhs, scope)?;
                fold_binary(*op, l, r).map_err(|e| fold_err(e, op.as_str()))
            }
            NodeKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let c = self.evaluate_constant(*cond, scope)?;
                let t = self.evaluate_constant(*then_expr, scope)?;
                let e = self.evaluate_constant(*else_expr, scope)?;
                let common = wider(t.ty(), e.ty());
                let chosen = if c.is_truthy() { t } else { e };
                chosen.cast(common).ok_or_else(|| not_constant("conditional"))
            }
            NodeKind::Cast { ty, expr } => {
                let value = self.evaluate_constant(*expr, scope)?;
                scalar_type_name(&ty.name)
                    .and_then(|target| value.cast(target))
                    .ok_or_else(|| not_constant("cast"))
            }
            _ => Err(not_constant("expression")),
        }
    }

    /// Integer constant, e.g. a template argument or span size.
    pub fn evaluate_int(&self, node: NodeId, scope: ScopeId, what: &str) -> Result<i32, SemaError> {
        match self.evaluate_constant(node, scope)? {
            ConstValue::Int(v) => Ok(v),
            other => Err(sema_err!(
                TypeMismatch {
                    expected: format!("integer constant for {what}"),
                    found: self.type_name(other.ty()),
                },
                self.ast.span(node)
            )),
        }
    }

    /// Value of a constant symbol reachable as `path` from `scope`.
    fn constant_symbol(&self, path: &NamespacedIdentifier, scope: ScopeId) -> Option<ConstValue> {
        let symbol = match path.segments() {
            [single] => self.scopes.lookup(scope, *single),
            _ => None,
        }
        .or_else(|| {
            let ns = &self.scopes.get(self.scopes.enclosing_namespace(scope)).id;
            match self.namespaces.resolve(ns, path) {
                Some((_, Entity::Symbol(s))) => Some(*s),
                _ => None,
            }
        })?;
        let data = self.scopes.symbol(symbol);
        match data.storage {
            Storage::Constant => data.const_value,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_wraps_and_rejects_zero_divisor() {
        assert_eq!(
            fold_binary(BinaryOp::Add, ConstValue::Int(i32::MAX), ConstValue::Int(1)),
            Ok(ConstValue::Int(i32::MIN))
        );
        assert_eq!(
            fold_binary(BinaryOp::Div, ConstValue::Int(7), ConstValue::Int(2)),
            Ok(ConstValue::Int(3))
        );
        assert_eq!(
            fold_binary(BinaryOp::Mod, ConstValue::Int(-7), ConstValue::Int(3)),
            Ok(ConstValue::Int(-1))
        );
        assert_eq!(
            fold_binary(BinaryOp::Div, ConstValue::Int(1), ConstValue::Int(0)),
            Err(FoldError::DivisionByZero)
        );
        assert_eq!(
            fold_binary(BinaryOp::Shl, ConstValue::Int(1), ConstValue::Int(4)),
            Ok(ConstValue::Int(16))
        );
    }

    #[test]
    fn mixed_operands_promote() {
        assert_eq!(
            fold_binary(BinaryOp::Mul, ConstValue::Int(3), ConstValue::Float(0.5)),
            Ok(ConstValue::Float(1.5))
        );
        assert_eq!(
            fold_binary(BinaryOp::Add, ConstValue::Float(0.5), ConstValue::Double(0.25)),
            Ok(ConstValue::Double(0.75))
        );
        assert_eq!(
            fold_binary(BinaryOp::Mod, ConstValue::Float(3.0), ConstValue::Int(2)),
            Err(FoldError::InvalidOperand)
        );
        assert_eq!(
            fold_binary(BinaryOp::Div, ConstValue::Double(1.0), ConstValue::Double(0.0)),
            Err(FoldError::DivisionByZero)
        );
    }

    #[test]
    fn comparisons_and_logic_yield_int() {
        assert_eq!(
            fold_binary(BinaryOp::Lt, ConstValue::Int(2), ConstValue::Double(2.5)),
            Ok(ConstValue::Int(1))
        );
        assert_eq!(
            fold_binary(BinaryOp::And, ConstValue::Float(0.0), ConstValue::Int(1)),
            Ok(ConstValue::Int(0))
        );
        assert_eq!(
            fold_binary(BinaryOp::Ne, ConstValue::Double(f64::NAN), ConstValue::Double(f64::NAN)),
            Ok(ConstValue::Int(1))
        );
        assert_eq!(fold_unary(UnaryOp::Not, ConstValue::Double(0.0)), Ok(ConstValue::Int(1)));
        assert_eq!(fold_unary(UnaryOp::BitNot, ConstValue::Int(0)), Ok(ConstValue::Int(-1)));
        assert_eq!(
            fold_unary(UnaryOp::BitNot, ConstValue::Float(1.0)),
            Err(FoldError::InvalidOperand)
        );
    }
}
