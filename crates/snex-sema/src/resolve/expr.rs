// src/resolve/expr.rs
//
// Expression typing. Every resolved expression gets a `TypeInfo`; implicit
// numeric conversions are made explicit by wrapping the operand in a
// `Cast` node, so later passes never have to reason about promotion.

use snex_frontend::{AstPrinter, BinaryOp, NodeId, NodeKind, TypeExpr, TypeName, UnaryOp};
use snex_identity::{NamespacedIdentifier, Symbol};

use super::BodyContext;
use crate::compilation::Compilation;
use crate::const_eval::{literal_value, wider};
use crate::errors::SemaError;
use crate::namespace::Entity;
use crate::scope::{ScopeId, Storage, SymbolId};
use crate::sema_err;
use crate::types::{ConstValue, SnexType, TypeId, TypeInfo};

impl Compilation {
    pub(crate) fn resolve_expr(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        cx: &mut BodyContext,
    ) -> Result<TypeInfo, SemaError> {
        let span = self.ast.span(node);
        let ty = match self.ast.kind(node).clone() {
            NodeKind::Literal(lit) => {
                let value = literal_value(lit);
                self.nodes.get_mut(node).constant = Some(value);
                TypeInfo::new(value.ty())
            }
            NodeKind::Identifier(path) => return self.resolve_identifier(node, &path, scope),
            NodeKind::Member { base, field } => return self.resolve_member(node, base, field, scope, cx),
            NodeKind::Subscript { base, index } => return self.resolve_subscript(node, base, index, scope, cx),
            NodeKind::Call { .. } => return self.resolve_call(node, scope, cx),
            NodeKind::Unary { op, operand } => {
                let operand_ty = self.resolve_expr(operand, scope, cx)?;
                self.require_numeric(operand_ty, op.as_str(), span)?;
                match op {
                    UnaryOp::Neg => TypeInfo::new(operand_ty.id),
                    UnaryOp::Not => TypeInfo::new(TypeId::INT),
                    UnaryOp::BitNot => {
                        self.require_int(operand_ty, op.as_str(), span)?;
                        TypeInfo::new(TypeId::INT)
                    }
                }
            }
            NodeKind::IncDec {
                increment, target, ..
            } => {
                let target_ty = self.resolve_expr(target, scope, cx)?;
                self.require_lvalue(target, false)?;
                self.require_numeric(target_ty, if increment { "++" } else { "--" }, span)?;
                TypeInfo::new(target_ty.id)
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let l = self.resolve_expr(lhs, scope, cx)?;
                let r = self.resolve_expr(rhs, scope, cx)?;
                self.resolve_binary(op, (lhs, l), (rhs, r), span)?
            }
            NodeKind::Assign { op, target, value } => {
                let target_ty = self.resolve_expr(target, scope, cx)?;
                self.require_lvalue(target, false)?;
                match op {
                    None if matches!(self.ast.kind(value), NodeKind::InitList(_)) => {
                        self.resolve_initializer(value, target_ty.id, scope, cx)?;
                    }
                    None => {
                        let value_ty = self.resolve_expr(value, scope, cx)?;
                        if target_ty.id.is_numeric() {
                            self.coerce(value, target_ty.id)?;
                        } else {
                            self.require_same_type(value, value_ty.id, target_ty.id)?;
                        }
                    }
                    Some(op) => {
                        let value_ty = self.resolve_expr(value, scope, cx)?;
                        self.require_numeric(target_ty, op.as_str(), span)?;
                        self.require_numeric(value_ty, op.as_str(), span)?;
                        if op.is_integer_only() {
                            self.require_int(target_ty, op.as_str(), span)?;
                            self.require_int(value_ty, op.as_str(), span)?;
                        }
                        // Computed in the common type, stored back converted.
                        self.coerce(value, wider(target_ty.id, value_ty.id))?;
                    }
                }
                TypeInfo::new(target_ty.id)
            }
            NodeKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.resolve_condition(cond, scope, cx)?;
                let a = self.resolve_expr(then_expr, scope, cx)?;
                let b = self.resolve_expr(else_expr, scope, cx)?;
                if a.id.is_numeric() && b.id.is_numeric() {
                    let common = wider(a.id, b.id);
                    self.coerce(then_expr, common)?;
                    self.coerce(else_expr, common)?;
                    TypeInfo::new(common)
                } else {
                    return Err(sema_err!(
                        Unsupported {
                            what: format!(
                                "conditional between '{}' and '{}'",
                                self.info_name(a),
                                self.info_name(b)
                            ),
                        },
                        span
                    ));
                }
            }
            NodeKind::Cast { ty, expr } => {
                let target = self.resolve_type(&ty, scope)?;
                let source = self.resolve_expr(expr, scope, cx)?;
                if !target.id.is_numeric() || target.is_ref || !source.id.is_numeric() {
                    return Err(sema_err!(
                        InvalidOperand {
                            op: format!("cast to {}", self.info_name(target)),
                            ty: self.info_name(source),
                        },
                        span
                    ));
                }
                TypeInfo::new(target.id)
            }
            NodeKind::InitList(_) => {
                return Err(sema_err!(
                    Unsupported {
                        what: "initializer list outside of an initialization".to_string(),
                    },
                    span
                ));
            }
            _ => {
                return Err(sema_err!(
                    Unsupported {
                        what: "statement used as an expression".to_string(),
                    },
                    span
                ));
            }
        };
        self.set_type(node, ty);
        Ok(ty)
    }

    fn resolve_binary(
        &mut self,
        op: BinaryOp,
        (lhs, l): (NodeId, TypeInfo),
        (rhs, r): (NodeId, TypeInfo),
        span: snex_identity::Span,
    ) -> Result<TypeInfo, SemaError> {
        self.require_numeric(l, op.as_str(), span)?;
        self.require_numeric(r, op.as_str(), span)?;
        if op.is_logical() {
            return Ok(TypeInfo::new(TypeId::INT));
        }
        if op.is_integer_only() {
            self.require_int(l, op.as_str(), span)?;
            self.require_int(r, op.as_str(), span)?;
            return Ok(TypeInfo::new(TypeId::INT));
        }
        let common = wider(l.id, r.id);
        self.coerce(lhs, common)?;
        self.coerce(rhs, common)?;
        Ok(TypeInfo::new(if op.is_comparison() { TypeId::INT } else { common }))
    }

    /// Variable reachable as `path` from `scope`: unqualified names through
    /// the scope chain first, then the namespace tables.
    pub(crate) fn lookup_symbol(&self, path: &NamespacedIdentifier, scope: ScopeId) -> Option<SymbolId> {
        if let [single] = path.segments()
            && let Some(symbol) = self.scopes.lookup(scope, *single)
        {
            return Some(symbol);
        }
        let ns = &self.scopes.get(self.scopes.enclosing_namespace(scope)).id;
        match self.namespaces.resolve(ns, path) {
            Some((_, Entity::Symbol(symbol))) => Some(*symbol),
            _ => None,
        }
    }

    pub(crate) fn is_namespace(&self, path: &NamespacedIdentifier, scope: ScopeId) -> bool {
        let ns = &self.scopes.get(self.scopes.enclosing_namespace(scope)).id;
        matches!(self.namespaces.resolve(ns, path), Some((_, Entity::Namespace(_))))
    }

    fn resolve_identifier(
        &mut self,
        node: NodeId,
        path: &NamespacedIdentifier,
        scope: ScopeId,
    ) -> Result<TypeInfo, SemaError> {
        let Some(symbol) = self.lookup_symbol(path, scope) else {
            return Err(sema_err!(
                UnknownIdentifier {
                    name: self.path_name(path),
                },
                self.ast.span(node)
            ));
        };
        let data = self.scopes.symbol(symbol);
        let (ty, constant) = match data.storage {
            Storage::Constant => (TypeInfo::constant(data.info.id), data.const_value),
            _ => (data.info, None),
        };
        let info = self.nodes.get_mut(node);
        info.symbol = Some(symbol);
        info.constant = constant;
        info.lvalue = constant.is_none();
        self.set_type(node, ty);
        Ok(ty)
    }

    fn resolve_member(
        &mut self,
        node: NodeId,
        base: NodeId,
        field: Symbol,
        scope: ScopeId,
        cx: &mut BodyContext,
    ) -> Result<TypeInfo, SemaError> {
        // `Math.PI`, `Dsp.gain`: member syntax on a namespace
        if let NodeKind::Identifier(path) = self.ast.kind(base).clone()
            && self.lookup_symbol(&path, scope).is_none()
        {
            let qualified = path.child(field);
            if self.lookup_symbol(&qualified, scope).is_some() {
                self.ast.set_kind(node, NodeKind::Identifier(qualified.clone()));
                return self.resolve_identifier(node, &qualified, scope);
            }
        }

        let base_ty = self.resolve_expr(base, scope, cx)?;
        let span = self.ast.span(node);
        let unknown = || {
            sema_err!(
                UnknownMember {
                    ty: self.info_name(base_ty),
                    name: self.interner.resolve(field).to_string(),
                },
                span
            )
        };
        let Some(st) = self.types.as_struct(base_ty.id) else {
            return Err(unknown());
        };
        if let Some(member) = st.member(field) {
            let ty = TypeInfo {
                is_const: member.ty.is_const || base_ty.is_const,
                ..member.ty.decay()
            };
            let offset = member.offset;
            let lvalue = self.nodes.get(base).is_some_and(|i| i.lvalue);
            let info = self.nodes.get_mut(node);
            info.offset = Some(offset);
            info.lvalue = lvalue;
            self.set_type(node, ty);
            return Ok(ty);
        }

        // Static members are ordinary symbols of the class scope.
        let symbol = self
            .class_scopes
            .get(&base_ty.id)
            .and_then(|&class| self.scopes.get(class).symbol(field))
            .ok_or_else(unknown)?;
        let qualified = self.scopes.symbol(symbol).id.clone();
        self.ast.set_kind(node, NodeKind::Identifier(qualified.clone()));
        self.resolve_identifier(node, &qualified, scope)
    }

    fn resolve_subscript(
        &mut self,
        node: NodeId,
        base: NodeId,
        index: NodeId,
        scope: ScopeId,
        cx: &mut BodyContext,
    ) -> Result<TypeInfo, SemaError> {
        let span = self.ast.span(node);
        let base_ty = self.resolve_expr(base, scope, cx)?;
        let Some(elem) = self.types.element_type(base_ty.id) else {
            return Err(sema_err!(
                InvalidOperand {
                    op: "[]".to_string(),
                    ty: self.info_name(base_ty),
                },
                span
            ));
        };
        let index_ty = self.resolve_expr(index, scope, cx)?;
        if index_ty.id != TypeId::INT {
            return Err(sema_err!(
                TypeMismatch {
                    expected: "int index".to_string(),
                    found: self.info_name(index_ty),
                },
                self.ast.span(index)
            ));
        }
        let is_dyn = matches!(self.types.get(base_ty.id), SnexType::Dyn { .. });
        if let Some((_, size)) = self.types.as_span(base_ty.id)
            && let Ok(ConstValue::Int(i)) = self.evaluate_constant(index, scope)
            && (i < 0 || i as u32 >= size)
        {
            return Err(sema_err!(
                IndexOutOfBounds {
                    index: i as i64,
                    size,
                },
                self.ast.span(index)
            ));
        }
        let lvalue = is_dyn || self.nodes.get(base).is_some_and(|i| i.lvalue);
        let ty = TypeInfo {
            is_const: base_ty.is_const && !is_dyn,
            ..TypeInfo::new(elem)
        };
        self.nodes.get_mut(node).lvalue = lvalue;
        self.set_type(node, ty);
        Ok(ty)
    }

    /// Resolve an initializer list against `target`, element by element.
    pub(crate) fn resolve_initializer(
        &mut self,
        list: NodeId,
        target: TypeId,
        scope: ScopeId,
        cx: &mut BodyContext,
    ) -> Result<(), SemaError> {
        let NodeKind::InitList(items) = self.ast.kind(list).clone() else {
            let ty = self.resolve_expr(list, scope, cx)?;
            if target.is_numeric() {
                self.coerce(list, target)?;
            } else {
                self.require_same_type(list, ty.id, target)?;
            }
            return Ok(());
        };
        let slots = self.aggregate_slots(target, items.len(), self.ast.span(list))?;
        for (item, (slot_ty, _)) in items.into_iter().zip(slots) {
            self.resolve_initializer(item, slot_ty, scope, cx)?;
        }
        self.set_type(list, TypeInfo::new(target));
        Ok(())
    }

    /// Make an implicit numeric conversion explicit. Returns the node now
    /// standing in `node`'s place.
    pub(crate) fn coerce(&mut self, node: NodeId, target: TypeId) -> Result<NodeId, SemaError> {
        let from = self.nodes.ty(node).map_or(TypeId::VOID, |t| t.id);
        if from == target {
            return Ok(node);
        }
        let span = self.ast.span(node);
        if !from.is_numeric() || !target.is_numeric() {
            return Err(sema_err!(
                TypeMismatch {
                    expected: self.type_name(target),
                    found: self.type_name(from),
                },
                span
            ));
        }
        let name = match target {
            TypeId::INT => TypeName::Int,
            TypeId::FLOAT => TypeName::Float,
            _ => TypeName::Double,
        };
        let cast = self.ast.wrap(node, |inner| NodeKind::Cast {
            ty: TypeExpr::simple(name, span),
            expr: inner,
        });
        self.set_type(cast, TypeInfo::new(target));
        Ok(cast)
    }

    /// `node` must designate storage; writable unless `allow_const`.
    pub(crate) fn require_lvalue(&self, node: NodeId, allow_const: bool) -> Result<(), SemaError> {
        let span = self.ast.span(node);
        let info = self.nodes.get(node);
        if !allow_const && info.and_then(|i| i.ty).is_some_and(|t| t.is_const) {
            return Err(sema_err!(
                ConstAssignment {
                    name: AstPrinter::new(&self.ast, &self.interner).inline_expr(node),
                },
                span
            ));
        }
        if !info.is_some_and(|i| i.lvalue) {
            return Err(sema_err!(NotAddressable {}, span));
        }
        Ok(())
    }

    pub(crate) fn require_same_type(&self, node: NodeId, found: TypeId, expected: TypeId) -> Result<(), SemaError> {
        if found == expected {
            return Ok(());
        }
        Err(sema_err!(
            TypeMismatch {
                expected: self.type_name(expected),
                found: self.type_name(found),
            },
            self.ast.span(node)
        ))
    }

    fn require_numeric(&self, ty: TypeInfo, op: &str, span: snex_identity::Span) -> Result<(), SemaError> {
        if ty.id.is_numeric() {
            return Ok(());
        }
        Err(sema_err!(
            InvalidOperand {
                op: op.to_string(),
                ty: self.info_name(ty),
            },
            span
        ))
    }

    fn require_int(&self, ty: TypeInfo, op: &str, span: snex_identity::Span) -> Result<(), SemaError> {
        if ty.id == TypeId::INT {
            return Ok(());
        }
        Err(sema_err!(
            InvalidOperand {
                op: op.to_string(),
                ty: self.info_name(ty),
            },
            span
        ))
    }

    /// A reference to a scalar local or parameter is taken, so it needs a
    /// stack slot.
    pub(crate) fn mark_addressable(&mut self, node: NodeId) {
        if !matches!(self.ast.kind(node), NodeKind::Identifier(_)) {
            return;
        }
        let Some(symbol) = self.nodes.get(node).and_then(|i| i.symbol) else {
            return;
        };
        let data = self.scopes.symbol_mut(symbol);
        if matches!(data.storage, Storage::Local | Storage::Param(_)) && data.info.id.is_scalar() && !data.info.is_ref {
            data.addressable = true;
        }
    }
}
