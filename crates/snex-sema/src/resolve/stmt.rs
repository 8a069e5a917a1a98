// src/resolve/stmt.rs

use rustc_hash::FxHashSet;

use snex_frontend::{NodeId, NodeKind, SwitchCase, TypeName, VarDecl};

use super::BodyContext;
use crate::compilation::{Compilation, Pass};
use crate::errors::SemaError;
use crate::scope::{ScopeId, ScopeKind, Storage, SymbolData};
use crate::sema_err;
use crate::types::{ConstValue, TypeId, TypeInfo};

impl Compilation {
    /// Resolve the statements of `block` directly in `scope`.
    pub(crate) fn resolve_block_in(
        &mut self,
        block: NodeId,
        scope: ScopeId,
        cx: &mut BodyContext,
    ) -> Result<(), SemaError> {
        let NodeKind::Block(stmts) = self.ast.kind(block).clone() else {
            return self.resolve_statement(block, scope, cx);
        };
        for stmt in stmts {
            self.resolve_statement(stmt, scope, cx)?;
        }
        self.nodes.mark(block, Pass::Resolve);
        Ok(())
    }

    /// Loop and branch bodies get a scope of their own even when they are
    /// a single statement.
    fn resolve_body(&mut self, body: NodeId, scope: ScopeId, cx: &mut BodyContext) -> Result<(), SemaError> {
        let inner = self.block_scope(scope);
        self.resolve_block_in(body, inner, cx)
    }

    fn block_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = self.scopes.get(parent).id.clone();
        self.scopes.push(ScopeKind::Block, id, parent)
    }

    pub(crate) fn resolve_statement(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        cx: &mut BodyContext,
    ) -> Result<(), SemaError> {
        let span = self.ast.span(node);
        match self.ast.kind(node).clone() {
            NodeKind::Block(_) => {
                let inner = self.block_scope(scope);
                self.resolve_block_in(node, inner, cx)?;
            }
            NodeKind::VarDecl(decl) => return self.resolve_local_var(node, &decl, scope, cx),
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.resolve_condition(cond, scope, cx)?;
                self.resolve_body(then_branch, scope, cx)?;
                if let Some(else_branch) = else_branch {
                    self.resolve_body(else_branch, scope, cx)?;
                }
            }
            NodeKind::While { cond, body } => {
                self.resolve_condition(cond, scope, cx)?;
                self.resolve_loop_body(body, scope, cx)?;
            }
            NodeKind::DoWhile { body, cond } => {
                self.resolve_loop_body(body, scope, cx)?;
                self.resolve_condition(cond, scope, cx)?;
            }
            NodeKind::For {
                init,
                cond,
                step,
                body,
            } => {
                let for_scope = self.block_scope(scope);
                if let Some(init) = init {
                    if matches!(self.ast.kind(init), NodeKind::Block(_)) {
                        // `for (int i = 0, j = 0; ...)`
                        self.resolve_block_in(init, for_scope, cx)?;
                    } else {
                        self.resolve_statement(init, for_scope, cx)?;
                    }
                }
                if let Some(cond) = cond {
                    self.resolve_condition(cond, for_scope, cx)?;
                }
                if let Some(step) = step {
                    self.resolve_expr(step, for_scope, cx)?;
                }
                self.resolve_loop_body(body, for_scope, cx)?;
            }
            NodeKind::ForEach(each) => {
                let iterable = self.resolve_expr(each.iterable, scope, cx)?;
                let Some(elem) = self.types.element_type(iterable.id) else {
                    return Err(sema_err!(
                        TypeMismatch {
                            expected: "span or dyn".to_string(),
                            found: self.info_name(iterable),
                        },
                        self.ast.span(each.iterable)
                    ));
                };
                let var_ty = if each.var_ty.name == TypeName::Auto {
                    TypeInfo::new(elem)
                } else {
                    let declared = self.resolve_type(&each.var_ty, scope)?;
                    if declared.id != elem {
                        return Err(sema_err!(
                            TypeMismatch {
                                expected: self.type_name(elem),
                                found: self.type_name(declared.id),
                            },
                            each.var_ty.span
                        ));
                    }
                    declared
                };
                let var_ty = TypeInfo {
                    is_ref: each.var_ty.is_ref,
                    is_const: each.var_ty.is_const || (each.var_ty.is_ref && iterable.is_const),
                    ..var_ty
                };
                let each_scope = self.block_scope(scope);
                let id = self.scopes.get(scope).id.child(each.var);
                let symbol = self
                    .scopes
                    .declare(
                        each_scope,
                        each.var,
                        SymbolData {
                            id,
                            info: var_ty,
                            const_value: None,
                            storage: Storage::Local,
                            addressable: false,
                        },
                    )
                    .ok_or_else(|| self.duplicate(each.var, span))?;
                self.nodes.get_mut(node).symbol = Some(symbol);
                self.resolve_loop_body(each.body, each_scope, cx)?;
                self.set_type(node, iterable);
                return Ok(());
            }
            NodeKind::Switch { scrutinee, cases } => self.resolve_switch(scrutinee, &cases, scope, cx)?,
            NodeKind::Return(value) => self.resolve_return(node, value, scope, cx)?,
            NodeKind::Break => {
                if cx.loop_depth + cx.switch_depth == 0 {
                    return Err(sema_err!(
                        ControlOutsideLoop {
                            keyword: "break".to_string(),
                        },
                        span
                    ));
                }
            }
            NodeKind::Continue => {
                if cx.loop_depth == 0 {
                    return Err(sema_err!(
                        ControlOutsideLoop {
                            keyword: "continue".to_string(),
                        },
                        span
                    ));
                }
            }
            NodeKind::ExprStmt(expr) => {
                self.resolve_expr(expr, scope, cx)?;
            }
            NodeKind::Empty => {}
            NodeKind::Using { name, ty } => {
                let target = self.resolve_type(&ty, scope)?;
                if !self.scopes.declare_type(scope, name, target.id) {
                    return Err(self.duplicate(name, span));
                }
            }
            _ => {
                return Err(sema_err!(
                    Unsupported {
                        what: "declaration inside a function".to_string(),
                    },
                    span
                ));
            }
        }
        self.set_type(node, TypeInfo::new(TypeId::VOID));
        Ok(())
    }

    fn resolve_loop_body(&mut self, body: NodeId, scope: ScopeId, cx: &mut BodyContext) -> Result<(), SemaError> {
        cx.loop_depth += 1;
        let result = self.resolve_body(body, scope, cx);
        cx.loop_depth -= 1;
        result
    }

    pub(crate) fn resolve_condition(
        &mut self,
        cond: NodeId,
        scope: ScopeId,
        cx: &mut BodyContext,
    ) -> Result<(), SemaError> {
        let ty = self.resolve_expr(cond, scope, cx)?;
        if !ty.id.is_numeric() {
            return Err(sema_err!(
                TypeMismatch {
                    expected: "a numeric condition".to_string(),
                    found: self.info_name(ty),
                },
                self.ast.span(cond)
            ));
        }
        Ok(())
    }

    fn resolve_switch(
        &mut self,
        scrutinee: NodeId,
        cases: &[SwitchCase],
        scope: ScopeId,
        cx: &mut BodyContext,
    ) -> Result<(), SemaError> {
        let ty = self.resolve_expr(scrutinee, scope, cx)?;
        if ty.id != TypeId::INT {
            return Err(sema_err!(
                TypeMismatch {
                    expected: "int".to_string(),
                    found: self.info_name(ty),
                },
                self.ast.span(scrutinee)
            ));
        }
        let body_scope = self.block_scope(scope);
        cx.switch_depth += 1;
        let result = self.resolve_cases(cases, scope, body_scope, cx);
        cx.switch_depth -= 1;
        result
    }

    /// Case labels are distinct integer constants. All case bodies share
    /// one scope.
    fn resolve_cases(
        &mut self,
        cases: &[SwitchCase],
        scope: ScopeId,
        body_scope: ScopeId,
        cx: &mut BodyContext,
    ) -> Result<(), SemaError> {
        let mut seen = FxHashSet::default();
        for case in cases {
            if let Some(value) = case.value {
                let label = self.evaluate_int(value, scope, "case label")?;
                if !seen.insert(label) {
                    return Err(sema_err!(
                        InvalidDeclaration {
                            reason: format!("duplicate case {label}"),
                        },
                        case.span
                    ));
                }
                self.nodes.get_mut(value).constant = Some(ConstValue::Int(label));
                self.set_type(value, TypeInfo::new(TypeId::INT));
            }
            for &stmt in &case.body {
                self.resolve_statement(stmt, body_scope, cx)?;
            }
        }
        Ok(())
    }

    fn resolve_return(
        &mut self,
        node: NodeId,
        value: Option<NodeId>,
        scope: ScopeId,
        cx: &mut BodyContext,
    ) -> Result<(), SemaError> {
        let span = self.ast.span(node);
        let ret = cx.ret;
        match value {
            None if ret.id.is_void() => Ok(()),
            None => Err(sema_err!(
                TypeMismatch {
                    expected: self.info_name(ret),
                    found: "void".to_string(),
                },
                span
            )),
            Some(value) if ret.id.is_void() => Err(sema_err!(
                TypeMismatch {
                    expected: "void".to_string(),
                    found: "a value".to_string(),
                },
                self.ast.span(value)
            )),
            Some(value) => {
                let ty = self.resolve_expr(value, scope, cx)?;
                if ret.is_ref {
                    self.require_lvalue(value, ret.is_const)?;
                    self.require_same_type(value, ty.id, ret.id)?;
                    self.mark_addressable(value);
                } else {
                    self.coerce(value, ret.id)?;
                }
                Ok(())
            }
        }
    }

    fn resolve_local_var(
        &mut self,
        node: NodeId,
        decl: &VarDecl,
        scope: ScopeId,
        cx: &mut BodyContext,
    ) -> Result<(), SemaError> {
        let span = self.ast.span(node);
        let mut info = if decl.ty.name == TypeName::Auto {
            let Some(init) = decl.init else {
                return Err(sema_err!(
                    InvalidDeclaration {
                        reason: "'auto' needs an initializer to deduce from".to_string(),
                    },
                    span
                ));
            };
            let deduced = self.resolve_expr(init, scope, cx)?;
            TypeInfo {
                is_const: decl.ty.is_const,
                is_ref: decl.ty.is_ref,
                ..TypeInfo::new(deduced.id)
            }
        } else {
            self.resolve_type(&decl.ty, scope)?
        };
        if info.is_static {
            return Err(sema_err!(
                Unsupported {
                    what: "static local variables".to_string(),
                },
                decl.ty.span
            ));
        }
        if info.id.is_void() {
            return Err(sema_err!(
                InvalidDeclaration {
                    reason: "variable of type void".to_string(),
                },
                span
            ));
        }
        self.require_complete(info.id, span)?;

        let mut storage = Storage::Local;
        let mut const_value = None;
        match decl.init {
            None if info.is_ref => {
                return Err(sema_err!(
                    InvalidDeclaration {
                        reason: "reference without initializer".to_string(),
                    },
                    span
                ));
            }
            None => {}
            Some(init) if info.is_ref => {
                let init_ty = self.resolve_init_expr(init, decl, scope, cx)?;
                self.require_lvalue(init, info.is_const)?;
                self.require_same_type(init, init_ty.id, info.id)?;
                self.mark_addressable(init);
            }
            Some(init) if matches!(self.ast.kind(init), NodeKind::InitList(_)) => {
                self.resolve_initializer(init, info.id, scope, cx)?;
            }
            Some(init) => {
                let init_ty = self.resolve_init_expr(init, decl, scope, cx)?;
                if info.id.is_numeric() {
                    let init = self.coerce(init, info.id)?;
                    if info.is_const
                        && let Ok(value) = self.evaluate_constant(init, scope)
                        && let Some(value) = value.cast(info.id)
                    {
                        storage = Storage::Constant;
                        const_value = Some(value);
                    }
                } else {
                    self.require_same_type(init, init_ty.id, info.id)?;
                }
            }
        }
        if storage == Storage::Constant {
            info.is_const = true;
        }

        let id = self.scopes.get(scope).id.child(decl.name);
        let symbol = self
            .scopes
            .declare(
                scope,
                decl.name,
                SymbolData {
                    id,
                    info,
                    const_value,
                    storage,
                    addressable: false,
                },
            )
            .ok_or_else(|| self.duplicate(decl.name, span))?;
        self.nodes.get_mut(node).symbol = Some(symbol);
        self.set_type(node, info);
        Ok(())
    }

    /// `auto` initializers were already resolved while deducing the type.
    fn resolve_init_expr(
        &mut self,
        init: NodeId,
        decl: &VarDecl,
        scope: ScopeId,
        cx: &mut BodyContext,
    ) -> Result<TypeInfo, SemaError> {
        match self.nodes.ty(init) {
            Some(ty) if decl.ty.name == TypeName::Auto => Ok(ty),
            _ => self.resolve_expr(init, scope, cx),
        }
    }
}
