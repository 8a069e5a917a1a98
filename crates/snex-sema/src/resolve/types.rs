// src/resolve/types.rs
//
// Type expressions to `TypeInfo`, template argument lists, and struct
// template instantiation.

use snex_frontend::{NodeKind, TemplateArgExpr, TemplateParam, TypeExpr, TypeName};
use snex_identity::{NamespacedIdentifier, Span};

use super::MAX_INSTANTIATION_DEPTH;
use crate::compilation::Compilation;
use crate::errors::SemaError;
use crate::namespace::{Entity, TemplateDecl};
use crate::scope::{ScopeId, ScopeKind, Storage, SymbolData};
use crate::sema_err;
use crate::template::merge_template_args;
use crate::types::{ConstValue, ResolvedTemplateArg, TypeId, TypeInfo};

impl Compilation {
    /// Resolve a written type in `scope`. `auto` is rejected here; callers
    /// that allow it deduce the type themselves.
    pub(crate) fn resolve_type(&mut self, ty: &TypeExpr, scope: ScopeId) -> Result<TypeInfo, SemaError> {
        let id = match &ty.name {
            TypeName::Void => TypeId::VOID,
            TypeName::Int | TypeName::Bool => TypeId::INT,
            TypeName::Float => TypeId::FLOAT,
            TypeName::Double => TypeId::DOUBLE,
            TypeName::Block => TypeId::BLOCK,
            TypeName::Auto => {
                return Err(sema_err!(
                    InvalidDeclaration {
                        reason: "'auto' needs an initializer to deduce from".to_string(),
                    },
                    ty.span
                ));
            }
            TypeName::Span => self.resolve_span_type(ty, scope)?,
            TypeName::Dyn => {
                let [TemplateArgExpr::Type(elem)] = ty.args.as_slice() else {
                    return Err(sema_err!(
                        TemplateArgument {
                            param: "T".to_string(),
                            reason: "dyn takes exactly one element type".to_string(),
                        },
                        ty.span
                    ));
                };
                let elem = self.resolve_element_type(elem, scope)?;
                self.types.dyn_of(elem)
            }
            TypeName::Named(path) => self.resolve_named_type(path, &ty.args, scope, ty.span)?,
        };
        Ok(TypeInfo {
            id,
            is_const: ty.is_const,
            is_ref: ty.is_ref,
            is_static: ty.is_static,
        })
    }

    fn resolve_span_type(&mut self, ty: &TypeExpr, scope: ScopeId) -> Result<TypeId, SemaError> {
        let [elem, size] = ty.args.as_slice() else {
            return Err(sema_err!(
                TemplateArgument {
                    param: "N".to_string(),
                    reason: format!("span takes an element type and a size, found {} arguments", ty.args.len()),
                },
                ty.span
            ));
        };
        let TemplateArgExpr::Type(elem) = elem else {
            return Err(sema_err!(
                TemplateArgument {
                    param: "T".to_string(),
                    reason: "expected an element type".to_string(),
                },
                ty.span
            ));
        };
        let elem = self.resolve_element_type(elem, scope)?;
        let size = match self.resolve_template_arg(size, scope)? {
            ResolvedTemplateArg::Const(n) if n > 0 => n as u32,
            ResolvedTemplateArg::Const(n) => {
                return Err(sema_err!(
                    TemplateArgument {
                        param: "N".to_string(),
                        reason: format!("span size must be positive, found {n}"),
                    },
                    ty.span
                ));
            }
            ResolvedTemplateArg::Type(_) => {
                return Err(sema_err!(
                    TemplateArgument {
                        param: "N".to_string(),
                        reason: "expected an integer constant, found a type".to_string(),
                    },
                    ty.span
                ));
            }
        };
        Ok(self.types.span(elem, size))
    }

    /// Element types are plain values: no references, no void, no
    /// incomplete structs.
    fn resolve_element_type(&mut self, elem: &TypeExpr, scope: ScopeId) -> Result<TypeId, SemaError> {
        let info = self.resolve_type(elem, scope)?;
        if info.is_ref || info.id.is_void() {
            return Err(sema_err!(
                TemplateArgument {
                    param: "T".to_string(),
                    reason: format!("'{}' cannot be an element type", self.info_name(info)),
                },
                elem.span
            ));
        }
        self.require_complete(info.id, elem.span)?;
        Ok(info.id)
    }

    pub(crate) fn require_complete(&self, ty: TypeId, span: Span) -> Result<(), SemaError> {
        match self.types.as_struct(ty) {
            Some(st) if !st.complete => Err(sema_err!(
                InvalidDeclaration {
                    reason: format!("'{}' is incomplete here", st.label),
                },
                span
            )),
            _ => Ok(()),
        }
    }

    fn resolve_named_type(
        &mut self,
        path: &NamespacedIdentifier,
        args: &[TemplateArgExpr],
        scope: ScopeId,
        span: Span,
    ) -> Result<TypeId, SemaError> {
        if let [single] = path.segments()
            && let Some(ty) = self.scopes.lookup_type(scope, *single)
        {
            return self.reject_template_args(ty, args, span);
        }
        let ns = self.scopes.get(self.scopes.enclosing_namespace(scope)).id.clone();
        match self.namespaces.resolve(&ns, path).map(|(_, e)| e.clone()) {
            Some(Entity::Type(ty)) => self.reject_template_args(ty, args, span),
            Some(Entity::StructTemplate(decl)) => {
                let resolved = args
                    .iter()
                    .map(|a| self.resolve_template_arg(a, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                self.instantiate_struct_template(decl, &resolved, span)
            }
            _ => Err(sema_err!(
                UnknownType {
                    name: self.path_name(path),
                },
                span
            )),
        }
    }

    fn reject_template_args(&self, ty: TypeId, args: &[TemplateArgExpr], span: Span) -> Result<TypeId, SemaError> {
        if args.is_empty() {
            return Ok(ty);
        }
        Err(sema_err!(
            TemplateArgument {
                param: self.type_name(ty),
                reason: "not a template".to_string(),
            },
            span
        ))
    }

    pub(crate) fn resolve_template_arg(
        &mut self,
        arg: &TemplateArgExpr,
        scope: ScopeId,
    ) -> Result<ResolvedTemplateArg, SemaError> {
        match arg {
            TemplateArgExpr::Type(ty) => Ok(ResolvedTemplateArg::Type(self.resolve_element_type(ty, scope)?)),
            TemplateArgExpr::Const(node) => {
                // The parser only knows type names it has seen; a name it
                // took for a constant may still be a type.
                if let NodeKind::Identifier(path) = self.ast.kind(*node).clone()
                    && self.names_type(&path, scope)
                {
                    let span = self.ast.span(*node);
                    let ty = TypeExpr::simple(TypeName::Named(path), span);
                    return Ok(ResolvedTemplateArg::Type(self.resolve_element_type(&ty, scope)?));
                }
                Ok(ResolvedTemplateArg::Const(
                    self.evaluate_int(*node, scope, "template argument")?,
                ))
            }
        }
    }

    fn names_type(&self, path: &NamespacedIdentifier, scope: ScopeId) -> bool {
        if let [single] = path.segments() {
            if self.scopes.lookup_type(scope, *single).is_some() {
                return true;
            }
            if self.scopes.lookup(scope, *single).is_some() {
                return false;
            }
        }
        let ns = &self.scopes.get(self.scopes.enclosing_namespace(scope)).id;
        matches!(
            self.namespaces.resolve(ns, path),
            Some((_, Entity::Type(_) | Entity::StructTemplate(_)))
        )
    }

    /// Bind one template parameter in `scope`: types as type names,
    /// integers as constants.
    pub(crate) fn bind_template_param(&mut self, scope: ScopeId, param: &TemplateParam, arg: ResolvedTemplateArg) {
        match arg {
            ResolvedTemplateArg::Type(ty) => {
                self.scopes.declare_type(scope, param.name(), ty);
            }
            ResolvedTemplateArg::Const(value) => {
                let id = self.scopes.get(scope).id.child(param.name());
                self.scopes.declare(
                    scope,
                    param.name(),
                    SymbolData {
                        id,
                        info: TypeInfo::constant(TypeId::INT),
                        const_value: Some(ConstValue::Int(value)),
                        storage: Storage::Constant,
                        addressable: false,
                    },
                );
            }
        }
    }

    /// Complete `args` with the declaration's defaults and check the result
    /// against `params`. Defaults are evaluated in the declaring scope with
    /// the earlier parameters bound.
    pub(crate) fn complete_template_args(
        &mut self,
        params: &[TemplateParam],
        args: &[ResolvedTemplateArg],
        decl_scope: ScopeId,
        span: Span,
    ) -> Result<Vec<ResolvedTemplateArg>, SemaError> {
        let mut merged = args.to_vec();
        if merged.len() < params.len() {
            let ns = self.scopes.get(decl_scope).id.clone();
            let tmp = self.scopes.push(ScopeKind::Namespace, ns, decl_scope);
            for (param, arg) in params.iter().zip(args) {
                self.bind_template_param(tmp, param, *arg);
            }
            for param in &params[merged.len()..] {
                let arg = match param {
                    TemplateParam::Type {
                        default: Some(ty), ..
                    } => ResolvedTemplateArg::Type(self.resolve_element_type(ty, tmp)?),
                    TemplateParam::Int {
                        default: Some(node),
                        ..
                    } => ResolvedTemplateArg::Const(self.evaluate_int(*node, tmp, "template default")?),
                    _ => break,
                };
                self.bind_template_param(tmp, param, arg);
                merged.push(arg);
            }
        }
        merge_template_args(params, &merged, &self.interner, span, |_, _| Ok(None))
    }

    pub(crate) fn template_args_display(&self, args: &[ResolvedTemplateArg]) -> String {
        args.iter()
            .map(|a| match a {
                ResolvedTemplateArg::Type(ty) => self.type_name(*ty),
                ResolvedTemplateArg::Const(v) => v.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Instance of a struct template for `args`, created on first request.
    /// The instance copies the template's definition into the tree so its
    /// methods resolve and compile like any other struct.
    pub(crate) fn instantiate_struct_template(
        &mut self,
        decl: TemplateDecl,
        args: &[ResolvedTemplateArg],
        span: Span,
    ) -> Result<TypeId, SemaError> {
        let NodeKind::StructDef(def) = self.ast.kind(decl.node).clone() else {
            return Err(sema_err!(
                UnknownType {
                    name: "template".to_string(),
                },
                span
            ));
        };
        let merged = self.complete_template_args(&def.template_params, args, decl.scope, span)?;
        if let Some(ty) = self.types.instance(decl.node, &merged) {
            return Ok(ty);
        }

        self.options.abort.check(span)?;
        if self.instantiation_depth >= MAX_INSTANTIATION_DEPTH {
            return Err(sema_err!(
                InstantiationDepth {
                    depth: MAX_INSTANTIATION_DEPTH,
                },
                span
            ));
        }

        let label = format!(
            "{}<{}>",
            self.interner.resolve(def.name),
            self.template_args_display(&merged)
        );
        tracing::debug!(%label, "instantiating struct template");

        let ns = self.scopes.get(decl.scope).id.clone();
        let id = ns.child(self.interner.intern(&label));
        let copy = self.ast.clone_subtree(decl.node);
        let marker = self.ast.push(
            NodeKind::TemplateInstance {
                template: decl.node,
                label: label.clone(),
                item: copy,
            },
            self.ast.span(decl.node),
        );
        let root = self.ast.root();
        self.ast.append_child(root, marker);

        let ty = self.types.declare_struct(id.clone(), label, merged.clone(), copy);
        self.types.insert_instance(decl.node, &merged, ty);

        let class_scope = self.scopes.push(ScopeKind::Class, id, decl.scope);
        for (param, arg) in def.template_params.iter().zip(&merged) {
            self.bind_template_param(class_scope, param, *arg);
        }
        self.scopes.declare_type(class_scope, def.name, ty);

        self.instantiation_depth += 1;
        let result = self.declare_struct_body(ty, copy, class_scope);
        self.instantiation_depth -= 1;
        result?;
        Ok(ty)
    }
}
