// src/resolve/decls.rs
//
// Namespace-level and struct-level declarations. Everything here runs
// before any function body is resolved, so bodies may refer to functions
// and root variables declared further down.

use snex_frontend::{FunctionDef, NodeId, NodeKind, StructDef, TypeName, VarDecl};
use snex_identity::{NamespacedIdentifier, Span};

use super::MAX_FUNCTION_INSTANCES;
use crate::class_data::AllocError;
use crate::compilation::{Compilation, FunctionInstanceKey, Pass};
use crate::errors::SemaError;
use crate::functions::{FunctionArg, FunctionData, FunctionId, FunctionKind};
use crate::namespace::TemplateDecl;
use crate::scope::{ScopeId, ScopeKind, Storage, SymbolData};
use crate::sema_err;
use crate::types::{ConstValue, ResolvedTemplateArg, SnexType, TypeId, TypeInfo};

/// How a function definition enters the function table.
#[derive(Debug, Clone)]
pub(crate) enum Origin {
    Free,
    Method(TypeId),
    /// Function template instance with its display label.
    Instance(String),
}

impl Compilation {
    pub(crate) fn declare_items(&mut self, items: &[NodeId], scope: ScopeId) -> Result<(), SemaError> {
        for &item in items {
            self.options.abort.check(self.ast.span(item))?;
            self.declare_item(item, scope)?;
        }
        Ok(())
    }

    fn declare_item(&mut self, item: NodeId, scope: ScopeId) -> Result<(), SemaError> {
        let span = self.ast.span(item);
        let ns = self.scopes.get(scope).id.clone();
        match self.ast.kind(item).clone() {
            NodeKind::StructDef(def) if !def.template_params.is_empty() => {
                let decl = self.template_decl(item, scope);
                if !self.namespaces.add_struct_template(ns.child(def.name), decl) {
                    return Err(self.duplicate(def.name, span));
                }
            }
            NodeKind::StructDef(def) => self.declare_struct(item, &def, scope)?,
            NodeKind::FunctionDef(def) if !def.template_params.is_empty() => {
                let decl = self.template_decl(item, scope);
                if !self.namespaces.add_function_template(ns.child(def.name), decl) {
                    return Err(self.duplicate(def.name, span));
                }
            }
            NodeKind::FunctionDef(_) => {
                self.declare_function(item, scope, Origin::Free)?;
            }
            NodeKind::VarDecl(decl) => self.declare_root_var(item, &decl, scope)?,
            NodeKind::Using { name, ty } => {
                let target = self.resolve_type(&ty, scope)?;
                if !self.scopes.declare_type(scope, name, target.id)
                    || !self.namespaces.add_type(ns.child(name), target.id)
                {
                    return Err(self.duplicate(name, span));
                }
                self.set_type(item, target);
            }
            NodeKind::Namespace { name, items } => {
                let id = ns.child(name);
                let fresh = self.scopes.push(ScopeKind::Namespace, id.clone(), scope);
                let Some(ns_scope) = self.namespaces.add_namespace(id, fresh) else {
                    return Err(self.duplicate(name, span));
                };
                self.declare_items(&items, ns_scope)?;
                self.nodes.mark(item, Pass::Resolve);
            }
            NodeKind::Empty | NodeKind::TemplateInstance { .. } => {}
            _ => {
                return Err(sema_err!(
                    Unsupported {
                        what: "statement at namespace level".to_string(),
                    },
                    span
                ));
            }
        }
        Ok(())
    }

    fn template_decl(&mut self, node: NodeId, scope: ScopeId) -> TemplateDecl {
        TemplateDecl {
            node,
            scope,
            decl_index: self.functions.next_decl_index(),
        }
    }

    pub(crate) fn duplicate(&self, name: snex_identity::Symbol, span: Span) -> SemaError {
        sema_err!(
            DuplicateSymbol {
                name: self.interner.resolve(name).to_string(),
            },
            span
        )
    }

    // -----------------------------------------------------------------------
    // Structs

    fn declare_struct(&mut self, node: NodeId, def: &StructDef, scope: ScopeId) -> Result<(), SemaError> {
        let span = self.ast.span(node);
        let id = self.scopes.get(scope).id.child(def.name);
        let label = self.interner.resolve(def.name).to_string();
        let ty = self.types.declare_struct(id.clone(), label, Vec::new(), node);
        if !self.namespaces.add_type(id.clone(), ty) || !self.scopes.declare_type(scope, def.name, ty) {
            return Err(self.duplicate(def.name, span));
        }
        let class_scope = self.scopes.push(ScopeKind::Class, id, scope);
        self.declare_struct_body(ty, node, class_scope)
    }

    /// Lay out members, then declare methods against the completed type.
    pub(crate) fn declare_struct_body(
        &mut self,
        ty: TypeId,
        node: NodeId,
        class_scope: ScopeId,
    ) -> Result<(), SemaError> {
        let NodeKind::StructDef(def) = self.ast.kind(node).clone() else {
            return Ok(());
        };
        self.class_scopes.insert(ty, class_scope);
        let class_id = self.scopes.get(class_scope).id.clone();

        let mut methods = Vec::new();
        for &member in &def.members {
            let span = self.ast.span(member);
            match self.ast.kind(member).clone() {
                NodeKind::VarDecl(decl) => {
                    self.declare_member(ty, member, &decl, class_scope, &class_id)?
                }
                NodeKind::FunctionDef(fdef) if fdef.template_params.is_empty() => {
                    methods.push(member)
                }
                NodeKind::Using { name, ty: target } => {
                    let target = self.resolve_type(&target, class_scope)?;
                    if !self.scopes.declare_type(class_scope, name, target.id) {
                        return Err(self.duplicate(name, span));
                    }
                    self.set_type(member, target);
                }
                _ => {
                    return Err(sema_err!(
                        Unsupported {
                            what: "template declarations inside a struct".to_string(),
                        },
                        span
                    ));
                }
            }
        }
        self.types.complete_struct(ty);

        for method in methods {
            let function = self.declare_function(method, class_scope, Origin::Method(ty))?;
            let is_destructor = self.functions.get(function).is_destructor;
            if let Some(st) = self.types.as_struct_mut(ty) {
                st.methods.push(function);
                if is_destructor {
                    st.destructor = Some(function);
                }
            }
        }
        self.nodes.mark(node, Pass::Resolve);
        tracing::trace!(
            name = %self.type_name(ty),
            size = self.types.size_of(ty),
            "declared struct"
        );
        Ok(())
    }

    fn declare_member(
        &mut self,
        owner: TypeId,
        node: NodeId,
        decl: &VarDecl,
        class_scope: ScopeId,
        class_id: &NamespacedIdentifier,
    ) -> Result<(), SemaError> {
        let span = self.ast.span(node);
        let info = self.resolve_type(&decl.ty, class_scope)?;
        if info.is_ref || info.id.is_void() {
            return Err(sema_err!(
                InvalidDeclaration {
                    reason: format!("member of type '{}'", self.info_name(info)),
                },
                span
            ));
        }
        self.require_complete(info.id, span)?;

        if info.is_static {
            return self.declare_static(node, decl, info, class_scope, class_id.child(decl.name));
        }

        let default = match decl.init {
            Some(init) if info.id.is_numeric() => Some(self.constant_of_type(init, info.id, class_scope)?),
            Some(init) => {
                return Err(sema_err!(
                    Unsupported {
                        what: "default initializer for an aggregate member".to_string(),
                    },
                    self.ast.span(init)
                ));
            }
            None => None,
        };
        let Some(offset) = self.types.add_member(owner, decl.name, info, default) else {
            return Err(self.duplicate(decl.name, span));
        };
        let symbol = self
            .scopes
            .declare(
                class_scope,
                decl.name,
                SymbolData {
                    id: class_id.child(decl.name),
                    info,
                    const_value: None,
                    storage: Storage::Member(offset),
                    addressable: false,
                },
            )
            .ok_or_else(|| self.duplicate(decl.name, span))?;
        let node_info = self.nodes.get_mut(node);
        node_info.symbol = Some(symbol);
        node_info.offset = Some(offset);
        self.set_type(node, info);
        Ok(())
    }

    /// Static members live in the root data segment (or fold away when
    /// they are constant scalars).
    fn declare_static(
        &mut self,
        node: NodeId,
        decl: &VarDecl,
        info: TypeInfo,
        class_scope: ScopeId,
        id: NamespacedIdentifier,
    ) -> Result<(), SemaError> {
        let symbol = self.allocate_root_symbol(node, decl, info, class_scope, id.clone())?;
        if !self.namespaces.add_symbol(id, symbol) {
            return Err(self.duplicate(decl.name, self.ast.span(node)));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Root variables

    fn declare_root_var(&mut self, node: NodeId, decl: &VarDecl, scope: ScopeId) -> Result<(), SemaError> {
        let span = self.ast.span(node);
        let info = if decl.ty.name == TypeName::Auto {
            let Some(init) = decl.init else {
                return Err(sema_err!(
                    InvalidDeclaration {
                        reason: "'auto' needs an initializer to deduce from".to_string(),
                    },
                    span
                ));
            };
            let value = self.evaluate_constant(init, scope)?;
            TypeInfo {
                is_const: decl.ty.is_const,
                ..TypeInfo::new(value.ty())
            }
        } else {
            self.resolve_type(&decl.ty, scope)?
        };
        if info.is_ref || info.id.is_void() {
            return Err(sema_err!(
                InvalidDeclaration {
                    reason: format!("root variable of type '{}'", self.info_name(info)),
                },
                span
            ));
        }
        self.require_complete(info.id, span)?;

        let id = self.scopes.get(scope).id.child(decl.name);
        let symbol = self.allocate_root_symbol(node, decl, info, scope, id.clone())?;
        if !self.namespaces.add_symbol(id, symbol) {
            return Err(self.duplicate(decl.name, span));
        }
        Ok(())
    }

    /// Constant scalars become compile-time symbols; everything else gets
    /// a slot in the root data segment with its initial value recorded.
    fn allocate_root_symbol(
        &mut self,
        node: NodeId,
        decl: &VarDecl,
        info: TypeInfo,
        scope: ScopeId,
        id: NamespacedIdentifier,
    ) -> Result<crate::scope::SymbolId, SemaError> {
        let span = self.ast.span(node);
        let (storage, const_value) = if info.is_const && info.id.is_numeric() {
            let Some(init) = decl.init else {
                return Err(sema_err!(
                    InvalidDeclaration {
                        reason: "const variable without initializer".to_string(),
                    },
                    span
                ));
            };
            (Storage::Constant, Some(self.constant_of_type(init, info.id, scope)?))
        } else {
            let size = self.types.size_of(info.id);
            let align = self.types.align_of(info.id);
            let offset = match self.root.allocate(id.clone(), info.id, size, align) {
                Ok(offset) => offset,
                Err(AllocError::Duplicate | AllocError::Finalised) => {
                    return Err(self.duplicate(decl.name, span));
                }
            };
            self.write_default_values(info.id, offset);
            if let Some(init) = decl.init {
                self.write_initial_value(init, info.id, offset, scope)?;
            }
            if let Some(destructor) = self.types.as_struct(info.id).and_then(|st| st.destructor) {
                self.root.add_destructor(offset, destructor);
            }
            (Storage::Root(offset), None)
        };

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
        Ok(symbol)
    }

    fn constant_of_type(&self, init: NodeId, ty: TypeId, scope: ScopeId) -> Result<ConstValue, SemaError> {
        let value = self.evaluate_constant(init, scope)?;
        value.cast(ty).ok_or_else(|| {
            sema_err!(
                TypeMismatch {
                    expected: self.type_name(ty),
                    found: self.type_name(value.ty()),
                },
                self.ast.span(init)
            )
        })
    }

    /// Member defaults of `ty` placed at `offset`, recursively.
    fn write_default_values(&mut self, ty: TypeId, offset: u32) {
        match self.types.get(ty) {
            SnexType::Struct(_) => {
                let members: Vec<_> = self
                    .types
                    .as_struct(ty)
                    .map(|st| {
                        st.members
                            .iter()
                            .map(|m| (m.ty.id, m.offset, m.default))
                            .collect()
                    })
                    .unwrap_or_default();
                for (member_ty, member_offset, default) in members {
                    match default {
                        Some(value) => self.root.set_initial_value(offset + member_offset, value),
                        None => self.write_default_values(member_ty, offset + member_offset),
                    }
                }
            }
            SnexType::Span { elem, size } if self.types.as_struct(elem).is_some() => {
                let stride = self.types.stride_of(elem);
                for i in 0..size {
                    self.write_default_values(elem, offset + i * stride);
                }
            }
            _ => {}
        }
    }

    /// Constant initializer of a root object. Lists fill elements or
    /// members in order; anything not listed keeps its default.
    fn write_initial_value(
        &mut self,
        init: NodeId,
        ty: TypeId,
        offset: u32,
        scope: ScopeId,
    ) -> Result<(), SemaError> {
        let span = self.ast.span(init);
        if let NodeKind::InitList(items) = self.ast.kind(init).clone() {
            let slots = self.aggregate_slots(ty, items.len(), span)?;
            for (item, (slot_ty, slot_offset)) in items.into_iter().zip(slots) {
                self.write_initial_value(item, slot_ty, offset + slot_offset, scope)?;
            }
            return Ok(());
        }
        if !ty.is_numeric() {
            return Err(sema_err!(
                NotConstant {
                    what: format!("initializer of '{}'", self.type_name(ty)),
                },
                span
            ));
        }
        let value = self.constant_of_type(init, ty, scope)?;
        self.root.set_initial_value(offset, value);
        Ok(())
    }

    /// Element (or member) types and offsets an initializer list of
    /// `count` items fills in `ty`. A scalar takes a single-item list.
    pub fn aggregate_slots(
        &self,
        ty: TypeId,
        count: usize,
        span: Span,
    ) -> Result<Vec<(TypeId, u32)>, SemaError> {
        let slots: Vec<(TypeId, u32)> = match self.types.get(ty) {
            SnexType::Span { elem, size } => {
                let stride = self.types.stride_of(elem);
                (0..size).map(|i| (elem, i * stride)).collect()
            }
            SnexType::Struct(_) => self
                .types
                .as_struct(ty)
                .map(|st| st.members.iter().map(|m| (m.ty.id, m.offset)).collect())
                .unwrap_or_default(),
            SnexType::Int | SnexType::Float | SnexType::Double => vec![(ty, 0)],
            SnexType::Void | SnexType::Dyn { .. } => {
                return Err(sema_err!(
                    TypeMismatch {
                        expected: "span, struct or scalar".to_string(),
                        found: self.type_name(ty),
                    },
                    span
                ));
            }
        };
        if count > slots.len() {
            return Err(sema_err!(
                TypeMismatch {
                    expected: format!("at most {} initializers for '{}'", slots.len(), self.type_name(ty)),
                    found: count.to_string(),
                },
                span
            ));
        }
        Ok(slots.into_iter().take(count).collect())
    }

    // -----------------------------------------------------------------------
    // Functions

    /// Declare a function signature and queue its body. The function scope
    /// holds the parameters and is a child of `scope`.
    pub(crate) fn declare_function(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        origin: Origin,
    ) -> Result<FunctionId, SemaError> {
        let NodeKind::FunctionDef(def) = self.ast.kind(node).clone() else {
            return Err(sema_err!(
                Unsupported {
                    what: "function declaration".to_string(),
                },
                self.ast.span(node)
            ));
        };
        let span = self.ast.span(node);
        let id = self.scopes.get(scope).id.child(def.name);
        let fscope = self.scopes.push(ScopeKind::Function, id.clone(), scope);

        if def.ret.name == TypeName::Auto {
            return Err(sema_err!(
                Unsupported {
                    what: "deduced return types".to_string(),
                },
                def.ret.span
            ));
        }
        let ret = self.resolve_type(&def.ret, fscope)?;
        if ret.id.is_complex() && !ret.is_ref {
            return Err(sema_err!(
                InvalidDeclaration {
                    reason: format!("'{}' can only be returned by reference", self.type_name(ret.id)),
                },
                def.ret.span
            ));
        }

        let args = self.declare_params(&def, fscope, &id)?;
        let this_type = match origin {
            Origin::Method(owner) => Some(owner),
            _ => None,
        };
        let label = match &origin {
            Origin::Instance(label) => label.clone(),
            _ => self.path_name(&id),
        };

        if !matches!(origin, Origin::Instance(_)) {
            self.check_redefinition(&id, this_type, &args, span)?;
        }

        let decl_index = self.functions.next_decl_index();
        let data = FunctionData {
            id,
            label,
            ret,
            args,
            kind: FunctionKind::User { def: node, scope: fscope },
            this_type,
            templated: matches!(origin, Origin::Instance(_)),
            decl_index,
            is_destructor: def.is_destructor,
        };
        let function = if matches!(origin, Origin::Instance(_)) || def.is_destructor {
            self.functions.add_hidden(data)
        } else {
            self.functions.add(data)
        };
        self.set_type(node, ret);
        self.pending.push_back(function);
        Ok(function)
    }

    fn declare_params(
        &mut self,
        def: &FunctionDef,
        fscope: ScopeId,
        id: &NamespacedIdentifier,
    ) -> Result<Vec<FunctionArg>, SemaError> {
        let mut args: Vec<FunctionArg> = Vec::with_capacity(def.params.len());
        for (i, param) in def.params.iter().enumerate() {
            let info = self.resolve_type(&param.ty, fscope)?;
            if info.id.is_void() {
                return Err(sema_err!(
                    InvalidDeclaration {
                        reason: "parameter of type void".to_string(),
                    },
                    param.span
                ));
            }
            self.require_complete(info.id, param.span)?;
            let default = match param.default {
                Some(node) if info.id.is_numeric() && !info.is_ref => {
                    Some(self.constant_of_type(node, info.id, fscope)?)
                }
                Some(node) => {
                    return Err(sema_err!(
                        Unsupported {
                            what: "default argument for this parameter type".to_string(),
                        },
                        self.ast.span(node)
                    ));
                }
                None if args.last().is_some_and(|a| a.default.is_some()) => {
                    return Err(sema_err!(
                        InvalidDeclaration {
                            reason: "parameters after a defaulted one need defaults too".to_string(),
                        },
                        param.span
                    ));
                }
                None => None,
            };
            let symbol = self
                .scopes
                .declare(
                    fscope,
                    param.name,
                    SymbolData {
                        id: id.child(param.name),
                        info,
                        const_value: None,
                        storage: Storage::Param(i as u32),
                        addressable: false,
                    },
                )
                .ok_or_else(|| self.duplicate(param.name, param.span))?;
            args.push(FunctionArg {
                name: param.name,
                info,
                default,
                symbol: Some(symbol),
            });
        }
        Ok(args)
    }

    /// Overloads must differ in their parameter types.
    fn check_redefinition(
        &self,
        id: &NamespacedIdentifier,
        this_type: Option<TypeId>,
        args: &[FunctionArg],
        span: Span,
    ) -> Result<(), SemaError> {
        let existing = match (this_type, id.name()) {
            (Some(owner), Some(name)) => self.functions.methods(owner, name),
            _ => self.functions.lookup(id),
        };
        let same = existing.iter().any(|&f| {
            let other = self.functions.get(f);
            other.user_def().is_some()
                && other.args.len() == args.len()
                && other.args.iter().zip(args).all(|(a, b)| a.info.id == b.info.id)
        });
        if same {
            return Err(sema_err!(
                DuplicateSymbol {
                    name: self.path_name(id),
                },
                span
            ));
        }
        Ok(())
    }

    /// Instance of a function template for fully merged `args`, created on
    /// first request. Its body is resolved later from the queue.
    pub(crate) fn instantiate_function_template(
        &mut self,
        decl: TemplateDecl,
        args: &[ResolvedTemplateArg],
        span: Span,
    ) -> Result<FunctionId, SemaError> {
        let key: FunctionInstanceKey = (decl.node, args.iter().copied().collect());
        if let Some(&function) = self.function_instances.get(&key) {
            return Ok(function);
        }
        self.options.abort.check(span)?;
        if self.function_instances.len() >= MAX_FUNCTION_INSTANCES {
            return Err(sema_err!(
                InstantiationDepth {
                    depth: MAX_FUNCTION_INSTANCES,
                },
                span
            ));
        }
        let NodeKind::FunctionDef(def) = self.ast.kind(decl.node).clone() else {
            return Err(sema_err!(
                Unsupported {
                    what: "function template".to_string(),
                },
                span
            ));
        };

        let label = format!(
            "{}<{}>",
            self.path_name(&self.scopes.get(decl.scope).id.child(def.name)),
            self.template_args_display(args)
        );
        tracing::debug!(%label, "instantiating function template");

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

        let ns = self.scopes.get(decl.scope).id.clone();
        let instance_scope = self.scopes.push(ScopeKind::Namespace, ns, decl.scope);
        for (param, arg) in def.template_params.iter().zip(args) {
            self.bind_template_param(instance_scope, param, *arg);
        }
        let function = self.declare_function(copy, instance_scope, Origin::Instance(label))?;
        self.function_instances.insert(key, function);
        Ok(function)
    }
}
