// src/resolve/calls.rs
//
// Call resolution: candidate collection (free functions, methods, native
// modules, function templates with argument deduction), overload ranking
// and argument conversion.

use rustc_hash::FxHashMap;

use snex_frontend::{Callee, NodeId, NodeKind, TemplateArgExpr, TemplateParam, TypeExpr, TypeName};
use snex_identity::{NamespacedIdentifier, Span, Symbol};

use super::BodyContext;
use crate::compilation::Compilation;
use crate::const_eval::value_literal;
use crate::errors::{SemaError, SemaErrorKind};
use crate::functions::{CandidateSignature, FunctionId, FunctionKind, Ranking, rank_candidates};
use crate::namespace::{Entity, TemplateDecl};
use crate::scope::{ScopeId, ScopeKind};
use crate::sema_err;
use crate::types::{ResolvedTemplateArg, SnexType, TypeId, TypeInfo};

#[derive(Debug, Clone)]
enum Candidate {
    Function(FunctionId),
    /// Function template with its complete argument list.
    Template(TemplateDecl, Vec<ResolvedTemplateArg>),
}

impl Compilation {
    pub(crate) fn resolve_call(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        cx: &mut BodyContext,
    ) -> Result<TypeInfo, SemaError> {
        let span = self.ast.span(node);
        let NodeKind::Call { callee, args } = self.ast.kind(node).clone() else {
            return Err(sema_err!(
                Unsupported {
                    what: "call".to_string(),
                },
                span
            ));
        };

        let function = match callee {
            Callee::Method { receiver, name } => {
                // `Math.sin(x)`: method syntax on a namespace
                if let NodeKind::Identifier(path) = self.ast.kind(receiver).clone()
                    && self.lookup_symbol(&path, scope).is_none()
                    && self.is_namespace(&path, scope)
                {
                    let callee = Callee::Path {
                        path: path.child(name),
                        template_args: Vec::new(),
                    };
                    self.ast.set_kind(node, NodeKind::Call { callee, args });
                    return self.resolve_call(node, scope, cx);
                }
                self.resolve_method_call(receiver, name, &args, scope, cx, span)?
            }
            Callee::Path { path, template_args } => {
                let arg_types = self.resolve_args(&args, scope, cx)?;
                let explicit = template_args
                    .iter()
                    .map(|a| self.resolve_template_arg(a, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                let Some(candidates) = self.path_candidates(&path, &explicit, &arg_types, scope, cx, span)? else {
                    return Err(sema_err!(
                        UnknownIdentifier {
                            name: self.path_name(&path),
                        },
                        span
                    ));
                };
                self.select_overload(self.path_name(&path), candidates, &arg_types, span)?
            }
        };
        self.finish_call(node, function, span)
    }

    fn resolve_method_call(
        &mut self,
        receiver: NodeId,
        name: Symbol,
        args: &[NodeId],
        scope: ScopeId,
        cx: &mut BodyContext,
        span: Span,
    ) -> Result<FunctionId, SemaError> {
        let recv = self.resolve_expr(receiver, scope, cx)?;
        let arg_types = self.resolve_args(args, scope, cx)?;
        let candidates: Vec<FunctionId> = match self.types.get(recv.id) {
            SnexType::Span { .. } | SnexType::Dyn { .. } if self.interner.resolve(name) == "size" => {
                let is_span = matches!(self.types.get(recv.id), SnexType::Span { .. });
                vec![self.functions.size_method(recv.id, is_span, &mut self.interner)]
            }
            SnexType::Struct(_) => self.functions.methods(recv.id, name).to_vec(),
            _ => Vec::new(),
        };
        if candidates.is_empty() {
            return Err(sema_err!(
                UnknownMember {
                    ty: self.info_name(recv),
                    name: self.interner.resolve(name).to_string(),
                },
                span
            ));
        }
        if matches!(self.types.get(recv.id), SnexType::Struct(_)) {
            // `this` is passed by address
            self.require_lvalue(receiver, true)?;
        }
        let label = format!("{}.{}", self.type_name(recv.id), self.interner.resolve(name));
        let candidates = candidates.into_iter().map(Candidate::Function).collect();
        self.select_overload(label, candidates, &arg_types, span)
    }

    fn resolve_args(
        &mut self,
        args: &[NodeId],
        scope: ScopeId,
        cx: &mut BodyContext,
    ) -> Result<Vec<TypeId>, SemaError> {
        args.iter()
            .map(|&arg| Ok(self.resolve_expr(arg, scope, cx)?.id))
            .collect()
    }

    /// Everything `path` can call from `scope`. `None` when nothing by that
    /// name exists; an empty list when only non-viable templates do.
    fn path_candidates(
        &mut self,
        path: &NamespacedIdentifier,
        explicit: &[ResolvedTemplateArg],
        arg_types: &[TypeId],
        scope: ScopeId,
        cx: &BodyContext,
        span: Span,
    ) -> Result<Option<Vec<Candidate>>, SemaError> {
        // Sibling methods called without `this.`
        if let (Some(owner), [name]) = (cx.this_type, path.segments())
            && explicit.is_empty()
        {
            let methods = self.functions.methods(owner, *name);
            if !methods.is_empty() {
                return Ok(Some(methods.iter().copied().map(Candidate::Function).collect()));
            }
        }

        let mut prefix = self.scopes.get(self.scopes.enclosing_namespace(scope)).id.clone();
        loop {
            let full = prefix.join(path);
            let mut found = Vec::new();
            if explicit.is_empty() {
                found.extend(self.functions.lookup(&full).iter().copied().map(Candidate::Function));
            }
            let templates = match self.namespaces.get(&full) {
                Some(Entity::FunctionTemplates(decls)) => Some(decls.clone()),
                _ => None,
            };
            if let Some(decls) = &templates {
                for decl in decls {
                    if let Some(args) = self.deduce_template_args(*decl, explicit, arg_types, span)? {
                        found.push(Candidate::Template(*decl, args));
                    }
                }
            }
            if !found.is_empty() || templates.is_some() || !self.functions.lookup(&full).is_empty() {
                return Ok(Some(found));
            }
            if prefix.is_root() {
                return Ok(None);
            }
            prefix = prefix.parent();
        }
    }

    /// Complete template arguments for calling `decl` with `arg_types`:
    /// explicit arguments first, then deduction from the parameter list,
    /// then declared defaults. `None` when the template does not fit.
    fn deduce_template_args(
        &mut self,
        decl: TemplateDecl,
        explicit: &[ResolvedTemplateArg],
        arg_types: &[TypeId],
        span: Span,
    ) -> Result<Option<Vec<ResolvedTemplateArg>>, SemaError> {
        let NodeKind::FunctionDef(def) = self.ast.kind(decl.node).clone() else {
            return Ok(None);
        };
        if explicit.len() > def.template_params.len() {
            return Ok(None);
        }
        let mut env: FxHashMap<Symbol, ResolvedTemplateArg> = def
            .template_params
            .iter()
            .zip(explicit)
            .map(|(p, a)| (p.name(), *a))
            .collect();
        for (param, &arg) in def.params.iter().zip(arg_types) {
            if !self.deduce_from(&param.ty, arg, &def.template_params, &mut env) {
                return Ok(None);
            }
        }

        let ordered: Vec<ResolvedTemplateArg> = def
            .template_params
            .iter()
            .map_while(|p| env.get(&p.name()).copied())
            .collect();
        let complete = match self.complete_template_args(&def.template_params, &ordered, decl.scope, span) {
            Ok(complete) => complete,
            Err(e) if e.kind() == SemaErrorKind::Timeout => return Err(e),
            Err(_) => return Ok(None),
        };
        // A parameter deduced past a gap must agree with the default used.
        let consistent = def
            .template_params
            .iter()
            .zip(&complete)
            .all(|(p, a)| env.get(&p.name()).is_none_or(|d| d == a));
        Ok(consistent.then_some(complete))
    }

    fn deduce_from(
        &self,
        ty: &TypeExpr,
        arg: TypeId,
        params: &[TemplateParam],
        env: &mut FxHashMap<Symbol, ResolvedTemplateArg>,
    ) -> bool {
        match &ty.name {
            TypeName::Named(path) if ty.args.is_empty() => match path.segments() {
                [name] if params.iter().any(|p| matches!(p, TemplateParam::Type { name: n, .. } if n == name)) => {
                    bind_deduced(env, *name, ResolvedTemplateArg::Type(arg))
                }
                _ => true,
            },
            TypeName::Span => {
                let (Some((elem, size)), [TemplateArgExpr::Type(elem_ty), size_arg]) =
                    (self.types.as_span(arg), ty.args.as_slice())
                else {
                    return true;
                };
                if let TemplateArgExpr::Const(node) = size_arg
                    && let NodeKind::Identifier(path) = self.ast.kind(*node)
                    && let [name] = path.segments()
                    && params.iter().any(|p| matches!(p, TemplateParam::Int { name: n, .. } if n == name))
                    && !bind_deduced(env, *name, ResolvedTemplateArg::Const(size as i32))
                {
                    return false;
                }
                self.deduce_from(elem_ty, elem, params, env)
            }
            TypeName::Dyn => match (self.types.as_dyn(arg), ty.args.as_slice()) {
                (Some(elem), [TemplateArgExpr::Type(elem_ty)]) => self.deduce_from(elem_ty, elem, params, env),
                _ => true,
            },
            _ => true,
        }
    }

    /// Parameter list of a candidate, for ranking. Template candidates
    /// whose parameter types fail to resolve drop out.
    fn candidate_signature(
        &mut self,
        candidate: &Candidate,
    ) -> Result<Option<CandidateSignature>, SemaError> {
        match candidate {
            Candidate::Function(function) => {
                let data = self.functions.get(*function);
                Ok(Some(CandidateSignature {
                    params: data.args.iter().map(|a| a.info.id).collect(),
                    required: data.required_args(),
                    templated: data.templated,
                    decl_index: data.decl_index,
                }))
            }
            Candidate::Template(decl, args) => {
                let NodeKind::FunctionDef(def) = self.ast.kind(decl.node).clone() else {
                    return Ok(None);
                };
                let ns = self.scopes.get(decl.scope).id.clone();
                let tmp = self.scopes.push(ScopeKind::Namespace, ns, decl.scope);
                for (param, arg) in def.template_params.iter().zip(args) {
                    self.bind_template_param(tmp, param, *arg);
                }
                let mut params = smallvec::SmallVec::new();
                for param in &def.params {
                    match self.resolve_type(&param.ty, tmp) {
                        Ok(info) => params.push(info.id),
                        Err(e) if e.kind() == SemaErrorKind::Timeout => return Err(e),
                        Err(_) => return Ok(None),
                    }
                }
                Ok(Some(CandidateSignature {
                    params,
                    required: def.params.iter().take_while(|p| p.default.is_none()).count(),
                    templated: true,
                    decl_index: decl.decl_index,
                }))
            }
        }
    }

    fn candidate_display(&self, candidate: &Candidate) -> String {
        match candidate {
            Candidate::Function(function) => self
                .functions
                .get(*function)
                .signature_display(&self.types, &self.interner),
            Candidate::Template(decl, args) => {
                let name = match self.ast.kind(decl.node) {
                    NodeKind::FunctionDef(def) => self.interner.resolve(def.name).to_string(),
                    _ => "template".to_string(),
                };
                format!("{name}<{}>", self.template_args_display(args))
            }
        }
    }

    fn select_overload(
        &mut self,
        name: String,
        candidates: Vec<Candidate>,
        arg_types: &[TypeId],
        span: Span,
    ) -> Result<FunctionId, SemaError> {
        let mut ranked = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if let Some(sig) = self.candidate_signature(&candidate)? {
                ranked.push((candidate, sig));
            }
        }
        match rank_candidates(&ranked, arg_types) {
            Ranking::Best(Candidate::Function(function)) => Ok(function),
            Ranking::Best(Candidate::Template(decl, args)) => self.instantiate_function_template(decl, &args, span),
            Ranking::Ambiguous(first, second) => Err(sema_err!(
                AmbiguousCall {
                    name,
                    first: self.candidate_display(&first),
                    second: self.candidate_display(&second),
                },
                span
            )),
            Ranking::NoMatch => Err(sema_err!(
                NoMatchingOverload {
                    name,
                    args: arg_types
                        .iter()
                        .map(|t| self.type_name(*t))
                        .collect::<Vec<_>>()
                        .join(", "),
                },
                span
            )),
        }
    }

    /// Convert arguments to the chosen signature, append defaulted
    /// arguments and record the target on the call node.
    fn finish_call(&mut self, node: NodeId, function: FunctionId, span: Span) -> Result<TypeInfo, SemaError> {
        let data = self.functions.get(function).clone();
        let NodeKind::Call { args, .. } = self.ast.kind(node).clone() else {
            return Ok(data.ret);
        };
        let native = matches!(data.kind, FunctionKind::Native { .. });
        for (&arg, param) in args.iter().zip(&data.args) {
            let arg_ty = self.nodes.ty(arg).map_or(TypeId::VOID, |t| t.id);
            let lvalue = self.nodes.get(arg).is_some_and(|i| i.lvalue);
            if param.info.is_ref && (lvalue || !param.info.is_const) {
                self.require_lvalue(arg, param.info.is_const || native)?;
                self.require_same_type(arg, arg_ty, param.info.id)?;
                self.mark_addressable(arg);
            } else if param.info.id.is_numeric() {
                // const references to temporaries are materialised by codegen
                self.coerce(arg, param.info.id)?;
            } else {
                self.require_same_type(arg, arg_ty, param.info.id)?;
            }
        }

        if args.len() < data.args.len()
            && let NodeKind::Call { callee, mut args } = self.ast.kind(node).clone()
        {
            for param in &data.args[args.len()..] {
                let Some(value) = param.default else { break };
                let lit = self.ast.push(NodeKind::Literal(value_literal(value)), span);
                self.nodes.get_mut(lit).constant = Some(value);
                self.set_type(lit, TypeInfo::new(value.ty()));
                args.push(lit);
            }
            self.ast.set_kind(node, NodeKind::Call { callee, args });
        }

        let info = self.nodes.get_mut(node);
        info.call = Some(function);
        info.lvalue = data.ret.is_ref;
        self.set_type(node, data.ret);
        Ok(data.ret)
    }
}

/// Record a deduced argument; false if it contradicts an earlier one.
fn bind_deduced(env: &mut FxHashMap<Symbol, ResolvedTemplateArg>, name: Symbol, value: ResolvedTemplateArg) -> bool {
    match env.get(&name) {
        Some(existing) => *existing == value,
        None => {
            env.insert(name, value);
            true
        }
    }
}
