// src/resolve/mod.rs
//
// Resolution pass. Runs in two phases:
//
// 1. Declarations, in source order: structs (with their layout and method
//    signatures), function signatures, root variables and their initial
//    values, aliases, namespaces and templates.
// 2. Bodies: every queued function body is resolved, which may instantiate
//    further templates and queue their bodies in turn.
//
// When the queue is empty every reachable node carries a `NodeInfo` with a
// concrete type, and the root data segment is finalised.

mod calls;
mod decls;
mod expr;
mod stmt;
mod types;

#[cfg(test)]
mod tests;

use snex_frontend::NodeId;

use crate::compilation::{Compilation, Pass};
use crate::errors::SemaError;
use crate::functions::FunctionId;
use crate::scope::ScopeId;
use crate::types::{TypeId, TypeInfo};

/// Nesting limit for struct templates instantiating other struct templates.
pub const MAX_INSTANTIATION_DEPTH: usize = 64;
/// Upper bound on distinct function template instances per unit.
pub const MAX_FUNCTION_INSTANCES: usize = 1024;

/// State threaded through one function body.
#[derive(Debug, Clone)]
pub(crate) struct BodyContext {
    pub ret: TypeInfo,
    pub this_type: Option<TypeId>,
    pub loop_depth: u32,
    pub switch_depth: u32,
}

impl Compilation {
    pub(crate) fn resolve(&mut self) -> Result<(), SemaError> {
        let root = self.ast.root();
        let snex_frontend::NodeKind::Program(items) = self.ast.kind(root).clone() else {
            return Ok(());
        };
        self.declare_items(&items, ScopeId::GLOBAL)?;
        tracing::debug!(
            queued = self.pending.len(),
            root_bytes = self.root.size(),
            "declarations resolved"
        );

        while let Some(function) = self.pending.pop_front() {
            self.resolve_function_body(function)?;
        }

        self.root.finalise();
        self.nodes.mark(root, Pass::Resolve);
        Ok(())
    }

    fn resolve_function_body(&mut self, function: FunctionId) -> Result<(), SemaError> {
        let data = self.functions.get(function);
        let Some((def, scope)) = data.user_def() else {
            return Ok(());
        };
        let mut cx = BodyContext {
            ret: data.ret,
            this_type: data.this_type,
            loop_depth: 0,
            switch_depth: 0,
        };
        tracing::trace!(function = %data.label, "resolving body");

        let span = self.ast.span(def);
        self.options.abort.check(span)?;

        let snex_frontend::NodeKind::FunctionDef(fdef) = self.ast.kind(def) else {
            return Ok(());
        };
        let body = fdef.body;
        // Parameters and top-level locals share the function scope.
        self.resolve_block_in(body, scope, &mut cx)?;
        self.nodes.mark(def, Pass::Resolve);
        Ok(())
    }

    /// Record the resolved type of `node` and mark it resolved.
    pub(crate) fn set_type(&mut self, node: NodeId, ty: TypeInfo) {
        let info = self.nodes.get_mut(node);
        info.ty = Some(ty);
        self.nodes.mark(node, Pass::Resolve);
    }
}
