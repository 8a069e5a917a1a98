// src/namespace.rs
//! Namespace-level symbol table keyed by fully qualified identifiers.
//!
//! Unqualified names inside function bodies go through the scope chain;
//! qualified names (`Dsp::gain`) and namespace-level declarations are
//! looked up here, searching from the innermost enclosing namespace
//! outward.

use rustc_hash::FxHashMap;

use snex_frontend::NodeId;
use snex_identity::NamespacedIdentifier;

use crate::scope::{ScopeId, SymbolId};
use crate::types::TypeId;

/// A template declaration together with the namespace scope it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateDecl {
    pub node: NodeId,
    pub scope: ScopeId,
    pub decl_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Type(TypeId),
    StructTemplate(TemplateDecl),
    FunctionTemplates(Vec<TemplateDecl>),
    Symbol(SymbolId),
    /// A source namespace, or a native module such as `Math`.
    Namespace(ScopeId),
}

impl Entity {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Entity::Type(_) => "type",
            Entity::StructTemplate(_) => "struct template",
            Entity::FunctionTemplates(_) => "function template",
            Entity::Symbol(_) => "variable",
            Entity::Namespace(_) => "namespace",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NamespaceHandler {
    entries: FxHashMap<NamespacedIdentifier, Entity>,
}

impl NamespaceHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable or constant. Fails if the name is taken.
    pub fn add_symbol(&mut self, id: NamespacedIdentifier, symbol: SymbolId) -> bool {
        self.insert_new(id, Entity::Symbol(symbol))
    }

    /// Register a type name (struct or alias). Fails if the name is taken.
    pub fn add_type(&mut self, id: NamespacedIdentifier, ty: TypeId) -> bool {
        self.insert_new(id, Entity::Type(ty))
    }

    pub fn add_struct_template(&mut self, id: NamespacedIdentifier, decl: TemplateDecl) -> bool {
        self.insert_new(id, Entity::StructTemplate(decl))
    }

    /// Function templates overload, so several may share a name.
    pub fn add_function_template(&mut self, id: NamespacedIdentifier, decl: TemplateDecl) -> bool {
        match self.entries.get_mut(&id) {
            Some(Entity::FunctionTemplates(list)) => {
                list.push(decl);
                true
            }
            Some(_) => false,
            None => {
                self.entries.insert(id, Entity::FunctionTemplates(vec![decl]));
                true
            }
        }
    }

    /// Namespaces may be reopened; returns the existing scope if so.
    pub fn add_namespace(&mut self, id: NamespacedIdentifier, scope: ScopeId) -> Option<ScopeId> {
        match self.entries.get(&id) {
            Some(Entity::Namespace(existing)) => Some(*existing),
            Some(_) => None,
            None => {
                self.entries.insert(id, Entity::Namespace(scope));
                Some(scope)
            }
        }
    }

    fn insert_new(&mut self, id: NamespacedIdentifier, entity: Entity) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, entity);
        true
    }

    pub fn get(&self, id: &NamespacedIdentifier) -> Option<&Entity> {
        self.entries.get(id)
    }

    /// Resolve `path` as written inside namespace `current`: try
    /// `current::path`, then each enclosing namespace, then the root.
    pub fn resolve(
        &self,
        current: &NamespacedIdentifier,
        path: &NamespacedIdentifier,
    ) -> Option<(NamespacedIdentifier, &Entity)> {
        let mut prefix = current.clone();
        loop {
            let full = prefix.join(path);
            if let Some(entity) = self.entries.get(&full) {
                return Some((full, entity));
            }
            if prefix.is_root() {
                return None;
            }
            prefix = prefix.parent();
        }
    }

    /// The complex type registered under `id`, if any.
    pub fn get_complex_type(&self, id: &NamespacedIdentifier) -> Option<TypeId> {
        match self.entries.get(id) {
            Some(Entity::Type(ty)) if ty.is_complex() => Some(*ty),
            _ => None,
        }
    }

    /// Every registered type name.
    pub fn types(&self) -> impl Iterator<Item = (&NamespacedIdentifier, TypeId)> + '_ {
        self.entries.iter().filter_map(|(k, v)| match v {
            Entity::Type(ty) => Some((k, *ty)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snex_identity::Interner;

    #[test]
    fn resolves_from_innermost_namespace_outward() {
        let mut interner = Interner::new();
        let outer = interner.intern("Outer");
        let inner = interner.intern("Inner");
        let k = interner.intern("k");

        let mut ns = NamespaceHandler::new();
        let root_k = NamespacedIdentifier::single(k);
        let outer_k = NamespacedIdentifier::from_segments([outer, k]);
        ns.add_type(root_k.clone(), TypeId::INT);
        ns.add_type(outer_k.clone(), TypeId::FLOAT);

        let here = NamespacedIdentifier::from_segments([outer, inner]);
        let (found, entity) = ns.resolve(&here, &root_k).unwrap();
        assert_eq!(found, outer_k);
        assert_eq!(entity, &Entity::Type(TypeId::FLOAT));

        let (found, _) = ns.resolve(&NamespacedIdentifier::root(), &root_k).unwrap();
        assert_eq!(found, root_k);
    }

    #[test]
    fn names_are_unique_except_templates_and_namespaces() {
        let mut interner = Interner::new();
        let f = NamespacedIdentifier::single(interner.intern("f"));
        let n = NamespacedIdentifier::single(interner.intern("N"));
        let decl = TemplateDecl {
            node: NodeId::new(1),
            scope: ScopeId::GLOBAL,
            decl_index: 0,
        };
        let mut ns = NamespaceHandler::new();
        assert!(ns.add_function_template(f.clone(), decl));
        assert!(ns.add_function_template(f.clone(), decl));
        assert!(!ns.add_type(f.clone(), TypeId::INT));
        assert!(matches!(ns.get(&f), Some(Entity::FunctionTemplates(v)) if v.len() == 2));

        assert_eq!(ns.add_namespace(n.clone(), ScopeId::GLOBAL), Some(ScopeId::GLOBAL));
        assert_eq!(ns.add_namespace(n, ScopeId::GLOBAL), Some(ScopeId::GLOBAL));
    }
}
