// src/scope.rs
//
// Lexical scope chain. Scopes form a tree owned by the `ScopeArena`;
// parent links are indices, so lookups walk upward without ownership
// cycles. Symbols are stored once in a flat table and referenced by id
// from the scope that declares them.

use rustc_hash::FxHashMap;

use snex_identity::{NamespacedIdentifier, Symbol};

use crate::types::{ConstValue, TypeId, TypeInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    pub const GLOBAL: ScopeId = ScopeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    /// `namespace N { }` and template instance scopes.
    Namespace,
    Class,
    Function,
    Block,
}

/// Where a symbol's value lives at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Function-local variable.
    Local,
    /// Function parameter by position (after `this`, if any).
    Param(u32),
    /// Offset into the root data segment.
    Root(u32),
    /// Offset from the `this` pointer of the enclosing method.
    Member(u32),
    /// Folded to its constant value; no storage.
    Constant,
}

#[derive(Debug, Clone)]
pub struct SymbolData {
    pub id: NamespacedIdentifier,
    pub info: TypeInfo,
    pub const_value: Option<ConstValue>,
    pub storage: Storage,
    /// A reference to this local is taken somewhere, so it needs a stack
    /// slot rather than a register.
    pub addressable: bool,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub id: NamespacedIdentifier,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    symbols: FxHashMap<Symbol, SymbolId>,
    types: FxHashMap<Symbol, TypeId>,
}

impl Scope {
    pub fn symbol(&self, name: Symbol) -> Option<SymbolId> {
        self.symbols.get(&name).copied()
    }

    pub fn type_alias(&self, name: Symbol) -> Option<TypeId> {
        self.types.get(&name).copied()
    }

    pub fn symbols(&self) -> impl Iterator<Item = (Symbol, SymbolId)> + '_ {
        self.symbols.iter().map(|(k, v)| (*k, *v))
    }
}

#[derive(Debug, Clone)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
    symbols: Vec<SymbolData>,
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeArena {
    /// Arena holding only the global scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                kind: ScopeKind::Global,
                id: NamespacedIdentifier::root(),
                parent: None,
                children: Vec::new(),
                symbols: FxHashMap::default(),
                types: FxHashMap::default(),
            }],
            symbols: Vec::new(),
        }
    }

    pub fn push(&mut self, kind: ScopeKind, id: NamespacedIdentifier, parent: ScopeId) -> ScopeId {
        let scope = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            kind,
            id,
            parent: Some(parent),
            children: Vec::new(),
            symbols: FxHashMap::default(),
            types: FxHashMap::default(),
        });
        self.scopes[parent.index()].children.push(scope);
        scope
    }

    pub fn get(&self, scope: ScopeId) -> &Scope {
        &self.scopes[scope.index()]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Declare a symbol in `scope`. Returns `None` if the name is already
    /// declared there; outer declarations are shadowed, not conflicting.
    pub fn declare(&mut self, scope: ScopeId, name: Symbol, data: SymbolData) -> Option<SymbolId> {
        let entry = &mut self.scopes[scope.index()];
        if entry.symbols.contains_key(&name) {
            return None;
        }
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(data);
        entry.symbols.insert(name, id);
        Some(id)
    }

    /// Bind a type name (template parameter or alias) in `scope`.
    pub fn declare_type(&mut self, scope: ScopeId, name: Symbol, ty: TypeId) -> bool {
        let entry = &mut self.scopes[scope.index()];
        if entry.types.contains_key(&name) || entry.symbols.contains_key(&name) {
            return false;
        }
        entry.types.insert(name, ty);
        true
    }

    pub fn symbol(&self, id: SymbolId) -> &SymbolData {
        &self.symbols[id.index()]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut SymbolData {
        &mut self.symbols[id.index()]
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// `scope` and its ancestors, innermost first.
    pub fn chain(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(scope), move |s| self.get(*s).parent)
    }

    /// Nearest scope in the chain that declares `name`. Nearer scopes
    /// shadow outer ones.
    pub fn get_scope_for_symbol(&self, scope: ScopeId, name: Symbol) -> Option<ScopeId> {
        self.chain(scope)
            .find(|s| self.get(*s).symbols.contains_key(&name))
    }

    pub fn lookup(&self, scope: ScopeId, name: Symbol) -> Option<SymbolId> {
        self.chain(scope).find_map(|s| self.get(s).symbol(name))
    }

    /// Type name bound in the chain. A variable of the same name in a nearer
    /// scope hides the type.
    pub fn lookup_type(&self, scope: ScopeId, name: Symbol) -> Option<TypeId> {
        for s in self.chain(scope) {
            let entry = self.get(s);
            if let Some(ty) = entry.type_alias(name) {
                return Some(ty);
            }
            if entry.symbols.contains_key(&name) {
                return None;
            }
        }
        None
    }

    /// Nearest enclosing scope of `kind`.
    pub fn enclosing(&self, scope: ScopeId, kind: ScopeKind) -> Option<ScopeId> {
        self.chain(scope).find(|s| self.get(*s).kind == kind)
    }

    /// Nearest namespace-level scope (namespace or global).
    pub fn enclosing_namespace(&self, scope: ScopeId) -> ScopeId {
        self.chain(scope)
            .find(|s| matches!(self.get(*s).kind, ScopeKind::Namespace | ScopeKind::Global))
            .unwrap_or(ScopeId::GLOBAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snex_identity::Interner;

    fn local(ty: TypeId) -> SymbolData {
        SymbolData {
            id: NamespacedIdentifier::root(),
            info: TypeInfo::new(ty),
            const_value: None,
            storage: Storage::Local,
            addressable: false,
        }
    }

    #[test]
    fn nearest_declaration_shadows() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let mut arena = ScopeArena::new();
        let func = arena.push(ScopeKind::Function, NamespacedIdentifier::root(), ScopeId::GLOBAL);
        let block = arena.push(ScopeKind::Block, NamespacedIdentifier::root(), func);
        let inner = arena.push(ScopeKind::Block, NamespacedIdentifier::root(), block);

        let outer_x = arena.declare(ScopeId::GLOBAL, x, local(TypeId::INT)).unwrap();
        let inner_x = arena.declare(block, x, local(TypeId::DOUBLE)).unwrap();

        assert_eq!(arena.lookup(inner, x), Some(inner_x));
        assert_eq!(arena.get_scope_for_symbol(inner, x), Some(block));
        assert_eq!(arena.symbol(arena.lookup(inner, x).unwrap()).info.id, TypeId::DOUBLE);
        assert_eq!(arena.lookup(func, x), Some(outer_x));
    }

    #[test]
    fn redeclaration_in_same_scope_fails() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let mut arena = ScopeArena::new();
        assert!(arena.declare(ScopeId::GLOBAL, x, local(TypeId::INT)).is_some());
        assert!(arena.declare(ScopeId::GLOBAL, x, local(TypeId::FLOAT)).is_none());
        assert_eq!(arena.symbol_count(), 1);
    }

    #[test]
    fn variables_hide_outer_type_names() {
        let mut interner = Interner::new();
        let t = interner.intern("T");
        let mut arena = ScopeArena::new();
        let class = arena.push(ScopeKind::Class, NamespacedIdentifier::root(), ScopeId::GLOBAL);
        let func = arena.push(ScopeKind::Function, NamespacedIdentifier::root(), class);
        assert!(arena.declare_type(class, t, TypeId::FLOAT));
        assert_eq!(arena.lookup_type(func, t), Some(TypeId::FLOAT));
        arena.declare(func, t, local(TypeId::INT));
        assert_eq!(arena.lookup_type(func, t), None);
        assert_eq!(arena.enclosing(func, ScopeKind::Class), Some(class));
        assert_eq!(arena.enclosing_namespace(func), ScopeId::GLOBAL);
        assert_eq!(arena.get(ScopeId::GLOBAL).children, vec![class]);
    }
}
