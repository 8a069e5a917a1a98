// src/compilation.rs
//
// One compilation unit: the parsed AST plus every table the passes build.
// Passes are implemented as `impl Compilation` blocks in `resolve/` and
// `optimizer/`; the code generator consumes the finished unit.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use snex_frontend::{Ast, NodeId, ParsedUnit};
use snex_identity::{Interner, NamespacedIdentifier, Span};
use snex_runtime::NativeRegistry;

use crate::abort::AbortToken;
use crate::class_data::RootClassData;
use crate::errors::SemaError;
use crate::functions::{FunctionId, FunctionTable};
use crate::namespace::NamespaceHandler;
use crate::optimizer::{MAX_REWRITES, OptimizerStats};
use crate::scope::{ScopeArena, ScopeId, ScopeKind, Storage, SymbolData, SymbolId};
use crate::types::{ConstValue, ResolvedTemplateArg, TypeId, TypeInfo, TypeRegistry};

/// Pipeline stages in execution order. Each node records the last one it
/// completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Pass {
    Resolve,
    Optimize,
    Generate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum OptimizationLevel {
    /// Only high-level inliners.
    None,
    /// Inliners plus constant folding and propagation.
    ConstantFolding,
    /// Everything: also binary simplification, dead branches and unrolling.
    #[default]
    Full,
}

impl OptimizationLevel {
    pub fn folds_constants(self) -> bool {
        self >= OptimizationLevel::ConstantFolding
    }

    pub fn is_full(self) -> bool {
        self == OptimizationLevel::Full
    }
}

#[derive(Debug, Clone)]
pub struct SemaOptions {
    pub optimization: OptimizationLevel,
    /// Largest span a `for (x : span)` loop is unrolled over.
    pub unroll_limit: usize,
    /// Rewrites across the whole unit before the optimizer gives up.
    pub max_rewrites: usize,
    pub abort: AbortToken,
}

impl Default for SemaOptions {
    fn default() -> Self {
        Self {
            optimization: OptimizationLevel::Full,
            unroll_limit: 8,
            max_rewrites: MAX_REWRITES,
            abort: AbortToken::never(),
        }
    }
}

/// Per-node results of resolution.
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    pub ty: Option<TypeInfo>,
    pub pass: Option<Pass>,
    /// Variable a node reads, declares or iterates with.
    pub symbol: Option<SymbolId>,
    /// Function a call node invokes.
    pub call: Option<FunctionId>,
    /// Byte offset of the member a `Member` node selects.
    pub offset: Option<u32>,
    /// Compile-time value of a node that names a constant.
    pub constant: Option<ConstValue>,
    pub lvalue: bool,
}

/// Side table of [`NodeInfo`], indexed by node.
#[derive(Debug, Clone, Default)]
pub struct NodeMap {
    infos: Vec<NodeInfo>,
}

impl NodeMap {
    pub fn get(&self, id: NodeId) -> Option<&NodeInfo> {
        self.infos.get(id.index())
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut NodeInfo {
        if id.index() >= self.infos.len() {
            self.infos.resize_with(id.index() + 1, NodeInfo::default);
        }
        &mut self.infos[id.index()]
    }

    pub fn ty(&self, id: NodeId) -> Option<TypeInfo> {
        self.get(id).and_then(|i| i.ty)
    }

    pub fn pass(&self, id: NodeId) -> Option<Pass> {
        self.get(id).and_then(|i| i.pass)
    }

    pub fn mark(&mut self, id: NodeId, pass: Pass) {
        let info = self.get_mut(id);
        if info.pass < Some(pass) {
            info.pass = Some(pass);
        }
    }

    /// Forget that `id` completed `pass` (and anything later).
    pub fn reset_to(&mut self, id: NodeId, pass: Pass) {
        let info = self.get_mut(id);
        if info.pass >= Some(pass) {
            info.pass = Some(Pass::Resolve).filter(|p| *p < pass);
        }
    }
}

/// Key of a memoized function template instance.
pub(crate) type FunctionInstanceKey = (NodeId, SmallVec<[ResolvedTemplateArg; 4]>);

pub struct Compilation {
    pub ast: Ast,
    pub interner: Interner,
    pub types: TypeRegistry,
    pub namespaces: NamespaceHandler,
    pub scopes: ScopeArena,
    pub root: RootClassData,
    pub functions: FunctionTable,
    pub nodes: NodeMap,
    pub options: SemaOptions,
    pub stats: OptimizerStats,
    pub(crate) pending: VecDeque<FunctionId>,
    pub(crate) class_scopes: FxHashMap<TypeId, ScopeId>,
    pub(crate) function_instances: FxHashMap<FunctionInstanceKey, FunctionId>,
    pub(crate) instantiation_depth: usize,
}

impl Compilation {
    /// Set up a unit over `unit`, registering builtin and host functions.
    pub fn new(unit: ParsedUnit, natives: &NativeRegistry, options: SemaOptions) -> Self {
        let ParsedUnit {
            ast,
            mut interner,
        } = unit;
        let mut functions = FunctionTable::new();
        let mut registry = NativeRegistry::with_math();
        for (name, module) in natives.modules() {
            registry.register_module(name, module.clone());
        }
        functions.register_builtins(&registry, &mut interner);

        let mut compilation = Self {
            ast,
            interner,
            types: TypeRegistry::new(),
            namespaces: NamespaceHandler::new(),
            scopes: ScopeArena::new(),
            root: RootClassData::new(),
            functions,
            nodes: NodeMap::default(),
            options,
            stats: OptimizerStats::default(),
            pending: VecDeque::new(),
            class_scopes: FxHashMap::default(),
            function_instances: FxHashMap::default(),
            instantiation_depth: 0,
        };
        compilation.register_module_namespaces(&registry);
        compilation
    }

    /// Each native module becomes a namespace holding its constants, so
    /// `Math::PI` and `Math.PI` resolve like any other qualified name.
    fn register_module_namespaces(&mut self, registry: &NativeRegistry) {
        for (name, module) in registry.modules() {
            let module_sym = self.interner.intern(name);
            let path = NamespacedIdentifier::single(module_sym);
            let scope = self
                .scopes
                .push(ScopeKind::Namespace, path.clone(), ScopeId::GLOBAL);
            self.namespaces.add_namespace(path.clone(), scope);
            let mut constants: Vec<_> = module.constants().collect();
            constants.sort_by(|a, b| a.0.cmp(b.0));
            for (const_name, value) in constants {
                let sym = self.interner.intern(const_name);
                let value = match value {
                    snex_runtime::NativeValue::Int(v) => ConstValue::Int(v),
                    snex_runtime::NativeValue::Float(v) => ConstValue::Float(v),
                    snex_runtime::NativeValue::Double(v) => ConstValue::Double(v),
                };
                let id = path.child(sym);
                let data = SymbolData {
                    id: id.clone(),
                    info: TypeInfo::constant(value.ty()),
                    const_value: Some(value),
                    storage: Storage::Constant,
                    addressable: false,
                };
                if let Some(symbol) = self.scopes.declare(scope, sym, data) {
                    self.namespaces.add_symbol(id, symbol);
                }
            }
        }
    }

    /// Run resolution and optimization. Any error aborts the whole unit.
    pub fn run(&mut self) -> Result<(), SemaError> {
        let span = self.root_span();
        self.options.abort.check(span)?;
        let _resolve = tracing::debug_span!("resolve").entered();
        self.resolve()?;
        drop(_resolve);

        self.options.abort.check(span)?;
        let _optimize = tracing::debug_span!("optimize").entered();
        self.optimize()?;
        drop(_optimize);

        self.options.abort.check(span)?;
        tracing::debug!(
            functions = self.functions.len(),
            types = self.types.len(),
            rewrites = self.stats.rewrites,
            "semantic passes complete"
        );
        Ok(())
    }

    pub fn root_span(&self) -> Span {
        if self.ast.is_empty() {
            Span::default()
        } else {
            self.ast.span(self.ast.root())
        }
    }

    /// User-defined functions (including methods and template instances)
    /// with their definition node.
    pub fn user_functions(&self) -> Vec<(FunctionId, NodeId)> {
        self.functions
            .iter()
            .filter_map(|(id, f)| f.user_def().map(|(def, _)| (id, def)))
            .collect()
    }

    pub fn type_name(&self, ty: TypeId) -> String {
        self.types.display(ty, &self.interner)
    }

    pub fn info_name(&self, info: TypeInfo) -> String {
        self.types.display_info(info, &self.interner)
    }

    pub fn path_name(&self, path: &NamespacedIdentifier) -> String {
        path.display(&self.interner)
    }

    /// Constant value behind a node, either recorded directly or through a
    /// constant symbol.
    pub fn node_constant(&self, id: NodeId) -> Option<ConstValue> {
        let info = self.nodes.get(id)?;
        if let Some(value) = info.constant {
            return Some(value);
        }
        let symbol = self.scopes.symbol(info.symbol?);
        match symbol.storage {
            Storage::Constant => symbol.const_value,
            _ => None,
        }
    }

    /// Human readable layout of the root data segment.
    pub fn dump_layout(&self) -> String {
        let mut out = String::new();
        for entry in self.root.entries() {
            out.push_str(&format!(
                "{:>6}  {:<24} {} ({} bytes)\n",
                entry.offset,
                self.path_name(&entry.id),
                self.type_name(entry.ty),
                entry.size
            ));
        }
        out.push_str(&format!("total {} bytes\n", self.root.size()));
        out
    }
}
