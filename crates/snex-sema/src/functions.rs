// src/functions.rs
//
// Function table: every callable the unit knows about (user functions,
// methods, template instances, native library functions and inliners) and
// the overload ranking used to pick one for a call site.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use snex_frontend::NodeId;
use snex_identity::{Interner, NamespacedIdentifier, Symbol};
use snex_runtime::{NativeRegistry, NativeType};

use crate::scope::{ScopeId, SymbolId};
use crate::types::{ConstValue, TypeId, TypeInfo, TypeRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u32);

impl FunctionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Call rewritten in the AST before code generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighLevelInliner {
    /// `s.size()` on a span folds to its length.
    SpanSize,
    /// `Math.map(x, lo, hi)` becomes `lo + x * (hi - lo)`.
    MathMap,
}

/// Call expanded to an instruction sequence by the code generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyInliner {
    Abs,
    Min,
    Max,
    Sqrt,
    Floor,
    Ceil,
    /// Clamp `x` into `[lo, hi]`.
    Range,
    /// Load of the size field of a `dyn`.
    DynSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inliner {
    HighLevel(HighLevelInliner),
    Assembly(AssemblyInliner),
}

#[derive(Debug, Clone, Copy)]
pub enum FunctionKind {
    /// Defined in source. `scope` is the function scope holding the
    /// parameters.
    User { def: NodeId, scope: ScopeId },
    Native { ptr: *const u8 },
    Inline(Inliner),
}

#[derive(Debug, Clone)]
pub struct FunctionArg {
    pub name: Symbol,
    pub info: TypeInfo,
    pub default: Option<ConstValue>,
    pub symbol: Option<SymbolId>,
}

#[derive(Debug, Clone)]
pub struct FunctionData {
    pub id: NamespacedIdentifier,
    /// Qualified display name, also the export name of root functions.
    pub label: String,
    pub ret: TypeInfo,
    pub args: Vec<FunctionArg>,
    pub kind: FunctionKind,
    /// Owning struct for methods; compiled with a leading `this` pointer.
    pub this_type: Option<TypeId>,
    /// Instantiated from a function template.
    pub templated: bool,
    pub decl_index: u32,
    pub is_destructor: bool,
}

impl FunctionData {
    pub fn required_args(&self) -> usize {
        self.args.iter().take_while(|a| a.default.is_none()).count()
    }

    pub fn accepts_arity(&self, n: usize) -> bool {
        n >= self.required_args() && n <= self.args.len()
    }

    pub fn inliner(&self) -> Option<Inliner> {
        match self.kind {
            FunctionKind::Inline(inliner) => Some(inliner),
            _ => None,
        }
    }

    pub fn user_def(&self) -> Option<(NodeId, ScopeId)> {
        match self.kind {
            FunctionKind::User { def, scope } => Some((def, scope)),
            _ => None,
        }
    }

    pub fn signature_display(&self, types: &TypeRegistry, interner: &Interner) -> String {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| types.display_info(a.info, interner))
            .collect();
        format!(
            "{} {}({})",
            types.display_info(self.ret, interner),
            self.label,
            args.join(", ")
        )
    }
}

#[derive(Debug, Default)]
pub struct FunctionTable {
    functions: Vec<FunctionData>,
    by_name: FxHashMap<NamespacedIdentifier, Vec<FunctionId>>,
    methods: FxHashMap<(TypeId, Symbol), Vec<FunctionId>>,
    next_decl: u32,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_decl_index(&mut self) -> u32 {
        let i = self.next_decl;
        self.next_decl += 1;
        i
    }

    /// Add a free function (or template instance) under its qualified id.
    pub fn add(&mut self, data: FunctionData) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        match data.this_type {
            Some(owner) => {
                if let Some(name) = data.id.name() {
                    self.methods.entry((owner, name)).or_default().push(id);
                }
            }
            None => self.by_name.entry(data.id.clone()).or_default().push(id),
        }
        self.functions.push(data);
        id
    }

    /// Add without making it visible to name lookup (template instances).
    pub fn add_hidden(&mut self, data: FunctionData) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(data);
        id
    }

    pub fn get(&self, id: FunctionId) -> &FunctionData {
        &self.functions[id.index()]
    }

    pub fn get_mut(&mut self, id: FunctionId) -> &mut FunctionData {
        &mut self.functions[id.index()]
    }

    pub fn lookup(&self, id: &NamespacedIdentifier) -> &[FunctionId] {
        self.by_name.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn methods(&self, owner: TypeId, name: Symbol) -> &[FunctionId] {
        self.methods
            .get(&(owner, name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FunctionId, &FunctionData)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FunctionId(i as u32), f))
    }

    /// Register the `Math` inliners and every native module in `natives`.
    pub fn register_builtins(&mut self, natives: &NativeRegistry, interner: &mut Interner) {
        let math = interner.intern(snex_runtime::MATH_MODULE);
        let numeric = [TypeId::INT, TypeId::FLOAT, TypeId::DOUBLE];
        let floating = [TypeId::FLOAT, TypeId::DOUBLE];

        let mut inline = |table: &mut Self, name: &str, ty: TypeId, arity: usize, inliner| {
            let sym = interner.intern(name);
            let params = ["x", "a", "b"];
            let args = (0..arity)
                .map(|i| FunctionArg {
                    name: interner.intern(params[i.min(2)]),
                    info: TypeInfo::new(ty),
                    default: None,
                    symbol: None,
                })
                .collect();
            let decl_index = table.next_decl_index();
            table.add(FunctionData {
                id: NamespacedIdentifier::from_segments([math, sym]),
                label: format!("Math::{name}"),
                ret: TypeInfo::new(ty),
                args,
                kind: FunctionKind::Inline(inliner),
                this_type: None,
                templated: false,
                decl_index,
                is_destructor: false,
            });
        };

        for ty in numeric {
            inline(self, "abs", ty, 1, Inliner::Assembly(AssemblyInliner::Abs));
            inline(self, "min", ty, 2, Inliner::Assembly(AssemblyInliner::Min));
            inline(self, "max", ty, 2, Inliner::Assembly(AssemblyInliner::Max));
            inline(self, "range", ty, 3, Inliner::Assembly(AssemblyInliner::Range));
        }
        for ty in floating {
            inline(self, "sqrt", ty, 1, Inliner::Assembly(AssemblyInliner::Sqrt));
            inline(self, "floor", ty, 1, Inliner::Assembly(AssemblyInliner::Floor));
            inline(self, "ceil", ty, 1, Inliner::Assembly(AssemblyInliner::Ceil));
            inline(self, "map", ty, 3, Inliner::HighLevel(HighLevelInliner::MathMap));
        }

        for (module_name, module) in natives.modules() {
            let module_sym = interner.intern(module_name);
            let mut names: Vec<&str> = module.function_names().collect();
            names.sort_unstable();
            for name in names {
                let sym = interner.intern(name);
                for native in module.overloads(name) {
                    let args = native
                        .signature
                        .params
                        .iter()
                        .enumerate()
                        .map(|(i, p)| FunctionArg {
                            name: interner.intern(&format!("arg{i}")),
                            info: native_type_info(*p),
                            default: None,
                            symbol: None,
                        })
                        .collect();
                    let decl_index = self.next_decl_index();
                    self.add(FunctionData {
                        id: NamespacedIdentifier::from_segments([module_sym, sym]),
                        label: format!("{module_name}::{name}"),
                        ret: native_type_info(native.signature.return_type),
                        args,
                        kind: FunctionKind::Native { ptr: native.ptr },
                        this_type: None,
                        templated: false,
                        decl_index,
                        is_destructor: false,
                    });
                }
            }
        }
        tracing::trace!(functions = self.functions.len(), "registered builtin functions");
    }

    /// The builtin `size()` method of a span or dyn type, created on first
    /// use.
    pub fn size_method(&mut self, owner: TypeId, is_span: bool, interner: &mut Interner) -> FunctionId {
        let size = interner.intern("size");
        if let Some(&existing) = self.methods(owner, size).first() {
            return existing;
        }
        let inliner = if is_span {
            Inliner::HighLevel(HighLevelInliner::SpanSize)
        } else {
            Inliner::Assembly(AssemblyInliner::DynSize)
        };
        let decl_index = self.next_decl_index();
        self.add(FunctionData {
            id: NamespacedIdentifier::single(size),
            label: "size".to_string(),
            ret: TypeInfo::new(TypeId::INT),
            args: Vec::new(),
            kind: FunctionKind::Inline(inliner),
            this_type: Some(owner),
            templated: false,
            decl_index,
            is_destructor: false,
        })
    }
}

/// Type of a native parameter or return value as seen by SNEX code.
pub fn native_type_info(ty: NativeType) -> TypeInfo {
    match ty {
        NativeType::Void => TypeInfo::new(TypeId::VOID),
        NativeType::Int => TypeInfo::new(TypeId::INT),
        NativeType::Float => TypeInfo::new(TypeId::FLOAT),
        NativeType::Double => TypeInfo::new(TypeId::DOUBLE),
        NativeType::Block => TypeInfo::new(TypeId::BLOCK).with_ref(true),
    }
}

/// Host-visible native type of a SNEX type, if it can cross the boundary.
pub fn to_native_type(info: TypeInfo) -> Option<NativeType> {
    match info.id {
        TypeId::VOID => Some(NativeType::Void),
        TypeId::INT if !info.is_ref => Some(NativeType::Int),
        TypeId::FLOAT if !info.is_ref => Some(NativeType::Float),
        TypeId::DOUBLE if !info.is_ref => Some(NativeType::Double),
        TypeId::BLOCK => Some(NativeType::Block),
        _ => None,
    }
}

/// Cost of passing a `from` value where `to` is expected: 0 for an exact
/// match, 1 for an implicit numeric conversion.
pub fn conversion_cost(from: TypeId, to: TypeId) -> Option<u32> {
    if from == to {
        Some(0)
    } else if from.is_numeric() && to.is_numeric() {
        Some(1)
    } else {
        None
    }
}

/// Signature of one overload candidate.
#[derive(Debug, Clone)]
pub struct CandidateSignature {
    pub params: SmallVec<[TypeId; 4]>,
    pub required: usize,
    pub templated: bool,
    pub decl_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ranking<T> {
    Best(T),
    Ambiguous(T, T),
    NoMatch,
}

/// Pick the best candidate for `args`. Candidates are filtered by arity and
/// convertibility, then ordered by (fewest conversions, non-templated
/// first, declaration order). Two different signatures tied on the first
/// two keys are ambiguous.
pub fn rank_candidates<T: Clone>(
    candidates: &[(T, CandidateSignature)],
    args: &[TypeId],
) -> Ranking<T> {
    let mut viable: Vec<(u32, &T, &CandidateSignature)> = candidates
        .iter()
        .filter(|(_, sig)| args.len() >= sig.required && args.len() <= sig.params.len())
        .filter_map(|(item, sig)| {
            let mut cost = 0;
            for (arg, param) in args.iter().zip(&sig.params) {
                cost += conversion_cost(*arg, *param)?;
            }
            Some((cost, item, sig))
        })
        .collect();
    viable.sort_by_key(|(cost, _, sig)| (*cost, sig.templated, sig.decl_index));

    match viable.as_slice() {
        [] => Ranking::NoMatch,
        [(_, best, _)] => Ranking::Best((*best).clone()),
        [(c1, best, s1), (c2, second, s2), ..] => {
            let tied = c1 == c2 && s1.templated == s2.templated;
            let n = args.len();
            if tied && s1.params[..n] != s2.params[..n] {
                Ranking::Ambiguous((*best).clone(), (*second).clone())
            } else {
                Ranking::Best((*best).clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: &[TypeId], templated: bool, decl_index: u32) -> CandidateSignature {
        CandidateSignature {
            params: params.iter().copied().collect(),
            required: params.len(),
            templated,
            decl_index,
        }
    }

    #[test]
    fn non_templated_beats_templated() {
        let candidates = [
            ("template", sig(&[TypeId::INT], true, 0)),
            ("plain", sig(&[TypeId::INT], false, 1)),
        ];
        assert_eq!(
            rank_candidates(&candidates, &[TypeId::INT]),
            Ranking::Best("plain")
        );
    }

    #[test]
    fn exact_template_beats_converting_plain_function() {
        let candidates = [
            ("template", sig(&[TypeId::FLOAT], true, 0)),
            ("plain", sig(&[TypeId::INT], false, 1)),
        ];
        assert_eq!(
            rank_candidates(&candidates, &[TypeId::FLOAT]),
            Ranking::Best("template")
        );
        assert_eq!(
            rank_candidates(&candidates, &[TypeId::INT]),
            Ranking::Best("plain")
        );
    }

    #[test]
    fn exact_match_beats_conversion() {
        let candidates = [
            ("float", sig(&[TypeId::FLOAT], false, 0)),
            ("double", sig(&[TypeId::DOUBLE], false, 1)),
        ];
        assert_eq!(
            rank_candidates(&candidates, &[TypeId::DOUBLE]),
            Ranking::Best("double")
        );
        // Both need one conversion from int
        assert_eq!(
            rank_candidates(&candidates, &[TypeId::INT]),
            Ranking::Ambiguous("float", "double")
        );
    }

    #[test]
    fn swapped_argument_order_is_ambiguous() {
        let candidates = [
            ("fi", sig(&[TypeId::FLOAT, TypeId::INT], false, 0)),
            ("if", sig(&[TypeId::INT, TypeId::FLOAT], false, 1)),
        ];
        assert_eq!(
            rank_candidates(&candidates, &[TypeId::INT, TypeId::INT]),
            Ranking::Ambiguous("fi", "if")
        );
        assert_eq!(
            rank_candidates(&candidates, &[TypeId::FLOAT, TypeId::INT]),
            Ranking::Best("fi")
        );
    }

    #[test]
    fn arity_and_defaults_filter_candidates() {
        let mut with_default = sig(&[TypeId::FLOAT, TypeId::FLOAT], false, 0);
        with_default.required = 1;
        let candidates = [
            ("default", with_default),
            ("block", sig(&[TypeId::BLOCK], false, 1)),
        ];
        assert_eq!(
            rank_candidates(&candidates, &[TypeId::FLOAT]),
            Ranking::Best("default")
        );
        assert_eq!(rank_candidates(&candidates, &[]), Ranking::NoMatch);
        assert_eq!(
            rank_candidates(&candidates, &[TypeId::BLOCK]),
            Ranking::Best("block")
        );
    }

    #[test]
    fn builtins_register_math_overloads() {
        let mut interner = Interner::new();
        let mut table = FunctionTable::new();
        table.register_builtins(&NativeRegistry::with_math(), &mut interner);

        let math = interner.intern("Math");
        let sin = NamespacedIdentifier::from_segments([math, interner.intern("sin")]);
        let abs = NamespacedIdentifier::from_segments([math, interner.intern("abs")]);
        assert_eq!(table.lookup(&sin).len(), 2);
        assert_eq!(table.lookup(&abs).len(), 3);
        let first = table.get(table.lookup(&abs)[0]);
        assert_eq!(first.inliner(), Some(Inliner::Assembly(AssemblyInliner::Abs)));
    }
}
