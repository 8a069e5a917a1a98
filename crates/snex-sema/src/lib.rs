//! SNEX semantic analysis: type registry, scopes, symbol tables, the
//! resolver that annotates every node with a type, and the optimizer.
//!
//! A [`Compilation`] owns one parsed unit and every table built for it.
//! [`Compilation::run`] resolves and optimizes; the code generator then
//! consumes the unit.

pub mod abort;
pub mod class_data;
pub mod compilation;
pub mod const_eval;
pub mod errors;
pub mod functions;
pub mod namespace;
pub mod optimizer;
pub mod resolve;
pub mod scope;
pub mod template;
pub mod types;

pub use abort::AbortToken;
pub use class_data::{AllocError, ClassDataEntry, DestructorEntry, RootClassData};
pub use compilation::{Compilation, NodeInfo, NodeMap, OptimizationLevel, Pass, SemaOptions};
pub use const_eval::{FoldError, fold_binary, fold_unary};
pub use errors::{SemaError, SemaErrorKind, SemanticError};
pub use functions::{
    AssemblyInliner, FunctionArg, FunctionData, FunctionId, FunctionKind, FunctionTable,
    HighLevelInliner, Inliner, to_native_type,
};
pub use namespace::{Entity, NamespaceHandler};
pub use optimizer::OptimizerStats;
pub use scope::{ScopeArena, ScopeId, ScopeKind, Storage, SymbolData, SymbolId};
pub use snex_identity::Span;
pub use types::{ConstValue, Member, SnexType, StructType, TypeId, TypeInfo, TypeRegistry};
