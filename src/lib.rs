// src/lib.rs
//! SNEX compiler driver.
//!
//! [`compile`] turns source text into a [`CompiledObject`]; host code then
//! fetches entry points by name and signature, directly or through a
//! [`CallbackCollection`]. Compilation is synchronous and should run off
//! the audio thread; the generated functions never lock or allocate.

// Public modules (the snex driver API)
pub mod callbacks;
pub mod cli;
pub mod commands;
pub mod compile;
pub mod config;
pub mod diagnostics;
pub mod expression;

pub use callbacks::{CallbackCollection, CallbackKind, Parameter, ProcessMode};
pub use compile::{CompileResult, analyze, compile, compile_object};
pub use config::CompileConfig;
pub use diagnostics::{CompileError, Diagnostic, ErrorKind, Severity};
pub use expression::JitExpression;

// Targeted re-exports so hosts need not depend on the sub-crates.
pub use snex_codegen::{CodegenStats, CompiledFunction, CompiledObject, DataEntry, JitOptions};
pub use snex_runtime::{Block, DynBuffer, NativeModule, NativeRegistry, NativeSignature, NativeType, NativeValue};
pub use snex_sema::{AbortToken, OptimizationLevel};
