//! Cranelift code generation for SNEX.
//!
//! [`generate`] lowers a resolved [`snex_sema::Compilation`] to machine code
//! through a Cranelift JIT module. Expression temporaries are allocated
//! from a small register pool that spills to the stack frame when it runs
//! out (see [`registers`]). The result is a [`CompiledObject`] owning the
//! code and the root data segment the code addresses.

mod calls;
mod compiler;
mod context;
pub mod errors;
mod expr;
mod function;
mod inliners;
pub mod jit;
mod object;
pub mod registers;
mod stmt;

#[cfg(test)]
mod tests;

pub use compiler::generate;
pub use errors::{CodegenError, CodegenErrorKind, CodegenResult};
pub use jit::{JitContext, JitOptions};
pub use object::{CodegenStats, CompiledFunction, CompiledObject, DataEntry};
pub use registers::{RegisterClass, RegisterStats};
