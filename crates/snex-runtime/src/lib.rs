//! SNEX runtime: native math library, buffer layouts and the registry of
//! host functions compiled code may call.
pub mod buffer;
pub mod math;
pub mod native_registry;

pub use buffer::{Block, DYN_BYTE_SIZE, DYN_DATA_OFFSET, DYN_SIZE_OFFSET, DynBuffer};
pub use native_registry::{
    NativeFunction, NativeModule, NativeRegistry, NativeSignature, NativeType, NativeValue,
};

/// Module name of the builtin math library.
pub const MATH_MODULE: &str = "Math";
/// Module name host externals are registered under by convention.
pub const HOST_MODULE: &str = "Host";
