//! Typed embedded code generation.
//!
//! Generation code manipulates typed handles bound to a backend, and every
//! operation on a handle emits instructions for the generated function right
//! away. Width, signedness and vector shape are part of the handle types, so
//! mixing incompatible operands is a compile error instead of a bad encoding.
//!
//! # Primary Usage
//!
//! ```no_run
//! use typed_codegen::{Ptr, Value, X64Backend};
//!
//! # fn main() -> Result<(), typed_codegen::CodegenError> {
//! let backend = X64Backend::new()?;
//! let src = Ptr::<_, u32>::arg(&backend, 0)?;
//!
//! let mut x = Value::<_, u32>::new(&backend, "x")?;
//! x.assign(&src.deref())?;
//! x.add_assign(5u32)?.shr_assign(1u32)?;
//! x.ret()?;
//! drop(x);
//!
//! let jit = backend.finalize()?;
//! let mut input = 10u32;
//! let result = unsafe {
//!     jit.call((&mut input as *mut u32).cast(), std::ptr::null_mut(), std::ptr::null_mut())
//! };
//! assert_eq!(result, 7);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Typed handles, type contracts and the backend interface
//! - [`x64`] - x86-64 backend (iced-x86 encoder, executable mapping)
//! - `llvm` - LLVM IR backend, behind the `llvm` feature

pub mod core;
pub mod x64;

#[cfg(feature = "llvm")]
pub mod llvm;

pub use core::{
    // Typed handles
    make_vector, Condition, Ptr, Ref, Relation, Value, Vector,
    // Backend interface
    Backend, EntryPoint, POINTER_ARGS,
    // Errors and statistics
    CodegenError, CodegenResult, EmissionStats,
    // Type contracts
    IndexScalar, NarrowerThan, Scalar, ScalarType, ShiftableLane, VectorShape,
};
pub use x64::{JitCode, X64Backend, X64Config};

#[cfg(feature = "llvm")]
pub use llvm::{LlvmBackend, LlvmJit};
