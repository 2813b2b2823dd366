//! LLVM IR backend.
//!
//! Builds one harness function per [`LlvmBackend`] with inkwell and
//! JIT-compiles it on [`LlvmBackend::finalize`]. Requires a system LLVM 14.
//!
//! # Example
//! ```ignore
//! use inkwell::context::Context;
//! use typed_codegen::llvm::LlvmBackend;
//! use typed_codegen::{Ptr, Value};
//!
//! let context = Context::create();
//! let backend = LlvmBackend::new(&context, "kernel");
//! let src = Ptr::<_, u32>::arg(&backend, 0)?;
//! let mut x = Value::<_, u32>::new(&backend, "x")?;
//! x.assign(&src.deref())?;
//! x.ret()?;
//! drop(x);
//! let jit = backend.finalize()?;
//! ```

pub mod backend;

pub use backend::{predicate, LlvmBackend, LlvmJit, Slot, VectorSlot};
