//! x86-64 architecture-specific components.
//!
//! - Instruction selection and encoding using iced-x86
//! - The [`X64Backend`] implementation of the backend trait
//! - Executable mapping of the assembled harness function

pub mod backend;
pub mod encoder;
pub mod jit;

pub use backend::{X64Backend, X64Config, X64Reg};
pub use encoder::{Address, X64Encoder};
pub use jit::JitCode;
