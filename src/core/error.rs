// This module defines the error type for typed-codegen using the thiserror crate. CodegenError
// covers every way a generation-time call can refuse to proceed: data-dependent contract
// violations detected before emission (non power-of-two divisors, out of range shift amounts,
// displacement overflow, missing or mismatched memory operand size tags, operand forms a
// backend cannot encode), backend resource failures (register pool exhaustion), and failures
// reported by the underlying engines (iced-x86 assembler, inkwell builder, executable mapping
// and JIT creation). Type and width contracts are not represented here because they are
// enforced by trait bounds and never reach run time. CodegenResult<T> is the crate-wide alias.

//! Error types for typed code generation.
//!
//! Using thiserror for idiomatic error handling.

use thiserror::Error;

/// Main error type for code generation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("Division by {divisor} is not implemented, only powers of two are supported")]
    UnsupportedDivisor {
        divisor: i128,
    },

    #[error("Shift amount {amount} out of range for {bits}-bit operand")]
    ShiftOutOfRange {
        amount: u32,
        bits: u32,
    },

    #[error("Unsupported {width}-bit {operation} instruction")]
    UnsupportedWidth {
        operation: &'static str,
        width: u32,
    },

    #[error("Unsupported operand for {operation}: {reason}")]
    UnsupportedOperand {
        operation: &'static str,
        reason: &'static str,
    },

    #[error("Memory operand tagged {found:?} used for a {expected}-byte access")]
    OperandSize {
        expected: u32,
        found: Option<u8>,
    },

    #[error("Displacement overflow for element {index} of size {size}")]
    DisplacementOverflow {
        index: i64,
        size: u32,
    },

    #[error("Pointer argument {index} out of range ({available} available)")]
    ArgumentOutOfRange {
        index: usize,
        available: usize,
    },

    #[error("Register allocation failed: {reason}")]
    RegisterAllocation {
        reason: String,
    },

    #[error("Assembler error: {reason}")]
    Assembler {
        reason: String,
    },

    #[error("LLVM builder error: {reason}")]
    Builder {
        reason: String,
    },

    #[error("JIT error: {reason}")]
    Jit {
        reason: String,
    },

    #[error("Function finalized without a return")]
    MissingReturn,
}

/// Result type alias for code generation.
pub type CodegenResult<T> = Result<T, CodegenError>;
