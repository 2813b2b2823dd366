// This module defines the Backend capability interface: the minimal set of primitives a
// code-generation engine must expose so that the typed handles (Value, Vector, Ref,
// Condition) can drive it. A backend allocates typed scalar storage and 128/256-bit SIMD
// storage, reports register widths, and emits moves, stores, two-operand arithmetic and
// logic, shifts, width conversions, comparison materialization, unaligned vector
// loads/stores, lane-wise vector adds and logical vector right shifts. Operands are passed
// as backend-neutral descriptors (Operand, Mem, VectorOperand) carrying the backend's own
// handle types. Instruction selection by width, signedness, operand form and vector size
// happens inside each implementation. All methods take &self: a backend is a shared,
// interior-mutable session that every value holds by reference, and it is deliberately not
// Sync. The three-pointer function harness (pointer arguments and return) lives here too so
// that tests and tools can run generated code on either backend.

//! Backend capability interface.
//!
//! Implemented by [`X64Backend`](crate::x64::X64Backend) and, with the `llvm`
//! feature, by `LlvmBackend`.

use super::error::CodegenResult;
use super::stats::EmissionStats;
use super::types::{ElementWidth, ScalarType, VectorBits};
use std::fmt;

/// Signature of every function produced by the harness.
pub type EntryPoint = unsafe extern "C" fn(*mut u8, *mut u8, *mut u8) -> u64;

/// Number of pointer arguments of the harness function.
pub const POINTER_ARGS: usize = 3;

/// Two-operand arithmetic and logic operations (`dst = dst op src`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
}

/// Shift operations (`dst = dst op amount`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftOp {
    Shl,
    /// Logical right shift, fills with zero.
    Shr,
    /// Arithmetic right shift, fills with the sign bit.
    Sar,
}

/// Width-crossing conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvertOp {
    Truncate,
    SignExtend,
    ZeroExtend,
}

/// Relational kind with signedness already resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionFlag {
    Eq,
    Ne,
    /// Signed less.
    Lt,
    /// Signed less or equal.
    Le,
    /// Signed greater.
    Gt,
    /// Signed greater or equal.
    Ge,
    /// Unsigned less.
    Below,
    /// Unsigned less or equal.
    BelowEq,
    /// Unsigned greater.
    Above,
    /// Unsigned greater or equal.
    AboveEq,
}

impl ConditionFlag {
    /// Flag testing the opposite outcome.
    pub const fn negate(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Ge => Self::Lt,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            Self::Below => Self::AboveEq,
            Self::AboveEq => Self::Below,
            Self::BelowEq => Self::Above,
            Self::Above => Self::BelowEq,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    pub const fn is_unsigned(self) -> bool {
        matches!(self, Self::Below | Self::BelowEq | Self::Above | Self::AboveEq)
    }
}

/// Memory operand as handed to a backend.
pub struct Mem<B: Backend> {
    pub base: B::Addr,
    /// Index register, scaled by `scale`.
    pub index: Option<B::Reg>,
    pub scale: u8,
    pub disp: i32,
    /// Operand size in bytes, `None` while untagged.
    pub size: Option<u8>,
}

impl<B: Backend> Mem<B> {
    pub fn new(base: B::Addr) -> Self {
        Self {
            base,
            index: None,
            scale: 1,
            disp: 0,
            size: None,
        }
    }

    pub fn with_size(mut self, size: u8) -> Self {
        self.size = Some(size);
        self
    }
}

impl<B: Backend> Clone for Mem<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for Mem<B> {}

impl<B: Backend> fmt::Debug for Mem<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mem")
            .field("base", &self.base)
            .field("index", &self.index)
            .field("scale", &self.scale)
            .field("disp", &self.disp)
            .field("size", &self.size)
            .finish()
    }
}

/// Scalar operand descriptor: register, memory or immediate.
pub enum Operand<B: Backend> {
    Reg(B::Reg),
    Mem(Mem<B>),
    Imm(i64),
}

impl<B: Backend> Clone for Operand<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for Operand<B> {}

impl<B: Backend> fmt::Debug for Operand<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => f.debug_tuple("Reg").field(reg).finish(),
            Operand::Mem(mem) => f.debug_tuple("Mem").field(mem).finish(),
            Operand::Imm(imm) => f.debug_tuple("Imm").field(imm).finish(),
        }
    }
}

/// Vector operand descriptor: SIMD register or memory.
pub enum VectorOperand<B: Backend> {
    Reg(B::VReg),
    Mem(Mem<B>),
}

impl<B: Backend> Clone for VectorOperand<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for VectorOperand<B> {}

impl<B: Backend> fmt::Debug for VectorOperand<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorOperand::Reg(reg) => f.debug_tuple("Reg").field(reg).finish(),
            VectorOperand::Mem(mem) => f.debug_tuple("Mem").field(mem).finish(),
        }
    }
}

/// Primitives a code-generation engine exposes to the typed handles.
///
/// Every `emit_*` call emits immediately, in call order. Implementations
/// select the concrete instruction from the operation, the scalar type or
/// lane width, the vector size and the operand form. The generic layer has
/// already validated type contracts and immediate ranges before calling in.
pub trait Backend: Sized {
    /// Storage of one scalar value.
    type Reg: Copy + fmt::Debug;
    /// Storage of one vector value.
    type VReg: Copy + fmt::Debug;
    /// Base address of a memory operand.
    type Addr: Copy + fmt::Debug;

    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Allocate storage for a scalar of type `ty`. `name` is diagnostic only.
    fn new_reg(&self, ty: ScalarType, name: &str) -> CodegenResult<Self::Reg>;

    /// Allocate a SIMD register of the given size.
    fn new_vreg(&self, bits: VectorBits, name: &str) -> CodegenResult<Self::VReg>;

    /// Return scalar storage to the backend.
    fn release_reg(&self, reg: Self::Reg);

    /// Return SIMD storage to the backend.
    fn release_vreg(&self, reg: Self::VReg);

    /// Bit width of a scalar register.
    fn reg_bits(&self, reg: Self::Reg) -> u32;

    /// `dst = src`.
    fn emit_move(&self, ty: ScalarType, dst: Self::Reg, src: Operand<Self>) -> CodegenResult<()>;

    /// `[dst] = src`.
    fn emit_store(&self, ty: ScalarType, dst: Mem<Self>, src: Self::Reg) -> CodegenResult<()>;

    /// `dst = dst op src`.
    fn emit_binary(
        &self,
        op: BinaryOp,
        ty: ScalarType,
        dst: Self::Reg,
        src: Operand<Self>,
    ) -> CodegenResult<()>;

    /// `dst = dst op amount`; `amount` is a register or an immediate.
    fn emit_shift(
        &self,
        op: ShiftOp,
        ty: ScalarType,
        dst: Self::Reg,
        amount: Operand<Self>,
    ) -> CodegenResult<()>;

    /// `dst = convert(src)` between two widths.
    fn emit_convert(
        &self,
        op: ConvertOp,
        dst_ty: ScalarType,
        dst: Self::Reg,
        src_ty: ScalarType,
        src: Self::Reg,
    ) -> CodegenResult<()>;

    /// `dst = (lhs flag rhs) ? 1 : 0` for operands of type `ty`; `dst` is a byte.
    fn emit_set_condition(
        &self,
        flag: ConditionFlag,
        ty: ScalarType,
        lhs: Operand<Self>,
        rhs: Operand<Self>,
        dst: Self::Reg,
    ) -> CodegenResult<()>;

    /// Unaligned vector load.
    fn emit_vector_load(&self, bits: VectorBits, dst: Self::VReg, src: Mem<Self>) -> CodegenResult<()>;

    /// Unaligned vector store.
    fn emit_vector_store(&self, bits: VectorBits, dst: Mem<Self>, src: Self::VReg) -> CodegenResult<()>;

    /// Lane-wise `dst += src`.
    fn emit_vector_add(
        &self,
        lane: ElementWidth,
        bits: VectorBits,
        dst: Self::VReg,
        src: VectorOperand<Self>,
    ) -> CodegenResult<()>;

    /// Lane-wise logical right shift by an immediate.
    fn emit_vector_shr(
        &self,
        lane: ElementWidth,
        bits: VectorBits,
        dst: Self::VReg,
        amount: u8,
    ) -> CodegenResult<()>;

    /// Address held in harness pointer argument `index`.
    fn pointer_arg(&self, index: usize) -> CodegenResult<Self::Addr>;

    /// Return `src`, zero-extended to 64 bits, from the harness function.
    fn emit_return(&self, ty: ScalarType, src: Self::Reg) -> CodegenResult<()>;

    /// Snapshot of the emission statistics.
    fn stats(&self) -> EmissionStats;
}

#[cfg(test)]
mod tests {
    use super::ConditionFlag;

    #[test]
    fn test_condition_negation() {
        let flags = [
            ConditionFlag::Eq,
            ConditionFlag::Ne,
            ConditionFlag::Lt,
            ConditionFlag::Le,
            ConditionFlag::Gt,
            ConditionFlag::Ge,
            ConditionFlag::Below,
            ConditionFlag::BelowEq,
            ConditionFlag::Above,
            ConditionFlag::AboveEq,
        ];
        for flag in flags {
            assert_eq!(flag.negate().negate(), flag);
            assert_ne!(flag.negate(), flag);
            assert_eq!(flag.negate().is_signed(), flag.is_signed());
        }
        assert_eq!(ConditionFlag::Below.negate(), ConditionFlag::AboveEq);
        assert!(ConditionFlag::BelowEq.is_unsigned());
        assert!(!ConditionFlag::Eq.is_signed() && !ConditionFlag::Eq.is_unsigned());
    }
}
