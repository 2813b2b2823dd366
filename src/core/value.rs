// This module implements Value, the typed scalar handle. A Value owns one piece of backend
// storage (a physical register on x64, a stack slot on LLVM) for an integer of fixed width
// and signedness, and holds a non-owning reference to the backend that produced it. Every
// method is an eager emission step: assignment, the compound arithmetic, bitwise and shift
// assignments, narrowing and widening conversions, and power-of-two division each emit their
// backend instructions immediately and in call order. Right-hand sides come in three forms
// (another Value of the same type, a memory Ref of the same element type, or an immediate),
// selected through the IntoOperand trait; shift amounts use ShiftAmount because memory
// operands are not possible there. Comparisons build inert Conditions whose relational kind
// is resolved from the element type's signedness. Data-dependent contract checks (shift
// range, divisor) run before anything reaches the backend. Dropping a Value releases its
// storage back to the backend.

//! Typed scalar values.

use super::backend::{Backend, BinaryOp, ConditionFlag, ConvertOp, Operand, ShiftOp};
use super::condition::{Condition, Relation};
use super::error::{CodegenError, CodegenResult};
use super::memory::Ref;
use super::types::{division_shift, NarrowerThan, Scalar, ScalarType};
use std::fmt;
use std::marker::PhantomData;

/// Right-hand side of assignments, arithmetic and comparisons on `Value<T>`.
///
/// Implemented for `&Value<T>`, `&Ref<T>` and immediates of type `T`.
pub trait IntoOperand<B: Backend, T: Scalar> {
    fn into_operand(self) -> Operand<B>;
}

impl<B: Backend, T: Scalar> IntoOperand<B, T> for &Value<'_, B, T> {
    fn into_operand(self) -> Operand<B> {
        Operand::Reg(self.reg)
    }
}

impl<B: Backend, T: Scalar> IntoOperand<B, T> for &Ref<'_, B, T> {
    fn into_operand(self) -> Operand<B> {
        Operand::Mem(self.scalar_mem())
    }
}

macro_rules! impl_immediate_operand {
    ($($ty:ty),*) => {
        $(
            impl<B: Backend> IntoOperand<B, $ty> for $ty {
                fn into_operand(self) -> Operand<B> {
                    Operand::Imm(self.to_imm())
                }
            }
        )*
    };
}

impl_immediate_operand!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Shift amount for `Value<T>`: another `&Value<T>` or an immediate `u32`.
pub trait ShiftAmount<B: Backend, T: Scalar> {
    fn into_amount(self) -> Operand<B>;
}

impl<B: Backend, T: Scalar> ShiftAmount<B, T> for &Value<'_, B, T> {
    fn into_amount(self) -> Operand<B> {
        Operand::Reg(self.reg)
    }
}

impl<B: Backend, T: Scalar> ShiftAmount<B, T> for u32 {
    fn into_amount(self) -> Operand<B> {
        Operand::Imm(i64::from(self))
    }
}

/// Generation-time handle for one integer of type `T`.
///
/// The backend must outlive the value; the borrow enforces it.
pub struct Value<'a, B: Backend, T: Scalar> {
    backend: &'a B,
    reg: B::Reg,
    _ty: PhantomData<T>,
}

impl<'a, B: Backend, T: Scalar> Value<'a, B, T> {
    /// Allocate uninitialized storage. `name` only shows up in diagnostics.
    pub fn new(backend: &'a B, name: &str) -> CodegenResult<Self> {
        let reg = backend.new_reg(T::TYPE, name)?;
        debug_assert_eq!(backend.reg_bits(reg), T::TYPE.bits());
        Ok(Self {
            backend,
            reg,
            _ty: PhantomData,
        })
    }

    /// Allocate storage initialized with `init`.
    pub fn with_value(backend: &'a B, init: T, name: &str) -> CodegenResult<Self> {
        let value = Self::new(backend, name)?;
        backend.emit_move(T::TYPE, value.reg, Operand::Imm(init.to_imm()))?;
        Ok(value)
    }

    pub fn reg(&self) -> B::Reg {
        self.reg
    }

    pub fn backend(&self) -> &'a B {
        self.backend
    }

    pub fn scalar_type(&self) -> ScalarType {
        T::TYPE
    }

    /// Copy `rhs` into this value.
    pub fn assign(&mut self, rhs: impl IntoOperand<B, T>) -> CodegenResult<&mut Self> {
        self.backend.emit_move(T::TYPE, self.reg, rhs.into_operand())?;
        Ok(self)
    }

    /// Write this value to memory.
    pub fn store_to(&self, dst: &Ref<'_, B, T>) -> CodegenResult<()> {
        self.backend.emit_store(T::TYPE, dst.scalar_mem(), self.reg)
    }

    fn binary(&mut self, op: BinaryOp, rhs: Operand<B>) -> CodegenResult<&mut Self> {
        self.backend.emit_binary(op, T::TYPE, self.reg, rhs)?;
        Ok(self)
    }

    pub fn add_assign(&mut self, rhs: impl IntoOperand<B, T>) -> CodegenResult<&mut Self> {
        self.binary(BinaryOp::Add, rhs.into_operand())
    }

    pub fn sub_assign(&mut self, rhs: impl IntoOperand<B, T>) -> CodegenResult<&mut Self> {
        self.binary(BinaryOp::Sub, rhs.into_operand())
    }

    pub fn and_assign(&mut self, rhs: impl IntoOperand<B, T>) -> CodegenResult<&mut Self> {
        self.binary(BinaryOp::And, rhs.into_operand())
    }

    pub fn or_assign(&mut self, rhs: impl IntoOperand<B, T>) -> CodegenResult<&mut Self> {
        self.binary(BinaryOp::Or, rhs.into_operand())
    }

    pub fn xor_assign(&mut self, rhs: impl IntoOperand<B, T>) -> CodegenResult<&mut Self> {
        self.binary(BinaryOp::Xor, rhs.into_operand())
    }

    fn shift(&mut self, op: ShiftOp, amount: Operand<B>) -> CodegenResult<&mut Self> {
        if let Operand::Imm(imm) = amount {
            let bits = T::TYPE.bits();
            if imm as u64 >= u64::from(bits) {
                return Err(CodegenError::ShiftOutOfRange {
                    amount: imm as u32,
                    bits,
                });
            }
        }
        self.backend.emit_shift(op, T::TYPE, self.reg, amount)?;
        Ok(self)
    }

    pub fn shl_assign(&mut self, amount: impl ShiftAmount<B, T>) -> CodegenResult<&mut Self> {
        self.shift(ShiftOp::Shl, amount.into_amount())
    }

    /// Arithmetic shift for signed `T`, logical shift for unsigned `T`.
    pub fn shr_assign(&mut self, amount: impl ShiftAmount<B, T>) -> CodegenResult<&mut Self> {
        let op = if T::TYPE.signed { ShiftOp::Sar } else { ShiftOp::Shr };
        self.shift(op, amount.into_amount())
    }

    /// Divide by a power of two through a right shift.
    ///
    /// For signed values the shift rounds toward negative infinity, so the
    /// result only equals integer division for non-negative values. Any
    /// other divisor fails before emitting.
    pub fn div_assign(&mut self, divisor: T) -> CodegenResult<&mut Self> {
        let imm = divisor.to_imm();
        let amount = division_shift(imm, T::TYPE.signed)
            .ok_or(CodegenError::UnsupportedDivisor {
                divisor: divisor.to_i128(),
            })?;
        self.shr_assign(amount)
    }

    /// Truncate a wider value into this one.
    pub fn narrow<O: Scalar>(&mut self, src: &Value<'_, B, O>) -> CodegenResult<&mut Self>
    where
        T: NarrowerThan<O>,
    {
        self.backend
            .emit_convert(ConvertOp::Truncate, T::TYPE, self.reg, O::TYPE, src.reg)?;
        Ok(self)
    }

    /// Extend a narrower value into this one, sign- or zero-extending by the
    /// signedness of this (destination) value.
    pub fn widen<O: Scalar>(&mut self, src: &Value<'_, B, O>) -> CodegenResult<&mut Self>
    where
        O: NarrowerThan<T>,
    {
        let op = if T::TYPE.signed {
            ConvertOp::SignExtend
        } else {
            ConvertOp::ZeroExtend
        };
        self.backend.emit_convert(op, T::TYPE, self.reg, O::TYPE, src.reg)?;
        Ok(self)
    }

    fn compare<'v, R>(&'v self, relation: Relation, rhs: R) -> Condition<'v, B>
    where
        R: IntoOperand<B, T> + 'v,
    {
        let flag = ConditionFlag::resolve(relation, T::TYPE.signed);
        Condition::new(
            self.backend,
            T::TYPE,
            Operand::Reg(self.reg),
            rhs.into_operand(),
            flag,
        )
    }

    pub fn cmp_eq<'v, R: IntoOperand<B, T> + 'v>(&'v self, rhs: R) -> Condition<'v, B> {
        self.compare(Relation::Eq, rhs)
    }

    pub fn cmp_ne<'v, R: IntoOperand<B, T> + 'v>(&'v self, rhs: R) -> Condition<'v, B> {
        self.compare(Relation::Ne, rhs)
    }

    pub fn cmp_lt<'v, R: IntoOperand<B, T> + 'v>(&'v self, rhs: R) -> Condition<'v, B> {
        self.compare(Relation::Lt, rhs)
    }

    pub fn cmp_le<'v, R: IntoOperand<B, T> + 'v>(&'v self, rhs: R) -> Condition<'v, B> {
        self.compare(Relation::Le, rhs)
    }

    pub fn cmp_gt<'v, R: IntoOperand<B, T> + 'v>(&'v self, rhs: R) -> Condition<'v, B> {
        self.compare(Relation::Gt, rhs)
    }

    pub fn cmp_ge<'v, R: IntoOperand<B, T> + 'v>(&'v self, rhs: R) -> Condition<'v, B> {
        self.compare(Relation::Ge, rhs)
    }

    /// Return this value from the harness function.
    pub fn ret(&self) -> CodegenResult<()> {
        self.backend.emit_return(T::TYPE, self.reg)
    }
}

impl<B: Backend, T: Scalar> Drop for Value<'_, B, T> {
    fn drop(&mut self) {
        self.backend.release_reg(self.reg);
    }
}

impl<B: Backend, T: Scalar> fmt::Debug for Value<'_, B, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("backend", &self.backend.name())
            .field("reg", &self.reg)
            .field("ty", &T::TYPE)
            .finish()
    }
}
