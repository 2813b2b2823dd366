//! Typed SIMD values.
//!
//! `Vector<T, N>` holds `N` lanes of `T` in one 128-bit or 256-bit register.
//! The shape is checked by the `[T; N]: VectorShape` bound, so only the 16
//! legal combinations exist.
//!
//! Memory operands of vector operations are always accessed unaligned. Any
//! [`Ref`] passed to `load`, `store` or `add_assign` is retagged to the full
//! register size before it reaches the backend.

use super::backend::{Backend, VectorOperand};
use super::error::{CodegenError, CodegenResult};
use super::memory::Ref;
use super::types::{division_shift, Scalar, ShiftableLane, VectorBits, VectorShape};
use std::fmt;
use std::marker::PhantomData;

/// Right-hand side of `Vector::add_assign`.
pub trait IntoVectorOperand<B: Backend, T: Scalar, const N: usize> {
    fn into_vector_operand(self, bits: VectorBits) -> VectorOperand<B>;
}

impl<B: Backend, T: Scalar, const N: usize> IntoVectorOperand<B, T, N> for &Vector<'_, B, T, N>
where
    [T; N]: VectorShape,
{
    fn into_vector_operand(self, _bits: VectorBits) -> VectorOperand<B> {
        VectorOperand::Reg(self.reg)
    }
}

impl<B: Backend, T: Scalar, const N: usize> IntoVectorOperand<B, T, N> for &mut Ref<'_, B, T>
where
    [T; N]: VectorShape,
{
    fn into_vector_operand(self, bits: VectorBits) -> VectorOperand<B> {
        self.set_size(bits.bytes() as u8);
        VectorOperand::Mem(self.mem())
    }
}

/// Generation-time handle for a SIMD register of `N` lanes of `T`.
pub struct Vector<'a, B: Backend, T: Scalar, const N: usize>
where
    [T; N]: VectorShape,
{
    backend: &'a B,
    reg: B::VReg,
    _ty: PhantomData<T>,
}

impl<'a, B: Backend, T: Scalar, const N: usize> Vector<'a, B, T, N>
where
    [T; N]: VectorShape,
{
    const BITS: VectorBits = <[T; N] as VectorShape>::BITS;

    pub fn new(backend: &'a B, name: &str) -> CodegenResult<Self> {
        let reg = backend.new_vreg(Self::BITS, name)?;
        Ok(Self {
            backend,
            reg,
            _ty: PhantomData,
        })
    }

    /// Number of lanes.
    pub fn width(&self) -> usize {
        N
    }

    /// Register size.
    pub fn bits(&self) -> VectorBits {
        Self::BITS
    }

    pub fn reg(&self) -> B::VReg {
        self.reg
    }

    pub fn backend(&self) -> &'a B {
        self.backend
    }

    /// Unaligned load of `N` consecutive elements starting at `src`.
    pub fn load(&mut self, src: &mut Ref<'_, B, T>) -> CodegenResult<&mut Self> {
        src.set_size(Self::BITS.bytes() as u8);
        self.backend.emit_vector_load(Self::BITS, self.reg, src.mem())?;
        Ok(self)
    }

    /// Unaligned store of all lanes starting at `dst`.
    pub fn store(&self, dst: &mut Ref<'_, B, T>) -> CodegenResult<()> {
        dst.set_size(Self::BITS.bytes() as u8);
        self.backend.emit_vector_store(Self::BITS, dst.mem(), self.reg)
    }

    /// Lane-wise wrapping add.
    pub fn add_assign(&mut self, rhs: impl IntoVectorOperand<B, T, N>) -> CodegenResult<&mut Self> {
        let src = rhs.into_vector_operand(Self::BITS);
        self.backend
            .emit_vector_add(T::TYPE.width, Self::BITS, self.reg, src)?;
        Ok(self)
    }

    /// Lane-wise logical right shift, regardless of the signedness of `T`.
    pub fn shr_assign(&mut self, amount: u32) -> CodegenResult<&mut Self>
    where
        T: ShiftableLane,
    {
        let bits = T::TYPE.bits();
        if amount >= bits {
            return Err(CodegenError::ShiftOutOfRange { amount, bits });
        }
        self.backend
            .emit_vector_shr(T::TYPE.width, Self::BITS, self.reg, amount as u8)?;
        Ok(self)
    }

    /// Lane-wise division by a power of two through a logical right shift.
    pub fn div_assign(&mut self, divisor: T) -> CodegenResult<&mut Self>
    where
        T: ShiftableLane,
    {
        let imm = divisor.to_imm();
        let amount = division_shift(imm, T::TYPE.signed)
            .ok_or(CodegenError::UnsupportedDivisor {
                divisor: divisor.to_i128(),
            })?;
        self.shr_assign(amount)
    }
}

impl<B: Backend, T: Scalar, const N: usize> Drop for Vector<'_, B, T, N>
where
    [T; N]: VectorShape,
{
    fn drop(&mut self) {
        self.backend.release_vreg(self.reg);
    }
}

impl<B: Backend, T: Scalar, const N: usize> fmt::Debug for Vector<'_, B, T, N>
where
    [T; N]: VectorShape,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vector")
            .field("backend", &self.backend.name())
            .field("reg", &self.reg)
            .field("lane", &T::TYPE)
            .field("lanes", &N)
            .finish()
    }
}

/// Allocate a vector and load it from `src`.
pub fn make_vector<'a, B: Backend, T: Scalar, const N: usize>(
    backend: &'a B,
    src: &mut Ref<'_, B, T>,
) -> CodegenResult<Vector<'a, B, T, N>>
where
    [T; N]: VectorShape,
{
    let mut vector = Vector::new(backend, "vec")?;
    vector.load(src)?;
    Ok(vector)
}
