//! Typed pointers and memory references.
//!
//! A [`Ref`] is the memory operand of loads, stores, in-place arithmetic and
//! comparisons. It carries an element-size tag which starts out as
//! `size_of::<T>()`; vector loads and stores retag it to the full register
//! size as a side effect, so callers must not rely on the tag surviving a
//! vector operation.

use super::backend::{Backend, Mem};
use super::error::{CodegenError, CodegenResult};
use super::types::{IndexScalar, Scalar};
use super::value::Value;
use std::fmt;
use std::marker::PhantomData;

/// Typed pointer held by the backend (a pointer argument of the harness).
pub struct Ptr<'a, B: Backend, T: Scalar> {
    backend: &'a B,
    addr: B::Addr,
    _ty: PhantomData<T>,
}

impl<'a, B: Backend, T: Scalar> Ptr<'a, B, T> {
    /// Pointer held in harness argument `index`.
    pub fn arg(backend: &'a B, index: usize) -> CodegenResult<Self> {
        let addr = backend.pointer_arg(index)?;
        Ok(Self::from_addr(backend, addr))
    }

    pub fn from_addr(backend: &'a B, addr: B::Addr) -> Self {
        Self {
            backend,
            addr,
            _ty: PhantomData,
        }
    }

    pub fn addr(&self) -> B::Addr {
        self.addr
    }

    pub fn backend(&self) -> &'a B {
        self.backend
    }

    /// Same address, different element type.
    pub fn cast<U: Scalar>(&self) -> Ptr<'a, B, U> {
        Ptr::from_addr(self.backend, self.addr)
    }

    /// Element at offset zero.
    pub fn deref(&self) -> Ref<'a, B, T> {
        Ref::from_mem(Mem::new(self.addr))
    }

    /// Element at constant index `index`.
    pub fn at(&self, index: i64) -> CodegenResult<Ref<'a, B, T>> {
        let size = T::TYPE.width.bytes();
        let disp = index
            .checked_mul(i64::from(size))
            .and_then(|disp| i32::try_from(disp).ok())
            .ok_or(CodegenError::DisplacementOverflow { index, size })?;

        let mut mem = Mem::new(self.addr);
        mem.disp = disp;
        Ok(Ref::from_mem(mem))
    }

    /// Element at the index held in `index`, scaled by the element size.
    pub fn index<'v, I: IndexScalar>(&self, index: &'v Value<'a, B, I>) -> Ref<'v, B, T>
    where
        'a: 'v,
    {
        let mut mem = Mem::new(self.addr);
        mem.index = Some(index.reg());
        mem.scale = T::TYPE.width.bytes() as u8;
        Ref::from_mem(mem)
    }
}

impl<B: Backend, T: Scalar> Clone for Ptr<'_, B, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend, T: Scalar> Copy for Ptr<'_, B, T> {}

impl<B: Backend, T: Scalar> fmt::Debug for Ptr<'_, B, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ptr")
            .field("addr", &self.addr)
            .field("elem", &T::TYPE)
            .finish()
    }
}

/// Typed reference to an addressable element.
///
/// The lifetime ties the reference to whatever register it uses as index.
pub struct Ref<'r, B: Backend, T: Scalar> {
    mem: Mem<B>,
    _marker: PhantomData<(&'r (), T)>,
}

impl<'r, B: Backend, T: Scalar> Ref<'r, B, T> {
    /// Reference to `mem`, tagged with the element size.
    pub fn from_mem(mem: Mem<B>) -> Self {
        Self {
            mem: mem.with_size(T::TYPE.width.bytes() as u8),
            _marker: PhantomData,
        }
    }

    /// The memory operand as it would be handed to the backend now.
    pub fn mem(&self) -> Mem<B> {
        self.mem
    }

    /// Current operand size tag in bytes.
    pub fn size_tag(&self) -> Option<u8> {
        self.mem.size
    }

    /// Change the operand size tag. Used by vector operations.
    pub fn set_size(&mut self, bytes: u8) {
        self.mem.size = Some(bytes);
    }

    /// Memory operand for a scalar access, retagged to the element size.
    pub(crate) fn scalar_mem(&self) -> Mem<B> {
        self.mem.with_size(T::TYPE.width.bytes() as u8)
    }

    /// Additional constant byte displacement.
    pub fn offset(mut self, bytes: i32) -> CodegenResult<Self> {
        self.mem.disp = self
            .mem
            .disp
            .checked_add(bytes)
            .ok_or(CodegenError::DisplacementOverflow {
                index: i64::from(bytes),
                size: 1,
            })?;
        Ok(self)
    }
}

impl<B: Backend, T: Scalar> fmt::Debug for Ref<'_, B, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("mem", &self.mem)
            .field("elem", &T::TYPE)
            .finish()
    }
}
