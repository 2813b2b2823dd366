//! Element types and the type-level contracts of the typed handles.
//!
//! Only plain integers of 1, 2, 4 or 8 bytes can back a [`Value`](super::Value)
//! or a [`Vector`](super::Vector). The restrictions are expressed as traits so
//! that violating them is a compile error rather than a generation-time check:
//!
//! - [`Scalar`] is sealed and implemented for `u8 i8 u16 i16 u32 i32 u64 i64`.
//! - [`NarrowerThan`] orders element types by width for narrow/widen.
//! - [`VectorShape`] lists the 16 legal `[T; N]` vector shapes (128 or 256 bits).
//! - [`ShiftableLane`] excludes byte lanes from vector shifts.
//!
//! ```compile_fail
//! use typed_codegen::{Value, X64Backend};
//!
//! let backend = X64Backend::new().unwrap();
//! let wide = Value::<_, u64>::new(&backend, "wide").unwrap();
//! let mut narrow = Value::<_, u32>::new(&backend, "narrow").unwrap();
//! // widening into a narrower destination does not compile
//! narrow.widen(&wide).unwrap();
//! ```
//!
//! ```compile_fail
//! use typed_codegen::{Value, X64Backend};
//!
//! let backend = X64Backend::new().unwrap();
//! let narrow = Value::<_, u16>::new(&backend, "narrow").unwrap();
//! let mut wide = Value::<_, u64>::new(&backend, "wide").unwrap();
//! // narrowing into a wider destination does not compile
//! wide.narrow(&narrow).unwrap();
//! ```
//!
//! ```compile_fail
//! use typed_codegen::{Value, X64Backend};
//!
//! let backend = X64Backend::new().unwrap();
//! let src = Value::<_, i32>::new(&backend, "src").unwrap();
//! let mut dst = Value::<_, u32>::new(&backend, "dst").unwrap();
//! // equal widths are neither narrower nor wider
//! dst.narrow(&src).unwrap();
//! ```
//!
//! ```compile_fail
//! use typed_codegen::{Value, X64Backend};
//!
//! let backend = X64Backend::new().unwrap();
//! let src = Value::<_, i32>::new(&backend, "src").unwrap();
//! let mut dst = Value::<_, u32>::new(&backend, "dst").unwrap();
//! dst.widen(&src).unwrap();
//! ```
//!
//! ```compile_fail
//! use typed_codegen::{Vector, X64Backend};
//!
//! let backend = X64Backend::new().unwrap();
//! // 3 x 4 bytes is neither 128 nor 256 bits
//! let v = Vector::<_, u32, 3>::new(&backend, "v").unwrap();
//! ```
//!
//! ```compile_fail
//! use typed_codegen::{Vector, X64Backend};
//!
//! let backend = X64Backend::new().unwrap();
//! let mut v = Vector::<_, u8, 16>::new(&backend, "v").unwrap();
//! // byte lanes cannot be shifted
//! v.shr_assign(1).unwrap();
//! ```

use std::fmt;

/// Byte width of an integer element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementWidth {
    Byte = 1,
    Word = 2,
    DWord = 4,
    QWord = 8,
}

impl ElementWidth {
    pub const fn bytes(self) -> u32 {
        self as u32
    }

    pub const fn bits(self) -> u32 {
        self.bytes() * 8
    }

    pub const fn from_bytes(bytes: u32) -> Option<Self> {
        match bytes {
            1 => Some(Self::Byte),
            2 => Some(Self::Word),
            4 => Some(Self::DWord),
            8 => Some(Self::QWord),
            _ => None,
        }
    }
}

/// Width and signedness of a scalar element, as seen by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalarType {
    pub width: ElementWidth,
    pub signed: bool,
}

impl ScalarType {
    pub const fn new(width: ElementWidth, signed: bool) -> Self {
        Self { width, signed }
    }

    pub const fn bits(self) -> u32 {
        self.width.bits()
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.signed { 'i' } else { 'u' };
        write!(f, "{}{}", prefix, self.bits())
    }
}

/// Total size of a SIMD register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorBits {
    /// 128-bit SSE register (xmm).
    V128,
    /// 256-bit AVX register (ymm).
    V256,
}

impl VectorBits {
    pub const fn bits(self) -> u32 {
        match self {
            Self::V128 => 128,
            Self::V256 => 256,
        }
    }

    pub const fn bytes(self) -> u32 {
        self.bits() / 8
    }

    /// Number of lanes of the given width that fit in the register.
    pub const fn lanes(self, lane: ElementWidth) -> u32 {
        self.bytes() / lane.bytes()
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Plain integer usable as the element type of a value or vector.
pub trait Scalar: sealed::Sealed + Copy + fmt::Debug + 'static {
    const TYPE: ScalarType;

    /// Immediate encoding of the value: sign-extended for signed types,
    /// the raw bit pattern for unsigned ones.
    fn to_imm(self) -> i64;

    /// The value itself, losslessly, for diagnostics.
    fn to_i128(self) -> i128;
}

macro_rules! impl_scalar {
    ($($ty:ty => $width:ident, $signed:expr;)*) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Scalar for $ty {
                const TYPE: ScalarType = ScalarType::new(ElementWidth::$width, $signed);

                #[inline]
                fn to_imm(self) -> i64 {
                    self as i64
                }

                #[inline]
                fn to_i128(self) -> i128 {
                    self as i128
                }
            }
        )*
    };
}

impl_scalar! {
    u8 => Byte, false;
    i8 => Byte, true;
    u16 => Word, false;
    i16 => Word, true;
    u32 => DWord, false;
    i32 => DWord, true;
    u64 => QWord, false;
    i64 => QWord, true;
}

/// `Self` is strictly narrower than `O`.
///
/// `narrow` requires `Dest: NarrowerThan<Src>`, `widen` requires
/// `Src: NarrowerThan<Dest>`.
pub trait NarrowerThan<O: Scalar>: Scalar {}

macro_rules! impl_narrower {
    ($($small:ty => [$($wide:ty),*];)*) => {
        $($(impl NarrowerThan<$wide> for $small {})*)*
    };
}

impl_narrower! {
    u8 => [u16, i16, u32, i32, u64, i64];
    i8 => [u16, i16, u32, i32, u64, i64];
    u16 => [u32, i32, u64, i64];
    i16 => [u32, i32, u64, i64];
    u32 => [u64, i64];
    i32 => [u64, i64];
}

/// Legal vector shapes: `size_of::<T>() * N` is 16 or 32 bytes.
pub trait VectorShape {
    const BITS: VectorBits;
}

macro_rules! impl_vector_shape {
    ($($ty:ty: $narrow:literal, $wide:literal;)*) => {
        $(
            impl VectorShape for [$ty; $narrow] {
                const BITS: VectorBits = VectorBits::V128;
            }

            impl VectorShape for [$ty; $wide] {
                const BITS: VectorBits = VectorBits::V256;
            }
        )*
    };
}

impl_vector_shape! {
    u8: 16, 32;
    i8: 16, 32;
    u16: 8, 16;
    i16: 8, 16;
    u32: 4, 8;
    i32: 4, 8;
    u64: 2, 4;
    i64: 2, 4;
}

/// Lane types that vector shifts support (everything but bytes).
pub trait ShiftableLane: Scalar {}

impl ShiftableLane for u16 {}
impl ShiftableLane for i16 {}
impl ShiftableLane for u32 {}
impl ShiftableLane for i32 {}
impl ShiftableLane for u64 {}
impl ShiftableLane for i64 {}

/// Integer types that can index memory through a register.
pub trait IndexScalar: Scalar {}

impl IndexScalar for u64 {}
impl IndexScalar for i64 {}

/// Shift amount equivalent to dividing by `divisor`, if it is a power of two.
///
/// `divisor` is an immediate as produced by [`Scalar::to_imm`]; unsigned
/// divisors are read back as their raw bit pattern.
pub fn division_shift(divisor: i64, signed: bool) -> Option<u32> {
    if signed && divisor <= 0 {
        return None;
    }
    let raw = divisor as u64;
    raw.is_power_of_two().then(|| raw.trailing_zeros())
}
