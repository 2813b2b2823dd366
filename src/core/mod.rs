// This module is the backend-independent half of the crate: the typed handles that
// generation code works with and the capability trait those handles drive. It exports the
// element-type contracts (sealed Scalar, NarrowerThan, VectorShape, ShiftableLane), the
// Backend trait with its operand descriptors, the scalar Value and SIMD Vector handles, the
// Ptr/Ref pair for addressing memory, the inert Condition produced by comparisons, the error
// type shared by every backend, emission statistics, and the physical register pool that
// register-based backends allocate from. Nothing here knows about a concrete instruction set
// or IR; every instruction choice happens behind the Backend trait.

//! Backend-independent typed code generation.
//!
//! # Key Components
//!
//! ## Typed handles (`value`, `vector`, `memory`, `condition`)
//! - [`Value`] for one integer, [`Vector`] for a SIMD register
//! - [`Ptr`]/[`Ref`] for typed memory operands
//! - [`Condition`] for comparisons that have not been consumed yet
//!
//! ## Backend interface (`backend`)
//! - The [`Backend`] trait and operand descriptors
//! - The three-pointer function harness signature
//!
//! ## Support (`types`, `error`, `stats`, `register_file`)
//! - Compile-time element contracts
//! - [`CodegenError`] and [`EmissionStats`]
//! - Physical register pool with bitset tracking

pub mod backend;
pub mod condition;
pub mod error;
pub mod memory;
pub mod register_file;
pub mod stats;
pub mod types;
pub mod value;
pub mod vector;

pub use backend::{
    Backend,
    BinaryOp,
    ConditionFlag,
    ConvertOp,
    EntryPoint,
    Mem,
    Operand,
    ShiftOp,
    VectorOperand,
    POINTER_ARGS,
};

pub use condition::{Condition, Relation};

pub use error::{CodegenError, CodegenResult};

pub use memory::{Ptr, Ref};

pub use register_file::{AsmReg, RegAllocError, RegBitSet, RegisterFile};

pub use stats::EmissionStats;

pub use types::{
    ElementWidth,
    IndexScalar,
    NarrowerThan,
    Scalar,
    ScalarType,
    ShiftableLane,
    VectorBits,
    VectorShape,
};

pub use value::{IntoOperand, ShiftAmount, Value};

pub use vector::{make_vector, IntoVectorOperand, Vector};
