//! Pending comparisons.
//!
//! A [`Condition`] is what `Value::cmp_*` returns. It records both operands,
//! their type and the resolved flag, and emits nothing until a consumer
//! (branch lowering outside this crate, or [`Condition::materialize`]) asks
//! for it.

use super::backend::{Backend, ConditionFlag, Operand};
use super::error::CodegenResult;
use super::types::ScalarType;
use super::value::Value;
use std::fmt;
use std::marker::PhantomData;

/// Relational operator before signedness is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ConditionFlag {
    /// Flag for `relation` on operands of the given signedness.
    pub const fn resolve(relation: Relation, signed: bool) -> Self {
        match (relation, signed) {
            (Relation::Eq, _) => Self::Eq,
            (Relation::Ne, _) => Self::Ne,
            (Relation::Lt, true) => Self::Lt,
            (Relation::Le, true) => Self::Le,
            (Relation::Gt, true) => Self::Gt,
            (Relation::Ge, true) => Self::Ge,
            (Relation::Lt, false) => Self::Below,
            (Relation::Le, false) => Self::BelowEq,
            (Relation::Gt, false) => Self::Above,
            (Relation::Ge, false) => Self::AboveEq,
        }
    }
}

/// Inert description of `lhs flag rhs`.
///
/// Borrows the values it was built from for `'v`.
pub struct Condition<'v, B: Backend> {
    backend: &'v B,
    ty: ScalarType,
    lhs: Operand<B>,
    rhs: Operand<B>,
    flag: ConditionFlag,
    _operands: PhantomData<&'v ()>,
}

impl<'v, B: Backend> Condition<'v, B> {
    pub(crate) fn new(
        backend: &'v B,
        ty: ScalarType,
        lhs: Operand<B>,
        rhs: Operand<B>,
        flag: ConditionFlag,
    ) -> Self {
        Self {
            backend,
            ty,
            lhs,
            rhs,
            flag,
            _operands: PhantomData,
        }
    }

    pub fn lhs(&self) -> Operand<B> {
        self.lhs
    }

    pub fn rhs(&self) -> Operand<B> {
        self.rhs
    }

    pub fn flag(&self) -> ConditionFlag {
        self.flag
    }

    /// Type shared by both operands.
    pub fn operand_type(&self) -> ScalarType {
        self.ty
    }

    /// Condition holding exactly when this one does not.
    pub fn negate(self) -> Self {
        Self {
            flag: self.flag.negate(),
            ..self
        }
    }

    /// Emit the comparison and write 1 or 0 into `dst`.
    pub fn materialize(&self, dst: &mut Value<'_, B, u8>) -> CodegenResult<()> {
        log::trace!("materialize {:?} {} into {:?}", self.flag, self.ty, dst.reg());
        self.backend
            .emit_set_condition(self.flag, self.ty, self.lhs, self.rhs, dst.reg())
    }
}

impl<B: Backend> fmt::Debug for Condition<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("flag", &self.flag)
            .field("ty", &self.ty)
            .field("lhs", &self.lhs)
            .field("rhs", &self.rhs)
            .finish()
    }
}
