// This module implements the Backend trait on top of inkwell's IR builder. Instead of choosing
// machine instructions it expresses every primitive as LLVM IR and leaves selection to LLVM.
// One backend instance builds exactly one function with the fixed harness signature
// i64 (i8*, i8*, i8*) in its own module. Scalar values are stack slots (alloca of iN) and
// vectors are allocas of <N x iK>; every operation loads its operands, applies the IR
// instruction (add, sub, and, or, xor, shl, lshr, ashr, trunc, sext, zext, icmp) and stores
// the result back, so values behave like mutable registers even though LLVM IR is SSA.
// Memory operands become a byte GEP from the i8* base (index * scale + displacement) followed
// by a pointer cast to the accessed type, and all accesses through them use alignment 1 to
// match the unaligned semantics of the native backend. Relational flags map onto the signed
// or unsigned integer predicates, and materialized comparisons are zero-extended to i8.
// Finalization verifies the module and JIT-compiles it with the MCJIT execution engine.

//! LLVM IR backend (cargo feature `llvm`).

use crate::core::backend::{
    Backend, BinaryOp, ConditionFlag, ConvertOp, EntryPoint, Mem, Operand, ShiftOp, VectorOperand,
    POINTER_ARGS,
};
use crate::core::error::{CodegenError, CodegenResult};
use crate::core::stats::EmissionStats;
use crate::core::types::{ElementWidth, ScalarType, VectorBits};
use inkwell::builder::{Builder, BuilderError};
use inkwell::context::Context;
use inkwell::execution_engine::{ExecutionEngine, JitFunction};
use inkwell::module::Module;
use inkwell::targets::{InitializationConfig, Target};
use inkwell::types::{BasicType, BasicTypeEnum, IntType, PointerType, VectorType};
use inkwell::values::{BasicValue, BasicValueEnum, FunctionValue, IntValue, PointerValue, VectorValue};
use inkwell::{AddressSpace, IntPredicate, OptimizationLevel};
use std::cell::{Cell, RefCell};

fn builder_error(err: BuilderError) -> CodegenError {
    CodegenError::Builder {
        reason: err.to_string(),
    }
}

fn alignment_error(reason: &'static str) -> CodegenError {
    CodegenError::Builder {
        reason: reason.to_string(),
    }
}

/// Integer predicate for a resolved condition flag.
pub fn predicate(flag: ConditionFlag) -> IntPredicate {
    match flag {
        ConditionFlag::Eq => IntPredicate::EQ,
        ConditionFlag::Ne => IntPredicate::NE,
        ConditionFlag::Lt => IntPredicate::SLT,
        ConditionFlag::Le => IntPredicate::SLE,
        ConditionFlag::Gt => IntPredicate::SGT,
        ConditionFlag::Ge => IntPredicate::SGE,
        ConditionFlag::Below => IntPredicate::ULT,
        ConditionFlag::BelowEq => IntPredicate::ULE,
        ConditionFlag::Above => IntPredicate::UGT,
        ConditionFlag::AboveEq => IntPredicate::UGE,
    }
}

/// Stack slot backing a scalar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot<'ctx> {
    pub ptr: PointerValue<'ctx>,
    pub ty: IntType<'ctx>,
}

/// Stack slot backing a vector value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorSlot<'ctx> {
    pub ptr: PointerValue<'ctx>,
    pub ty: VectorType<'ctx>,
}

/// Code generation backend building one LLVM IR function.
pub struct LlvmBackend<'ctx> {
    context: &'ctx Context,
    module: Module<'ctx>,
    builder: Builder<'ctx>,
    function: FunctionValue<'ctx>,
    function_name: String,
    stats: RefCell<EmissionStats>,
    returned: Cell<bool>,
}

impl<'ctx> LlvmBackend<'ctx> {
    /// Start a harness function called `name` in a fresh module.
    pub fn new(context: &'ctx Context, name: &str) -> Self {
        let module = context.create_module("typed_codegen");
        let byte_ptr = context.i8_type().ptr_type(AddressSpace::default());
        let fn_type = context.i64_type().fn_type(
            &[byte_ptr.into(), byte_ptr.into(), byte_ptr.into()],
            false,
        );
        let function = module.add_function(name, fn_type, None);
        let entry = context.append_basic_block(function, "entry");
        let builder = context.create_builder();
        builder.position_at_end(entry);

        log::debug!("llvm backend: function {}", name);

        Self {
            context,
            module,
            builder,
            function,
            function_name: name.to_string(),
            stats: RefCell::new(EmissionStats::new()),
            returned: Cell::new(false),
        }
    }

    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    /// Textual IR of the module.
    pub fn print_ir(&self) -> String {
        self.module.print_to_string().to_string()
    }

    /// Verify the module and JIT-compile the function.
    pub fn finalize(self) -> CodegenResult<LlvmJit<'ctx>> {
        if !self.returned.get() {
            return Err(CodegenError::MissingReturn);
        }
        self.module.verify().map_err(|e| CodegenError::Jit {
            reason: e.to_string(),
        })?;

        Target::initialize_native(&InitializationConfig::default())
            .map_err(|reason| CodegenError::Jit { reason })?;
        let engine = self
            .module
            .create_jit_execution_engine(OptimizationLevel::None)
            .map_err(|e| CodegenError::Jit {
                reason: e.to_string(),
            })?;
        // SAFETY: the function was built with the harness signature.
        let function = unsafe { engine.get_function::<EntryPoint>(&self.function_name) }.map_err(
            |e| CodegenError::Jit {
                reason: e.to_string(),
            },
        )?;

        log::debug!("llvm backend: finalized {}", self.function_name);
        Ok(LlvmJit {
            function,
            _engine: engine,
            _module: self.module,
        })
    }

    fn record(&self, opcode: &'static str) {
        self.stats.borrow_mut().record_instruction(opcode);
        log::trace!("   Generated: {}", opcode);
    }

    fn int_type(&self, width: ElementWidth) -> IntType<'ctx> {
        match width {
            ElementWidth::Byte => self.context.i8_type(),
            ElementWidth::Word => self.context.i16_type(),
            ElementWidth::DWord => self.context.i32_type(),
            ElementWidth::QWord => self.context.i64_type(),
        }
    }

    fn vector_type(&self, lane: ElementWidth, bits: VectorBits) -> VectorType<'ctx> {
        self.int_type(lane).vec_type(bits.lanes(lane))
    }

    fn load_slot(&self, slot: Slot<'ctx>) -> CodegenResult<IntValue<'ctx>> {
        let value = self
            .builder
            .build_load(slot.ty, slot.ptr, "")
            .map_err(builder_error)?;
        self.record("load");
        Ok(value.into_int_value())
    }

    fn store_slot(&self, ptr: PointerValue<'ctx>, value: impl BasicValue<'ctx>) -> CodegenResult<()> {
        self.builder.build_store(ptr, value).map_err(builder_error)?;
        self.record("store");
        Ok(())
    }

    fn load_vector_slot(&self, slot: VectorSlot<'ctx>) -> CodegenResult<VectorValue<'ctx>> {
        let value = self
            .builder
            .build_load(slot.ty, slot.ptr, "")
            .map_err(builder_error)?;
        self.record("load");
        Ok(value.into_vector_value())
    }

    /// Typed pointer for a memory operand, after checking its size tag.
    fn address(
        &self,
        mem: Mem<Self>,
        bytes: u32,
        ptr_ty: PointerType<'ctx>,
    ) -> CodegenResult<PointerValue<'ctx>> {
        if mem.size.map(u32::from) != Some(bytes) {
            return Err(CodegenError::OperandSize {
                expected: bytes,
                found: mem.size,
            });
        }

        let i64_type = self.context.i64_type();
        let disp = i64_type.const_int(mem.disp as u64, true);
        let offset = match mem.index {
            None => disp,
            Some(index) => {
                let mut index = self.load_slot(index)?;
                if index.get_type() != i64_type {
                    index = self
                        .builder
                        .build_int_z_extend(index, i64_type, "")
                        .map_err(builder_error)?;
                    self.record("zext");
                }
                let scaled = self
                    .builder
                    .build_int_mul(index, i64_type.const_int(u64::from(mem.scale), false), "")
                    .map_err(builder_error)?;
                self.record("mul");
                let offset = self
                    .builder
                    .build_int_add(scaled, disp, "")
                    .map_err(builder_error)?;
                self.record("add");
                offset
            }
        };

        // SAFETY: the byte offset stays within the caller-provided buffer.
        let byte_addr = unsafe {
            self.builder
                .build_gep(self.context.i8_type(), mem.base, &[offset], "")
        }
        .map_err(builder_error)?;
        self.record("getelementptr");

        let typed = self
            .builder
            .build_pointer_cast(byte_addr, ptr_ty, "")
            .map_err(builder_error)?;
        self.record("bitcast");
        Ok(typed)
    }

    /// Load with alignment 1 through a memory operand.
    fn load_unaligned(
        &self,
        ty: BasicTypeEnum<'ctx>,
        mem: Mem<Self>,
        bytes: u32,
    ) -> CodegenResult<BasicValueEnum<'ctx>> {
        let ptr = self.address(mem, bytes, ty.ptr_type(AddressSpace::default()))?;
        let value = self.builder.build_load(ty, ptr, "").map_err(builder_error)?;
        if let Some(inst) = value.as_instruction_value() {
            inst.set_alignment(1).map_err(alignment_error)?;
        }
        self.record("load");
        Ok(value)
    }

    /// Store with alignment 1 through a memory operand.
    fn store_unaligned(
        &self,
        value: BasicValueEnum<'ctx>,
        mem: Mem<Self>,
        bytes: u32,
    ) -> CodegenResult<()> {
        let ptr = self.address(mem, bytes, value.get_type().ptr_type(AddressSpace::default()))?;
        let inst = self.builder.build_store(ptr, value).map_err(builder_error)?;
        inst.set_alignment(1).map_err(alignment_error)?;
        self.record("store");
        Ok(())
    }

    fn operand_value(&self, ty: ScalarType, operand: Operand<Self>) -> CodegenResult<IntValue<'ctx>> {
        let int_type = self.int_type(ty.width);
        match operand {
            Operand::Reg(slot) => self.load_slot(slot),
            Operand::Imm(imm) => Ok(int_type.const_int(imm as u64, false)),
            Operand::Mem(mem) => Ok(self
                .load_unaligned(int_type.into(), mem, ty.width.bytes())?
                .into_int_value()),
        }
    }
}

impl<'ctx> Backend for LlvmBackend<'ctx> {
    type Reg = Slot<'ctx>;
    type VReg = VectorSlot<'ctx>;
    type Addr = PointerValue<'ctx>;

    fn name(&self) -> &'static str {
        "llvm"
    }

    fn new_reg(&self, ty: ScalarType, name: &str) -> CodegenResult<Slot<'ctx>> {
        let int_type = self.int_type(ty.width);
        let ptr = self.builder.build_alloca(int_type, name).map_err(builder_error)?;
        self.record("alloca");
        self.stats.borrow_mut().record_register_allocated();
        Ok(Slot { ptr, ty: int_type })
    }

    fn new_vreg(&self, bits: VectorBits, name: &str) -> CodegenResult<VectorSlot<'ctx>> {
        // the lane split is irrelevant for storage, operations reinterpret it
        let ty = self.vector_type(ElementWidth::Byte, bits);
        let ptr = self.builder.build_alloca(ty, name).map_err(builder_error)?;
        self.record("alloca");
        self.stats.borrow_mut().record_vector_register_allocated();
        Ok(VectorSlot { ptr, ty })
    }

    fn release_reg(&self, _reg: Slot<'ctx>) {
        self.stats.borrow_mut().record_register_released();
    }

    fn release_vreg(&self, _reg: VectorSlot<'ctx>) {
        self.stats.borrow_mut().record_register_released();
    }

    fn reg_bits(&self, reg: Slot<'ctx>) -> u32 {
        reg.ty.get_bit_width()
    }

    fn emit_move(&self, ty: ScalarType, dst: Slot<'ctx>, src: Operand<Self>) -> CodegenResult<()> {
        let value = self.operand_value(ty, src)?;
        self.store_slot(dst.ptr, value)
    }

    fn emit_store(&self, ty: ScalarType, dst: Mem<Self>, src: Slot<'ctx>) -> CodegenResult<()> {
        let value = self.load_slot(src)?;
        self.store_unaligned(value.into(), dst, ty.width.bytes())
    }

    fn emit_binary(
        &self,
        op: BinaryOp,
        ty: ScalarType,
        dst: Slot<'ctx>,
        src: Operand<Self>,
    ) -> CodegenResult<()> {
        let lhs = self.load_slot(dst)?;
        let rhs = self.operand_value(ty, src)?;
        let (result, opcode) = match op {
            BinaryOp::Add => (self.builder.build_int_add(lhs, rhs, ""), "add"),
            BinaryOp::Sub => (self.builder.build_int_sub(lhs, rhs, ""), "sub"),
            BinaryOp::And => (self.builder.build_and(lhs, rhs, ""), "and"),
            BinaryOp::Or => (self.builder.build_or(lhs, rhs, ""), "or"),
            BinaryOp::Xor => (self.builder.build_xor(lhs, rhs, ""), "xor"),
        };
        let result = result.map_err(builder_error)?;
        self.record(opcode);
        self.store_slot(dst.ptr, result)
    }

    fn emit_shift(
        &self,
        op: ShiftOp,
        ty: ScalarType,
        dst: Slot<'ctx>,
        amount: Operand<Self>,
    ) -> CodegenResult<()> {
        if let Operand::Mem(_) = amount {
            return Err(CodegenError::UnsupportedOperand {
                operation: "shift",
                reason: "shift amount cannot come from memory",
            });
        }
        let value = self.load_slot(dst)?;
        let amount = self.operand_value(ty, amount)?;
        let (result, opcode) = match op {
            ShiftOp::Shl => (self.builder.build_left_shift(value, amount, ""), "shl"),
            ShiftOp::Shr => (self.builder.build_right_shift(value, amount, false, ""), "lshr"),
            ShiftOp::Sar => (self.builder.build_right_shift(value, amount, true, ""), "ashr"),
        };
        let result = result.map_err(builder_error)?;
        self.record(opcode);
        self.store_slot(dst.ptr, result)
    }

    fn emit_convert(
        &self,
        op: ConvertOp,
        dst_ty: ScalarType,
        dst: Slot<'ctx>,
        _src_ty: ScalarType,
        src: Slot<'ctx>,
    ) -> CodegenResult<()> {
        let value = self.load_slot(src)?;
        let target = self.int_type(dst_ty.width);
        let (result, opcode) = match op {
            ConvertOp::Truncate => (self.builder.build_int_truncate(value, target, ""), "trunc"),
            ConvertOp::SignExtend => (self.builder.build_int_s_extend(value, target, ""), "sext"),
            ConvertOp::ZeroExtend => (self.builder.build_int_z_extend(value, target, ""), "zext"),
        };
        let result = result.map_err(builder_error)?;
        self.record(opcode);
        self.store_slot(dst.ptr, result)
    }

    fn emit_set_condition(
        &self,
        flag: ConditionFlag,
        ty: ScalarType,
        lhs: Operand<Self>,
        rhs: Operand<Self>,
        dst: Slot<'ctx>,
    ) -> CodegenResult<()> {
        let lhs = self.operand_value(ty, lhs)?;
        let rhs = self.operand_value(ty, rhs)?;
        let bit = self
            .builder
            .build_int_compare(predicate(flag), lhs, rhs, "")
            .map_err(builder_error)?;
        self.record("icmp");
        let byte = self
            .builder
            .build_int_z_extend(bit, self.context.i8_type(), "")
            .map_err(builder_error)?;
        self.record("zext");
        self.store_slot(dst.ptr, byte)
    }

    fn emit_vector_load(&self, bits: VectorBits, dst: VectorSlot<'ctx>, src: Mem<Self>) -> CodegenResult<()> {
        let value = self.load_unaligned(dst.ty.into(), src, bits.bytes())?;
        self.store_slot(dst.ptr, value)
    }

    fn emit_vector_store(&self, bits: VectorBits, dst: Mem<Self>, src: VectorSlot<'ctx>) -> CodegenResult<()> {
        let value = self.load_vector_slot(src)?;
        self.store_unaligned(value.into(), dst, bits.bytes())
    }

    fn emit_vector_add(
        &self,
        lane: ElementWidth,
        bits: VectorBits,
        dst: VectorSlot<'ctx>,
        src: VectorOperand<Self>,
    ) -> CodegenResult<()> {
        let ty = self.vector_type(lane, bits);
        let lhs = self.load_vector_slot(VectorSlot { ptr: self.cast_slot(dst, ty)?, ty })?;
        let rhs = match src {
            VectorOperand::Reg(slot) => {
                self.load_vector_slot(VectorSlot { ptr: self.cast_slot(slot, ty)?, ty })?
            }
            VectorOperand::Mem(mem) => self
                .load_unaligned(ty.into(), mem, bits.bytes())?
                .into_vector_value(),
        };
        let sum = self.builder.build_int_add(lhs, rhs, "").map_err(builder_error)?;
        self.record("add");
        self.store_slot(self.cast_slot(dst, ty)?, sum)
    }

    fn emit_vector_shr(
        &self,
        lane: ElementWidth,
        bits: VectorBits,
        dst: VectorSlot<'ctx>,
        amount: u8,
    ) -> CodegenResult<()> {
        if u32::from(amount) >= lane.bits() {
            return Err(CodegenError::ShiftOutOfRange {
                amount: u32::from(amount),
                bits: lane.bits(),
            });
        }
        let ty = self.vector_type(lane, bits);
        let slot = VectorSlot { ptr: self.cast_slot(dst, ty)?, ty };
        let value = self.load_vector_slot(slot)?;

        let lane_amount = self.int_type(lane).const_int(u64::from(amount), false);
        let splat = VectorType::const_vector(&vec![lane_amount; bits.lanes(lane) as usize]);
        let shifted = self
            .builder
            .build_right_shift(value, splat, false, "")
            .map_err(builder_error)?;
        self.record("lshr");
        self.store_slot(slot.ptr, shifted)
    }

    fn pointer_arg(&self, index: usize) -> CodegenResult<PointerValue<'ctx>> {
        self.function
            .get_nth_param(index as u32)
            .map(|param| param.into_pointer_value())
            .ok_or(CodegenError::ArgumentOutOfRange {
                index,
                available: POINTER_ARGS,
            })
    }

    fn emit_return(&self, ty: ScalarType, src: Slot<'ctx>) -> CodegenResult<()> {
        let mut value = self.load_slot(src)?;
        if ty.width != ElementWidth::QWord {
            value = self
                .builder
                .build_int_z_extend(value, self.context.i64_type(), "")
                .map_err(builder_error)?;
            self.record("zext");
        }
        self.builder.build_return(Some(&value)).map_err(builder_error)?;
        self.record("ret");
        self.returned.set(true);
        Ok(())
    }

    fn stats(&self) -> EmissionStats {
        self.stats.borrow().clone()
    }
}

impl<'ctx> LlvmBackend<'ctx> {
    /// View a vector slot through a pointer to `ty`.
    fn cast_slot(&self, slot: VectorSlot<'ctx>, ty: VectorType<'ctx>) -> CodegenResult<PointerValue<'ctx>> {
        if slot.ty == ty {
            return Ok(slot.ptr);
        }
        let ptr = self
            .builder
            .build_pointer_cast(slot.ptr, ty.ptr_type(AddressSpace::default()), "")
            .map_err(builder_error)?;
        self.record("bitcast");
        Ok(ptr)
    }
}

/// JIT-compiled harness function.
pub struct LlvmJit<'ctx> {
    function: JitFunction<'ctx, EntryPoint>,
    _engine: ExecutionEngine<'ctx>,
    _module: Module<'ctx>,
}

impl LlvmJit<'_> {
    /// Call the function with three pointer arguments.
    ///
    /// # Safety
    ///
    /// Every pointer must be valid for all accesses the generated code makes
    /// through it.
    pub unsafe fn call(&self, arg0: *mut u8, arg1: *mut u8, arg2: *mut u8) -> u64 {
        self.function.call(arg0, arg1, arg2)
    }
}
