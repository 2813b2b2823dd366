//! x86-64 backend.
//!
//! Values live in physical registers for their whole lifetime. The pool
//! excludes `rcx` (shift counts), `r11` (scratch for wide immediates and
//! non-register comparison operands), `rsp`/`rbp` and the three pointer
//! argument registers `rdi`, `rsi`, `rdx`. XMM/YMM 0-14 are available for
//! vectors, `xmm15` stages unaligned 128-bit add operands.
//!
//! The harness prologue is emitted at construction; [`Backend::emit_return`]
//! emits the matching epilogue.

use super::encoder::{Address, X64Encoder};
use super::jit::JitCode;
use crate::core::backend::{
    Backend, BinaryOp, ConditionFlag, ConvertOp, Mem, Operand, ShiftOp, VectorOperand, POINTER_ARGS,
};
use crate::core::error::{CodegenError, CodegenResult};
use crate::core::register_file::{AsmReg, RegBitSet, RegId, RegisterFile, GP_BANK, VEC_BANK};
use crate::core::stats::EmissionStats;
use crate::core::types::{ElementWidth, ScalarType, VectorBits};
use std::cell::{Cell, RefCell};

const RAX: AsmReg = AsmReg::gp(0);
const RCX: AsmReg = AsmReg::gp(1);
const RSP: AsmReg = AsmReg::gp(4);
const RBP: AsmReg = AsmReg::gp(5);
const R11: AsmReg = AsmReg::gp(11);
const XMM15: AsmReg = AsmReg::vec(15);

/// General-purpose registers handed out to values.
const GP_POOL: [RegId; 9] = [0, 3, 8, 9, 10, 12, 13, 14, 15];

/// rdi, rsi, rdx.
const ARG_REGS: [AsmReg; POINTER_ARGS] = [AsmReg::gp(7), AsmReg::gp(6), AsmReg::gp(2)];

/// rbx, r12-r15, saved after rbp.
const CALLEE_SAVED: [AsmReg; 5] = [
    AsmReg::gp(3),
    AsmReg::gp(12),
    AsmReg::gp(13),
    AsmReg::gp(14),
    AsmReg::gp(15),
];

/// Register holding a scalar value, with the width it is accessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct X64Reg {
    pub reg: AsmReg,
    pub width: ElementWidth,
}

/// Configuration of an [`X64Backend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X64Config {
    /// Allow 256-bit (AVX2) vectors. Defaults to what the host supports.
    pub allow_avx2: bool,
    /// Address the code is assembled for.
    pub base_address: u64,
}

impl Default for X64Config {
    fn default() -> Self {
        Self {
            allow_avx2: host_supports_avx2(),
            base_address: 0,
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn host_supports_avx2() -> bool {
    std::arch::is_x86_feature_detected!("avx2")
}

#[cfg(not(target_arch = "x86_64"))]
fn host_supports_avx2() -> bool {
    true
}

/// Code generation backend emitting x86-64 machine code.
pub struct X64Backend {
    config: X64Config,
    encoder: RefCell<X64Encoder>,
    registers: RefCell<RegisterFile>,
    used_ymm: Cell<bool>,
    returned: Cell<bool>,
}

impl X64Backend {
    /// Backend with the default configuration.
    pub fn new() -> CodegenResult<Self> {
        Self::with_config(X64Config::default())
    }

    pub fn with_config(config: X64Config) -> CodegenResult<Self> {
        let mut allocatable = RegBitSet::from_ids(GP_BANK, &GP_POOL);
        allocatable.union(&RegBitSet::from_ids(VEC_BANK, &(0..15).collect::<Vec<RegId>>()));

        log::debug!("x64 backend: avx2={}, base=0x{:x}", config.allow_avx2, config.base_address);

        let backend = Self {
            config,
            encoder: RefCell::new(X64Encoder::new()?),
            registers: RefCell::new(RegisterFile::new(allocatable)),
            used_ymm: Cell::new(false),
            returned: Cell::new(false),
        };
        backend.emit_prologue()?;
        Ok(backend)
    }

    pub fn config(&self) -> &X64Config {
        &self.config
    }

    fn emit_prologue(&self) -> CodegenResult<()> {
        let mut encoder = self.encoder.borrow_mut();
        encoder.push(RBP)?;
        encoder.mov_reg_reg(ElementWidth::QWord, RBP, RSP)?;
        for reg in CALLEE_SAVED {
            encoder.push(reg)?;
        }
        Ok(())
    }

    fn emit_epilogue(&self, encoder: &mut X64Encoder) -> CodegenResult<()> {
        if self.used_ymm.get() {
            encoder.vzeroupper()?;
        }
        for reg in CALLEE_SAVED.iter().rev() {
            encoder.pop(*reg)?;
        }
        encoder.pop(RBP)?;
        encoder.ret()
    }

    /// Machine code for everything emitted so far.
    pub fn assemble(&self) -> CodegenResult<Vec<u8>> {
        if !self.returned.get() {
            return Err(CodegenError::MissingReturn);
        }
        self.encoder.borrow_mut().assemble(self.config.base_address)
    }

    /// Assemble and map the function executable.
    pub fn finalize(self) -> CodegenResult<JitCode> {
        let code = self.assemble()?;
        log::debug!("x64 backend: finalized {} bytes", code.len());
        JitCode::new(&code)
    }

    /// Translate a memory operand, checking its size tag against `bytes`.
    fn address(&self, mem: Mem<Self>, bytes: u32) -> CodegenResult<Address> {
        if mem.size.map(u32::from) != Some(bytes) {
            return Err(CodegenError::OperandSize {
                expected: bytes,
                found: mem.size,
            });
        }
        Ok(Address {
            base: mem.base,
            index: mem.index.map(|index| index.reg),
            scale: mem.scale,
            disp: mem.disp,
        })
    }

    fn check_vector_bits(&self, bits: VectorBits, operation: &'static str) -> CodegenResult<()> {
        if bits == VectorBits::V256 && !self.config.allow_avx2 {
            return Err(CodegenError::UnsupportedWidth {
                operation,
                width: bits.bits(),
            });
        }
        Ok(())
    }

    /// Load a non-register operand into `scratch` so it can be used where a
    /// register is required.
    fn load_operand(
        &self,
        encoder: &mut X64Encoder,
        ty: ScalarType,
        operand: Operand<Self>,
        scratch: AsmReg,
    ) -> CodegenResult<AsmReg> {
        match operand {
            Operand::Reg(reg) => Ok(reg.reg),
            Operand::Imm(imm) => {
                encoder.mov_reg_imm(ty.width, scratch, truncate_imm(ty.width, imm))?;
                Ok(scratch)
            }
            Operand::Mem(mem) => {
                let addr = self.address(mem, ty.width.bytes())?;
                encoder.mov_reg_mem(ty.width, scratch, addr)?;
                Ok(scratch)
            }
        }
    }
}

/// Truncate an immediate to `width`, sign-extended back to i64. Only qword
/// immediates keep bits above 32.
fn truncate_imm(width: ElementWidth, imm: i64) -> i64 {
    match width {
        ElementWidth::Byte => i64::from(imm as i8),
        ElementWidth::Word => i64::from(imm as i16),
        ElementWidth::DWord => i64::from(imm as i32),
        ElementWidth::QWord => imm,
    }
}

/// The immediate as a sign-extended imm32, if it has one.
fn imm32(width: ElementWidth, imm: i64) -> Option<i32> {
    i32::try_from(truncate_imm(width, imm)).ok()
}

impl Backend for X64Backend {
    type Reg = X64Reg;
    type VReg = AsmReg;
    type Addr = AsmReg;

    fn name(&self) -> &'static str {
        "x64"
    }

    fn new_reg(&self, ty: ScalarType, name: &str) -> CodegenResult<X64Reg> {
        let mut registers = self.registers.borrow_mut();
        let reg = registers
            .allocate_reg(GP_BANK)
            .map_err(|e| CodegenError::RegisterAllocation {
                reason: e.to_string(),
            })?;
        self.encoder.borrow_mut().stats_mut().record_register_allocated();
        let (used, total) = registers.bank_usage(GP_BANK);
        log::debug!("allocated {:?} for {} ({}), {}/{} in use", reg, name, ty, used, total);
        Ok(X64Reg {
            reg,
            width: ty.width,
        })
    }

    fn new_vreg(&self, bits: VectorBits, name: &str) -> CodegenResult<AsmReg> {
        self.check_vector_bits(bits, "vector register")?;
        let reg = self
            .registers
            .borrow_mut()
            .allocate_reg(VEC_BANK)
            .map_err(|e| CodegenError::RegisterAllocation {
                reason: e.to_string(),
            })?;
        if bits == VectorBits::V256 {
            self.used_ymm.set(true);
        }
        self.encoder
            .borrow_mut()
            .stats_mut()
            .record_vector_register_allocated();
        log::debug!("allocated {:?} for {} ({}-bit)", reg, name, bits.bits());
        Ok(reg)
    }

    fn release_reg(&self, reg: X64Reg) {
        match self.registers.borrow_mut().free_register(reg.reg) {
            Ok(()) => self.encoder.borrow_mut().stats_mut().record_register_released(),
            Err(e) => log::warn!("release of {:?} failed: {}", reg, e),
        }
    }

    fn release_vreg(&self, reg: AsmReg) {
        match self.registers.borrow_mut().free_register(reg) {
            Ok(()) => self.encoder.borrow_mut().stats_mut().record_register_released(),
            Err(e) => log::warn!("release of {:?} failed: {}", reg, e),
        }
    }

    fn reg_bits(&self, reg: X64Reg) -> u32 {
        reg.width.bits()
    }

    fn emit_move(&self, ty: ScalarType, dst: X64Reg, src: Operand<Self>) -> CodegenResult<()> {
        let mut encoder = self.encoder.borrow_mut();
        match src {
            Operand::Reg(src) => encoder.mov_reg_reg(ty.width, dst.reg, src.reg),
            Operand::Imm(imm) => encoder.mov_reg_imm(ty.width, dst.reg, truncate_imm(ty.width, imm)),
            Operand::Mem(mem) => {
                let addr = self.address(mem, ty.width.bytes())?;
                encoder.mov_reg_mem(ty.width, dst.reg, addr)
            }
        }
    }

    fn emit_store(&self, ty: ScalarType, dst: Mem<Self>, src: X64Reg) -> CodegenResult<()> {
        let addr = self.address(dst, ty.width.bytes())?;
        self.encoder.borrow_mut().mov_mem_reg(ty.width, addr, src.reg)
    }

    fn emit_binary(
        &self,
        op: BinaryOp,
        ty: ScalarType,
        dst: X64Reg,
        src: Operand<Self>,
    ) -> CodegenResult<()> {
        let mut encoder = self.encoder.borrow_mut();
        match src {
            Operand::Reg(src) => encoder.alu_reg_reg(op, ty.width, dst.reg, src.reg),
            Operand::Mem(mem) => {
                let addr = self.address(mem, ty.width.bytes())?;
                encoder.alu_reg_mem(op, ty.width, dst.reg, addr)
            }
            Operand::Imm(imm) => match imm32(ty.width, imm) {
                Some(imm) => encoder.alu_reg_imm(op, ty.width, dst.reg, imm),
                None => {
                    encoder.mov_reg_imm(ElementWidth::QWord, R11, imm)?;
                    encoder.alu_reg_reg(op, ElementWidth::QWord, dst.reg, R11)
                }
            },
        }
    }

    fn emit_shift(
        &self,
        op: ShiftOp,
        ty: ScalarType,
        dst: X64Reg,
        amount: Operand<Self>,
    ) -> CodegenResult<()> {
        let mut encoder = self.encoder.borrow_mut();
        match amount {
            Operand::Imm(imm) => {
                let amount = u8::try_from(imm)
                    .ok()
                    .filter(|amount| u32::from(*amount) < ty.bits())
                    .ok_or(CodegenError::ShiftOutOfRange {
                        amount: imm as u32,
                        bits: ty.bits(),
                    })?;
                encoder.shift_imm(op, ty.width, dst.reg, amount)
            }
            Operand::Reg(count) => {
                encoder.mov_shift_count(count.reg)?;
                encoder.shift_cl(op, ty.width, dst.reg)
            }
            Operand::Mem(_) => Err(CodegenError::UnsupportedOperand {
                operation: "shift",
                reason: "shift amount cannot come from memory",
            }),
        }
    }

    fn emit_convert(
        &self,
        op: ConvertOp,
        dst_ty: ScalarType,
        dst: X64Reg,
        src_ty: ScalarType,
        src: X64Reg,
    ) -> CodegenResult<()> {
        let mut encoder = self.encoder.borrow_mut();
        match op {
            // the low part of the source register is the truncated value
            ConvertOp::Truncate => encoder.mov_reg_reg(dst_ty.width, dst.reg, src.reg),
            ConvertOp::SignExtend => encoder.movsx(dst_ty.width, dst.reg, src_ty.width, src.reg),
            ConvertOp::ZeroExtend => encoder.movzx(dst_ty.width, dst.reg, src_ty.width, src.reg),
        }
    }

    fn emit_set_condition(
        &self,
        flag: ConditionFlag,
        ty: ScalarType,
        lhs: Operand<Self>,
        rhs: Operand<Self>,
        dst: X64Reg,
    ) -> CodegenResult<()> {
        let mut encoder = self.encoder.borrow_mut();
        let lhs = self.load_operand(&mut encoder, ty, lhs, R11)?;
        match rhs {
            Operand::Reg(rhs) => encoder.cmp_reg_reg(ty.width, lhs, rhs.reg)?,
            Operand::Mem(mem) => {
                let addr = self.address(mem, ty.width.bytes())?;
                encoder.cmp_reg_mem(ty.width, lhs, addr)?
            }
            Operand::Imm(imm) => match imm32(ty.width, imm) {
                Some(imm) => encoder.cmp_reg_imm(ty.width, lhs, imm)?,
                None => {
                    encoder.mov_reg_imm(ElementWidth::QWord, RCX, imm)?;
                    encoder.cmp_reg_reg(ty.width, lhs, RCX)?
                }
            },
        }
        encoder.setcc(flag, dst.reg)
    }

    fn emit_vector_load(&self, bits: VectorBits, dst: AsmReg, src: Mem<Self>) -> CodegenResult<()> {
        self.check_vector_bits(bits, "vector load")?;
        let addr = self.address(src, bits.bytes())?;
        self.encoder.borrow_mut().vec_load(bits, dst, addr)
    }

    fn emit_vector_store(&self, bits: VectorBits, dst: Mem<Self>, src: AsmReg) -> CodegenResult<()> {
        self.check_vector_bits(bits, "vector store")?;
        let addr = self.address(dst, bits.bytes())?;
        self.encoder.borrow_mut().vec_store(bits, addr, src)
    }

    fn emit_vector_add(
        &self,
        lane: ElementWidth,
        bits: VectorBits,
        dst: AsmReg,
        src: VectorOperand<Self>,
    ) -> CodegenResult<()> {
        self.check_vector_bits(bits, "vector add")?;
        match src {
            VectorOperand::Reg(src) => self.encoder.borrow_mut().vec_add_reg(lane, bits, dst, src),
            VectorOperand::Mem(mem) => {
                let addr = self.address(mem, bits.bytes())?;
                let mut encoder = self.encoder.borrow_mut();
                match bits {
                    VectorBits::V128 => {
                        encoder.vec_load(bits, XMM15, addr)?;
                        encoder.vec_add_reg(lane, bits, dst, XMM15)
                    }
                    VectorBits::V256 => encoder.vec_add_mem(lane, bits, dst, addr),
                }
            }
        }
    }

    fn emit_vector_shr(
        &self,
        lane: ElementWidth,
        bits: VectorBits,
        dst: AsmReg,
        amount: u8,
    ) -> CodegenResult<()> {
        self.check_vector_bits(bits, "vector shift")?;
        if u32::from(amount) >= lane.bits() {
            return Err(CodegenError::ShiftOutOfRange {
                amount: u32::from(amount),
                bits: lane.bits(),
            });
        }
        self.encoder.borrow_mut().vec_shr_imm(lane, bits, dst, amount)
    }

    fn pointer_arg(&self, index: usize) -> CodegenResult<AsmReg> {
        ARG_REGS
            .get(index)
            .copied()
            .ok_or(CodegenError::ArgumentOutOfRange {
                index,
                available: POINTER_ARGS,
            })
    }

    fn emit_return(&self, ty: ScalarType, src: X64Reg) -> CodegenResult<()> {
        let mut encoder = self.encoder.borrow_mut();
        match ty.width {
            ElementWidth::Byte | ElementWidth::Word => {
                encoder.movzx(ElementWidth::DWord, RAX, ty.width, src.reg)?
            }
            width => encoder.mov_reg_reg(width, RAX, src.reg)?,
        }
        self.emit_epilogue(&mut encoder)?;
        self.returned.set(true);
        Ok(())
    }

    fn stats(&self) -> EmissionStats {
        self.encoder.borrow().stats().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::{X64Backend, X64Config};
    use crate::core::{CodegenError, Ptr, Scalar, Value, Vector};
    use crate::core::backend::Backend;

    fn backend() -> X64Backend {
        let _ = env_logger::builder().is_test(true).try_init();
        X64Backend::with_config(X64Config {
            allow_avx2: true,
            base_address: 0,
        })
        .unwrap()
    }

    #[test]
    fn test_prologue_and_return() {
        let backend = backend();
        {
            let value = Value::<_, u32>::with_value(&backend, 7, "v").unwrap();
            value.ret().unwrap();
        }
        let stats = backend.stats();
        // rbp, rbx, r12-r15
        assert_eq!(stats.count("push"), 6);
        assert_eq!(stats.count("pop"), 6);
        assert_eq!(stats.count("ret"), 1);
        assert_eq!(stats.count("vzeroupper"), 0);
        assert!(!backend.assemble().unwrap().is_empty());
    }

    #[test]
    fn test_missing_return() {
        let backend = backend();
        assert_eq!(backend.assemble(), Err(CodegenError::MissingReturn));
    }

    #[test]
    fn test_register_exhaustion() {
        let backend = backend();
        let mut values = Vec::new();
        for _ in 0..9 {
            values.push(Value::<_, u64>::new(&backend, "v").unwrap());
        }
        assert!(matches!(
            Value::<_, u64>::new(&backend, "overflow"),
            Err(CodegenError::RegisterAllocation { .. })
        ));
        values.pop();
        assert!(Value::<_, u64>::new(&backend, "reused").is_ok());
    }

    #[test]
    fn test_wide_immediate_uses_scratch() {
        let backend = backend();
        let mut value = Value::<_, u64>::new(&backend, "v").unwrap();
        value.add_assign(0x1_0000_0000u64).unwrap();
        value.add_assign(1u64).unwrap();

        let stats = backend.stats();
        assert_eq!(stats.count("add"), 2);
        // mov rbp, rsp in the prologue plus the scratch load
        assert_eq!(stats.count("mov"), 2);
    }

    #[test]
    fn test_shift_out_of_range_rejected() {
        let backend = backend();
        let mut value = Value::<_, u32>::new(&backend, "v").unwrap();
        let before = backend.stats().instructions_emitted;
        assert!(value.shl_assign(32u32).is_err());
        assert_eq!(backend.stats().instructions_emitted, before);
    }

    #[test]
    fn test_avx2_disabled() {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = X64Backend::with_config(X64Config {
            allow_avx2: false,
            base_address: 0,
        })
        .unwrap();

        assert!(matches!(
            Vector::<_, u32, 8>::new(&backend, "wide"),
            Err(CodegenError::UnsupportedWidth { width: 256, .. })
        ));
        assert!(Vector::<_, u32, 4>::new(&backend, "narrow").is_ok());
    }

    #[test]
    fn test_untagged_memory_rejected() {
        let backend = backend();
        let ptr = Ptr::<_, u32>::arg(&backend, 0).unwrap();
        let mut untagged = ptr.deref().mem();
        untagged.size = None;

        let value = Value::<_, u32>::new(&backend, "v").unwrap();
        assert_eq!(
            backend.emit_store(u32::TYPE, untagged, value.reg()),
            Err(CodegenError::OperandSize {
                expected: 4,
                found: None
            })
        );
        assert!(matches!(
            Ptr::<_, u8>::arg(&backend, 3),
            Err(CodegenError::ArgumentOutOfRange { index: 3, available: 3 })
        ));
    }
}
