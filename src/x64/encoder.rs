// This module provides x86-64 instruction selection on top of the iced-x86 CodeAssembler and
// serves as the machine code half of the x64 backend. X64Encoder converts AsmReg register
// references from the physical register pool into iced register operands of the requested
// width (8, 16, 32 or 64-bit general-purpose, XMM or YMM) and emits exactly one instruction
// per call: moves between registers, immediates and memory; the two-operand ALU group
// (ADD, SUB, AND, OR, XOR) in register, immediate and memory forms; SHL/SHR/SAR by immediate
// or by CL; MOVSX/MOVSXD/MOVZX for widening; CMP followed by the SETcc matching a resolved
// condition flag; unaligned MOVDQU/VMOVDQU vector transfers; the SSE2 two-operand and AVX2
// three-operand lane-wise adds; and logical vector right shifts by immediate. Memory operands
// are built from base, optional scaled index and displacement and then sized explicitly from
// the access width. Every emitted instruction is counted by mnemonic in EmissionStats so that
// callers can check instruction selection without decoding the output. Prologue and epilogue
// helpers (PUSH, POP, VZEROUPPER, RET) complete the fixed three-pointer harness function.

//! x86-64 instruction encoding using iced-x86.
//!
//! The encoder knows nothing about typed values; it is driven by
//! [`X64Backend`](super::X64Backend), which has already resolved widths,
//! signedness and operand forms.

use crate::core::backend::{BinaryOp, ConditionFlag, ShiftOp};
use crate::core::error::{CodegenError, CodegenResult};
use crate::core::register_file::{AsmReg, GP_BANK, VEC_BANK};
use crate::core::stats::EmissionStats;
use crate::core::types::{ElementWidth, VectorBits};
use iced_x86::code_asm::{registers::cl, *};
use iced_x86::IcedError;

fn asm_error(err: IcedError) -> CodegenError {
    CodegenError::Assembler {
        reason: err.to_string(),
    }
}

fn invalid_register(operation: &'static str) -> CodegenError {
    CodegenError::UnsupportedOperand {
        operation,
        reason: "register is outside the encodable set",
    }
}

/// Convert AsmReg to iced-x86 64-bit GP register.
fn gp64(reg: AsmReg) -> CodegenResult<AsmRegister64> {
    use iced_x86::code_asm::*;

    const GP64_REGS: [AsmRegister64; 16] = [
        rax, rcx, rdx, rbx, rsp, rbp, rsi, rdi,
        r8, r9, r10, r11, r12, r13, r14, r15,
    ];

    if reg.bank != GP_BANK {
        return Err(invalid_register("gp64"));
    }
    GP64_REGS
        .get(reg.id as usize)
        .copied()
        .ok_or_else(|| invalid_register("gp64"))
}

/// Convert AsmReg to iced-x86 32-bit GP register.
fn gp32(reg: AsmReg) -> CodegenResult<AsmRegister32> {
    use iced_x86::code_asm::*;

    const GP32_REGS: [AsmRegister32; 16] = [
        eax, ecx, edx, ebx, esp, ebp, esi, edi,
        r8d, r9d, r10d, r11d, r12d, r13d, r14d, r15d,
    ];

    if reg.bank != GP_BANK {
        return Err(invalid_register("gp32"));
    }
    GP32_REGS
        .get(reg.id as usize)
        .copied()
        .ok_or_else(|| invalid_register("gp32"))
}

/// Convert AsmReg to iced-x86 16-bit GP register.
fn gp16(reg: AsmReg) -> CodegenResult<AsmRegister16> {
    use iced_x86::code_asm::*;

    const GP16_REGS: [AsmRegister16; 16] = [
        ax, cx, dx, bx, sp, bp, si, di,
        r8w, r9w, r10w, r11w, r12w, r13w, r14w, r15w,
    ];

    if reg.bank != GP_BANK {
        return Err(invalid_register("gp16"));
    }
    GP16_REGS
        .get(reg.id as usize)
        .copied()
        .ok_or_else(|| invalid_register("gp16"))
}

/// Convert AsmReg to iced-x86 8-bit GP register (REX encodings, no high bytes).
fn gp8(reg: AsmReg) -> CodegenResult<AsmRegister8> {
    use iced_x86::code_asm::*;

    const GP8_REGS: [AsmRegister8; 16] = [
        al, cl, dl, bl, spl, bpl, sil, dil,
        r8b, r9b, r10b, r11b, r12b, r13b, r14b, r15b,
    ];

    if reg.bank != GP_BANK {
        return Err(invalid_register("gp8"));
    }
    GP8_REGS
        .get(reg.id as usize)
        .copied()
        .ok_or_else(|| invalid_register("gp8"))
}

fn xmm(reg: AsmReg) -> CodegenResult<AsmRegisterXmm> {
    use iced_x86::code_asm::*;

    const XMM_REGS: [AsmRegisterXmm; 16] = [
        xmm0, xmm1, xmm2, xmm3, xmm4, xmm5, xmm6, xmm7,
        xmm8, xmm9, xmm10, xmm11, xmm12, xmm13, xmm14, xmm15,
    ];

    if reg.bank != VEC_BANK {
        return Err(invalid_register("xmm"));
    }
    XMM_REGS
        .get(reg.id as usize)
        .copied()
        .ok_or_else(|| invalid_register("xmm"))
}

fn ymm(reg: AsmReg) -> CodegenResult<AsmRegisterYmm> {
    use iced_x86::code_asm::*;

    const YMM_REGS: [AsmRegisterYmm; 16] = [
        ymm0, ymm1, ymm2, ymm3, ymm4, ymm5, ymm6, ymm7,
        ymm8, ymm9, ymm10, ymm11, ymm12, ymm13, ymm14, ymm15,
    ];

    if reg.bank != VEC_BANK {
        return Err(invalid_register("ymm"));
    }
    YMM_REGS
        .get(reg.id as usize)
        .copied()
        .ok_or_else(|| invalid_register("ymm"))
}

/// Bind `$r` to the `$width` view of `$reg` and evaluate `$body`.
macro_rules! with_gp {
    ($width:expr, $reg:expr, |$r:ident| $body:expr) => {
        match $width {
            ElementWidth::Byte => {
                let $r = gp8($reg)?;
                $body
            }
            ElementWidth::Word => {
                let $r = gp16($reg)?;
                $body
            }
            ElementWidth::DWord => {
                let $r = gp32($reg)?;
                $body
            }
            ElementWidth::QWord => {
                let $r = gp64($reg)?;
                $body
            }
        }
    };
}

/// Same as `with_gp!` for two registers of the same width.
macro_rules! with_gp2 {
    ($width:expr, $a:expr, $b:expr, |$x:ident, $y:ident| $body:expr) => {
        match $width {
            ElementWidth::Byte => {
                let ($x, $y) = (gp8($a)?, gp8($b)?);
                $body
            }
            ElementWidth::Word => {
                let ($x, $y) = (gp16($a)?, gp16($b)?);
                $body
            }
            ElementWidth::DWord => {
                let ($x, $y) = (gp32($a)?, gp32($b)?);
                $body
            }
            ElementWidth::QWord => {
                let ($x, $y) = (gp64($a)?, gp64($b)?);
                $body
            }
        }
    };
}

macro_rules! alu {
    ($asm:expr, $op:expr, $dst:expr, $src:expr) => {
        match $op {
            BinaryOp::Add => $asm.add($dst, $src),
            BinaryOp::Sub => $asm.sub($dst, $src),
            BinaryOp::And => $asm.and($dst, $src),
            BinaryOp::Or => $asm.or($dst, $src),
            BinaryOp::Xor => $asm.xor($dst, $src),
        }
    };
}

macro_rules! shift {
    ($asm:expr, $op:expr, $dst:expr, $amount:expr) => {
        match $op {
            ShiftOp::Shl => $asm.shl($dst, $amount),
            ShiftOp::Shr => $asm.shr($dst, $amount),
            ShiftOp::Sar => $asm.sar($dst, $amount),
        }
    };
}

fn alu_mnemonic(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::Xor => "xor",
    }
}

fn shift_mnemonic(op: ShiftOp) -> &'static str {
    match op {
        ShiftOp::Shl => "shl",
        ShiftOp::Shr => "shr",
        ShiftOp::Sar => "sar",
    }
}

/// `[base + index * scale + disp]`, before the access size is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    pub base: AsmReg,
    pub index: Option<AsmReg>,
    pub scale: u8,
    pub disp: i32,
}

impl Address {
    pub fn base(base: AsmReg) -> Self {
        Self {
            base,
            index: None,
            scale: 1,
            disp: 0,
        }
    }

    /// Build the iced memory operand sized to `bytes`.
    fn operand(&self, bytes: u32) -> CodegenResult<AsmMemoryOperand> {
        let base = gp64(self.base)?;
        let unsized_mem = match self.index {
            None => base + self.disp,
            Some(index) => {
                let index = gp64(index)?;
                match self.scale {
                    1 => base + index + self.disp,
                    2 => base + index * 2 + self.disp,
                    4 => base + index * 4 + self.disp,
                    8 => base + index * 8 + self.disp,
                    _ => {
                        return Err(CodegenError::UnsupportedOperand {
                            operation: "address",
                            reason: "scale must be 1, 2, 4 or 8",
                        })
                    }
                }
            }
        };

        Ok(match bytes {
            1 => byte_ptr(unsized_mem),
            2 => word_ptr(unsized_mem),
            4 => dword_ptr(unsized_mem),
            8 => qword_ptr(unsized_mem),
            16 => xmmword_ptr(unsized_mem),
            32 => ymmword_ptr(unsized_mem),
            _ => {
                return Err(CodegenError::OperandSize {
                    expected: bytes,
                    found: None,
                })
            }
        })
    }
}

/// x86-64 instruction encoder using iced-x86.
pub struct X64Encoder {
    /// Code assembler for generating instructions.
    assembler: CodeAssembler,
    /// Instruction counts by mnemonic.
    stats: EmissionStats,
}

impl X64Encoder {
    /// Create a new 64-bit encoder.
    pub fn new() -> CodegenResult<Self> {
        Ok(Self {
            assembler: CodeAssembler::new(64).map_err(asm_error)?,
            stats: EmissionStats::new(),
        })
    }

    pub fn stats(&self) -> &EmissionStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut EmissionStats {
        &mut self.stats
    }

    fn record(&mut self, mnemonic: &'static str) {
        self.stats.record_instruction(mnemonic);
        log::trace!("   Generated: {}", mnemonic);
    }

    // ==== SCALAR MOVES ====

    /// `mov dst, src` at `width`.
    pub fn mov_reg_reg(&mut self, width: ElementWidth, dst: AsmReg, src: AsmReg) -> CodegenResult<()> {
        with_gp2!(width, dst, src, |d, s| self.assembler.mov(d, s)).map_err(asm_error)?;
        self.record("mov");
        Ok(())
    }

    /// `mov dst, imm`. Byte, word and dword immediates must already be
    /// truncated to the width; qword immediates may be any i64.
    pub fn mov_reg_imm(&mut self, width: ElementWidth, dst: AsmReg, imm: i64) -> CodegenResult<()> {
        match width {
            ElementWidth::Byte => self.assembler.mov(gp8(dst)?, imm as i32),
            ElementWidth::Word => self.assembler.mov(gp16(dst)?, imm as i32),
            ElementWidth::DWord => self.assembler.mov(gp32(dst)?, imm as i32),
            ElementWidth::QWord => self.assembler.mov(gp64(dst)?, imm),
        }
        .map_err(asm_error)?;
        self.record("mov");
        Ok(())
    }

    /// `mov dst, [addr]`.
    pub fn mov_reg_mem(&mut self, width: ElementWidth, dst: AsmReg, addr: Address) -> CodegenResult<()> {
        let mem = addr.operand(width.bytes())?;
        with_gp!(width, dst, |d| self.assembler.mov(d, mem)).map_err(asm_error)?;
        self.record("mov");
        Ok(())
    }

    /// `mov [addr], src`.
    pub fn mov_mem_reg(&mut self, width: ElementWidth, addr: Address, src: AsmReg) -> CodegenResult<()> {
        let mem = addr.operand(width.bytes())?;
        with_gp!(width, src, |s| self.assembler.mov(mem, s)).map_err(asm_error)?;
        self.record("mov");
        Ok(())
    }

    /// `mov cl, src` in preparation of a variable shift.
    pub fn mov_shift_count(&mut self, src: AsmReg) -> CodegenResult<()> {
        self.assembler.mov(cl, gp8(src)?).map_err(asm_error)?;
        self.record("mov");
        Ok(())
    }

    // ==== ARITHMETIC AND LOGIC ====

    pub fn alu_reg_reg(
        &mut self,
        op: BinaryOp,
        width: ElementWidth,
        dst: AsmReg,
        src: AsmReg,
    ) -> CodegenResult<()> {
        with_gp2!(width, dst, src, |d, s| alu!(self.assembler, op, d, s)).map_err(asm_error)?;
        self.record(alu_mnemonic(op));
        Ok(())
    }

    /// `op dst, imm32`; the immediate is sign-extended to the width.
    pub fn alu_reg_imm(
        &mut self,
        op: BinaryOp,
        width: ElementWidth,
        dst: AsmReg,
        imm: i32,
    ) -> CodegenResult<()> {
        with_gp!(width, dst, |d| alu!(self.assembler, op, d, imm)).map_err(asm_error)?;
        self.record(alu_mnemonic(op));
        Ok(())
    }

    pub fn alu_reg_mem(
        &mut self,
        op: BinaryOp,
        width: ElementWidth,
        dst: AsmReg,
        addr: Address,
    ) -> CodegenResult<()> {
        let mem = addr.operand(width.bytes())?;
        with_gp!(width, dst, |d| alu!(self.assembler, op, d, mem)).map_err(asm_error)?;
        self.record(alu_mnemonic(op));
        Ok(())
    }

    // ==== SHIFTS ====

    pub fn shift_imm(
        &mut self,
        op: ShiftOp,
        width: ElementWidth,
        dst: AsmReg,
        amount: u8,
    ) -> CodegenResult<()> {
        let amount = i32::from(amount);
        with_gp!(width, dst, |d| shift!(self.assembler, op, d, amount)).map_err(asm_error)?;
        self.record(shift_mnemonic(op));
        Ok(())
    }

    /// Shift by the count in `cl`.
    pub fn shift_cl(&mut self, op: ShiftOp, width: ElementWidth, dst: AsmReg) -> CodegenResult<()> {
        with_gp!(width, dst, |d| shift!(self.assembler, op, d, cl)).map_err(asm_error)?;
        self.record(shift_mnemonic(op));
        Ok(())
    }

    // ==== CONVERSIONS ====

    /// Sign-extend `src` into the wider `dst`.
    pub fn movsx(
        &mut self,
        dst_width: ElementWidth,
        dst: AsmReg,
        src_width: ElementWidth,
        src: AsmReg,
    ) -> CodegenResult<()> {
        use ElementWidth::*;

        let mnemonic = match (dst_width, src_width) {
            (Word, Byte) => self.assembler.movsx(gp16(dst)?, gp8(src)?).map(|_| "movsx"),
            (DWord, Byte) => self.assembler.movsx(gp32(dst)?, gp8(src)?).map(|_| "movsx"),
            (QWord, Byte) => self.assembler.movsx(gp64(dst)?, gp8(src)?).map(|_| "movsx"),
            (DWord, Word) => self.assembler.movsx(gp32(dst)?, gp16(src)?).map(|_| "movsx"),
            (QWord, Word) => self.assembler.movsx(gp64(dst)?, gp16(src)?).map(|_| "movsx"),
            (QWord, DWord) => self.assembler.movsxd(gp64(dst)?, gp32(src)?).map(|_| "movsxd"),
            _ => {
                return Err(CodegenError::UnsupportedOperand {
                    operation: "movsx",
                    reason: "destination must be wider than source",
                })
            }
        }
        .map_err(asm_error)?;
        self.record(mnemonic);
        Ok(())
    }

    /// Zero-extend `src` into the wider `dst`. 32-bit writes clear the upper
    /// half, so 64-bit destinations use the 32-bit forms.
    pub fn movzx(
        &mut self,
        dst_width: ElementWidth,
        dst: AsmReg,
        src_width: ElementWidth,
        src: AsmReg,
    ) -> CodegenResult<()> {
        use ElementWidth::*;

        let mnemonic = match (dst_width, src_width) {
            (Word, Byte) => self.assembler.movzx(gp16(dst)?, gp8(src)?).map(|_| "movzx"),
            (DWord | QWord, Byte) => self.assembler.movzx(gp32(dst)?, gp8(src)?).map(|_| "movzx"),
            (DWord | QWord, Word) => self.assembler.movzx(gp32(dst)?, gp16(src)?).map(|_| "movzx"),
            (QWord, DWord) => self.assembler.mov(gp32(dst)?, gp32(src)?).map(|_| "mov"),
            _ => {
                return Err(CodegenError::UnsupportedOperand {
                    operation: "movzx",
                    reason: "destination must be wider than source",
                })
            }
        }
        .map_err(asm_error)?;
        self.record(mnemonic);
        Ok(())
    }

    // ==== COMPARISONS ====

    pub fn cmp_reg_reg(&mut self, width: ElementWidth, lhs: AsmReg, rhs: AsmReg) -> CodegenResult<()> {
        with_gp2!(width, lhs, rhs, |l, r| self.assembler.cmp(l, r)).map_err(asm_error)?;
        self.record("cmp");
        Ok(())
    }

    pub fn cmp_reg_imm(&mut self, width: ElementWidth, lhs: AsmReg, imm: i32) -> CodegenResult<()> {
        with_gp!(width, lhs, |l| self.assembler.cmp(l, imm)).map_err(asm_error)?;
        self.record("cmp");
        Ok(())
    }

    pub fn cmp_reg_mem(&mut self, width: ElementWidth, lhs: AsmReg, addr: Address) -> CodegenResult<()> {
        let mem = addr.operand(width.bytes())?;
        with_gp!(width, lhs, |l| self.assembler.cmp(l, mem)).map_err(asm_error)?;
        self.record("cmp");
        Ok(())
    }

    /// `setcc dst8` for the flags of the preceding `cmp`.
    pub fn setcc(&mut self, flag: ConditionFlag, dst: AsmReg) -> CodegenResult<()> {
        let d = gp8(dst)?;
        let mnemonic = match flag {
            ConditionFlag::Eq => self.assembler.sete(d).map(|_| "sete"),
            ConditionFlag::Ne => self.assembler.setne(d).map(|_| "setne"),
            ConditionFlag::Lt => self.assembler.setl(d).map(|_| "setl"),
            ConditionFlag::Le => self.assembler.setle(d).map(|_| "setle"),
            ConditionFlag::Gt => self.assembler.setg(d).map(|_| "setg"),
            ConditionFlag::Ge => self.assembler.setge(d).map(|_| "setge"),
            ConditionFlag::Below => self.assembler.setb(d).map(|_| "setb"),
            ConditionFlag::BelowEq => self.assembler.setbe(d).map(|_| "setbe"),
            ConditionFlag::Above => self.assembler.seta(d).map(|_| "seta"),
            ConditionFlag::AboveEq => self.assembler.setae(d).map(|_| "setae"),
        }
        .map_err(asm_error)?;
        self.record(mnemonic);
        Ok(())
    }

    // ==== VECTORS ====

    /// Unaligned `movdqu`/`vmovdqu` load.
    pub fn vec_load(&mut self, bits: VectorBits, dst: AsmReg, addr: Address) -> CodegenResult<()> {
        let mem = addr.operand(bits.bytes())?;
        let mnemonic = match bits {
            VectorBits::V128 => self.assembler.movdqu(xmm(dst)?, mem).map(|_| "movdqu"),
            VectorBits::V256 => self.assembler.vmovdqu(ymm(dst)?, mem).map(|_| "vmovdqu"),
        }
        .map_err(asm_error)?;
        self.record(mnemonic);
        Ok(())
    }

    /// Unaligned `movdqu`/`vmovdqu` store.
    pub fn vec_store(&mut self, bits: VectorBits, addr: Address, src: AsmReg) -> CodegenResult<()> {
        let mem = addr.operand(bits.bytes())?;
        let mnemonic = match bits {
            VectorBits::V128 => self.assembler.movdqu(mem, xmm(src)?).map(|_| "movdqu"),
            VectorBits::V256 => self.assembler.vmovdqu(mem, ymm(src)?).map(|_| "vmovdqu"),
        }
        .map_err(asm_error)?;
        self.record(mnemonic);
        Ok(())
    }

    /// Lane-wise add, register source.
    pub fn vec_add_reg(
        &mut self,
        lane: ElementWidth,
        bits: VectorBits,
        dst: AsmReg,
        src: AsmReg,
    ) -> CodegenResult<()> {
        use ElementWidth::*;

        let mnemonic = match bits {
            VectorBits::V128 => {
                let (d, s) = (xmm(dst)?, xmm(src)?);
                match lane {
                    Byte => self.assembler.paddb(d, s).map(|_| "paddb"),
                    Word => self.assembler.paddw(d, s).map(|_| "paddw"),
                    DWord => self.assembler.paddd(d, s).map(|_| "paddd"),
                    QWord => self.assembler.paddq(d, s).map(|_| "paddq"),
                }
            }
            VectorBits::V256 => {
                let (d, s) = (ymm(dst)?, ymm(src)?);
                match lane {
                    Byte => self.assembler.vpaddb(d, d, s).map(|_| "vpaddb"),
                    Word => self.assembler.vpaddw(d, d, s).map(|_| "vpaddw"),
                    DWord => self.assembler.vpaddd(d, d, s).map(|_| "vpaddd"),
                    QWord => self.assembler.vpaddq(d, d, s).map(|_| "vpaddq"),
                }
            }
        }
        .map_err(asm_error)?;
        self.record(mnemonic);
        Ok(())
    }

    /// Lane-wise add, memory source. The 128-bit SSE forms fault on operands
    /// that are not 16-byte aligned.
    pub fn vec_add_mem(
        &mut self,
        lane: ElementWidth,
        bits: VectorBits,
        dst: AsmReg,
        addr: Address,
    ) -> CodegenResult<()> {
        use ElementWidth::*;

        let mem = addr.operand(bits.bytes())?;
        let mnemonic = match bits {
            VectorBits::V128 => {
                let d = xmm(dst)?;
                match lane {
                    Byte => self.assembler.paddb(d, mem).map(|_| "paddb"),
                    Word => self.assembler.paddw(d, mem).map(|_| "paddw"),
                    DWord => self.assembler.paddd(d, mem).map(|_| "paddd"),
                    QWord => self.assembler.paddq(d, mem).map(|_| "paddq"),
                }
            }
            VectorBits::V256 => {
                let d = ymm(dst)?;
                match lane {
                    Byte => self.assembler.vpaddb(d, d, mem).map(|_| "vpaddb"),
                    Word => self.assembler.vpaddw(d, d, mem).map(|_| "vpaddw"),
                    DWord => self.assembler.vpaddd(d, d, mem).map(|_| "vpaddd"),
                    QWord => self.assembler.vpaddq(d, d, mem).map(|_| "vpaddq"),
                }
            }
        }
        .map_err(asm_error)?;
        self.record(mnemonic);
        Ok(())
    }

    /// Lane-wise logical right shift by immediate. Byte lanes have no encoding.
    pub fn vec_shr_imm(
        &mut self,
        lane: ElementWidth,
        bits: VectorBits,
        dst: AsmReg,
        amount: u8,
    ) -> CodegenResult<()> {
        use ElementWidth::*;

        let amount = i32::from(amount);
        let mnemonic = match (bits, lane) {
            (_, Byte) => {
                return Err(CodegenError::UnsupportedOperand {
                    operation: "vector shift",
                    reason: "byte lanes cannot be shifted",
                })
            }
            (VectorBits::V128, Word) => self.assembler.psrlw(xmm(dst)?, amount).map(|_| "psrlw"),
            (VectorBits::V128, DWord) => self.assembler.psrld(xmm(dst)?, amount).map(|_| "psrld"),
            (VectorBits::V128, QWord) => self.assembler.psrlq(xmm(dst)?, amount).map(|_| "psrlq"),
            (VectorBits::V256, Word) => {
                let d = ymm(dst)?;
                self.assembler.vpsrlw(d, d, amount).map(|_| "vpsrlw")
            }
            (VectorBits::V256, DWord) => {
                let d = ymm(dst)?;
                self.assembler.vpsrld(d, d, amount).map(|_| "vpsrld")
            }
            (VectorBits::V256, QWord) => {
                let d = ymm(dst)?;
                self.assembler.vpsrlq(d, d, amount).map(|_| "vpsrlq")
            }
        }
        .map_err(asm_error)?;
        self.record(mnemonic);
        Ok(())
    }

    // ==== FRAME ====

    pub fn push(&mut self, reg: AsmReg) -> CodegenResult<()> {
        self.assembler.push(gp64(reg)?).map_err(asm_error)?;
        self.record("push");
        Ok(())
    }

    pub fn pop(&mut self, reg: AsmReg) -> CodegenResult<()> {
        self.assembler.pop(gp64(reg)?).map_err(asm_error)?;
        self.record("pop");
        Ok(())
    }

    pub fn vzeroupper(&mut self) -> CodegenResult<()> {
        self.assembler.vzeroupper().map_err(asm_error)?;
        self.record("vzeroupper");
        Ok(())
    }

    pub fn ret(&mut self) -> CodegenResult<()> {
        self.assembler.ret().map_err(asm_error)?;
        self.record("ret");
        Ok(())
    }

    /// Encode everything emitted so far for execution at `base_address`.
    pub fn assemble(&mut self, base_address: u64) -> CodegenResult<Vec<u8>> {
        self.assembler.assemble(base_address).map_err(asm_error)
    }
}
