//! Emission statistics shared by all backends.
//!
//! Every backend records what it emits so that generation code and tests
//! can check instruction selection without decoding the output.

use std::collections::HashMap;
use std::fmt;

/// Counters maintained by a backend while it emits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmissionStats {
    /// Number of instructions emitted.
    pub instructions_emitted: usize,

    /// Count of each instruction emitted, keyed by mnemonic or IR opcode.
    pub instruction_counts: HashMap<&'static str, usize>,

    /// Scalar registers (or stack slots) allocated.
    pub registers_allocated: usize,

    /// SIMD registers (or vector stack slots) allocated.
    pub vector_registers_allocated: usize,

    /// Registers handed back to the backend.
    pub registers_released: usize,
}

impl EmissionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one emitted instruction.
    pub fn record_instruction(&mut self, mnemonic: &'static str) {
        self.instructions_emitted += 1;
        *self.instruction_counts.entry(mnemonic).or_insert(0) += 1;
    }

    pub fn record_register_allocated(&mut self) {
        self.registers_allocated += 1;
    }

    pub fn record_vector_register_allocated(&mut self) {
        self.vector_registers_allocated += 1;
    }

    pub fn record_register_released(&mut self) {
        self.registers_released += 1;
    }

    /// How often `mnemonic` was emitted.
    pub fn count(&self, mnemonic: &str) -> usize {
        self.instruction_counts.get(mnemonic).copied().unwrap_or(0)
    }
}

impl fmt::Display for EmissionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Emission Statistics:")?;
        writeln!(f, "  Instructions emitted: {}", self.instructions_emitted)?;
        writeln!(f, "  Registers allocated: {}", self.registers_allocated)?;
        writeln!(f, "  Vector registers allocated: {}", self.vector_registers_allocated)?;
        writeln!(f, "  Registers released: {}", self.registers_released)?;

        if !self.instruction_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.instruction_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

            for (mnemonic, count) in sorted {
                writeln!(f, "    {}: {}", mnemonic, count)?;
            }
        }

        Ok(())
    }
}
