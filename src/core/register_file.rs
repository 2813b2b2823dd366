//! Physical register pool.
//!
//! Values own their register for their whole lifetime and there is no
//! spilling: allocation hands out the lowest free allocatable register of a
//! bank and fails once the bank is exhausted.

/// Maximum number of register banks supported (GP, vector).
pub const MAX_REGISTER_BANKS: usize = 2;

/// Maximum number of registers per bank.
pub const MAX_REGISTERS_PER_BANK: usize = 64;

/// Bank of general-purpose registers.
pub const GP_BANK: RegBank = 0;

/// Bank of SIMD registers.
pub const VEC_BANK: RegBank = 1;

/// Type for register bank indices.
pub type RegBank = u8;

/// Type for register IDs within a bank.
pub type RegId = u8;

/// Combined register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsmReg {
    pub bank: RegBank,
    pub id: RegId,
}

impl AsmReg {
    pub const fn new(bank: RegBank, id: RegId) -> Self {
        Self { bank, id }
    }

    pub const fn gp(id: RegId) -> Self {
        Self::new(GP_BANK, id)
    }

    pub const fn vec(id: RegId) -> Self {
        Self::new(VEC_BANK, id)
    }

    fn is_valid(self) -> bool {
        (self.bank as usize) < MAX_REGISTER_BANKS && (self.id as usize) < MAX_REGISTERS_PER_BANK
    }
}

/// Bit set for tracking register sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegBitSet {
    banks: [u64; MAX_REGISTER_BANKS],
}

impl RegBitSet {
    pub const fn new() -> Self {
        Self {
            banks: [0; MAX_REGISTER_BANKS],
        }
    }

    /// Set holding exactly `ids` in `bank`.
    pub fn from_ids(bank: RegBank, ids: &[RegId]) -> Self {
        let mut set = Self::new();
        for &id in ids {
            set.set(AsmReg::new(bank, id));
        }
        set
    }

    pub fn contains(&self, reg: AsmReg) -> bool {
        reg.is_valid() && (self.banks[reg.bank as usize] & (1u64 << reg.id)) != 0
    }

    pub fn set(&mut self, reg: AsmReg) {
        if reg.is_valid() {
            self.banks[reg.bank as usize] |= 1u64 << reg.id;
        }
    }

    pub fn clear(&mut self, reg: AsmReg) {
        if reg.is_valid() {
            self.banks[reg.bank as usize] &= !(1u64 << reg.id);
        }
    }

    pub fn union(&mut self, other: &RegBitSet) {
        for (bank, other) in self.banks.iter_mut().zip(other.banks) {
            *bank |= other;
        }
    }

    /// Lowest register of `bank` in this set and not in `exclude`.
    pub fn find_first_in_bank(&self, bank: RegBank, exclude: &RegBitSet) -> Option<RegId> {
        let bank = bank as usize;
        if bank >= MAX_REGISTER_BANKS {
            return None;
        }
        let available = self.banks[bank] & !exclude.banks[bank];
        (available != 0).then(|| available.trailing_zeros() as RegId)
    }

    pub fn count_in_bank(&self, bank: RegBank) -> u32 {
        self.banks
            .get(bank as usize)
            .map_or(0, |mask| mask.count_ones())
    }
}

/// Error types for register allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegAllocError {
    /// No registers available in the requested bank.
    NoRegistersAvailable { bank: RegBank },
    /// Register is not allocated.
    RegisterNotAllocated(AsmReg),
    /// Register is outside the pool.
    InvalidRegister(AsmReg),
}

impl std::fmt::Display for RegAllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRegistersAvailable { bank } => {
                write!(f, "no free register left in bank {}", bank)
            }
            Self::RegisterNotAllocated(reg) => write!(f, "register {:?} is not allocated", reg),
            Self::InvalidRegister(reg) => write!(f, "register {:?} is not allocatable", reg),
        }
    }
}

/// Tracks which registers of a fixed pool are owned by live values.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    /// Registers available for allocation.
    allocatable: RegBitSet,
    /// Currently allocated registers.
    used: RegBitSet,
}

impl RegisterFile {
    pub fn new(allocatable: RegBitSet) -> Self {
        Self {
            allocatable,
            used: RegBitSet::new(),
        }
    }

    /// Allocate the lowest free register of `bank`.
    pub fn allocate_reg(&mut self, bank: RegBank) -> Result<AsmReg, RegAllocError> {
        let id = self
            .allocatable
            .find_first_in_bank(bank, &self.used)
            .ok_or(RegAllocError::NoRegistersAvailable { bank })?;
        let reg = AsmReg::new(bank, id);
        self.used.set(reg);
        Ok(reg)
    }

    pub fn free_register(&mut self, reg: AsmReg) -> Result<(), RegAllocError> {
        if !self.allocatable.contains(reg) {
            return Err(RegAllocError::InvalidRegister(reg));
        }
        if !self.used.contains(reg) {
            return Err(RegAllocError::RegisterNotAllocated(reg));
        }
        self.used.clear(reg);
        Ok(())
    }

    /// `(used, total)` register counts for a bank.
    pub fn bank_usage(&self, bank: RegBank) -> (u32, u32) {
        (self.used.count_in_bank(bank), self.allocatable.count_in_bank(bank))
    }
}
