//! RV32 register file.
//!
//! 32 general-purpose registers of 32 bits each, plus the program counter.
//! `x0` is hard-wired to zero: writes to it are dropped, and the execute
//! stage clears it again at the end of every cycle.

use serde::{Serialize, Deserialize};

/// Number of general-purpose registers.
pub const NUM_REGISTERS: usize = 32;

/// Register index of `a0`, the first return-value register.
pub const A0: usize = 10;
/// Register index of `a1`, the second return-value register.
pub const A1: usize = 11;

/// ABI names, indexed by register number.
pub const ABI_NAMES: [&str; NUM_REGISTERS] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2",
    "s0", "s1", "a0", "a1", "a2", "a3", "a4", "a5",
    "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7",
    "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6",
];

/// The register file and program counter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// General-purpose registers x0..x31.
    x: [i32; NUM_REGISTERS],

    /// Program counter, a byte offset into the instruction buffer.
    pub pc: u32,
}

impl Registers {
    /// Create a new register file with all values zeroed.
    pub fn new() -> Self {
        Self {
            x: [0; NUM_REGISTERS],
            pc: 0,
        }
    }

    /// Reset all registers and the PC to zero.
    pub fn reset(&mut self) {
        self.x = [0; NUM_REGISTERS];
        self.pc = 0;
    }

    /// Read a register. Indices are masked to 5 bits.
    #[inline]
    pub fn read(&self, index: u8) -> i32 {
        self.x[(index & 0x1F) as usize]
    }

    /// Write a register. Writes to `x0` are ignored.
    #[inline]
    pub fn write(&mut self, index: u8, value: i32) {
        let index = (index & 0x1F) as usize;
        if index != 0 {
            self.x[index] = value;
        }
    }

    /// Force `x0` back to zero.
    #[inline]
    pub fn clear_zero(&mut self) {
        self.x[0] = 0;
    }

    /// All registers as a slice.
    pub fn as_slice(&self) -> &[i32] {
        &self.x
    }

    /// Value of `a0` (x10).
    pub fn a0(&self) -> i32 {
        self.x[A0]
    }

    /// Value of `a1` (x11).
    pub fn a1(&self) -> i32 {
        self.x[A1]
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, target: u32) {
        self.pc = target;
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

/// Look up a register by `xN` or ABI name (`fp` is accepted for `s0`).
pub fn parse_register(name: &str) -> Option<u8> {
    let name = name.trim().to_ascii_lowercase();
    if let Some(num) = name.strip_prefix('x') {
        return num
            .parse::<u8>()
            .ok()
            .filter(|n| (*n as usize) < NUM_REGISTERS);
    }
    if name == "fp" {
        return Some(8);
    }
    ABI_NAMES.iter().position(|abi| *abi == name).map(|i| i as u8)
}
