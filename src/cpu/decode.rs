//! Instruction decoder for the RV32 subset.
//!
//! Every 32-bit word decodes: register and function fields sit at fixed bit
//! positions regardless of opcode, and only the immediate depends on the
//! instruction format. Opcodes outside the subset decode to
//! [`Opcode::Unknown`] with a zero immediate.

use crate::cpu::registers::ABI_NAMES;
use serde::{Serialize, Deserialize};
use std::fmt;

/// Major opcode, the low 7 bits of the instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    /// Load upper immediate (U-type)
    Lui,
    /// Jump and link (J-type)
    Jal,
    /// Conditional branch (B-type)
    Branch,
    /// Load from data memory (I-type)
    Load,
    /// Store to data memory (S-type)
    Store,
    /// Register-immediate arithmetic (I-type)
    OpImm,
    /// Register-register arithmetic (R-type)
    Op,
    /// Anything outside the subset. Executes as a no-op.
    Unknown(u8),
}

impl Opcode {
    pub const LUI: u8 = 0x37;
    pub const JAL: u8 = 0x6F;
    pub const BRANCH: u8 = 0x63;
    pub const LOAD: u8 = 0x03;
    pub const STORE: u8 = 0x23;
    pub const OP_IMM: u8 = 0x13;
    pub const OP: u8 = 0x33;

    /// Classify the low 7 bits of a word.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x7F {
            Self::LUI => Opcode::Lui,
            Self::JAL => Opcode::Jal,
            Self::BRANCH => Opcode::Branch,
            Self::LOAD => Opcode::Load,
            Self::STORE => Opcode::Store,
            Self::OP_IMM => Opcode::OpImm,
            Self::OP => Opcode::Op,
            other => Opcode::Unknown(other),
        }
    }

    /// The 7-bit encoding.
    pub fn bits(self) -> u8 {
        match self {
            Opcode::Lui => Self::LUI,
            Opcode::Jal => Self::JAL,
            Opcode::Branch => Self::BRANCH,
            Opcode::Load => Self::LOAD,
            Opcode::Store => Self::STORE,
            Opcode::OpImm => Self::OP_IMM,
            Opcode::Op => Self::OP,
            Opcode::Unknown(bits) => bits & 0x7F,
        }
    }

    /// Encoding format, which decides how the immediate is laid out.
    pub fn format(self) -> Format {
        match self {
            Opcode::Lui => Format::U,
            Opcode::Jal => Format::J,
            Opcode::Branch => Format::B,
            Opcode::Store => Format::S,
            Opcode::Load | Opcode::OpImm => Format::I,
            Opcode::Op => Format::R,
            Opcode::Unknown(_) => Format::Unknown,
        }
    }
}

/// RISC-V instruction encoding formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    U,
    J,
    B,
    S,
    I,
    R,
    Unknown,
}

/// Branch condition selected by funct3 of a B-type instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchCondition {
    Eq,
    Ne,
    Lt,
    Ge,
    Ltu,
    Geu,
}

impl BranchCondition {
    /// funct3 2 and 3 are reserved.
    pub fn from_funct3(funct3: u8) -> Option<Self> {
        match funct3 & 0x7 {
            0 => Some(BranchCondition::Eq),
            1 => Some(BranchCondition::Ne),
            4 => Some(BranchCondition::Lt),
            5 => Some(BranchCondition::Ge),
            6 => Some(BranchCondition::Ltu),
            7 => Some(BranchCondition::Geu),
            _ => None,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            BranchCondition::Eq => "beq",
            BranchCondition::Ne => "bne",
            BranchCondition::Lt => "blt",
            BranchCondition::Ge => "bge",
            BranchCondition::Ltu => "bltu",
            BranchCondition::Geu => "bgeu",
        }
    }
}

/// Access width selected by funct3 of a load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessWidth {
    Byte,
    Half,
    Word,
    ByteUnsigned,
    HalfUnsigned,
}

impl AccessWidth {
    pub const BYTE: u8 = 0;
    pub const HALF: u8 = 1;
    pub const WORD: u8 = 2;

    pub fn from_funct3(funct3: u8) -> Option<Self> {
        match funct3 & 0x7 {
            0 => Some(AccessWidth::Byte),
            1 => Some(AccessWidth::Half),
            2 => Some(AccessWidth::Word),
            4 => Some(AccessWidth::ByteUnsigned),
            5 => Some(AccessWidth::HalfUnsigned),
            _ => None,
        }
    }
}

/// A decoded instruction.
///
/// Register and function fields are always extracted positionally, so an
/// I-type instruction still carries the `rs2`/`funct7` bits that overlap its
/// immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub rd: u8,
    pub rs1: u8,
    pub rs2: u8,
    pub funct3: u8,
    pub funct7: u8,
    /// Immediate, already sign-extended (or shifted, for U-type).
    pub imm: i32,
}

impl Instruction {
    pub fn format(&self) -> Format {
        self.opcode.format()
    }

    /// Branch condition, meaningful for [`Opcode::Branch`] only.
    pub fn branch_condition(&self) -> Option<BranchCondition> {
        BranchCondition::from_funct3(self.funct3)
    }

    /// Access width, meaningful for loads and stores only.
    pub fn access_width(&self) -> Option<AccessWidth> {
        AccessWidth::from_funct3(self.funct3)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rd = ABI_NAMES[(self.rd & 0x1F) as usize];
        let rs1 = ABI_NAMES[(self.rs1 & 0x1F) as usize];
        let rs2 = ABI_NAMES[(self.rs2 & 0x1F) as usize];
        let imm = self.imm;

        match self.opcode {
            Opcode::Lui => write!(f, "lui {rd}, {:#x}", (imm as u32) >> 12),
            Opcode::Jal => write!(f, "jal {rd}, {imm}"),
            Opcode::Branch => match self.branch_condition() {
                Some(cond) => write!(f, "{} {rs1}, {rs2}, {imm}", cond.mnemonic()),
                None => write!(f, ".word {:#010x}", encode(self)),
            },
            Opcode::Load => {
                let mnemonic = match self.access_width() {
                    Some(AccessWidth::Byte) => "lb",
                    Some(AccessWidth::Half) => "lh",
                    Some(AccessWidth::Word) => "lw",
                    Some(AccessWidth::ByteUnsigned) => "lbu",
                    Some(AccessWidth::HalfUnsigned) => "lhu",
                    None => return write!(f, ".word {:#010x}", encode(self)),
                };
                write!(f, "{mnemonic} {rd}, {imm}({rs1})")
            }
            Opcode::Store => {
                let mnemonic = match self.access_width() {
                    Some(AccessWidth::Byte) => "sb",
                    Some(AccessWidth::Half) => "sh",
                    Some(AccessWidth::Word) => "sw",
                    _ => return write!(f, ".word {:#010x}", encode(self)),
                };
                write!(f, "{mnemonic} {rs2}, {imm}({rs1})")
            }
            Opcode::OpImm => match (self.funct3, self.funct7) {
                (0, _) => write!(f, "addi {rd}, {rs1}, {imm}"),
                (1, 0x00) => write!(f, "slli {rd}, {rs1}, {}", imm & 0x1F),
                (2, _) => write!(f, "slti {rd}, {rs1}, {imm}"),
                (3, _) => write!(f, "sltiu {rd}, {rs1}, {imm}"),
                (4, _) => write!(f, "xori {rd}, {rs1}, {imm}"),
                (5, 0x00) => write!(f, "srli {rd}, {rs1}, {}", imm & 0x1F),
                (5, 0x20) => write!(f, "srai {rd}, {rs1}, {}", imm & 0x1F),
                (6, _) => write!(f, "ori {rd}, {rs1}, {imm}"),
                (7, _) => write!(f, "andi {rd}, {rs1}, {imm}"),
                _ => write!(f, ".word {:#010x}", encode(self)),
            },
            Opcode::Op => {
                let mnemonic = match (self.funct3, self.funct7) {
                    (0, 0x00) => "add",
                    (0, 0x20) => "sub",
                    (1, 0x00) => "sll",
                    (2, 0x00) => "slt",
                    (3, 0x00) => "sltu",
                    (4, 0x00) => "xor",
                    (5, 0x00) => "srl",
                    (5, 0x20) => "sra",
                    (6, 0x00) => "or",
                    (7, 0x00) => "and",
                    _ => return write!(f, ".word {:#010x}", encode(self)),
                };
                write!(f, "{mnemonic} {rd}, {rs1}, {rs2}")
            }
            Opcode::Unknown(_) => write!(f, ".word {:#010x}", encode(self)),
        }
    }
}

/// Extract bits `hi..=lo` of `word`, right-aligned.
#[inline]
pub fn bits(word: u32, hi: u32, lo: u32) -> u32 {
    (word >> lo) & ((1u64 << (hi - lo + 1)) - 1) as u32
}

/// Sign-extend the low `width` bits of `value` to a full i32.
#[inline]
pub fn sign_extend(value: u32, width: u32) -> i32 {
    let shift = 32 - width;
    ((value << shift) as i32) >> shift
}

/// Decode a 32-bit instruction word.
pub fn decode(word: u32) -> Instruction {
    let opcode = Opcode::from_bits(bits(word, 6, 0) as u8);

    let imm = match opcode.format() {
        Format::U => (word & 0xFFFF_F000) as i32,
        Format::J => {
            // imm[20|10:1|11|19:12]
            let imm = (bits(word, 31, 31) << 20)
                | (bits(word, 19, 12) << 12)
                | (bits(word, 20, 20) << 11)
                | (bits(word, 30, 21) << 1);
            sign_extend(imm, 21)
        }
        Format::B => {
            // imm[12|10:5] ... imm[4:1|11]
            let imm = (bits(word, 31, 31) << 12)
                | (bits(word, 7, 7) << 11)
                | (bits(word, 30, 25) << 5)
                | (bits(word, 11, 8) << 1);
            sign_extend(imm, 13)
        }
        Format::S => {
            let imm = (bits(word, 31, 25) << 5) | bits(word, 11, 7);
            sign_extend(imm, 12)
        }
        Format::I => sign_extend(bits(word, 31, 20), 12),
        Format::R | Format::Unknown => 0,
    };

    Instruction {
        opcode,
        rd: bits(word, 11, 7) as u8,
        funct3: bits(word, 14, 12) as u8,
        rs1: bits(word, 19, 15) as u8,
        rs2: bits(word, 24, 20) as u8,
        funct7: bits(word, 31, 25) as u8,
        imm,
    }
}

/// Encode a decoded instruction back into a word.
///
/// Immediates are truncated to the width of their format; callers that need
/// range checking (the assembler) do it before encoding. Unknown opcodes are
/// packed positionally, which reproduces the original word exactly.
pub fn encode(instr: &Instruction) -> u32 {
    let op = instr.opcode.bits();
    match instr.format() {
        Format::U => encode_u(op, instr.rd, instr.imm),
        Format::J => encode_j(op, instr.rd, instr.imm),
        Format::B => encode_b(op, instr.funct3, instr.rs1, instr.rs2, instr.imm),
        Format::S => encode_s(op, instr.funct3, instr.rs1, instr.rs2, instr.imm),
        Format::I => encode_i(op, instr.funct3, instr.rd, instr.rs1, instr.imm),
        Format::R | Format::Unknown => {
            encode_r(op, instr.funct3, instr.funct7, instr.rd, instr.rs1, instr.rs2)
        }
    }
}

#[inline]
fn reg(r: u8) -> u32 {
    (r & 0x1F) as u32
}

pub fn encode_r(opcode: u8, funct3: u8, funct7: u8, rd: u8, rs1: u8, rs2: u8) -> u32 {
    ((funct7 as u32 & 0x7F) << 25)
        | (reg(rs2) << 20)
        | (reg(rs1) << 15)
        | ((funct3 as u32 & 0x7) << 12)
        | (reg(rd) << 7)
        | (opcode as u32 & 0x7F)
}

pub fn encode_i(opcode: u8, funct3: u8, rd: u8, rs1: u8, imm: i32) -> u32 {
    (((imm as u32) & 0xFFF) << 20)
        | (reg(rs1) << 15)
        | ((funct3 as u32 & 0x7) << 12)
        | (reg(rd) << 7)
        | (opcode as u32 & 0x7F)
}

pub fn encode_s(opcode: u8, funct3: u8, rs1: u8, rs2: u8, imm: i32) -> u32 {
    let imm = imm as u32;
    (bits(imm, 11, 5) << 25)
        | (reg(rs2) << 20)
        | (reg(rs1) << 15)
        | ((funct3 as u32 & 0x7) << 12)
        | (bits(imm, 4, 0) << 7)
        | (opcode as u32 & 0x7F)
}

pub fn encode_b(opcode: u8, funct3: u8, rs1: u8, rs2: u8, imm: i32) -> u32 {
    let imm = imm as u32;
    (bits(imm, 12, 12) << 31)
        | (bits(imm, 10, 5) << 25)
        | (reg(rs2) << 20)
        | (reg(rs1) << 15)
        | ((funct3 as u32 & 0x7) << 12)
        | (bits(imm, 4, 1) << 8)
        | (bits(imm, 11, 11) << 7)
        | (opcode as u32 & 0x7F)
}

pub fn encode_u(opcode: u8, rd: u8, imm: i32) -> u32 {
    ((imm as u32) & 0xFFFF_F000) | (reg(rd) << 7) | (opcode as u32 & 0x7F)
}

pub fn encode_j(opcode: u8, rd: u8, imm: i32) -> u32 {
    let imm = imm as u32;
    (bits(imm, 20, 20) << 31)
        | (bits(imm, 10, 1) << 21)
        | (bits(imm, 11, 11) << 20)
        | (bits(imm, 19, 12) << 12)
        | (reg(rd) << 7)
        | (opcode as u32 & 0x7F)
}
