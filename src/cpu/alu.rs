//! ALU control.
//!
//! The opcode picks an ALU class, and the class together with funct3/funct7
//! picks the operation. Combinations outside the table select
//! [`AluControl::Nop`] and leave the destination register untouched.

use crate::cpu::decode::Opcode;
use serde::{Serialize, Deserialize};

/// ALU class derived from the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AluOp {
    /// Register-register (opcode 0x33)
    RType,
    /// Register-immediate (opcode 0x13)
    IType,
    /// Every other opcode
    None,
}

impl AluOp {
    pub fn from_opcode(opcode: Opcode) -> Self {
        match opcode {
            Opcode::Op => AluOp::RType,
            Opcode::OpImm => AluOp::IType,
            _ => AluOp::None,
        }
    }
}

/// Operation selected by [`select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AluControl {
    Add,
    Xor,
    OrImm,
    SraImm,
    Nop,
}

/// Look up the ALU operation.
pub fn select(op: AluOp, funct3: u8, funct7: u8) -> AluControl {
    match (op, funct3, funct7) {
        (AluOp::RType, 0, 0x00) => AluControl::Add,
        (AluOp::RType, 4, 0x00) => AluControl::Xor,
        (AluOp::IType, 6, _) => AluControl::OrImm,
        (AluOp::IType, 5, 0x20) => AluControl::SraImm,
        _ => AluControl::Nop,
    }
}

/// Apply an operation to `lhs` and the second operand.
///
/// The second operand is `rs2` for R-type and the immediate for I-type; the
/// caller picks it. Returns `None` for [`AluControl::Nop`].
pub fn apply(control: AluControl, lhs: i32, rhs: i32) -> Option<i32> {
    match control {
        AluControl::Add => Some(lhs.wrapping_add(rhs)),
        AluControl::Xor => Some(lhs ^ rhs),
        AluControl::OrImm => Some(lhs | rhs),
        // Shift amount is imm[4:0]; `>>` on i32 is arithmetic
        AluControl::SraImm => Some(lhs >> (rhs & 0x1F)),
        AluControl::Nop => None,
    }
}
