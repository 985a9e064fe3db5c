//! CPU emulation for the RV32 subset.
//!
//! - 32 general-purpose registers, `x0` hard-wired to zero
//! - 4 KiB byte-addressable data memory
//! - 4 KiB instruction buffer, fetched little-endian
//! - LUI, JAL, BEQ, LB/LW, SB/SW, ADD/XOR, ORI/SRAI; everything else is a no-op

pub mod alu;
pub mod decode;
pub mod execute;
pub mod memory;
pub mod program;
pub mod registers;

pub use memory::{Memory, MemoryError, MEMORY_SIZE};
pub use registers::Registers;
pub use program::{Program, ProgramError, INSTRUCTION_MEMORY_SIZE};
pub use decode::{decode, encode, Instruction, Opcode, Format};
pub use alu::{AluControl, AluOp};
pub use execute::{Cpu, CpuError, CpuState, Effect, Executed, RunSummary, StopReason};
