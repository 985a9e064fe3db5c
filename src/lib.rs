//! # RV32 Simulator
//!
//! A single-cycle instruction-set simulator for a reduced RISC-V (RV32I)
//! subset.
//!
//! A [`Program`] holds the instruction bytes; a [`Cpu`] owns the register
//! file, program counter and 4 KiB data memory, and advances one instruction
//! per [`Cpu::step`]. Instructions outside the subset execute as no-ops and
//! are reported as [`Effect::NoOp`].

pub mod cpu;
pub mod asm;

// Re-export commonly used types
pub use cpu::{Cpu, CpuError, CpuState, Effect, Executed, Instruction, Memory, Program, Registers, RunSummary, StopReason};
pub use asm::{assemble, assemble_program, disassemble, load_hex, parse_hex, AssemblerError, LoadError};
