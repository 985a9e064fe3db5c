//! Program tooling around the CPU core.
//!
//! This module provides:
//! - The hex byte file loader/writer consumed by the CLI
//! - A two-pass assembler for the RV32 subset (text → instruction words)
//! - A disassembler (words → readable text)

pub mod assembler;
pub mod disasm;
pub mod hexfile;

pub use assembler::{assemble, assemble_program, AssemblerError};
pub use disasm::{disassemble, disassemble_instruction};
pub use hexfile::{format_hex, load_hex, parse_hex, save_hex, LoadError};
