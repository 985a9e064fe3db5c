//! Disassembler for RV32 programs.
//!
//! Turns loaded program bytes back into readable assembly.

use crate::cpu::decode::decode;
use crate::cpu::program::Program;

/// Disassemble a single instruction word to text.
pub fn disassemble_instruction(word: u32) -> String {
    decode(word).to_string()
}

/// Disassemble every word of a program into a listing.
pub fn disassemble(program: &Program) -> String {
    let mut output = String::new();
    output.push_str("# RV32 disassembly\n");
    output.push_str("# -----------------\n\n");

    for (i, word) in program.words().enumerate() {
        let line = disassemble_instruction(word);
        output.push_str(&format!("{:04x}: {:08x}  {}\n", i * 4, word, line));
    }

    output
}
