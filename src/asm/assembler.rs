//! Simple two-pass assembler for RV32 programs.
//!
//! Syntax:
//! ```text
//! # Comment (`;` works too)
//! start:                  # Define a label
//!     lui  a0, 0x1        # Upper immediate
//!     ori  a1, zero, 42
//!     sw   a1, 8(a0)      # Memory operands are offset(base)
//!     beq  a0, a1, start  # Branch targets are labels or byte offsets
//!     jal  zero, 0        # Spin in place
//!     .word 0xdeadbeef    # Raw data word
//! ```
//!
//! Registers may be written as `x0`..`x31` or by ABI name.

use crate::cpu::decode::{
    decode, encode, encode_b, encode_i, encode_j, encode_r, encode_s, encode_u, AccessWidth,
    Format, Opcode,
};
use crate::cpu::program::Program;
use crate::cpu::registers::parse_register;
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source code to a list of instruction words.
pub fn assemble(source: &str) -> Result<Vec<u32>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// Assemble source code straight into a loadable program.
pub fn assemble_program(source: &str) -> Result<Program, AssemblerError> {
    let words = assemble(source)?;
    Program::from_words(&words).map_err(|_| AssemblerError::ProgramTooLarge {
        bytes: words.len() * 4,
    })
}

/// A label reference waiting for pass 2.
struct Fixup {
    /// Index into the output.
    index: usize,
    label: String,
    line: usize,
}

/// The assembler state.
struct Assembler {
    /// Symbol table (label -> byte address).
    symbols: HashMap<String, u32>,
    /// Branch and jump targets to patch once all labels are known.
    pending: Vec<Fixup>,
    /// Output words.
    output: Vec<u32>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            pending: Vec::new(),
            output: Vec::new(),
        }
    }

    fn current_addr(&self) -> u32 {
        (self.output.len() * 4) as u32
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<u32>, AssemblerError> {
        // Pass 1: collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: resolve label references
        self.resolve_references()?;

        Ok(std::mem::take(&mut self.output))
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        // Remove comments
        let line = match line.find(|c: char| c == '#' || c == ';') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let mut line = line.trim();

        // Any number of labels may precede the instruction
        while let Some(colon_idx) = line.find(':') {
            let label = line[..colon_idx].trim();
            if label.is_empty() || label.contains(char::is_whitespace) {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("invalid label {label:?}"),
                });
            }
            let addr = self.current_addr();
            if self.symbols.insert(label.to_string(), addr).is_some() {
                return Err(AssemblerError::DuplicateLabel {
                    line: line_num,
                    label: label.to_string(),
                });
            }
            line = line[colon_idx + 1..].trim();
        }

        if line.is_empty() {
            return Ok(());
        }

        self.process_instruction(line, line_num)
    }

    fn process_instruction(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
            Some((m, r)) => (m, r.trim()),
            None => (line, ""),
        };
        let mnemonic = mnemonic.to_ascii_lowercase();
        let operands: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(str::trim).collect()
        };

        let ops = Operands {
            items: &operands,
            line: line_num,
        };

        let word = match mnemonic.as_str() {
            // Directives
            ".word" => {
                ops.expect(1)?;
                let value = ops.number(0)?;
                if value < i32::MIN as i64 || value > u32::MAX as i64 {
                    return Err(AssemblerError::ValueOutOfRange { line: line_num, value });
                }
                value as u32
            }

            "nop" => {
                ops.expect(0)?;
                encode_i(Opcode::OP_IMM, 0, 0, 0, 0)
            }

            "lui" => {
                ops.expect(2)?;
                let rd = ops.register(0)?;
                let imm = ops.number(1)?;
                if !(-0x8_0000..=0xF_FFFF).contains(&imm) {
                    return Err(AssemblerError::ValueOutOfRange { line: line_num, value: imm });
                }
                encode_u(Opcode::LUI, rd, (imm as i32) << 12)
            }

            "jal" => {
                // `jal target` links through ra
                let (rd, target) = match operands.len() {
                    1 => (1, 0),
                    _ => {
                        ops.expect(2)?;
                        (ops.register(0)?, 1)
                    }
                };
                let offset = self.target(&ops, target, Format::J)?;
                encode_j(Opcode::JAL, rd, offset)
            }

            "beq" | "bne" | "blt" | "bge" | "bltu" | "bgeu" => {
                ops.expect(3)?;
                let funct3 = match mnemonic.as_str() {
                    "beq" => 0,
                    "bne" => 1,
                    "blt" => 4,
                    "bge" => 5,
                    "bltu" => 6,
                    _ => 7,
                };
                let rs1 = ops.register(0)?;
                let rs2 = ops.register(1)?;
                let offset = self.target(&ops, 2, Format::B)?;
                encode_b(Opcode::BRANCH, funct3, rs1, rs2, offset)
            }

            "lb" | "lh" | "lw" | "lbu" | "lhu" => {
                ops.expect(2)?;
                let funct3 = match mnemonic.as_str() {
                    "lb" => AccessWidth::BYTE,
                    "lh" => AccessWidth::HALF,
                    "lw" => AccessWidth::WORD,
                    "lbu" => 4,
                    _ => 5,
                };
                let rd = ops.register(0)?;
                let (offset, rs1) = ops.memory(1)?;
                encode_i(Opcode::LOAD, funct3, rd, rs1, offset)
            }

            "sb" | "sh" | "sw" => {
                ops.expect(2)?;
                let funct3 = match mnemonic.as_str() {
                    "sb" => AccessWidth::BYTE,
                    "sh" => AccessWidth::HALF,
                    _ => AccessWidth::WORD,
                };
                let rs2 = ops.register(0)?;
                let (offset, rs1) = ops.memory(1)?;
                encode_s(Opcode::STORE, funct3, rs1, rs2, offset)
            }

            "addi" | "slti" | "sltiu" | "xori" | "ori" | "andi" => {
                ops.expect(3)?;
                let funct3 = match mnemonic.as_str() {
                    "addi" => 0,
                    "slti" => 2,
                    "sltiu" => 3,
                    "xori" => 4,
                    "ori" => 6,
                    _ => 7,
                };
                let rd = ops.register(0)?;
                let rs1 = ops.register(1)?;
                let imm = ops.immediate12(2)?;
                encode_i(Opcode::OP_IMM, funct3, rd, rs1, imm)
            }

            "slli" | "srli" | "srai" => {
                ops.expect(3)?;
                let (funct3, funct7) = match mnemonic.as_str() {
                    "slli" => (1, 0x00),
                    "srli" => (5, 0x00),
                    _ => (5, 0x20),
                };
                let rd = ops.register(0)?;
                let rs1 = ops.register(1)?;
                let shamt = ops.number(2)?;
                if !(0..32).contains(&shamt) {
                    return Err(AssemblerError::ValueOutOfRange { line: line_num, value: shamt });
                }
                encode_i(Opcode::OP_IMM, funct3, rd, rs1, (funct7 << 5) | shamt as i32)
            }

            "add" | "sub" | "sll" | "slt" | "sltu" | "xor" | "srl" | "sra" | "or" | "and" => {
                ops.expect(3)?;
                let (funct3, funct7) = match mnemonic.as_str() {
                    "add" => (0, 0x00),
                    "sub" => (0, 0x20),
                    "sll" => (1, 0x00),
                    "slt" => (2, 0x00),
                    "sltu" => (3, 0x00),
                    "xor" => (4, 0x00),
                    "srl" => (5, 0x00),
                    "sra" => (5, 0x20),
                    "or" => (6, 0x00),
                    _ => (7, 0x00),
                };
                let rd = ops.register(0)?;
                let rs1 = ops.register(1)?;
                let rs2 = ops.register(2)?;
                encode_r(Opcode::OP, funct3, funct7, rd, rs1, rs2)
            }

            _ => {
                return Err(AssemblerError::UnknownMnemonic {
                    line: line_num,
                    mnemonic: mnemonic.to_string(),
                })
            }
        };

        self.output.push(word);
        Ok(())
    }

    /// Resolve a branch/jump target operand to a PC-relative offset.
    ///
    /// Labels are recorded for pass 2 and yield 0 for now.
    fn target(&mut self, ops: &Operands, index: usize, format: Format) -> Result<i32, AssemblerError> {
        let operand = ops.get(index)?;
        if let Ok(value) = parse_number(operand) {
            return check_offset(value, format, ops.line);
        }

        self.pending.push(Fixup {
            index: self.output.len(),
            label: operand.to_string(),
            line: ops.line,
        });
        Ok(0)
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        for fixup in &self.pending {
            let target = self.symbols.get(&fixup.label).ok_or_else(|| {
                AssemblerError::UndefinedLabel {
                    line: fixup.line,
                    label: fixup.label.clone(),
                }
            })?;

            let addr = (fixup.index * 4) as i64;
            let mut instr = decode(self.output[fixup.index]);
            instr.imm = check_offset(*target as i64 - addr, instr.format(), fixup.line)?;
            self.output[fixup.index] = encode(&instr);
        }
        Ok(())
    }
}

/// Operand list of one source line.
struct Operands<'a> {
    items: &'a [&'a str],
    line: usize,
}

impl<'a> Operands<'a> {
    fn expect(&self, count: usize) -> Result<(), AssemblerError> {
        if self.items.len() != count {
            return Err(AssemblerError::SyntaxError {
                line: self.line,
                message: format!("expected {} operands, found {}", count, self.items.len()),
            });
        }
        Ok(())
    }

    fn get(&self, index: usize) -> Result<&'a str, AssemblerError> {
        self.items.get(index).copied().ok_or_else(|| AssemblerError::SyntaxError {
            line: self.line,
            message: format!("missing operand {}", index + 1),
        })
    }

    fn register(&self, index: usize) -> Result<u8, AssemblerError> {
        let name = self.get(index)?;
        parse_register(name).ok_or_else(|| AssemblerError::UnknownRegister {
            line: self.line,
            name: name.to_string(),
        })
    }

    fn number(&self, index: usize) -> Result<i64, AssemblerError> {
        let text = self.get(index)?;
        parse_number(text).map_err(|message| AssemblerError::SyntaxError {
            line: self.line,
            message,
        })
    }

    fn immediate12(&self, index: usize) -> Result<i32, AssemblerError> {
        let value = self.number(index)?;
        if !(-2048..=2047).contains(&value) {
            return Err(AssemblerError::ValueOutOfRange { line: self.line, value });
        }
        Ok(value as i32)
    }

    /// Parse an `offset(base)` memory operand. The offset may be omitted.
    fn memory(&self, index: usize) -> Result<(i32, u8), AssemblerError> {
        let text = self.get(index)?;
        let syntax = || AssemblerError::SyntaxError {
            line: self.line,
            message: format!("expected offset(register), found {text:?}"),
        };

        let open = text.find('(').ok_or_else(syntax)?;
        let inner = text[open + 1..].strip_suffix(')').ok_or_else(syntax)?;
        let base = parse_register(inner).ok_or_else(|| AssemblerError::UnknownRegister {
            line: self.line,
            name: inner.trim().to_string(),
        })?;

        let offset_text = text[..open].trim();
        let offset = if offset_text.is_empty() {
            0
        } else {
            parse_number(offset_text).map_err(|message| AssemblerError::SyntaxError {
                line: self.line,
                message,
            })?
        };
        if !(-2048..=2047).contains(&offset) {
            return Err(AssemblerError::ValueOutOfRange { line: self.line, value: offset });
        }

        Ok((offset as i32, base))
    }
}

/// Parse a decimal or `0x` hex literal, optionally negative.
fn parse_number(text: &str) -> Result<i64, String> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let value = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).map_err(|_| format!("invalid hex literal {text:?}"))?
    } else {
        body.parse::<i64>().map_err(|_| format!("invalid number {text:?}"))?
    };

    Ok(if negative { -value } else { value })
}

/// Check that a PC-relative offset is even and fits its format.
fn check_offset(value: i64, format: Format, line: usize) -> Result<i32, AssemblerError> {
    let range = match format {
        Format::B => -4096..=4094,
        Format::J => -1_048_576..=1_048_574,
        _ => return Err(AssemblerError::ValueOutOfRange { line, value }),
    };
    if value % 2 != 0 || !range.contains(&value) {
        return Err(AssemblerError::ValueOutOfRange { line, value });
    }
    Ok(value as i32)
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("unknown register on line {line}: {name}")]
    UnknownRegister { line: usize, name: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },

    #[error("program of {bytes} bytes does not fit in instruction memory")]
    ProgramTooLarge { bytes: usize },
}
