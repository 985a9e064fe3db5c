//! Hex program file format.
//!
//! A plain text format with one byte per line:
//! - Each significant line holds a hexadecimal byte (`37`, `0x37`)
//! - Anything after the hex digits is ignored (`37 // lui`)
//! - Lines starting with `#` are comments
//! - Blank lines are ignored; spaces and CR/LF are stripped
//!
//! Bytes are loaded in order from offset 0 of the instruction buffer.

use crate::cpu::program::{Program, ProgramError};
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Load a hex program from disk.
pub fn load_hex<P: AsRef<Path>>(path: P) -> Result<Program, LoadError> {
    let source = std::fs::read_to_string(path.as_ref())
        .map_err(|e| LoadError::IoError(e.to_string()))?;
    let program = parse_hex(&source)?;
    info!(path = %path.as_ref().display(), bytes = program.len(), "loaded program");
    Ok(program)
}

/// Parse hex program text.
pub fn parse_hex(source: &str) -> Result<Program, LoadError> {
    let mut program = Program::new();

    for (line_num, line) in source.lines().enumerate() {
        let token: String = line
            .chars()
            .filter(|c| !matches!(c, ' ' | '\t' | '\r' | '\n'))
            .collect();

        // Skip empty lines and comments
        if token.is_empty() || token.starts_with('#') {
            continue;
        }

        let byte = parse_byte(&token).map_err(|message| LoadError::ParseError {
            line: line_num + 1,
            message,
        })?;

        program.push(byte).map_err(|e| match e {
            ProgramError::Overflow { capacity } => LoadError::Overflow {
                line: line_num + 1,
                capacity,
            },
            other => LoadError::IoError(other.to_string()),
        })?;
    }

    Ok(program)
}

/// Parse the leading hex digits of a token, with an optional `0x` prefix.
fn parse_byte(token: &str) -> Result<u8, String> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    let end = digits
        .find(|c: char| !c.is_ascii_hexdigit())
        .unwrap_or(digits.len());
    let digits = &digits[..end];

    if digits.is_empty() {
        return Err(format!("expected a hex byte, found {token:?}"));
    }

    let value = u32::from_str_radix(digits, 16)
        .map_err(|_| format!("hex value {digits:?} is too large"))?;
    u8::try_from(value).map_err(|_| format!("value {value:#x} does not fit in a byte"))
}

/// Save a program to disk in the hex format.
pub fn save_hex<P: AsRef<Path>>(path: P, program: &Program) -> Result<(), LoadError> {
    let mut file = std::fs::File::create(path.as_ref())
        .map_err(|e| LoadError::IoError(e.to_string()))?;
    file.write_all(format_hex(program).as_bytes())
        .map_err(|e| LoadError::IoError(e.to_string()))
}

/// Render a program in the hex format, one byte per line.
pub fn format_hex(program: &Program) -> String {
    let mut out = String::new();
    out.push_str("# RV32 program\n");
    out.push_str(&format!("# {} bytes\n", program.len()));

    for (i, word) in program.as_bytes().chunks(4).enumerate() {
        out.push_str(&format!("# {:#06x}\n", i * 4));
        for byte in word {
            out.push_str(&format!("{byte:02x}\n"));
        }
    }

    out
}

/// Errors that can occur while loading a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("instruction memory overflow on line {line} (capacity {capacity} bytes)")]
    Overflow { line: usize, capacity: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::INSTRUCTION_MEMORY_SIZE;

    #[test]
    fn test_parse_with_comments_and_whitespace() {
        let source = "# lui a0, 1\n37\n 15 \r\n\n00\n0x00\n";
        let program = parse_hex(source).unwrap();
        assert_eq!(program.as_bytes(), &[0x37, 0x15, 0x00, 0x00]);
        assert_eq!(program.fetch(0).unwrap(), 0x0000_1537);
    }

    #[test]
    fn test_trailing_annotation_is_ignored() {
        let program = parse_hex("6f // jal\nFF;\n").unwrap();
        assert_eq!(program.as_bytes(), &[0x6F, 0xFF]);
    }

    #[test]
    fn test_empty_source() {
        let program = parse_hex("# nothing here\n\n").unwrap();
        assert!(program.is_empty());
    }

    #[test]
    fn test_malformed_token() {
        let err = parse_hex("37\nzz\n").unwrap_err();
        assert!(matches!(err, LoadError::ParseError { line: 2, .. }));
    }

    #[test]
    fn test_value_too_large() {
        let err = parse_hex("1ff\n").unwrap_err();
        assert!(matches!(err, LoadError::ParseError { line: 1, .. }));
    }

    #[test]
    fn test_overflow() {
        let source = "00\n".repeat(INSTRUCTION_MEMORY_SIZE + 1);
        let err = parse_hex(&source).unwrap_err();
        assert_eq!(
            err,
            LoadError::Overflow {
                line: INSTRUCTION_MEMORY_SIZE + 1,
                capacity: INSTRUCTION_MEMORY_SIZE,
            }
        );
    }

    #[test]
    fn test_format_parses_back() {
        let program = Program::from_words(&[0x0000_1537, 0x0000_006F]).unwrap();
        let text = format_hex(&program);
        assert_eq!(parse_hex(&text).unwrap(), program);
    }

    #[test]
    fn test_missing_file() {
        let err = load_hex("/nonexistent/program.hex").unwrap_err();
        assert!(matches!(err, LoadError::IoError(_)));
    }
}
