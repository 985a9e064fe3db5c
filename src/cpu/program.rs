//! Instruction memory.
//!
//! A fixed 4 KiB buffer holding the program bytes, plus the number of bytes
//! actually loaded. The CPU borrows it for each fetch; it never owns it.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Capacity of the instruction buffer in bytes.
pub const INSTRUCTION_MEMORY_SIZE: usize = 4096;

/// Loaded program bytes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    bytes: Vec<u8>,
    len: usize,
}

impl Program {
    /// Create an empty program.
    pub fn new() -> Self {
        Self {
            bytes: vec![0; INSTRUCTION_MEMORY_SIZE],
            len: 0,
        }
    }

    /// Build a program from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProgramError> {
        let mut program = Self::new();
        for &byte in bytes {
            program.push(byte)?;
        }
        Ok(program)
    }

    /// Build a program from instruction words, little-endian.
    pub fn from_words(words: &[u32]) -> Result<Self, ProgramError> {
        let mut program = Self::new();
        for word in words {
            for byte in word.to_le_bytes() {
                program.push(byte)?;
            }
        }
        Ok(program)
    }

    /// Append one byte.
    pub fn push(&mut self, byte: u8) -> Result<(), ProgramError> {
        if self.len >= INSTRUCTION_MEMORY_SIZE {
            return Err(ProgramError::Overflow {
                capacity: INSTRUCTION_MEMORY_SIZE,
            });
        }
        self.bytes[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Fetch the little-endian word at `pc`.
    ///
    /// Valid when `pc + 3` lies inside the buffer. Bytes past the loaded
    /// length read as zero.
    pub fn fetch(&self, pc: u32) -> Result<u32, ProgramError> {
        let start = pc as usize;
        if start.saturating_add(3) >= self.bytes.len() {
            return Err(ProgramError::FetchOutOfBounds { pc });
        }
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.bytes[start..start + 4]);
        Ok(u32::from_le_bytes(buf))
    }

    /// Number of loaded bytes; the run ends when the PC reaches it.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The loaded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Loaded bytes grouped into words. A trailing partial word is zero-padded.
    pub fn words(&self) -> impl Iterator<Item = u32> + '_ {
        self.as_bytes().chunks(4).map(|chunk| {
            let mut buf = [0u8; 4];
            buf[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(buf)
        })
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("len", &self.len)
            .field("capacity", &INSTRUCTION_MEMORY_SIZE)
            .finish()
    }
}

/// Errors raised by the instruction buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("instruction memory overflow (capacity {capacity} bytes)")]
    Overflow { capacity: usize },

    #[error("program counter out of bounds: {pc:#x}")]
    FetchOutOfBounds { pc: u32 },
}
