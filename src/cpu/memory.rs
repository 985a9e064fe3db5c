//! Data memory.
//!
//! A flat, byte-addressable store of [`MEMORY_SIZE`] bytes. Every access is
//! bounds-checked against the full width of the access; nothing wraps.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Capacity of the data memory in bytes.
pub const MEMORY_SIZE: usize = 4096;

/// Byte-addressable data memory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// Create a new memory with all bytes zeroed.
    pub fn new() -> Self {
        Self {
            bytes: vec![0; MEMORY_SIZE],
        }
    }

    /// Validate an access of `width` bytes at `addr` and return its index.
    pub fn check(&self, addr: i32, width: usize) -> Result<usize, MemoryError> {
        if addr < 0 {
            return Err(MemoryError::OutOfBounds { addr, width });
        }
        let index = addr as usize;
        if index + width > self.bytes.len() {
            return Err(MemoryError::OutOfBounds { addr, width });
        }
        Ok(index)
    }

    /// Read one byte.
    pub fn read_byte(&self, addr: i32) -> Result<u8, MemoryError> {
        let index = self.check(addr, 1)?;
        Ok(self.bytes[index])
    }

    /// Read a little-endian 32-bit word.
    pub fn read_word(&self, addr: i32) -> Result<u32, MemoryError> {
        let index = self.check(addr, 4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.bytes[index..index + 4]);
        Ok(u32::from_le_bytes(buf))
    }

    /// Write one byte.
    pub fn write_byte(&mut self, addr: i32, value: u8) -> Result<(), MemoryError> {
        let index = self.check(addr, 1)?;
        self.bytes[index] = value;
        Ok(())
    }

    /// Write a little-endian 32-bit word.
    ///
    /// The span is validated before any byte is written, so a rejected
    /// store leaves memory untouched.
    pub fn write_word(&mut self, addr: i32, value: u32) -> Result<(), MemoryError> {
        let index = self.check(addr, 4)?;
        self.bytes[index..index + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Dump a range of bytes (for debugging).
    pub fn dump(&self, start: usize, count: usize) -> &[u8] {
        let start = start.min(self.bytes.len());
        let end = start.saturating_add(count).min(self.bytes.len());
        &self.bytes[start..end]
    }

    /// Total capacity in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero bytes
        let non_zero = self.bytes.iter().filter(|b| **b != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_bytes", &non_zero)
            .field("capacity", &self.bytes.len())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("memory access out of bounds at address {addr} (width {width})")]
    OutOfBounds { addr: i32, width: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_read_write() {
        let mut mem = Memory::new();
        mem.write_byte(10, 0xAB).unwrap();
        assert_eq!(mem.read_byte(10).unwrap(), 0xAB);
        assert_eq!(mem.read_byte(11).unwrap(), 0);
    }

    #[test]
    fn test_word_is_little_endian() {
        let mut mem = Memory::new();
        mem.write_word(0, 0x1234_5678).unwrap();
        assert_eq!(mem.dump(0, 4), &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(mem.read_word(0).unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_last_word_fits() {
        let mut mem = Memory::new();
        let last = (MEMORY_SIZE - 4) as i32;
        mem.write_word(last, 0xDEAD_BEEF).unwrap();
        assert_eq!(mem.read_word(last).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_word_straddling_end_is_rejected() {
        let mut mem = Memory::new();
        let addr = (MEMORY_SIZE - 1) as i32;

        assert_eq!(
            mem.write_word(addr, 0xFFFF_FFFF),
            Err(MemoryError::OutOfBounds { addr, width: 4 })
        );
        assert!(mem.read_word(addr).is_err());
        assert!(mem.dump(0, MEMORY_SIZE).iter().all(|b| *b == 0));

        // A single byte at the same address is fine
        mem.write_byte(addr, 0x55).unwrap();
        assert_eq!(mem.read_byte(addr).unwrap(), 0x55);
    }

    #[test]
    fn test_negative_and_past_end_addresses() {
        let mem = Memory::new();
        assert!(mem.read_byte(-1).is_err());
        assert!(mem.read_byte(MEMORY_SIZE as i32).is_err());
        assert!(mem.read_word(i32::MIN).is_err());
    }

    #[test]
    fn test_clear() {
        let mut mem = Memory::new();
        mem.write_word(100, 7).unwrap();
        mem.clear();
        assert_eq!(mem.read_word(100).unwrap(), 0);
    }
}
