use serde::{Deserialize, Serialize};

/// Size of the flat address space.
pub const MEMORY_SIZE: usize = 0x1_0000;

/// Byte-addressable storage seen by the decoder and executor.
///
/// Addresses are 16 bits and every access wraps, so none of these can fail.
pub trait Bus {
    fn read_u8(&self, addr: u16) -> u8;
    fn write_u8(&mut self, addr: u16, val: u8);

    /// Little-endian; the high byte lives at `addr + 1` (mod 65536).
    fn read_u16(&self, addr: u16) -> u16 {
        u16::from_le_bytes([self.read_u8(addr), self.read_u8(addr.wrapping_add(1))])
    }

    fn write_u16(&mut self, addr: u16, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.write_u8(addr, lo);
        self.write_u8(addr.wrapping_add(1), hi);
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ImageError {
    #[error("memory image must be exactly {expected} bytes, got {actual}")]
    Size { expected: usize, actual: usize },
}

/// The machine's 64 KiB memory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    mem: Vec<u8>,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self.mem.iter().filter(|b| **b != 0).count();
        f.debug_struct("Memory").field("nonzero_bytes", &used).finish()
    }
}

impl Memory {
    pub fn new() -> Self {
        Self {
            mem: vec![0; MEMORY_SIZE],
        }
    }

    /// Restores a full memory dump (byte i is address i).
    pub fn from_image(image: &[u8]) -> Result<Self, ImageError> {
        if image.len() != MEMORY_SIZE {
            return Err(ImageError::Size {
                expected: MEMORY_SIZE,
                actual: image.len(),
            });
        }
        Ok(Self { mem: image.to_vec() })
    }

    /// The raw dump, suitable for [`Memory::from_image`].
    pub fn image(&self) -> &[u8] {
        &self.mem
    }

    /// Copies `bytes` in starting at `at`, wrapping past the top of memory.
    pub fn load(&mut self, bytes: &[u8], at: u16) {
        let mut addr = at;
        for &b in bytes {
            self.mem[addr as usize] = b;
            addr = addr.wrapping_add(1);
        }
    }

    pub fn clear(&mut self) {
        self.mem.fill(0);
    }
}

impl Bus for Memory {
    fn read_u8(&self, addr: u16) -> u8 {
        self.mem[addr as usize]
    }

    fn write_u8(&mut self, addr: u16, val: u8) {
        self.mem[addr as usize] = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_access_is_little_endian_and_wraps() {
        let mut mem = Memory::new();
        mem.write_u16(0xFFFF, 0xBEEF);
        assert_eq!(mem.read_u8(0xFFFF), 0xEF);
        assert_eq!(mem.read_u8(0x0000), 0xBE);
        assert_eq!(mem.read_u16(0xFFFF), 0xBEEF);
    }

    #[test]
    fn load_wraps() {
        let mut mem = Memory::new();
        mem.load(&[1, 2, 3], 0xFFFE);
        assert_eq!(mem.read_u8(0xFFFE), 1);
        assert_eq!(mem.read_u8(0xFFFF), 2);
        assert_eq!(mem.read_u8(0x0000), 3);
    }

    #[test]
    fn image_must_be_full_size() {
        assert_eq!(
            Memory::from_image(&[0; 16]),
            Err(ImageError::Size {
                expected: MEMORY_SIZE,
                actual: 16
            })
        );
        let mut dump = vec![0u8; MEMORY_SIZE];
        dump[0x1234] = 0x56;
        let mem = Memory::from_image(&dump).unwrap();
        assert_eq!(mem.read_u8(0x1234), 0x56);
        assert_eq!(mem.image(), dump.as_slice());
    }
}
