//! Firmware image checksum.
//!
//! The bootloader verifies every uploaded image with this rolling checksum,
//! so the value sent in the `load` command must match bit for bit.

const POLYNOMIAL: u32 = 0x1D87_2B41;

/// Rolling 32-bit checksum accumulator, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checksum(u32);

impl Default for Checksum {
    fn default() -> Self {
        Checksum(1)
    }
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            let shifted = self.0.wrapping_shl(1);
            self.0 = if self.0 & 0x8000_0000 != 0 {
                shifted ^ POLYNOMIAL
            } else {
                shifted
            };
            self.0 ^= u32::from(byte);
        }
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

/// Checksum of a whole buffer.
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut sum = Checksum::new();
    sum.update(bytes);
    sum.value()
}
