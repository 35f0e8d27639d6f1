//! 40-bit SPI datagram: `RW(1) | ADDR(7) | DATA(32)` in, `STATUS(8) | DATA(32)` out,
//! most significant byte first on the wire.

use serde::Serialize;

pub const FRAME_LEN: usize = 5;

const RW_BIT: u32 = 39;
const ADDRESS_SHIFT: u32 = 32;
const WORD_MASK: u64 = (1 << 40) - 1;

/// Status flags the chip returns alongside every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SpiStatus {
    pub reset_flag: bool,
    pub driver_error: bool,
    pub stall_guard: bool,
    pub standstill: bool,
}

impl SpiStatus {
    pub fn to_bits(self) -> u8 {
        (self.reset_flag as u8)
            | (self.driver_error as u8) << 1
            | (self.stall_guard as u8) << 2
            | (self.standstill as u8) << 3
    }

    pub fn from_bits(bits: u8) -> Self {
        Self {
            reset_flag: bits & 0x1 != 0,
            driver_error: bits & 0x2 != 0,
            stall_guard: bits & 0x4 != 0,
            standstill: bits & 0x8 != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandWord(u64);

impl CommandWord {
    pub fn from_bytes(bytes: [u8; FRAME_LEN]) -> Self {
        let raw = bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
        Self(raw)
    }

    pub fn to_bytes(self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = (self.0 >> (8 * (FRAME_LEN - 1 - i))) as u8;
        }
        out
    }

    pub fn write(address: u8, data: u32) -> Self {
        Self((1 << RW_BIT) | ((address as u64 & 0x7F) << ADDRESS_SHIFT) | data as u64)
    }

    pub fn read(address: u8) -> Self {
        Self((address as u64 & 0x7F) << ADDRESS_SHIFT)
    }

    pub fn reply(data: u32, status: SpiStatus) -> Self {
        Self(((status.to_bits() as u64) << ADDRESS_SHIFT) | data as u64)
    }

    pub fn raw(self) -> u64 {
        self.0 & WORD_MASK
    }

    pub fn is_write(self) -> bool {
        (self.0 >> RW_BIT) & 1 == 1
    }

    pub fn address(self) -> u8 {
        ((self.0 >> ADDRESS_SHIFT) & 0x7F) as u8
    }

    pub fn data(self) -> u32 {
        self.0 as u32
    }

    /// Status nibble of a reply word.
    pub fn status(self) -> SpiStatus {
        SpiStatus::from_bits(((self.0 >> ADDRESS_SHIFT) & 0x0F) as u8)
    }
}
