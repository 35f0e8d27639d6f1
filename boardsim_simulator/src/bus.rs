//! The MCU side of an SPI bus, driven over board lines.

use crate::board::Board;
use boardsim_shared::{ConfigError, LineHandle};

/// Chip select (active low), MOSI byte line, and MISO byte line of one
/// slave on the board.
#[derive(Debug, Clone, Copy)]
pub struct SpiMaster {
    cs: LineHandle,
    mosi: LineHandle,
    miso: LineHandle,
}

impl SpiMaster {
    pub fn new(board: &Board, cs: &str, mosi: &str, miso: &str) -> Result<Self, ConfigError> {
        let wiring = board.wiring();
        Ok(Self {
            cs: wiring.resolve(cs)?,
            mosi: wiring.resolve(mosi)?,
            miso: wiring.resolve(miso)?,
        })
    }

    /// Selects the slave, clocks `bytes` out, and releases it. Returns the
    /// bytes the slave shifted back.
    pub fn transfer(&self, board: &mut Board, bytes: &[u8]) -> Result<Vec<u8>, ConfigError> {
        board.drive_handle(self.cs, 0)?;
        let mut reply = Vec::with_capacity(bytes.len());
        for byte in bytes {
            board.drive_handle(self.mosi, *byte as u32)?;
            reply.push(board.line_value_handle(self.miso).unwrap_or(0) as u8);
        }
        board.drive_handle(self.cs, 1)?;
        Ok(reply)
    }
}
