//! Transaction framing for chip-select gated, full-duplex byte buses.
//!
//! `Idle → Selected` on chip-select assertion (receive buffer cleared),
//! one byte in and one reply byte out per bus byte while selected, and
//! `Selected → Idle` on release. A release with exactly `N` bytes hands the
//! frame to the device; anything else is a bus abort and is dropped.

/// Framer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    Idle,
    Selected,
}

/// Result of a chip-select change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome<const N: usize> {
    /// No state change (repeated level).
    Unchanged,
    Opened,
    Complete([u8; N]),
    /// Released with the wrong byte count. Expected during probing.
    Aborted { received: usize },
}

#[derive(Debug, Clone)]
pub struct SpiFramer<const N: usize> {
    state: FramerState,
    rx: [u8; N],
    received: usize,
    tx: [u8; N],
}

impl<const N: usize> Default for SpiFramer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SpiFramer<N> {
    pub fn new() -> Self {
        Self {
            state: FramerState::Idle,
            rx: [0; N],
            received: 0,
            tx: [0; N],
        }
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Bytes clocked in during the current (or last) transaction.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Reply that will be shifted out during the next transaction.
    pub fn reply(&self) -> &[u8; N] {
        &self.tx
    }

    pub fn set_reply(&mut self, reply: [u8; N]) {
        self.tx = reply;
    }

    pub fn on_select(&mut self, asserted: bool) -> FrameOutcome<N> {
        match (self.state, asserted) {
            (FramerState::Idle, true) => {
                self.state = FramerState::Selected;
                self.rx = [0; N];
                self.received = 0;
                FrameOutcome::Opened
            }
            (FramerState::Selected, false) => {
                self.state = FramerState::Idle;
                if self.received == N {
                    FrameOutcome::Complete(self.rx)
                } else {
                    FrameOutcome::Aborted {
                        received: self.received,
                    }
                }
            }
            _ => FrameOutcome::Unchanged,
        }
    }

    /// Shifts `byte` in and returns the reply byte shifted out in the same
    /// bus cycle. Bytes past the frame length are counted (so the frame
    /// aborts) and answered with zero.
    pub fn on_byte(&mut self, byte: u8) -> Option<u8> {
        if self.state != FramerState::Selected {
            return None;
        }
        let index = self.received;
        self.received = self.received.saturating_add(1);
        if index < N {
            self.rx[index] = byte;
            Some(self.tx[index])
        } else {
            Some(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_frame_is_delivered_once() {
        let mut f = SpiFramer::<3>::new();
        assert_eq!(f.on_select(true), FrameOutcome::Opened);
        assert_eq!(f.on_select(true), FrameOutcome::Unchanged);
        for b in [1, 2, 3] {
            f.on_byte(b);
        }
        assert_eq!(f.on_select(false), FrameOutcome::Complete([1, 2, 3]));
        assert_eq!(f.on_select(false), FrameOutcome::Unchanged);
        assert_eq!(f.state(), FramerState::Idle);
    }

    #[test]
    fn short_and_long_frames_abort() {
        let mut f = SpiFramer::<3>::new();
        f.on_select(true);
        f.on_byte(9);
        assert_eq!(f.on_select(false), FrameOutcome::Aborted { received: 1 });

        f.on_select(true);
        for b in 0..4 {
            f.on_byte(b);
        }
        assert_eq!(f.on_select(false), FrameOutcome::Aborted { received: 4 });
    }

    #[test]
    fn reply_is_shifted_out_byte_for_byte() {
        let mut f = SpiFramer::<2>::new();
        f.set_reply([0xAB, 0xCD]);
        assert_eq!(f.on_byte(0x11), None);
        f.on_select(true);
        assert_eq!(f.on_byte(0x11), Some(0xAB));
        assert_eq!(f.on_byte(0x22), Some(0xCD));
        assert_eq!(f.on_byte(0x33), Some(0));
    }

    #[test]
    fn opening_clears_the_previous_buffer() {
        let mut f = SpiFramer::<2>::new();
        f.on_select(true);
        f.on_byte(7);
        f.on_select(false);
        f.on_select(true);
        assert_eq!(f.received(), 0);
        f.on_byte(1);
        f.on_byte(2);
        assert_eq!(f.on_select(false), FrameOutcome::Complete([1, 2]));
    }
}
