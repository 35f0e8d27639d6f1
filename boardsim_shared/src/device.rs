// Capability interfaces for simulated peripherals.
//
// A device implements `Peripheral` and opts into the capabilities it has
// (`ClockedDevice`, `SerialDevice`, `Scriptable`) through the accessor
// methods, instead of inheriting from a chain of base types.

use crate::scheduler::{Cycle, Scheduler, TimerHandle, TimerId, TimerKey};
use crate::scriptable::Scriptable;
use crate::wiring::LineHandle;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

/// Index of a device on its board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub usize);

impl DeviceId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A device-local port number (the device's own line enum, as an integer).
pub type PortId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Input,
    Output,
}

/// One row of a device's line table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDecl {
    pub port: PortId,
    /// Pin key used in settings (`step_in`, `diag_out`, ...).
    pub suffix: &'static str,
    pub direction: Direction,
    pub width: u8,
}

impl PortDecl {
    pub const fn input(port: PortId, suffix: &'static str, width: u8) -> Self {
        Self {
            port,
            suffix,
            direction: Direction::Input,
            width,
        }
    }

    pub const fn output(port: PortId, suffix: &'static str, width: u8) -> Self {
        Self {
            port,
            suffix,
            direction: Direction::Output,
            width,
        }
    }
}

/// What a handler may touch while it runs: the clock, its own output
/// ports, and its own timers.
pub struct SimContext<'a> {
    owner: DeviceId,
    outputs: &'a [Option<LineHandle>],
    scheduler: &'a mut Scheduler,
    raised: Vec<(LineHandle, u32)>,
}

impl<'a> SimContext<'a> {
    pub fn new(owner: DeviceId, outputs: &'a [Option<LineHandle>], scheduler: &'a mut Scheduler) -> Self {
        Self {
            owner,
            outputs,
            scheduler,
            raised: Vec::new(),
        }
    }

    pub fn owner(&self) -> DeviceId {
        self.owner
    }

    pub fn now(&self) -> Cycle {
        self.scheduler.now()
    }

    /// Queues a raise of one of this device's outputs. Unconnected ports
    /// swallow the value.
    pub fn raise(&mut self, port: PortId, value: u32) {
        if let Some(Some(line)) = self.outputs.get(port) {
            self.raised.push((*line, value));
        }
    }

    pub fn schedule_after(&mut self, timer: TimerId, delay: Cycle) -> TimerHandle {
        let key = TimerKey::new(self.owner, timer);
        self.scheduler.schedule_after(key, delay)
    }

    pub fn schedule_periodic(&mut self, timer: TimerId, delay: Cycle, period: Cycle) -> TimerHandle {
        let key = TimerKey::new(self.owner, timer);
        self.scheduler.schedule_periodic(key, delay, period)
    }

    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.scheduler.cancel(handle)
    }

    pub fn cancel_timer(&mut self, timer: TimerId) -> bool {
        self.scheduler.cancel_key(TimerKey::new(self.owner, timer))
    }

    pub fn timer_pending(&self, timer: TimerId) -> bool {
        self.scheduler.is_pending(TimerKey::new(self.owner, timer))
    }

    /// Lines raised during this handler, in raise order.
    pub fn into_raised(self) -> Vec<(LineHandle, u32)> {
        self.raised
    }
}

/// Base contract every simulated peripheral implements.
pub trait Peripheral: Send {
    /// Instance name, unique on the board (`X`, `buttons`, ...).
    fn name(&self) -> &str;

    fn kind(&self) -> &'static str;

    /// Declarative line table consumed by the board's registration routine.
    fn ports(&self) -> &'static [PortDecl];

    /// Called once after all lines are wired.
    fn init(&mut self, _ctx: &mut SimContext<'_>) {}

    /// A subscribed input line changed.
    fn on_input(&mut self, port: PortId, value: u32, ctx: &mut SimContext<'_>);

    fn clocked(&mut self) -> Option<&mut dyn ClockedDevice> {
        None
    }

    fn serial(&mut self) -> Option<&mut dyn SerialDevice> {
        None
    }

    fn scriptable(&mut self) -> Option<&mut dyn Scriptable> {
        None
    }

    /// Handle for the render/inspection thread.
    fn view(&self) -> Option<Arc<dyn Drawable>> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Devices that own cycle timers.
pub trait ClockedDevice {
    /// Timer `timer` reached `when`. Returning a later cycle re-arms it there.
    fn on_timer(&mut self, timer: TimerId, when: Cycle, ctx: &mut SimContext<'_>) -> Option<Cycle>;
}

/// Devices on a chip-select framed, full-duplex byte bus.
pub trait SerialDevice {
    /// Bytes in one complete transaction.
    fn frame_len(&self) -> usize;

    /// Chip select changed; `asserted` is the logical (not electrical) level.
    fn on_chip_select(&mut self, asserted: bool);

    /// One byte clocked in; returns the byte shifted out at the same time,
    /// or `None` while the device is not selected.
    fn on_serial_byte(&mut self, byte: u8) -> Option<u8>;
}

/// Published state, as the render thread sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewSnapshot {
    Motor {
        axis: char,
        position: f32,
        max_travel: f32,
        stalled: bool,
        enabled: bool,
        configured: bool,
    },
    Buttons {
        pressed: u8,
    },
}

/// Read-only visualization hook. Implementations read atomics only, so any
/// thread may call these at any time.
pub trait Drawable: Send + Sync {
    fn draw(&self) -> String;

    fn draw_simple(&self) -> String;

    fn snapshot(&self) -> ViewSnapshot;
}
