// boardsim_shared: simulation core shared by the board simulator and host

pub mod device;
pub mod error;
pub mod irq;
pub mod regs;
pub mod scheduler;
pub mod scriptable;
pub mod spi;
pub mod wiring;

pub use device::{
    ClockedDevice, DeviceId, Direction, Drawable, Peripheral, PortDecl, PortId, SerialDevice, SimContext,
    ViewSnapshot,
};
pub use error::{ActionError, ConfigError};
pub use irq::{Interconnect, LineOwner, Subscriber};
pub use scheduler::{Cycle, Expired, Scheduler, TimerHandle, TimerId, TimerKey};
pub use scriptable::{ActionSpec, LineStatus, Scriptable};
pub use spi::{FrameOutcome, FramerState, SpiFramer};
pub use wiring::{LineHandle, LineSpec, WiringTable};
