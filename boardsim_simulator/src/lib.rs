// boardsim_simulator: peripheral models and the board that runs them

pub mod board;
pub mod bus;
pub mod devices;
pub mod driver;
pub mod script;
pub mod settings;
pub mod trace;

pub use board::{BOARD_TARGET, Board};
pub use bus::SpiMaster;
pub use driver::{DriverError, Pacing, SimDriver, SimHandle, SimRequest};
pub use script::{Script, ScriptError, ScriptLine, ScriptReport, ScriptRunner};
pub use settings::{BoardSettings, DeviceKind, DeviceSettings, load_settings};
pub use trace::{CsvTrace, JsonlTrace, MultiTrace, TraceError, TraceRow, TraceSink};
