//! A simulated board: peripherals, the lines between them, and the clock.
//!
//! The board is the only place that owns device state. Everything that
//! happens to a device (an input edge, a timer, a scripted action) runs as
//! one handler call with a [`SimContext`]; lines the handler raised are
//! propagated depth-first as soon as it returns.

use crate::devices;
use crate::settings::BoardSettings;
use crate::trace::{TraceRow, TraceSink};
use boardsim_shared::scriptable::{self, ActionSpec, LineStatus};
use boardsim_shared::{
    ActionError, ConfigError, Cycle, DeviceId, Direction, Drawable, Interconnect, LineHandle, LineOwner,
    Peripheral, Scheduler, SimContext, Subscriber, WiringTable,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Script target name for the board's own actions.
pub const BOARD_TARGET: &str = "Board";

const ACT_WAIT_CYCLES: u32 = 0;
const ACT_WAIT_MS: u32 = 1;
const ACT_DRIVE: u32 = 2;
const ACT_PULSE: u32 = 3;

const BOARD_ACTIONS: &[ActionSpec] = &[
    ActionSpec::new(ACT_WAIT_CYCLES, "WaitCycles", 1, "Advances the clock by n cycles"),
    ActionSpec::new(ACT_WAIT_MS, "WaitMs", 1, "Advances the clock by n milliseconds"),
    ActionSpec::new(ACT_DRIVE, "Drive", 2, "Drives an external line to a value"),
    ActionSpec::new(ACT_PULSE, "Pulse", 3, "Pulses a line high then low count times, one pulse per period"),
];

struct DeviceSlot {
    device: Box<dyn Peripheral>,
    /// Port number → claimed output line.
    outputs: Vec<Option<LineHandle>>,
}

struct Tracer {
    sink: Box<dyn TraceSink>,
    interval: Cycle,
    next: Cycle,
}

pub struct Board {
    name: String,
    clock_hz: u64,
    wiring: WiringTable,
    irq: Interconnect,
    scheduler: Scheduler,
    slots: Vec<DeviceSlot>,
    by_name: HashMap<String, DeviceId>,
    started: bool,
    tracer: Option<Tracer>,
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("name", &self.name)
            .field("now", &self.scheduler.now())
            .field("lines", &self.wiring.len())
            .field("devices", &self.slots.len())
            .finish()
    }
}

impl Board {
    /// Builds and starts the board described by `settings`.
    pub fn new(settings: &BoardSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let mut board = Self::from_wiring(&settings.board.name, settings.board.clock_hz, settings.wiring()?);
        for dev in &settings.devices {
            let device = devices::build(dev)?;
            board.attach(device, &dev.pins)?;
        }
        board.start();
        tracing::info!(
            board = %board.name,
            lines = board.wiring.len(),
            devices = board.slots.len(),
            "board ready"
        );
        Ok(board)
    }

    /// An empty board over `wiring`; devices are added with [`Board::attach`].
    pub fn from_wiring(name: impl Into<String>, clock_hz: u64, wiring: WiringTable) -> Self {
        let irq = Interconnect::new(&wiring);
        Self {
            name: name.into(),
            clock_hz,
            wiring,
            irq,
            scheduler: Scheduler::new(),
            slots: Vec::new(),
            by_name: HashMap::new(),
            started: false,
            tracer: None,
        }
    }

    /// Wires `device` into the interconnect. `pins` maps port suffixes to
    /// line names; unmapped ports stay unconnected. Nothing is changed if
    /// any pin fails to resolve.
    pub fn attach(
        &mut self,
        device: Box<dyn Peripheral>,
        pins: &BTreeMap<String, String>,
    ) -> Result<DeviceId, ConfigError> {
        let name = device.name().to_string();
        if self.by_name.contains_key(&name) || name.eq_ignore_ascii_case(BOARD_TARGET) {
            return Err(ConfigError::DuplicateDevice(name));
        }
        let ports = device.ports();
        let id = DeviceId(self.slots.len());

        let mut resolved = Vec::with_capacity(pins.len());
        let mut claiming = HashSet::new();
        for (suffix, line) in pins {
            let decl = ports
                .iter()
                .find(|p| p.suffix == suffix.as_str())
                .ok_or_else(|| ConfigError::UnknownPin {
                    device: name.clone(),
                    pin: suffix.clone(),
                })?;
            let handle = self.wiring.resolve(line)?;
            if decl.direction == Direction::Output {
                if let Some(LineOwner::Device(owner)) = self.irq.owner(handle) {
                    return Err(ConfigError::LineClaimed {
                        line: line.clone(),
                        owner: self.slots[owner.0].device.name().to_string(),
                    });
                }
                if !claiming.insert(handle) {
                    return Err(ConfigError::LineClaimed {
                        line: line.clone(),
                        owner: name.clone(),
                    });
                }
            }
            if self.wiring.width(handle).is_some_and(|w| w < decl.width) {
                tracing::warn!(
                    device = %name,
                    pin = %suffix,
                    line = %line,
                    "line is narrower than the port; values will be truncated"
                );
            }
            resolved.push((*decl, line.as_str(), handle));
        }

        let port_count = ports.iter().map(|p| p.port + 1).max().unwrap_or(0);
        let mut outputs = vec![None; port_count];
        for (decl, line, handle) in resolved {
            match decl.direction {
                Direction::Input => {
                    self.irq.register(
                        &self.wiring,
                        line,
                        Subscriber {
                            device: id,
                            port: decl.port,
                        },
                    )?;
                }
                Direction::Output => {
                    self.irq.claim(&self.wiring, line, id)?;
                    outputs[decl.port] = Some(handle);
                }
            }
            tracing::debug!(device = %name, pin = decl.suffix, %line, "pin wired");
        }

        tracing::debug!(device = %name, kind = device.kind(), id = id.0, "attached device");
        self.by_name.insert(name, id);
        self.slots.push(DeviceSlot { device, outputs });
        if self.started {
            self.init_device(id);
        }
        Ok(id)
    }

    /// Runs every device's `init` once. Later calls do nothing.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        for i in 0..self.slots.len() {
            self.init_device(DeviceId(i));
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clock_hz(&self) -> u64 {
        self.clock_hz
    }

    pub fn now(&self) -> Cycle {
        self.scheduler.now()
    }

    pub fn wiring(&self) -> &WiringTable {
        &self.wiring
    }

    pub fn device_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.device.name())
    }

    /// Drives an externally owned line.
    pub fn drive(&mut self, line: &str, value: u32) -> Result<(), ConfigError> {
        let handle = self.wiring.resolve(line)?;
        self.drive_handle(handle, value)
    }

    pub fn drive_handle(&mut self, handle: LineHandle, value: u32) -> Result<(), ConfigError> {
        match self.irq.owner(handle) {
            Some(LineOwner::External) => {}
            Some(LineOwner::Device(_)) => {
                let name = self.wiring.name(handle).unwrap_or_default().to_string();
                return Err(ConfigError::NotOwner(name));
            }
            None => return Err(ConfigError::UnknownLine(handle.to_string())),
        }
        self.start();
        self.propagate(handle, value);
        Ok(())
    }

    /// Name of the device that drives `handle`, or `None` for external lines.
    pub fn line_owner(&self, handle: LineHandle) -> Option<&str> {
        match self.irq.owner(handle)? {
            LineOwner::Device(id) => self.slots.get(id.0).map(|s| s.device.name()),
            LineOwner::External => None,
        }
    }

    /// Last value raised on `line`.
    pub fn line_value(&self, line: &str) -> Result<u32, ConfigError> {
        let handle = self.wiring.resolve(line)?;
        Ok(self.irq.value(handle).unwrap_or(0))
    }

    pub fn line_value_handle(&self, handle: LineHandle) -> Option<u32> {
        self.irq.value(handle)
    }

    pub fn advance(&mut self, cycles: Cycle) {
        let target = self.now().saturating_add(cycles);
        self.run_until(target);
    }

    /// Fires every timer due up to `limit` in (cycle, schedule order), then
    /// leaves the clock at `limit`.
    pub fn run_until(&mut self, limit: Cycle) {
        self.start();
        while let Some(due) = self.scheduler.next_due() {
            if due > limit {
                break;
            }
            self.sample_trace(due.saturating_sub(1));
            let Some(expired) = self.scheduler.pop_due(limit) else {
                break;
            };
            self.fire(expired);
        }
        self.scheduler.advance_to(limit);
        self.sample_trace(limit);
    }

    fn fire(&mut self, expired: boardsim_shared::Expired) {
        let owner = expired.key.owner;
        let Some(DeviceSlot { device, outputs }) = self.slots.get_mut(owner.0) else {
            tracing::warn!(owner = owner.0, "timer fired for a device that is not on the board");
            return;
        };
        let mut ctx = SimContext::new(owner, outputs, &mut self.scheduler);
        let next = match device.clocked() {
            Some(clocked) => clocked.on_timer(expired.key.timer, expired.when, &mut ctx),
            None => {
                tracing::warn!(device = %device.name(), "timer fired on a device without timers");
                None
            }
        };
        let raised = ctx.into_raised();
        self.scheduler.reschedule(&expired, next);
        self.propagate_all(raised);
    }

    /// Runs a scripted action, folding failures into [`LineStatus::Error`].
    pub fn invoke(&mut self, target: &str, action: &str, args: &[String]) -> LineStatus {
        match self.invoke_checked(target, action, args) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(device = target, action, "scripted action failed: {e}");
                LineStatus::Error
            }
        }
    }

    pub fn invoke_checked(&mut self, target: &str, action: &str, args: &[String]) -> Result<LineStatus, ActionError> {
        self.start();
        tracing::info!(device = target, action, ?args, cycle = self.now(), "invoke");
        if target.eq_ignore_ascii_case(BOARD_TARGET) {
            return self.invoke_board(action, args);
        }
        let id = *self
            .by_name
            .get(target)
            .ok_or_else(|| ActionError::UnknownTarget(target.to_string()))?;
        let DeviceSlot { device, outputs } = &mut self.slots[id.0];
        let unknown = || ActionError::UnknownAction {
            target: target.to_string(),
            action: action.to_string(),
        };
        let scriptable = device.scriptable().ok_or_else(unknown)?;
        let spec = *scriptable::find_action(scriptable.actions(), action).ok_or_else(unknown)?;
        let mut ctx = SimContext::new(id, outputs, &mut self.scheduler);
        let result = scriptable::invoke_checked(scriptable, spec.id, args, &mut ctx);
        let raised = ctx.into_raised();
        self.propagate_all(raised);
        result
    }

    fn invoke_board(&mut self, action: &str, args: &[String]) -> Result<LineStatus, ActionError> {
        let spec = scriptable::find_action(BOARD_ACTIONS, action).ok_or_else(|| ActionError::UnknownAction {
            target: BOARD_TARGET.to_string(),
            action: action.to_string(),
        })?;
        if args.len() != spec.arity {
            return Err(ActionError::ArgumentCount {
                action: spec.name.to_string(),
                expected: spec.arity,
                got: args.len(),
            });
        }
        match spec.id {
            ACT_WAIT_CYCLES => {
                let cycles: Cycle = scriptable::arg(args, 0)?;
                self.advance(cycles);
            }
            ACT_WAIT_MS => {
                let ms: u64 = scriptable::arg(args, 0)?;
                self.advance(self.ms_to_cycles(ms));
            }
            ACT_DRIVE => {
                let value: u32 = scriptable::arg(args, 1)?;
                self.drive(&args[0], value)
                    .map_err(|e| ActionError::bad_arg(args[0].clone(), e.to_string()))?;
            }
            ACT_PULSE => {
                let count: u32 = scriptable::arg(args, 1)?;
                let period: Cycle = scriptable::arg(args, 2)?;
                if period < 2 {
                    return Err(ActionError::bad_arg(args[2].clone(), "period must be at least 2 cycles"));
                }
                let handle = self
                    .wiring
                    .resolve(&args[0])
                    .map_err(|e| ActionError::bad_arg(args[0].clone(), e.to_string()))?;
                for _ in 0..count {
                    self.drive_handle(handle, 1)
                        .map_err(|e| ActionError::bad_arg(args[0].clone(), e.to_string()))?;
                    self.advance(period / 2);
                    self.drive_handle(handle, 0)
                        .map_err(|e| ActionError::bad_arg(args[0].clone(), e.to_string()))?;
                    self.advance(period - period / 2);
                }
            }
            other => return Err(ActionError::UnknownActionId(other)),
        }
        Ok(LineStatus::Completed)
    }

    pub fn ms_to_cycles(&self, ms: u64) -> Cycle {
        ms.saturating_mul(self.clock_hz) / 1000
    }

    /// Every action table on the board, the board's own first.
    pub fn action_tables(&mut self) -> Vec<(String, &'static [ActionSpec])> {
        let mut tables = vec![(BOARD_TARGET.to_string(), BOARD_ACTIONS)];
        for slot in &mut self.slots {
            let name = slot.device.name().to_string();
            if let Some(s) = slot.device.scriptable() {
                tables.push((name, s.actions()));
            }
        }
        tables
    }

    pub fn device<T: 'static>(&self, name: &str) -> Option<&T> {
        let id = self.by_name.get(name)?;
        self.slots[id.0].device.as_any().downcast_ref::<T>()
    }

    pub fn device_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        let id = self.by_name.get(name)?;
        self.slots[id.0].device.as_any_mut().downcast_mut::<T>()
    }

    /// Runs `f` against device `name` with a handler context, then
    /// propagates whatever it raised. `None` if there is no such device of
    /// type `T`.
    pub fn with_device<T, R>(&mut self, name: &str, f: impl FnOnce(&mut T, &mut SimContext<'_>) -> R) -> Option<R>
    where
        T: 'static,
    {
        self.start();
        let id = *self.by_name.get(name)?;
        let DeviceSlot { device, outputs } = &mut self.slots[id.0];
        let device = device.as_any_mut().downcast_mut::<T>()?;
        let mut ctx = SimContext::new(id, outputs, &mut self.scheduler);
        let result = f(device, &mut ctx);
        let raised = ctx.into_raised();
        self.propagate_all(raised);
        Some(result)
    }

    /// Render handles, in attach order.
    pub fn views(&self) -> Vec<(String, Arc<dyn Drawable>)> {
        self.slots
            .iter()
            .filter_map(|s| s.device.view().map(|v| (s.device.name().to_string(), v)))
            .collect()
    }

    /// Samples every motor view into `sink` each `interval` cycles, starting now.
    pub fn set_trace(&mut self, sink: Box<dyn TraceSink>, interval: Cycle) {
        self.tracer = Some(Tracer {
            sink,
            interval: interval.max(1),
            next: self.now(),
        });
    }

    pub fn take_trace(&mut self) -> Option<Box<dyn TraceSink>> {
        self.tracer.take().map(|t| t.sink)
    }

    fn init_device(&mut self, id: DeviceId) {
        let DeviceSlot { device, outputs } = &mut self.slots[id.0];
        let mut ctx = SimContext::new(id, outputs, &mut self.scheduler);
        device.init(&mut ctx);
        let raised = ctx.into_raised();
        self.propagate_all(raised);
    }

    fn propagate_all(&mut self, raised: Vec<(LineHandle, u32)>) {
        for (line, value) in raised {
            self.propagate(line, value);
        }
    }

    fn propagate(&mut self, line: LineHandle, value: u32) {
        let Self {
            irq, slots, scheduler, ..
        } = self;
        irq.propagate(line, value, &mut |sub: Subscriber, _line, value| {
            let Some(DeviceSlot { device, outputs }) = slots.get_mut(sub.device.0) else {
                return Vec::new();
            };
            let mut ctx = SimContext::new(sub.device, outputs, scheduler);
            device.on_input(sub.port, value, &mut ctx);
            ctx.into_raised()
        });
    }

    /// Emits every sample due at or before `upto`.
    fn sample_trace(&mut self, upto: Cycle) {
        let Some(tracer) = self.tracer.as_mut() else {
            return;
        };
        if tracer.next > upto {
            return;
        }
        let views = self
            .slots
            .iter()
            .filter_map(|s| s.device.view().map(|v| (s.device.name(), v)))
            .collect::<Vec<_>>();
        while tracer.next <= upto {
            for (name, view) in &views {
                let Some(row) = TraceRow::from_snapshot(tracer.next, name, &view.snapshot()) else {
                    continue;
                };
                if let Err(e) = tracer.sink.record(&row) {
                    tracing::error!("trace write failed, recording stopped: {e}");
                    self.tracer = None;
                    return;
                }
            }
            tracer.next = tracer.next.saturating_add(tracer.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::tmc2130::{DriverConfig, Tmc2130};

    fn wiring() -> WiringTable {
        let mut w = WiringTable::new();
        for name in ["x.step", "x.dir", "x.en", "x.diag"] {
            w.add(name, 1).unwrap();
        }
        w
    }

    fn pins(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn board_with_driver() -> Board {
        let mut board = Board::from_wiring("t", 16_000_000, wiring());
        let driver = Tmc2130::with_config("X", 'X', DriverConfig::default()).unwrap();
        board
            .attach(
                Box::new(driver),
                &pins(&[("step_in", "x.step"), ("dir_in", "x.dir"), ("diag_out", "x.diag")]),
            )
            .unwrap();
        board.start();
        board
    }

    #[test]
    fn unknown_pin_leaves_the_board_untouched() {
        let mut board = Board::from_wiring("t", 1, wiring());
        let driver = Tmc2130::new("X", 'X');
        let err = board
            .attach(Box::new(driver), &pins(&[("diag_out", "x.diag"), ("bogus", "x.step")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPin { .. }));
        assert!(board.device::<Tmc2130>("X").is_none());
        // the diag line was not claimed by the failed attach
        board.drive("x.diag", 1).unwrap();
    }

    #[test]
    fn second_claim_of_an_output_fails() {
        let mut board = board_with_driver();
        let other = Tmc2130::new("Y", 'Y');
        let err = board
            .attach(Box::new(other), &pins(&[("diag_out", "x.diag")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::LineClaimed { owner, .. } if owner == "X"));
    }

    #[test]
    fn device_owned_lines_cannot_be_driven() {
        let mut board = board_with_driver();
        assert!(matches!(board.drive("x.diag", 1), Err(ConfigError::NotOwner(_))));
        assert!(matches!(board.drive("nope", 1), Err(ConfigError::UnknownLine(_))));
    }

    #[test]
    fn pulses_reach_the_driver_and_time_advances() {
        let mut board = board_with_driver();
        board.drive("x.dir", 1).unwrap();
        let args = ["x.step".to_string(), "10".to_string(), "100".to_string()];
        assert_eq!(board.invoke("Board", "Pulse", &args), LineStatus::Completed);
        assert_eq!(board.now(), 1000);
        let x = board.device::<Tmc2130>("X").unwrap();
        assert_eq!(x.step_count(), 10);
    }

    #[test]
    fn standstill_raises_diag_once() {
        let mut board = board_with_driver();
        board.drive("x.step", 1).unwrap();
        board.drive("x.step", 0).unwrap();
        assert_eq!(board.line_value("x.diag").unwrap(), 0);
        board.advance(DriverConfig::default().standstill_cycles);
        assert_eq!(board.line_value("x.diag").unwrap(), 1);
        assert_eq!(board.invoke("X", "WaitStandstill", &[]), LineStatus::Completed);
    }

    #[test]
    fn action_errors_are_reported() {
        let mut board = board_with_driver();
        assert_eq!(board.invoke("Q", "ToggleStall", &[]), LineStatus::Error);
        assert!(matches!(
            board.invoke_checked("X", "Explode", &[]),
            Err(ActionError::UnknownAction { .. })
        ));
        assert!(matches!(
            board.invoke_checked("X", "SetPosition", &[]),
            Err(ActionError::ArgumentCount { expected: 1, got: 0, .. })
        ));
        assert!(matches!(
            board.invoke_checked("board", "WaitCycles", &["soon".to_string()]),
            Err(ActionError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn toggle_stall_drives_diag() {
        let mut board = board_with_driver();
        assert_eq!(board.invoke("X", "togglestall", &[]), LineStatus::Completed);
        assert_eq!(board.line_value("x.diag").unwrap(), 1);
        board.invoke("X", "ResetDiag", &[]);
        assert_eq!(board.line_value("x.diag").unwrap(), 0);
    }

    #[test]
    fn action_tables_include_the_board() {
        let mut board = board_with_driver();
        let tables = board.action_tables();
        assert_eq!(tables[0].0, BOARD_TARGET);
        assert!(tables[1].1.iter().any(|a| a.name == "WaitStandstill"));
    }
}
