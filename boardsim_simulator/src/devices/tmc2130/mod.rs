//! TMC2130 stepper driver.
//!
//! SPI register access (40-bit datagrams, reply one transaction late),
//! STEP/DIR/EN pin handling, and the motion integrator that turns step
//! pulses into an axis position with end-stop clamping and standstill
//! detection.

pub mod command;
pub mod registers;
pub mod view;

use boardsim_shared::regs::{Access, RegisterBank};
use boardsim_shared::scriptable::{self, ActionSpec, LineStatus, Scriptable};
use boardsim_shared::{
    ActionError, ClockedDevice, ConfigError, Cycle, Drawable, FrameOutcome, Peripheral, PortDecl, PortId,
    SerialDevice, SimContext, SpiFramer, TimerId,
};
use command::{CommandWord, FRAME_LEN, SpiStatus};
use registers::{DRV_STATUS, GCONF, GSTAT, IHOLD_IRUN, LAYOUT, REGISTER_COUNT, SG_RESULT_FREE};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
pub use view::MotorView;

pub const KIND: &str = "tmc2130";

/// Port numbers, in line-table order.
pub mod lines {
    use boardsim_shared::PortId;

    pub const BYTE_IN: PortId = 0;
    pub const BYTE_OUT: PortId = 1;
    pub const CS_IN: PortId = 2;
    pub const STEP_IN: PortId = 3;
    pub const DIR_IN: PortId = 4;
    pub const EN_IN: PortId = 5;
    pub const DIAG_OUT: PortId = 6;
    pub const MIN_OUT: PortId = 7;
    pub const POS_OUT: PortId = 8;
}

const PORTS: &[PortDecl] = &[
    PortDecl::input(lines::BYTE_IN, "byte_in", 8),
    PortDecl::output(lines::BYTE_OUT, "byte_out", 8),
    PortDecl::input(lines::CS_IN, "cs_in", 1),
    PortDecl::input(lines::STEP_IN, "step_in", 1),
    PortDecl::input(lines::DIR_IN, "dir_in", 1),
    PortDecl::input(lines::EN_IN, "en_in", 1),
    PortDecl::output(lines::DIAG_OUT, "diag_out", 1),
    PortDecl::output(lines::MIN_OUT, "min_out", 1),
    PortDecl::output(lines::POS_OUT, "pos_out", 32),
];

const TIMER_STANDSTILL: TimerId = 0;

const ACT_TOGGLE_STALL: u32 = 0;
const ACT_SET_DIAG: u32 = 1;
const ACT_RESET_DIAG: u32 = 2;
const ACT_WAIT_STANDSTILL: u32 = 3;
const ACT_SET_POSITION: u32 = 4;

const ACTIONS: &[ActionSpec] = &[
    ActionSpec::new(ACT_TOGGLE_STALL, "ToggleStall", 0, "Toggles the stallGuard flag (and DIAG with it)"),
    ActionSpec::new(ACT_SET_DIAG, "SetDiag", 0, "Forces the DIAG output high"),
    ActionSpec::new(ACT_RESET_DIAG, "ResetDiag", 0, "Forces the DIAG output low"),
    ActionSpec::new(ACT_WAIT_STANDSTILL, "WaitStandstill", 0, "Waits until the standstill flag is set"),
    ActionSpec::new(ACT_SET_POSITION, "SetPosition", 1, "Moves the axis to a position in mm"),
];

/// Axis mechanics and pin polarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub inverted: bool,
    pub steps_per_mm: u16,
    pub max_mm: i16,
    pub start_pos: f32,
    pub no_endstops: bool,
    /// Idle cycles after the last step before standstill is reported.
    pub standstill_cycles: Cycle,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            inverted: false,
            steps_per_mm: 100,
            max_mm: 200,
            start_pos: 10.0,
            no_endstops: false,
            standstill_cycles: 1 << 20,
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps_per_mm == 0 {
            return Err(ConfigError::invalid("steps_per_mm", "must be greater than zero"));
        }
        if self.max_mm <= 0 {
            return Err(ConfigError::invalid("max_mm", "must be greater than zero"));
        }
        if !self.start_pos.is_finite() {
            return Err(ConfigError::invalid("start_pos", "must be a finite number"));
        }
        if !self.no_endstops && !(0.0..=self.max_mm as f32).contains(&self.start_pos) {
            return Err(ConfigError::invalid(
                "start_pos",
                format!("{} is outside the travel range 0..={}", self.start_pos, self.max_mm),
            ));
        }
        if self.standstill_cycles == 0 {
            return Err(ConfigError::invalid("standstill_cycles", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Driver state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverState {
    Unconfigured,
    Disabled,
    Idle,
    Moving,
    Stalled,
}

#[derive(Debug)]
pub struct Tmc2130 {
    name: String,
    cfg: DriverConfig,
    configured: bool,
    framer: SpiFramer<FRAME_LEN>,
    regs: RegisterBank<REGISTER_COUNT>,
    // pin latches
    dir: bool,
    enabled: bool,
    step_level: bool,
    // motion
    step: i32,
    min_step: i32,
    max_step: i32,
    moving: bool,
    // status
    stall_guard: bool,
    standstill: bool,
    reset_flag: bool,
    driver_error: bool,
    diag: bool,
    at_min: bool,
    view: Arc<MotorView>,
}

impl Tmc2130 {
    pub fn new(name: impl Into<String>, axis: char) -> Self {
        Self {
            name: name.into(),
            cfg: DriverConfig::default(),
            configured: false,
            framer: SpiFramer::new(),
            regs: RegisterBank::new(),
            dir: false,
            enabled: true,
            step_level: false,
            step: 0,
            min_step: 0,
            max_step: 0,
            moving: false,
            stall_guard: false,
            standstill: false,
            reset_flag: true,
            driver_error: false,
            diag: false,
            at_min: false,
            view: Arc::new(MotorView::new(axis)),
        }
    }

    pub fn with_config(name: impl Into<String>, axis: char, cfg: DriverConfig) -> Result<Self, ConfigError> {
        let mut driver = Self::new(name, axis);
        driver.configure(cfg)?;
        Ok(driver)
    }

    /// Applies `cfg` immediately. The step counter re-homes to the start
    /// position, the travel bounds follow the new geometry, and stall and
    /// standstill status is cleared. Output lines are left alone; a wired
    /// driver should go through [`Tmc2130::reconfigure`].
    pub fn configure(&mut self, cfg: DriverConfig) -> Result<(), ConfigError> {
        cfg.validate()?;
        let spu = cfg.steps_per_mm as f32;
        self.cfg = cfg;
        // innermost whole steps whose positions lie inside 0..=max_mm
        self.min_step = (-self.cfg.start_pos * spu).ceil() as i32;
        self.max_step = ((self.cfg.max_mm as f32 - self.cfg.start_pos) * spu).floor() as i32;
        while self.position_at(self.min_step) < 0.0 {
            self.min_step += 1;
        }
        while self.position_at(self.max_step) > self.cfg.max_mm as f32 {
            self.max_step -= 1;
        }
        self.step = 0;
        self.stall_guard = false;
        self.standstill = false;
        self.moving = false;
        self.configured = true;
        self.view.set_max_travel(self.cfg.max_mm as f32);
        self.view.set_position(self.position());
        self.view.set_configured(true);
        tracing::debug!(
            driver = %self.name,
            steps_per_mm = self.cfg.steps_per_mm,
            max_mm = self.cfg.max_mm,
            start = self.cfg.start_pos,
            "driver configured"
        );
        Ok(())
    }

    /// [`Tmc2130::configure`] on a running board: also drops a pending
    /// standstill timeout and republishes position, MIN and DIAG.
    pub fn reconfigure(&mut self, cfg: DriverConfig, ctx: &mut SimContext<'_>) -> Result<(), ConfigError> {
        self.configure(cfg)?;
        ctx.cancel_timer(TIMER_STANDSTILL);
        self.publish_position(ctx);
        self.update_diag(ctx);
        Ok(())
    }

    pub fn config(&self) -> &DriverConfig {
        &self.cfg
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn axis(&self) -> char {
        self.view.axis()
    }

    pub fn set_axis(&mut self, axis: char) {
        self.view.set_axis(axis);
    }

    /// Steps taken since the last configure, signed.
    pub fn step_count(&self) -> i32 {
        self.step
    }

    pub fn position(&self) -> f32 {
        self.position_at(self.step)
    }

    fn position_at(&self, step: i32) -> f32 {
        step as f32 / self.cfg.steps_per_mm as f32 + self.cfg.start_pos
    }

    pub fn state(&self) -> DriverState {
        if !self.configured {
            DriverState::Unconfigured
        } else if self.standstill {
            DriverState::Stalled
        } else if !self.enabled {
            DriverState::Disabled
        } else if self.moving {
            DriverState::Moving
        } else {
            DriverState::Idle
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn stall_guard(&self) -> bool {
        self.stall_guard
    }

    pub fn standstill(&self) -> bool {
        self.standstill
    }

    /// Level last driven on DIAG.
    pub fn diag_asserted(&self) -> bool {
        self.diag
    }

    pub fn registers(&self) -> &RegisterBank<REGISTER_COUNT> {
        &self.regs
    }

    /// Reply queued for the next transaction.
    pub fn pending_reply(&self) -> CommandWord {
        CommandWord::from_bytes(*self.framer.reply())
    }

    pub fn status(&self) -> SpiStatus {
        SpiStatus {
            reset_flag: self.reset_flag,
            driver_error: self.driver_error,
            stall_guard: self.stall_guard,
            standstill: self.standstill,
        }
    }

    /// Current value at `address` as the chip would report it, without
    /// read side effects. Diagnostic registers are computed from live state.
    pub fn peek_register(&self, address: u8) -> u32 {
        match address {
            GSTAT => (self.reset_flag as u32) | (self.driver_error as u32) << 1,
            DRV_STATUS => self.drv_status(),
            _ => self.regs.read(address),
        }
    }

    /// Named field of a register, e.g. `field("CHOPCONF", "mres")`.
    pub fn field(&self, register: &str, field: &str) -> Option<u32> {
        let reg = LAYOUT.by_name(register)?;
        let spec = reg.field(field)?;
        Some(spec.extract(self.peek_register(reg.address)))
    }

    pub fn draw(&self) -> String {
        self.view.draw()
    }

    pub fn draw_simple(&self) -> String {
        self.view.draw_simple()
    }

    pub fn motor_view(&self) -> Arc<MotorView> {
        Arc::clone(&self.view)
    }

    pub fn on_direction(&mut self, value: u32) {
        self.dir = value != 0;
    }

    /// EN is active low.
    pub fn on_enable(&mut self, value: u32) {
        self.enabled = value == 0;
        self.view.set_enabled(self.enabled);
    }

    /// Integrates one step on each rising edge.
    pub fn on_step(&mut self, value: u32, ctx: &mut SimContext<'_>) {
        let level = value != 0;
        let rising = level && !self.step_level;
        self.step_level = level;
        if !rising {
            return;
        }
        if !self.configured || !self.enabled {
            tracing::trace!(driver = %self.name, "step ignored while unconfigured or disabled");
            return;
        }

        ctx.cancel_timer(TIMER_STANDSTILL);
        self.standstill = false;
        self.moving = true;

        let forward = self.dir ^ self.cfg.inverted ^ self.shaft();
        self.step = if forward {
            self.step.saturating_add(1)
        } else {
            self.step.saturating_sub(1)
        };
        let clamped = self.clamp_to_travel();
        if clamped && !self.stall_guard {
            tracing::debug!(driver = %self.name, position = self.position(), "end stop reached");
        }
        self.stall_guard = clamped;

        self.publish_position(ctx);
        self.update_diag(ctx);
        ctx.schedule_after(TIMER_STANDSTILL, self.cfg.standstill_cycles);
    }

    fn shaft(&self) -> bool {
        registers::field(GCONF, "shaft")
            .map(|(reg, f)| self.regs.field(reg, f) != 0)
            .unwrap_or(false)
    }

    fn clamp_to_travel(&mut self) -> bool {
        if self.cfg.no_endstops {
            return false;
        }
        if self.step < self.min_step {
            self.step = self.min_step;
            true
        } else if self.step > self.max_step {
            self.step = self.max_step;
            true
        } else {
            false
        }
    }

    fn publish_position(&mut self, ctx: &mut SimContext<'_>) {
        let position = self.position();
        self.view.set_position(position);
        ctx.raise(lines::POS_OUT, position.to_bits());
        let at_min = position <= 0.0 || (!self.cfg.no_endstops && self.step <= self.min_step);
        if at_min != self.at_min {
            self.at_min = at_min;
            ctx.raise(lines::MIN_OUT, at_min as u32);
        }
    }

    /// DIAG follows stallGuard or standstill and is raised only on change.
    fn update_diag(&mut self, ctx: &mut SimContext<'_>) {
        let want = self.stall_guard || self.standstill;
        if want != self.diag {
            self.set_diag(want, ctx);
        }
    }

    fn set_diag(&mut self, level: bool, ctx: &mut SimContext<'_>) {
        self.diag = level;
        self.view.set_stalled(level);
        ctx.raise(lines::DIAG_OUT, level as u32);
    }

    fn drv_status(&self) -> u32 {
        let sg_result = if self.stall_guard { 0 } else { SG_RESULT_FREE };
        // current scale follows IHOLD at standstill, IRUN otherwise
        let current = registers::field(IHOLD_IRUN, if self.standstill { "ihold" } else { "irun" })
            .map(|(reg, f)| self.regs.field(reg, f))
            .unwrap_or(0);
        sg_result
            | (current & 0x1F) << 16
            | (self.stall_guard as u32) << 24
            | (self.standstill as u32) << 31
    }

    /// Decodes one complete datagram and prepares the reply for the next one.
    fn process_command(&mut self, frame: [u8; FRAME_LEN]) {
        let cmd = CommandWord::from_bytes(frame);
        let address = cmd.address();
        let data = if cmd.is_write() {
            match LAYOUT.access(address) {
                Access::ReadWrite => self.regs.write(address, cmd.data()),
                Access::Diagnostic => {
                    tracing::debug!(driver = %self.name, address, "write to read-only register ignored")
                }
            }
            tracing::debug!(driver = %self.name, address, data = cmd.data(), "register write");
            0
        } else {
            let value = self.peek_register(address);
            if address == GSTAT {
                // GSTAT flags clear on read
                self.reset_flag = false;
                self.driver_error = false;
            }
            tracing::debug!(driver = %self.name, address, value, "register read");
            value
        };
        let reply = CommandWord::reply(data, self.status());
        self.framer.set_reply(reply.to_bytes());
    }
}

impl SerialDevice for Tmc2130 {
    fn frame_len(&self) -> usize {
        FRAME_LEN
    }

    fn on_chip_select(&mut self, asserted: bool) {
        match self.framer.on_select(asserted) {
            FrameOutcome::Complete(frame) => self.process_command(frame),
            FrameOutcome::Aborted { received } => {
                tracing::trace!(driver = %self.name, received, "partial SPI transaction dropped");
            }
            FrameOutcome::Opened | FrameOutcome::Unchanged => {}
        }
    }

    fn on_serial_byte(&mut self, byte: u8) -> Option<u8> {
        self.framer.on_byte(byte)
    }
}

impl ClockedDevice for Tmc2130 {
    fn on_timer(&mut self, timer: TimerId, _when: Cycle, ctx: &mut SimContext<'_>) -> Option<Cycle> {
        if timer == TIMER_STANDSTILL {
            self.standstill = true;
            self.moving = false;
            tracing::debug!(driver = %self.name, position = self.position(), "standstill");
            self.update_diag(ctx);
        }
        None
    }
}

impl Scriptable for Tmc2130 {
    fn actions(&self) -> &'static [ActionSpec] {
        ACTIONS
    }

    fn process_action(
        &mut self,
        action: u32,
        args: &[String],
        ctx: &mut SimContext<'_>,
    ) -> Result<LineStatus, ActionError> {
        match action {
            ACT_TOGGLE_STALL => {
                self.stall_guard = !self.stall_guard;
                self.update_diag(ctx);
                Ok(LineStatus::Completed)
            }
            ACT_SET_DIAG => {
                self.set_diag(true, ctx);
                Ok(LineStatus::Completed)
            }
            ACT_RESET_DIAG => {
                self.set_diag(false, ctx);
                Ok(LineStatus::Completed)
            }
            ACT_WAIT_STANDSTILL => Ok(if self.standstill {
                LineStatus::Completed
            } else {
                LineStatus::Waiting
            }),
            ACT_SET_POSITION => {
                let mm: f32 = scriptable::arg(args, 0)?;
                if !self.configured {
                    return Err(ActionError::bad_arg(args[0].clone(), "driver is not configured"));
                }
                if !mm.is_finite() {
                    return Err(ActionError::bad_arg(args[0].clone(), "position must be finite"));
                }
                let spu = self.cfg.steps_per_mm as f32;
                self.step = ((mm - self.cfg.start_pos) * spu).round() as i32;
                self.stall_guard = self.clamp_to_travel();
                self.publish_position(ctx);
                self.update_diag(ctx);
                Ok(LineStatus::Completed)
            }
            other => Err(ActionError::UnknownActionId(other)),
        }
    }
}

impl Peripheral for Tmc2130 {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn ports(&self) -> &'static [PortDecl] {
        PORTS
    }

    fn init(&mut self, ctx: &mut SimContext<'_>) {
        if self.configured {
            self.publish_position(ctx);
        }
    }

    fn on_input(&mut self, port: PortId, value: u32, ctx: &mut SimContext<'_>) {
        match port {
            lines::CS_IN => self.on_chip_select(value == 0),
            lines::BYTE_IN => {
                if let Some(reply) = self.on_serial_byte(value as u8) {
                    ctx.raise(lines::BYTE_OUT, reply as u32);
                }
            }
            lines::STEP_IN => self.on_step(value, ctx),
            lines::DIR_IN => self.on_direction(value),
            lines::EN_IN => self.on_enable(value),
            _ => {}
        }
    }

    fn clocked(&mut self) -> Option<&mut dyn ClockedDevice> {
        Some(self)
    }

    fn serial(&mut self) -> Option<&mut dyn SerialDevice> {
        Some(self)
    }

    fn scriptable(&mut self) -> Option<&mut dyn Scriptable> {
        Some(self)
    }

    fn view(&self) -> Option<Arc<dyn Drawable>> {
        Some(self.view.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardsim_shared::{DeviceId, LineHandle, Scheduler};

    const OUTPUTS: [Option<LineHandle>; 9] = [
        None,
        Some(LineHandle(1)),
        None,
        None,
        None,
        None,
        Some(LineHandle(6)),
        Some(LineHandle(7)),
        Some(LineHandle(8)),
    ];

    fn driver() -> Tmc2130 {
        Tmc2130::with_config("x", 'X', DriverConfig::default()).unwrap()
    }

    fn pulse(dev: &mut Tmc2130, sched: &mut Scheduler, count: usize) -> Vec<(LineHandle, u32)> {
        let mut raised = Vec::new();
        for _ in 0..count {
            let mut ctx = SimContext::new(DeviceId(0), &OUTPUTS, sched);
            dev.on_step(1, &mut ctx);
            dev.on_step(0, &mut ctx);
            raised.extend(ctx.into_raised());
        }
        raised
    }

    fn transact(dev: &mut Tmc2130, bytes: [u8; FRAME_LEN]) -> [u8; FRAME_LEN] {
        let mut reply = [0u8; FRAME_LEN];
        dev.on_chip_select(true);
        for (i, b) in bytes.iter().enumerate() {
            reply[i] = dev.on_serial_byte(*b).unwrap();
        }
        dev.on_chip_select(false);
        reply
    }

    #[test]
    fn steps_only_count_on_rising_edges() {
        let mut dev = driver();
        let mut sched = Scheduler::new();
        dev.on_direction(1);
        let mut ctx = SimContext::new(DeviceId(0), &OUTPUTS, &mut sched);
        dev.on_step(1, &mut ctx);
        dev.on_step(1, &mut ctx);
        dev.on_step(0, &mut ctx);
        assert_eq!(dev.step_count(), 1);
    }

    #[test]
    fn unconfigured_and_disabled_drivers_ignore_steps() {
        let mut sched = Scheduler::new();
        let mut dev = Tmc2130::new("x", 'X');
        pulse(&mut dev, &mut sched, 3);
        assert_eq!(dev.step_count(), 0);
        assert_eq!(dev.state(), DriverState::Unconfigured);

        let mut dev = driver();
        dev.on_enable(1);
        pulse(&mut dev, &mut sched, 3);
        assert_eq!(dev.step_count(), 0);
        assert_eq!(dev.state(), DriverState::Disabled);
    }

    #[test]
    fn inversion_and_shaft_flip_direction() {
        let mut sched = Scheduler::new();
        let cfg = DriverConfig {
            inverted: true,
            ..DriverConfig::default()
        };
        let mut dev = Tmc2130::with_config("x", 'X', cfg).unwrap();
        dev.on_direction(1);
        pulse(&mut dev, &mut sched, 10);
        assert_eq!(dev.step_count(), -10);

        // GCONF.shaft undoes the configured inversion
        transact(&mut dev, CommandWord::write(GCONF, 1 << 4).to_bytes());
        pulse(&mut dev, &mut sched, 4);
        assert_eq!(dev.step_count(), -6);
    }

    #[test]
    fn clamps_at_both_ends_and_flags_stall_guard() {
        let mut sched = Scheduler::new();
        let mut dev = driver();
        dev.on_direction(0);
        let raised = pulse(&mut dev, &mut sched, 1_500);
        assert_eq!(dev.position(), 0.0);
        assert!(dev.stall_guard());
        assert!(dev.diag_asserted());
        // MIN_OUT went high exactly once
        let min_raises: Vec<_> = raised.iter().filter(|(l, _)| *l == LineHandle(7)).collect();
        assert_eq!(min_raises, vec![&(LineHandle(7), 1)]);

        dev.on_direction(1);
        pulse(&mut dev, &mut sched, 1);
        assert!(!dev.stall_guard());
        assert!(!dev.diag_asserted());
    }

    #[test]
    fn no_endstops_lets_position_run_past_travel() {
        let mut sched = Scheduler::new();
        let cfg = DriverConfig {
            no_endstops: true,
            ..DriverConfig::default()
        };
        let mut dev = Tmc2130::with_config("e", 'E', cfg).unwrap();
        dev.on_direction(0);
        pulse(&mut dev, &mut sched, 2_000);
        assert!((dev.position() - -10.0).abs() < 1e-4);
        assert!(!dev.stall_guard());
    }

    #[test]
    fn standstill_timer_is_rearmed_by_every_step() {
        let mut sched = Scheduler::new();
        let mut dev = driver();
        pulse(&mut dev, &mut sched, 1);
        let key = boardsim_shared::TimerKey::new(DeviceId(0), TIMER_STANDSTILL);
        assert_eq!(sched.due_at(key), Some(1 << 20));
        sched.advance_to(1000);
        pulse(&mut dev, &mut sched, 1);
        assert_eq!(sched.due_at(key), Some(1000 + (1 << 20)));
        assert_eq!(sched.len(), 1);
        assert_eq!(dev.state(), DriverState::Moving);
    }

    #[test]
    fn reply_carries_read_data_one_transaction_late() {
        let mut dev = driver();
        transact(&mut dev, CommandWord::write(0x6C, 0x0001_0135).to_bytes());
        transact(&mut dev, CommandWord::read(0x6C).to_bytes());
        let reply = CommandWord::from_bytes(transact(&mut dev, CommandWord::read(0x00).to_bytes()));
        assert_eq!(reply.data(), 0x0001_0135);
        assert_eq!(dev.field("CHOPCONF", "mres"), Some(0));
        assert_eq!(dev.field("CHOPCONF", "toff"), Some(5));
    }

    #[test]
    fn gstat_reset_flag_clears_when_read() {
        let mut dev = driver();
        assert!(dev.status().reset_flag);
        transact(&mut dev, CommandWord::read(GSTAT).to_bytes());
        let reply = dev.pending_reply();
        assert_eq!(reply.data() & 1, 1);
        assert!(!reply.status().reset_flag);
        // writes to diagnostic registers are ignored
        transact(&mut dev, CommandWord::write(DRV_STATUS, 0xFFFF_FFFF).to_bytes());
        assert_eq!(dev.registers().read(DRV_STATUS), 0);
    }

    #[test]
    fn partial_transaction_changes_nothing() {
        let mut dev = driver();
        transact(&mut dev, CommandWord::write(0x6C, 0x1234).to_bytes());
        let regs_before = dev.registers().clone();
        let reply_before = dev.pending_reply();

        dev.on_chip_select(true);
        for b in &CommandWord::write(0x6C, 0xFFFF).to_bytes()[..3] {
            dev.on_serial_byte(*b);
        }
        dev.on_chip_select(false);

        assert_eq!(dev.registers(), &regs_before);
        assert_eq!(dev.pending_reply(), reply_before);
    }

    #[test]
    fn configure_twice_matches_configure_once() {
        let mut sched = Scheduler::new();
        let mut once = driver();
        let mut twice = driver();
        twice.configure(DriverConfig::default()).unwrap();
        for dev in [&mut once, &mut twice] {
            dev.on_direction(1);
            pulse(dev, &mut sched, 250);
        }
        assert_eq!(once.step_count(), twice.step_count());
        assert_eq!(once.position(), twice.position());
    }

    #[test]
    fn rejects_malformed_configuration() {
        let mut dev = Tmc2130::new("x", 'X');
        let bad = DriverConfig {
            steps_per_mm: 0,
            ..DriverConfig::default()
        };
        assert!(matches!(dev.configure(bad), Err(ConfigError::InvalidValue { .. })));
        let outside = DriverConfig {
            start_pos: 250.0,
            ..DriverConfig::default()
        };
        assert!(dev.configure(outside).is_err());
        assert!(!dev.is_configured());
    }
}
