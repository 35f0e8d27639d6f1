//! Resistor-ladder button panel read through one ADC channel.
//!
//! The MCU raises the mux index it is about to sample on `trigger`; when
//! it matches this panel's channel the voltage of the held button comes back
//! on `value_out`.

use boardsim_shared::scriptable::{self, ActionSpec, LineStatus, Scriptable};
use boardsim_shared::{
    ActionError, ClockedDevice, ConfigError, Cycle, Drawable, Peripheral, PortDecl, PortId, SimContext, TimerId,
    ViewSnapshot,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

pub const KIND: &str = "adc_buttons";

pub mod lines {
    use boardsim_shared::PortId;

    pub const TRIGGER_IN: PortId = 0;
    pub const VALUE_OUT: PortId = 1;
    pub const DIGITAL_OUT: PortId = 2;
}

const PORTS: &[PortDecl] = &[
    PortDecl::input(lines::TRIGGER_IN, "trigger", 8),
    PortDecl::output(lines::VALUE_OUT, "value_out", 16),
    PortDecl::output(lines::DIGITAL_OUT, "digital_out", 1),
];

const TIMER_RELEASE: TimerId = 0;

const ACT_PUSH: u32 = 0;
const ACT_RELEASE: u32 = 1;

const ACTIONS: &[ActionSpec] = &[
    ActionSpec::new(ACT_PUSH, "Push", 1, "Holds a button (1-based, 0 releases) for the configured time"),
    ActionSpec::new(ACT_RELEASE, "Release", 0, "Releases whatever button is held"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    /// ADC channel the ladder is wired to.
    pub mux: u8,
    /// Millivolts per button; index 0 is "nothing pressed".
    pub levels_mv: Vec<u16>,
    pub hold_cycles: Cycle,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            mux: 5,
            levels_mv: vec![5000, 0, 1100, 2300],
            hold_cycles: 1_600_000,
        }
    }
}

impl ButtonConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.levels_mv.len() < 2 {
            return Err(ConfigError::invalid("levels_mv", "needs an idle level and at least one button"));
        }
        if self.levels_mv.len() > u8::MAX as usize {
            return Err(ConfigError::invalid("levels_mv", "too many buttons"));
        }
        if self.hold_cycles == 0 {
            return Err(ConfigError::invalid("hold_cycles", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Which button is held, for the render thread.
#[derive(Debug, Default)]
pub struct ButtonView {
    pressed: AtomicU8,
    count: AtomicU8,
}

impl ButtonView {
    pub fn pressed(&self) -> u8 {
        self.pressed.load(Ordering::Relaxed)
    }
}

impl Drawable for ButtonView {
    fn draw(&self) -> String {
        let pressed = self.pressed();
        let keys: Vec<String> = (1..=self.count.load(Ordering::Relaxed))
            .map(|b| if b == pressed { format!("[{b}]") } else { format!(" {b} ") })
            .collect();
        format!("Buttons {}", keys.join(""))
    }

    fn draw_simple(&self) -> String {
        match self.pressed() {
            0 => "Buttons: none".to_string(),
            b => format!("Buttons: {b}"),
        }
    }

    fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot::Buttons {
            pressed: self.pressed(),
        }
    }
}

#[derive(Debug)]
pub struct AdcButtons {
    name: String,
    cfg: ButtonConfig,
    current: u8,
    view: Arc<ButtonView>,
}

impl AdcButtons {
    pub fn new(name: impl Into<String>, cfg: ButtonConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let view = ButtonView::default();
        view.count.store((cfg.levels_mv.len() - 1) as u8, Ordering::Relaxed);
        Ok(Self {
            name: name.into(),
            cfg,
            current: 0,
            view: Arc::new(view),
        })
    }

    pub fn config(&self) -> &ButtonConfig {
        &self.cfg
    }

    /// Held button, 0 when none.
    pub fn pressed(&self) -> u8 {
        self.current
    }

    /// Voltage the ADC would read right now.
    pub fn level_mv(&self) -> u16 {
        self.cfg.levels_mv.get(self.current as usize).copied().unwrap_or(0)
    }

    pub fn push(&mut self, button: u8, ctx: &mut SimContext<'_>) -> Result<(), ActionError> {
        if button as usize >= self.cfg.levels_mv.len() {
            return Err(ActionError::bad_arg(
                button.to_string(),
                format!("button must be in 0..={}", self.cfg.levels_mv.len() - 1),
            ));
        }
        if button == 0 {
            self.release(ctx);
            return Ok(());
        }
        self.set_pressed(button, ctx);
        ctx.schedule_after(TIMER_RELEASE, self.cfg.hold_cycles);
        Ok(())
    }

    pub fn release(&mut self, ctx: &mut SimContext<'_>) {
        ctx.cancel_timer(TIMER_RELEASE);
        self.set_pressed(0, ctx);
    }

    fn set_pressed(&mut self, button: u8, ctx: &mut SimContext<'_>) {
        let was_held = self.current != 0;
        self.current = button;
        self.view.pressed.store(button, Ordering::Relaxed);
        if was_held != (button != 0) {
            ctx.raise(lines::DIGITAL_OUT, (button != 0) as u32);
        }
        tracing::debug!(panel = %self.name, button, "button state");
    }
}

impl ClockedDevice for AdcButtons {
    fn on_timer(&mut self, timer: TimerId, _when: Cycle, ctx: &mut SimContext<'_>) -> Option<Cycle> {
        if timer == TIMER_RELEASE {
            self.set_pressed(0, ctx);
        }
        None
    }
}

impl Scriptable for AdcButtons {
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
            ACT_PUSH => {
                let button: u8 = scriptable::arg(args, 0)?;
                self.push(button, ctx)?;
                Ok(LineStatus::Completed)
            }
            ACT_RELEASE => {
                self.release(ctx);
                Ok(LineStatus::Completed)
            }
            other => Err(ActionError::UnknownActionId(other)),
        }
    }
}

impl Peripheral for AdcButtons {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn ports(&self) -> &'static [PortDecl] {
        PORTS
    }

    fn on_input(&mut self, port: PortId, value: u32, ctx: &mut SimContext<'_>) {
        if port == lines::TRIGGER_IN && value == self.cfg.mux as u32 {
            ctx.raise(lines::VALUE_OUT, self.level_mv() as u32);
        }
    }

    fn clocked(&mut self) -> Option<&mut dyn ClockedDevice> {
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
