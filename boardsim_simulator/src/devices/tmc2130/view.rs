//! Lock-free motor state for the render thread.
//!
//! The simulation thread stores, anyone reads. Readers may see a value one
//! update old, never a torn one.

use boardsim_shared::{Drawable, ViewSnapshot};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

const GAUGE_WIDTH: usize = 40;

#[derive(Debug)]
pub struct MotorView {
    axis: AtomicU8,
    position: AtomicU32,
    max_travel: AtomicU32,
    stalled: AtomicBool,
    enabled: AtomicBool,
    configured: AtomicBool,
}

impl MotorView {
    pub fn new(axis: char) -> Self {
        Self {
            axis: AtomicU8::new(axis_byte(axis)),
            position: AtomicU32::new(0f32.to_bits()),
            max_travel: AtomicU32::new(0f32.to_bits()),
            stalled: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            configured: AtomicBool::new(false),
        }
    }

    pub fn axis(&self) -> char {
        self.axis.load(Ordering::Relaxed) as char
    }

    pub fn position(&self) -> f32 {
        f32::from_bits(self.position.load(Ordering::Relaxed))
    }

    pub fn max_travel(&self) -> f32 {
        f32::from_bits(self.max_travel.load(Ordering::Relaxed))
    }

    pub fn stalled(&self) -> bool {
        self.stalled.load(Ordering::Relaxed)
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn configured(&self) -> bool {
        self.configured.load(Ordering::Relaxed)
    }

    pub(crate) fn set_axis(&self, axis: char) {
        self.axis.store(axis_byte(axis), Ordering::Relaxed);
    }

    pub(crate) fn set_position(&self, position: f32) {
        self.position.store(position.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn set_max_travel(&self, max: f32) {
        self.max_travel.store(max.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::Relaxed);
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn set_configured(&self, configured: bool) {
        self.configured.store(configured, Ordering::Relaxed);
    }
}

fn axis_byte(axis: char) -> u8 {
    if axis.is_ascii() { axis as u8 } else { b'?' }
}

impl Drawable for MotorView {
    fn draw(&self) -> String {
        let position = self.position();
        let max = self.max_travel();
        let ratio = if max > 0.0 { (position / max).clamp(0.0, 1.0) } else { 0.0 };
        let filled = (ratio * GAUGE_WIDTH as f32).round() as usize;
        let mut flags = String::new();
        if self.stalled() {
            flags.push_str(" STALL");
        }
        if !self.enabled() {
            flags.push_str(" OFF");
        }
        format!(
            "{} [{}{}] {:8.2}mm{}",
            self.axis(),
            "=".repeat(filled),
            " ".repeat(GAUGE_WIDTH - filled),
            position,
            flags
        )
    }

    fn draw_simple(&self) -> String {
        format!("{}: {:.2}", self.axis(), self.position())
    }

    fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot::Motor {
            axis: self.axis(),
            position: self.position(),
            max_travel: self.max_travel(),
            stalled: self.stalled(),
            enabled: self.enabled(),
            configured: self.configured(),
        }
    }
}
