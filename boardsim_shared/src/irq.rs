//! Signal interconnect: named lines, their owners, and their subscribers.
//!
//! Devices never reference each other. A device input registers interest in
//! a line by name; a device output claims a line and raises it. Raising a
//! line hands the value to every subscriber synchronously, in registration
//! order, and anything a subscriber raises in response is propagated
//! depth-first before the next subscriber runs.

use crate::device::{DeviceId, PortId};
use crate::error::ConfigError;
use crate::wiring::{LineHandle, WiringTable};

/// Who may raise a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOwner {
    /// Unclaimed by any device: driven by the external collaborator (CPU, test).
    External,
    Device(DeviceId),
}

/// A registered input: value changes on the line are delivered to `port` of `device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscriber {
    pub device: DeviceId,
    pub port: PortId,
}

#[derive(Debug)]
struct Line {
    mask: u32,
    value: u32,
    owner: LineOwner,
    subscribers: Vec<Subscriber>,
}

/// Interconnect graph for one board.
#[derive(Debug)]
pub struct Interconnect {
    lines: Vec<Line>,
}

impl Interconnect {
    pub fn new(table: &WiringTable) -> Self {
        let lines = table
            .iter()
            .map(|(_, spec)| Line {
                mask: width_mask(spec.width),
                value: 0,
                owner: LineOwner::External,
                subscribers: Vec::new(),
            })
            .collect();
        Self { lines }
    }

    /// Binds `subscriber` to the line called `name`.
    pub fn register(
        &mut self,
        table: &WiringTable,
        name: &str,
        subscriber: Subscriber,
    ) -> Result<LineHandle, ConfigError> {
        let handle = table.resolve(name)?;
        let line = self.line_mut(handle, name)?;
        line.subscribers.push(subscriber);
        tracing::debug!(line = name, device = subscriber.device.0, port = subscriber.port, "registered input");
        Ok(handle)
    }

    /// Makes `device` the only party allowed to raise the line called `name`.
    pub fn claim(
        &mut self,
        table: &WiringTable,
        name: &str,
        device: DeviceId,
    ) -> Result<LineHandle, ConfigError> {
        let handle = table.resolve(name)?;
        let line = self.line_mut(handle, name)?;
        match line.owner {
            LineOwner::External => {
                line.owner = LineOwner::Device(device);
                tracing::debug!(line = name, device = device.0, "claimed output");
                Ok(handle)
            }
            LineOwner::Device(other) => Err(ConfigError::LineClaimed {
                line: name.to_string(),
                owner: format!("device {}", other.0),
            }),
        }
    }

    pub fn owner(&self, handle: LineHandle) -> Option<LineOwner> {
        self.lines.get(handle.index()).map(|l| l.owner)
    }

    /// Last value raised on the line (0 before the first raise).
    pub fn value(&self, handle: LineHandle) -> Option<u32> {
        self.lines.get(handle.index()).map(|l| l.value)
    }

    pub fn subscribers(&self, handle: LineHandle) -> &[Subscriber] {
        self.lines
            .get(handle.index())
            .map(|l| l.subscribers.as_slice())
            .unwrap_or(&[])
    }

    /// Latches `value` (masked to the line width) and delivers it to every
    /// subscriber in registration order.
    ///
    /// `deliver` runs one subscriber's handler and returns the lines that
    /// handler raised; each of those is propagated fully before the next
    /// subscriber of this line sees the value. Cycles in the graph are a
    /// wiring mistake and are not detected here.
    pub fn propagate<F>(&mut self, handle: LineHandle, value: u32, deliver: &mut F)
    where
        F: FnMut(Subscriber, LineHandle, u32) -> Vec<(LineHandle, u32)>,
    {
        let Some(line) = self.lines.get_mut(handle.index()) else {
            tracing::warn!(%handle, "raise on a line outside the wiring table");
            return;
        };
        let value = value & line.mask;
        line.value = value;
        let count = line.subscribers.len();
        for i in 0..count {
            let subscriber = self.lines[handle.index()].subscribers[i];
            for (next, next_value) in deliver(subscriber, handle, value) {
                self.propagate(next, next_value, deliver);
            }
        }
    }

    fn line_mut(&mut self, handle: LineHandle, name: &str) -> Result<&mut Line, ConfigError> {
        // The table and the interconnect are built from the same specs; a miss
        // means a handle from another board's table.
        self.lines
            .get_mut(handle.index())
            .ok_or_else(|| ConfigError::UnknownLine(name.to_string()))
    }
}

pub fn width_mask(width: u8) -> u32 {
    match width {
        0 => 0,
        w if w >= 32 => u32::MAX,
        w => (1u32 << w) - 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> WiringTable {
        let mut t = WiringTable::new();
        t.add("A", 1).unwrap();
        t.add("B", 8).unwrap();
        t.add("C", 1).unwrap();
        t
    }

    fn sub(device: usize, port: PortId) -> Subscriber {
        Subscriber {
            device: DeviceId(device),
            port,
        }
    }

    #[test]
    fn register_unknown_line_fails() {
        let t = table();
        let mut irq = Interconnect::new(&t);
        let err = irq.register(&t, "NOPE", sub(0, 0)).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownLine(n) if n == "NOPE"));
    }

    #[test]
    fn delivers_in_registration_order_with_masked_value() {
        let t = table();
        let mut irq = Interconnect::new(&t);
        let b = irq.register(&t, "B", sub(2, 0)).unwrap();
        irq.register(&t, "B", sub(1, 3)).unwrap();
        let mut seen = Vec::new();
        irq.propagate(b, 0x1FF, &mut |s, line, value| {
            seen.push((s.device.0, s.port, line, value));
            Vec::new()
        });
        assert_eq!(seen, vec![(2, 0, b, 0xFF), (1, 3, b, 0xFF)]);
        assert_eq!(irq.value(b), Some(0xFF));
    }

    #[test]
    fn chained_raises_propagate_depth_first() {
        let t = table();
        let mut irq = Interconnect::new(&t);
        let a = irq.register(&t, "A", sub(0, 0)).unwrap();
        irq.register(&t, "A", sub(1, 0)).unwrap();
        let c = irq.register(&t, "C", sub(2, 0)).unwrap();
        let mut order = Vec::new();
        irq.propagate(a, 1, &mut |s, _, v| {
            order.push(s.device.0);
            if s.device.0 == 0 {
                // device 0 forwards A onto C
                vec![(c, v)]
            } else {
                Vec::new()
            }
        });
        // device 2 (on C) runs before device 1 sees A
        assert_eq!(order, vec![0, 2, 1]);
        assert_eq!(irq.value(c), Some(1));
    }

    #[test]
    fn a_line_has_at_most_one_owner() {
        let t = table();
        let mut irq = Interconnect::new(&t);
        let a = irq.claim(&t, "A", DeviceId(4)).unwrap();
        assert_eq!(irq.owner(a), Some(LineOwner::Device(DeviceId(4))));
        assert!(matches!(
            irq.claim(&t, "A", DeviceId(5)),
            Err(ConfigError::LineClaimed { .. })
        ));
    }
}
