//! Flat register bank with a table-driven bit-field accessor.
//!
//! Chip layouts are described as data (`RegisterSpec` rows with their
//! `FieldSpec`s) and applied to a plain `[u32; N]`, instead of overlaying
//! structs on raw memory.

use crate::irq::width_mask;

/// How the command protocol may touch a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Plain storage.
    ReadWrite,
    /// Value is computed from live device state; writes are ignored.
    Diagnostic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub offset: u8,
    pub width: u8,
}

impl FieldSpec {
    pub const fn new(name: &'static str, offset: u8, width: u8) -> Self {
        Self {
            name,
            offset,
            width,
        }
    }

    pub fn mask(&self) -> u32 {
        width_mask(self.width) << self.offset
    }

    pub fn extract(&self, word: u32) -> u32 {
        (word >> self.offset) & width_mask(self.width)
    }

    pub fn insert(&self, word: u32, value: u32) -> u32 {
        (word & !self.mask()) | ((value & width_mask(self.width)) << self.offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSpec {
    pub address: u8,
    pub name: &'static str,
    pub access: Access,
    pub fields: &'static [FieldSpec],
}

impl RegisterSpec {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

/// A chip's register map: the described subset of its address space.
#[derive(Debug, Clone, Copy)]
pub struct RegisterLayout {
    pub registers: &'static [RegisterSpec],
}

impl RegisterLayout {
    pub fn by_address(&self, address: u8) -> Option<&'static RegisterSpec> {
        self.registers.iter().find(|r| r.address == address)
    }

    pub fn by_name(&self, name: &str) -> Option<&'static RegisterSpec> {
        self.registers.iter().find(|r| r.name.eq_ignore_ascii_case(name))
    }

    pub fn access(&self, address: u8) -> Access {
        self.by_address(address)
            .map(|r| r.access)
            .unwrap_or(Access::ReadWrite)
    }
}

/// Addressable 32-bit word storage. Out-of-range addresses read as zero and
/// swallow writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBank<const N: usize> {
    raw: [u32; N],
}

impl<const N: usize> Default for RegisterBank<N> {
    fn default() -> Self {
        Self { raw: [0; N] }
    }
}

impl<const N: usize> RegisterBank<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, address: u8) -> u32 {
        self.raw.get(address as usize).copied().unwrap_or(0)
    }

    pub fn write(&mut self, address: u8, value: u32) {
        if let Some(slot) = self.raw.get_mut(address as usize) {
            *slot = value;
        }
    }

    pub fn field(&self, register: &RegisterSpec, field: &FieldSpec) -> u32 {
        field.extract(self.read(register.address))
    }

    pub fn set_field(&mut self, register: &RegisterSpec, field: &FieldSpec, value: u32) {
        let word = field.insert(self.read(register.address), value);
        self.write(register.address, word);
    }

    pub fn raw(&self) -> &[u32; N] {
        &self.raw
    }
}
