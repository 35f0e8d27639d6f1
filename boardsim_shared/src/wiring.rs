//! Wiring table: symbolic line names mapped to stable numeric handles.
//!
//! The table is built once by the setup phase (usually from the board
//! settings file) and handed to the interconnect. Nothing here is global.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Numeric handle of a line in the wiring table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineHandle(pub u32);

impl LineHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One `[[lines]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LineSpec {
    pub name: String,
    #[serde(default = "default_width")]
    pub width: u8,
}

fn default_width() -> u8 {
    1
}

impl LineSpec {
    pub fn new(name: impl Into<String>, width: u8) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WiringFile {
    #[serde(default)]
    lines: Vec<LineSpec>,
}

/// Name → handle table shared by all peripherals on a board.
#[derive(Debug, Clone, Default)]
pub struct WiringTable {
    specs: Vec<LineSpec>,
    by_name: HashMap<String, LineHandle>,
}

impl WiringTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs<I>(specs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = LineSpec>,
    {
        let mut table = Self::new();
        for spec in specs {
            table.add(spec.name, spec.width)?;
        }
        Ok(table)
    }

    /// Parses a TOML document containing `[[lines]]` entries.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: WiringFile = toml::from_str(text)?;
        Self::from_specs(file.lines)
    }

    pub fn add(&mut self, name: impl Into<String>, width: u8) -> Result<LineHandle, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::invalid("line name", "must not be empty"));
        }
        if !(1..=32).contains(&width) {
            return Err(ConfigError::invalid(
                format!("width of line '{name}'"),
                format!("{width} is outside 1..=32"),
            ));
        }
        if self.by_name.contains_key(&name) {
            return Err(ConfigError::DuplicateLine(name));
        }
        let handle = LineHandle(self.specs.len() as u32);
        self.by_name.insert(name.clone(), handle);
        self.specs.push(LineSpec { name, width });
        Ok(handle)
    }

    pub fn resolve(&self, name: &str) -> Result<LineHandle, ConfigError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownLine(name.to_string()))
    }

    pub fn name(&self, handle: LineHandle) -> Option<&str> {
        self.specs.get(handle.index()).map(|s| s.name.as_str())
    }

    pub fn width(&self, handle: LineHandle) -> Option<u8> {
        self.specs.get(handle.index()).map(|s| s.width)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LineHandle, &LineSpec)> {
        self.specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (LineHandle(i as u32), spec))
    }
}
