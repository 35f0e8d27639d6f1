//! Board description files.
//!
//! A board is a TOML document with `[board]`, `[[lines]]`, `[[devices]]` and
//! an optional `[script]` table, layered with `BOARDSIM_*` environment
//! overrides (`BOARDSIM_BOARD__CLOCK_HZ=20000000`).

use crate::devices::adc_buttons::ButtonConfig;
use crate::devices::tmc2130::DriverConfig;
use boardsim_shared::{ConfigError, Cycle, LineSpec, WiringTable};
use config as config_rs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

pub const ENV_PREFIX: &str = "BOARDSIM";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSettings {
    #[serde(default)]
    pub board: BoardInfo,
    #[serde(default)]
    pub lines: Vec<LineSpec>,
    #[serde(default)]
    pub devices: Vec<DeviceSettings>,
    #[serde(default)]
    pub script: ScriptSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardInfo {
    #[serde(default = "default_board_name")]
    pub name: String,
    #[serde(default = "default_clock_hz")]
    pub clock_hz: u64,
}

impl Default for BoardInfo {
    fn default() -> Self {
        Self {
            name: default_board_name(),
            clock_hz: default_clock_hz(),
        }
    }
}

fn default_board_name() -> String {
    "board".to_string()
}

fn default_clock_hz() -> u64 {
    16_000_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Tmc2130,
    AdcButtons,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub name: String,
    pub kind: DeviceKind,
    /// Port suffix → wiring-table line name.
    #[serde(default)]
    pub pins: BTreeMap<String, String>,
    /// Axis letter for stepper drivers; defaults to the first letter of the name.
    #[serde(default)]
    pub axis: Option<String>,
    #[serde(default)]
    pub driver: Option<DriverConfig>,
    #[serde(default)]
    pub buttons: Option<ButtonConfig>,
}

/// Polling behaviour for actions that answer `Waiting`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSettings {
    pub poll_cycles: Cycle,
    pub timeout_cycles: Cycle,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            poll_cycles: 16_000,
            timeout_cycles: 160_000_000,
        }
    }
}

impl BoardSettings {
    /// Parses a board description without environment overrides.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let settings = config_rs::Config::builder()
            .add_source(config_rs::File::from_str(text, config_rs::FileFormat::Toml))
            .build()
            .map_err(settings_error)?;
        finish(settings)
    }

    pub fn wiring(&self) -> Result<WiringTable, ConfigError> {
        WiringTable::from_specs(self.lines.iter().cloned())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.board.clock_hz == 0 {
            return Err(ConfigError::invalid("board.clock_hz", "must be greater than zero"));
        }
        if self.script.poll_cycles == 0 {
            return Err(ConfigError::invalid("script.poll_cycles", "must be greater than zero"));
        }
        let mut seen = HashSet::new();
        for dev in &self.devices {
            if dev.name.trim().is_empty() {
                return Err(ConfigError::invalid("device name", "must not be empty"));
            }
            if !seen.insert(dev.name.as_str()) {
                return Err(ConfigError::DuplicateDevice(dev.name.clone()));
            }
            match dev.kind {
                DeviceKind::Tmc2130 if dev.buttons.is_some() => {
                    return Err(ConfigError::invalid(
                        format!("devices.{}.buttons", dev.name),
                        "only adc_buttons devices take a buttons section",
                    ));
                }
                DeviceKind::AdcButtons if dev.driver.is_some() => {
                    return Err(ConfigError::invalid(
                        format!("devices.{}.driver", dev.name),
                        "only tmc2130 devices take a driver section",
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Loads a board file and applies `BOARDSIM_*` environment overrides.
pub fn load_settings(path: impl AsRef<Path>) -> Result<BoardSettings, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("board file {} not found", path.display()),
        )));
    }
    let settings = config_rs::Config::builder()
        .add_source(config_rs::File::from(path).format(config_rs::FileFormat::Toml))
        .add_source(
            config_rs::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(settings_error)?;
    let board = finish(settings)?;
    tracing::debug!(
        file = %path.display(),
        board = %board.board.name,
        lines = board.lines.len(),
        devices = board.devices.len(),
        "loaded board settings"
    );
    Ok(board)
}

fn finish(settings: config_rs::Config) -> Result<BoardSettings, ConfigError> {
    let board: BoardSettings = settings.try_deserialize().map_err(settings_error)?;
    board.validate()?;
    Ok(board)
}

fn settings_error(e: config_rs::ConfigError) -> ConfigError {
    ConfigError::Settings(e.to_string())
}
