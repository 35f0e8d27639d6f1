//! Host configuration: which board to load, where to serve the inspection
//! API, and how fast simulated time runs.
//!
//! ```toml
//! [host]
//! board = "boards/bench.toml"
//! log_level = "debug"
//!
//! [web]
//! bind = "0.0.0.0:3000"
//! draw_interval_ms = 500
//!
//! [pacing]
//! cycles_per_tick = 16000
//! tick_ms = 1
//! ```

use boardsim_simulator::Pacing;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    #[serde(default = "default_board")]
    pub board: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            board: default_board(),
            log_level: default_log_level(),
        }
    }
}

impl HostConfig {
    pub fn level(&self) -> Result<tracing::Level, ConfigError> {
        self.log_level.parse().map_err(|_| ConfigError::Invalid {
            field: "host.log_level",
            reason: format!("'{}' is not one of trace, debug, info, warn, error", self.log_level),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Logs every device's one-line view at this interval; 0 disables it.
    #[serde(default)]
    pub draw_interval_ms: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            draw_interval_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PacingConfig {
    #[serde(default = "default_cycles_per_tick")]
    pub cycles_per_tick: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            cycles_per_tick: default_cycles_per_tick(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl PacingConfig {
    pub fn to_pacing(&self) -> Pacing {
        Pacing {
            cycles_per_tick: self.cycles_per_tick,
            tick: Duration::from_millis(self.tick_ms),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.host.level()?;
        if self.pacing.tick_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "pacing.tick_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn default_board() -> PathBuf { PathBuf::from("boards/bench.toml") }
fn default_log_level() -> String { "info".to_string() }
fn default_bind() -> String { "127.0.0.1:3000".to_string() }
fn default_cycles_per_tick() -> u64 { 16_000 }
fn default_tick_ms() -> u64 { 1 }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path, e);
        ConfigError::Io(e)
    })?;
    let config: Config = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}
