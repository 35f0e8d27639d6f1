//! Error taxonomy shared by every crate in the workspace.
//!
//! Only setup can fail hard. Runtime anomalies (aborted transactions,
//! travel-limit clamps, stalls) are device states, not errors.

use thiserror::Error;

/// Wiring and configuration failures. Fatal at setup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown line '{0}' (not in the wiring table)")]
    UnknownLine(String),
    #[error("line '{0}' is declared more than once")]
    DuplicateLine(String),
    #[error("line '{line}' is already driven by '{owner}'")]
    LineClaimed { line: String, owner: String },
    #[error("line '{0}' is owned by a device and cannot be driven externally")]
    NotOwner(String),
    #[error("device '{device}' has no pin named '{pin}'")]
    UnknownPin { device: String, pin: String },
    #[error("unknown device '{0}'")]
    UnknownDevice(String),
    #[error("device name '{0}' is used more than once")]
    DuplicateDevice(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("settings error: {0}")]
    Settings(String),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// A scripted action that could not run. Reported to the caller as
/// [`LineStatus::Error`](crate::scriptable::LineStatus::Error); device state is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("unknown target '{0}'")]
    UnknownTarget(String),
    #[error("'{target}' has no action '{action}'")]
    UnknownAction { target: String, action: String },
    #[error("action id {0} is not in the action table")]
    UnknownActionId(u32),
    #[error("{action} expects {expected} argument(s), got {got}")]
    ArgumentCount {
        action: String,
        expected: usize,
        got: usize,
    },
    #[error("invalid argument '{value}': {reason}")]
    InvalidArgument { value: String, reason: String },
}

impl ActionError {
    pub fn bad_arg(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            value: value.into(),
            reason: reason.into(),
        }
    }
}
