//! Scripted action dispatch.
//!
//! Each scriptable device publishes a table of `(id, name, arity)` entries.
//! [`invoke`] checks the id and argument count before the device sees the
//! call, so `process_action` only ever runs with a well-formed request.

use crate::device::SimContext;
use crate::error::ActionError;
use serde::Serialize;
use std::str::FromStr;

/// Outcome of one scripted action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineStatus {
    Completed,
    /// Needs more simulated time; the driver should advance and re-invoke.
    Waiting,
    Error,
}

impl LineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LineStatus::Completed => "completed",
            LineStatus::Waiting => "waiting",
            LineStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionSpec {
    pub id: u32,
    pub name: &'static str,
    pub arity: usize,
    pub help: &'static str,
}

impl ActionSpec {
    pub const fn new(id: u32, name: &'static str, arity: usize, help: &'static str) -> Self {
        Self {
            id,
            name,
            arity,
            help,
        }
    }
}

pub trait Scriptable {
    fn actions(&self) -> &'static [ActionSpec];

    /// Runs a validated action against live device state.
    fn process_action(
        &mut self,
        action: u32,
        args: &[String],
        ctx: &mut SimContext<'_>,
    ) -> Result<LineStatus, ActionError>;
}

pub fn find_action<'t>(actions: &'t [ActionSpec], name: &str) -> Option<&'t ActionSpec> {
    actions.iter().find(|a| a.name.eq_ignore_ascii_case(name))
}

/// Validates and runs `action` with `args`, keeping the error.
pub fn invoke_checked(
    device: &mut dyn Scriptable,
    action: u32,
    args: &[String],
    ctx: &mut SimContext<'_>,
) -> Result<LineStatus, ActionError> {
    let spec = device
        .actions()
        .iter()
        .find(|a| a.id == action)
        .copied()
        .ok_or(ActionError::UnknownActionId(action))?;
    if args.len() != spec.arity {
        return Err(ActionError::ArgumentCount {
            action: spec.name.to_string(),
            expected: spec.arity,
            got: args.len(),
        });
    }
    device.process_action(action, args, ctx)
}

/// Validates and runs `action`, folding any failure into [`LineStatus::Error`].
pub fn invoke(
    device: &mut dyn Scriptable,
    action: u32,
    args: &[String],
    ctx: &mut SimContext<'_>,
) -> LineStatus {
    match invoke_checked(device, action, args, ctx) {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!("scripted action rejected: {e}");
            LineStatus::Error
        }
    }
}

/// Parses argument `index` as `T`.
pub fn arg<T>(args: &[String], index: usize) -> Result<T, ActionError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = args
        .get(index)
        .ok_or_else(|| ActionError::bad_arg("", format!("missing argument {index}")))?;
    raw.trim()
        .parse::<T>()
        .map_err(|e| ActionError::bad_arg(raw.clone(), e.to_string()))
}
