//! Line-oriented action scripts.
//!
//! ```text
//! # home X
//! Board::Drive(x.dir, 0)
//! Board::Pulse(x.step, 1500, 200)
//! X::WaitStandstill()
//! ```

use crate::board::Board;
use crate::settings::ScriptSettings;
use boardsim_shared::{ActionError, Cycle, LineStatus};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("line {line}: {source}")]
    Action {
        line: usize,
        #[source]
        source: ActionError,
    },
    #[error("line {line}: still waiting after {cycles} cycles")]
    Timeout { line: usize, cycles: Cycle },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    /// 1-based line number in the source text.
    pub number: usize,
    pub target: String,
    pub action: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    lines: Vec<ScriptLine>,
}

impl Script {
    /// Parses the whole text up front; a single bad line rejects the script.
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let mut lines = Vec::new();
        for (i, raw) in text.lines().enumerate() {
            let number = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            lines.push(parse_line(number, line)?);
        }
        Ok(Self { lines })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn lines(&self) -> &[ScriptLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn parse_line(number: usize, line: &str) -> Result<ScriptLine, ScriptError> {
    let err = |reason: &str| ScriptError::Parse {
        line: number,
        reason: reason.to_string(),
    };
    let (target, rest) = line
        .split_once("::")
        .ok_or_else(|| err("expected Target::Action(args)"))?;
    let target = target.trim();
    if target.is_empty() {
        return Err(err("missing target"));
    }
    let (action, args) = match rest.split_once('(') {
        Some((action, tail)) => {
            let inner = tail
                .trim_end()
                .strip_suffix(')')
                .ok_or_else(|| err("missing closing parenthesis"))?;
            let args: Vec<String> = if inner.trim().is_empty() {
                Vec::new()
            } else {
                inner.split(',').map(|a| a.trim().to_string()).collect()
            };
            if args.iter().any(String::is_empty) {
                return Err(err("empty argument"));
            }
            (action.trim(), args)
        }
        None => (rest.trim(), Vec::new()),
    };
    if action.is_empty() || !action.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(err("action names are alphanumeric"));
    }
    Ok(ScriptLine {
        number,
        target: target.to_string(),
        action: action.to_string(),
        args,
    })
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptReport {
    pub lines_run: usize,
    /// Times a `Waiting` line was polled again.
    pub polls: u64,
    pub start_cycle: Cycle,
    pub end_cycle: Cycle,
}

/// Runs scripts against a board, polling `Waiting` actions by advancing the
/// clock `poll_cycles` at a time.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    poll_cycles: Cycle,
    timeout_cycles: Cycle,
}

impl ScriptRunner {
    pub fn new(settings: &ScriptSettings) -> Self {
        Self {
            poll_cycles: settings.poll_cycles.max(1),
            timeout_cycles: settings.timeout_cycles,
        }
    }

    pub fn run(&self, board: &mut Board, script: &Script) -> Result<ScriptReport, ScriptError> {
        let start_cycle = board.now();
        let mut polls = 0;
        for line in script.lines() {
            polls += self.run_line(board, line)?;
        }
        let report = ScriptReport {
            lines_run: script.len(),
            polls,
            start_cycle,
            end_cycle: board.now(),
        };
        tracing::info!(
            lines = report.lines_run,
            polls = report.polls,
            cycles = report.end_cycle - report.start_cycle,
            "script complete"
        );
        Ok(report)
    }

    fn run_line(&self, board: &mut Board, line: &ScriptLine) -> Result<u64, ScriptError> {
        let started = board.now();
        let mut polls = 0;
        loop {
            let status = board
                .invoke_checked(&line.target, &line.action, &line.args)
                .map_err(|source| {
                    tracing::warn!(line = line.number, "script failed: {source}");
                    ScriptError::Action {
                        line: line.number,
                        source,
                    }
                })?;
            match status {
                LineStatus::Completed => return Ok(polls),
                LineStatus::Error => {
                    return Err(ScriptError::Action {
                        line: line.number,
                        source: ActionError::bad_arg(line.action.clone(), "device reported an error"),
                    });
                }
                LineStatus::Waiting => {
                    let waited = board.now() - started;
                    if waited >= self.timeout_cycles {
                        tracing::warn!(line = line.number, waited, "script wait timed out");
                        return Err(ScriptError::Timeout {
                            line: line.number,
                            cycles: waited,
                        });
                    }
                    board.advance(self.poll_cycles);
                    polls += 1;
                }
            }
        }
    }
}
