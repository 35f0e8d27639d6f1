//! Periodic samples of the published motor views, as CSV or JSON lines.

use boardsim_shared::{Cycle, ViewSnapshot};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRow {
    pub cycle: Cycle,
    pub device: String,
    pub axis: String,
    pub position: f32,
    pub stalled: bool,
    pub enabled: bool,
}

impl TraceRow {
    /// Row for a motor snapshot; other view kinds are not traced.
    pub fn from_snapshot(cycle: Cycle, device: &str, snapshot: &ViewSnapshot) -> Option<Self> {
        match snapshot {
            ViewSnapshot::Motor {
                axis,
                position,
                stalled,
                enabled,
                ..
            } => Some(Self {
                cycle,
                device: device.to_string(),
                axis: axis.to_string(),
                position: *position,
                stalled: *stalled,
                enabled: *enabled,
            }),
            ViewSnapshot::Buttons { .. } => None,
        }
    }
}

pub trait TraceSink: Send {
    fn record(&mut self, row: &TraceRow) -> Result<(), TraceError>;

    fn flush(&mut self) -> Result<(), TraceError>;
}

pub struct CsvTrace<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvTrace<File> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        Ok(Self {
            writer: csv::Writer::from_path(path)?,
        })
    }
}

impl<W: Write> CsvTrace<W> {
    pub fn from_writer(out: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(out),
        }
    }

    pub fn into_inner(self) -> Result<W, TraceError> {
        self.writer
            .into_inner()
            .map_err(|e| TraceError::Io(std::io::Error::other(e.to_string())))
    }
}

impl<W: Write + Send> TraceSink for CsvTrace<W> {
    fn record(&mut self, row: &TraceRow) -> Result<(), TraceError> {
        self.writer.serialize(row)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TraceError> {
        self.writer.flush()?;
        Ok(())
    }
}

pub struct JsonlTrace<W: Write> {
    out: W,
}

impl JsonlTrace<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
        })
    }
}

impl<W: Write> JsonlTrace<W> {
    pub fn from_writer(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> TraceSink for JsonlTrace<W> {
    fn record(&mut self, row: &TraceRow) -> Result<(), TraceError> {
        serde_json::to_writer(&mut self.out, row)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TraceError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Fans every row out to several sinks.
#[derive(Default)]
pub struct MultiTrace {
    sinks: Vec<Box<dyn TraceSink>>,
}

impl MultiTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn TraceSink>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TraceSink for MultiTrace {
    fn record(&mut self, row: &TraceRow) -> Result<(), TraceError> {
        for sink in &mut self.sinks {
            sink.record(row)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TraceError> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cycle: Cycle, position: f32) -> TraceRow {
        TraceRow {
            cycle,
            device: "X".into(),
            axis: "X".into(),
            position,
            stalled: false,
            enabled: true,
        }
    }

    #[test]
    fn csv_has_a_header_and_one_line_per_row() {
        let mut trace = CsvTrace::from_writer(Vec::new());
        trace.record(&row(0, 10.0)).unwrap();
        trace.record(&row(1000, 10.5)).unwrap();
        let text = String::from_utf8(trace.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "cycle,device,axis,position,stalled,enabled");
        assert_eq!(lines[2], "1000,X,X,10.5,false,true");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn jsonl_rows_parse_back() {
        let mut trace = JsonlTrace::from_writer(Vec::new());
        trace.record(&row(5, 1.25)).unwrap();
        let text = String::from_utf8(trace.into_inner()).unwrap();
        let back: TraceRow = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(back, row(5, 1.25));
    }

    #[test]
    fn button_views_are_not_traced() {
        assert!(TraceRow::from_snapshot(0, "panel", &ViewSnapshot::Buttons { pressed: 1 }).is_none());
    }
}
