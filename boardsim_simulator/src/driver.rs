//! Runs a board on its own thread.
//!
//! The simulation thread is the only one that touches device state. Other
//! threads send [`SimRequest`]s over a channel and get answers back on a
//! oneshot; render threads read the published views directly.

use crate::board::Board;
use boardsim_shared::{ActionError, Cycle, Drawable, LineStatus};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;

/// How fast simulated time runs against wall time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub cycles_per_tick: Cycle,
    pub tick: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        // 16 MHz in 1 ms ticks
        Self {
            cycles_per_tick: 16_000,
            tick: Duration::from_millis(1),
        }
    }
}

#[derive(Debug)]
pub enum SimRequest {
    Invoke {
        target: String,
        action: String,
        args: Vec<String>,
        reply: oneshot::Sender<Result<LineStatus, ActionError>>,
    },
    Drive {
        line: String,
        value: u32,
        reply: oneshot::Sender<Result<(), String>>,
    },
    LineValue {
        line: String,
        reply: oneshot::Sender<Result<u32, String>>,
    },
    Now {
        reply: oneshot::Sender<Cycle>,
    },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("simulation thread is gone")]
    Disconnected,
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Cloneable front end to a running [`SimDriver`].
#[derive(Clone)]
pub struct SimHandle {
    tx: Sender<SimRequest>,
    cycle: Arc<AtomicU64>,
    views: Arc<Vec<(String, Arc<dyn Drawable>)>>,
    clock_hz: u64,
}

impl SimHandle {
    /// Cycle count as of the last completed batch.
    pub fn cycle(&self) -> Cycle {
        self.cycle.load(Ordering::Acquire)
    }

    pub fn clock_hz(&self) -> u64 {
        self.clock_hz
    }

    pub fn views(&self) -> &[(String, Arc<dyn Drawable>)] {
        &self.views
    }

    pub fn view(&self, name: &str) -> Option<&Arc<dyn Drawable>> {
        self.views.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub async fn invoke(&self, target: &str, action: &str, args: Vec<String>) -> Result<LineStatus, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(SimRequest::Invoke {
            target: target.to_string(),
            action: action.to_string(),
            args,
            reply,
        })?;
        let result = rx.await.map_err(|_| DriverError::Disconnected)?;
        result.map_err(|e| DriverError::Rejected(e.to_string()))
    }

    pub async fn drive(&self, line: &str, value: u32) -> Result<(), DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(SimRequest::Drive {
            line: line.to_string(),
            value,
            reply,
        })?;
        rx.await
            .map_err(|_| DriverError::Disconnected)?
            .map_err(DriverError::Rejected)
    }

    pub async fn line_value(&self, line: &str) -> Result<u32, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(SimRequest::LineValue {
            line: line.to_string(),
            reply,
        })?;
        rx.await
            .map_err(|_| DriverError::Disconnected)?
            .map_err(DriverError::Rejected)
    }

    /// Exact cycle, answered by the simulation thread.
    pub async fn now(&self) -> Result<Cycle, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(SimRequest::Now { reply })?;
        rx.await.map_err(|_| DriverError::Disconnected)
    }

    fn send(&self, request: SimRequest) -> Result<(), DriverError> {
        self.tx.send(request).map_err(|_| DriverError::Disconnected)
    }
}

pub struct SimDriver {
    handle: SimHandle,
    thread: Option<JoinHandle<Board>>,
}

impl SimDriver {
    pub fn spawn(board: Board, pacing: Pacing) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let cycle = Arc::new(AtomicU64::new(board.now()));
        let handle = SimHandle {
            tx,
            cycle: Arc::clone(&cycle),
            views: Arc::new(board.views()),
            clock_hz: board.clock_hz(),
        };
        let thread = std::thread::Builder::new()
            .name(format!("sim-{}", board.name()))
            .spawn(move || run(board, rx, cycle, pacing))?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }

    /// Stops the simulation thread and hands the board back.
    pub fn shutdown(mut self) -> Option<Board> {
        let _ = self.handle.tx.send(SimRequest::Shutdown);
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(board) => Some(board),
            Err(_) => {
                tracing::error!("simulation thread panicked");
                None
            }
        }
    }
}

impl Drop for SimDriver {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.handle.tx.send(SimRequest::Shutdown);
            let _ = thread.join();
        }
    }
}

fn run(mut board: Board, rx: Receiver<SimRequest>, cycle: Arc<AtomicU64>, pacing: Pacing) -> Board {
    tracing::info!(board = %board.name(), cycles_per_tick = pacing.cycles_per_tick, "simulation thread started");
    let mut next_tick = Instant::now() + pacing.tick;
    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok(SimRequest::Shutdown) => break,
            Ok(request) => serve(&mut board, &cycle, request),
            Err(RecvTimeoutError::Timeout) => {
                board.advance(pacing.cycles_per_tick);
                cycle.store(board.now(), Ordering::Release);
                next_tick += pacing.tick;
                let now = Instant::now();
                if next_tick + pacing.tick < now {
                    // fell behind; drop the backlog instead of racing to catch up
                    next_tick = now + pacing.tick;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::info!(board = %board.name(), cycle = board.now(), "simulation thread stopped");
    board
}

/// Handles one request. The published cycle is refreshed before the reply
/// goes out, so a caller sees the clock its own request moved.
fn serve(board: &mut Board, cycle: &AtomicU64, request: SimRequest) {
    // A dropped receiver just means the caller stopped waiting.
    match request {
        SimRequest::Invoke {
            target,
            action,
            args,
            reply,
        } => {
            let result = board.invoke_checked(&target, &action, &args);
            cycle.store(board.now(), Ordering::Release);
            let _ = reply.send(result);
        }
        SimRequest::Drive { line, value, reply } => {
            let result = board.drive(&line, value).map_err(|e| e.to_string());
            cycle.store(board.now(), Ordering::Release);
            let _ = reply.send(result);
        }
        SimRequest::LineValue { line, reply } => {
            let _ = reply.send(board.line_value(&line).map_err(|e| e.to_string()));
        }
        SimRequest::Now { reply } => {
            let _ = reply.send(board.now());
        }
        SimRequest::Shutdown => {}
    }
}
