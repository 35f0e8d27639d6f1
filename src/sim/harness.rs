//! CLI entry point for the simulation harness: scripted batch runs against a
//! board file, with optional CSV/JSONL traces of every motor.

use boardsim_shared::ConfigError;
use boardsim_simulator::{
    Board, CsvTrace, JsonlTrace, MultiTrace, Script, ScriptError, ScriptRunner, TraceError, load_settings,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;

/// Board simulation harness
#[derive(Parser, Debug)]
#[command(name = "sim-harness", about = "Runs action scripts against a simulated board.")]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a script to completion
    Run {
        /// Board description (TOML)
        #[arg(long)]
        board: PathBuf,
        /// Action script
        #[arg(long)]
        script: PathBuf,
        /// Write a CSV trace of every motor
        #[arg(long)]
        trace: Option<PathBuf>,
        /// Write a JSON-lines trace of every motor
        #[arg(long)]
        jsonl: Option<PathBuf>,
        /// Cycles between trace samples
        #[arg(long, default_value_t = 16_000)]
        sample_cycles: u64,
    },
    /// List every scripted action on the board
    Actions {
        #[arg(long)]
        board: PathBuf,
    },
    /// Dump the wiring table
    Lines {
        #[arg(long)]
        board: PathBuf,
    },
}

#[derive(Debug, Error)]
enum HarnessError {
    #[error("board: {0}")]
    Config(#[from] ConfigError),
    #[error("script: {0}")]
    Script(#[from] ScriptError),
    #[error("trace: {0}")]
    Trace(#[from] TraceError),
}

fn load_board(path: &Path) -> Result<(Board, boardsim_simulator::BoardSettings), HarnessError> {
    let settings = load_settings(path)?;
    let board = Board::new(&settings)?;
    Ok((board, settings))
}

fn run(
    board: &Path,
    script: &Path,
    trace: Option<&Path>,
    jsonl: Option<&Path>,
    sample_cycles: u64,
) -> Result<(), HarnessError> {
    let (mut board, settings) = load_board(board)?;
    let script = Script::load(script)?;

    let mut sinks = MultiTrace::new();
    if let Some(path) = trace {
        sinks.push(Box::new(CsvTrace::create(path)?));
    }
    if let Some(path) = jsonl {
        sinks.push(Box::new(JsonlTrace::create(path)?));
    }
    if !sinks.is_empty() {
        board.set_trace(Box::new(sinks), sample_cycles);
    }

    let result = ScriptRunner::new(&settings.script).run(&mut board, &script);
    // keep whatever was traced, even for a failed run
    if let Some(mut sink) = board.take_trace() {
        sink.flush()?;
    }
    let report = result?;

    println!(
        "{} lines, {} polls, cycles {}..{} ({:.3} s simulated)",
        report.lines_run,
        report.polls,
        report.start_cycle,
        report.end_cycle,
        (report.end_cycle - report.start_cycle) as f64 / board.clock_hz() as f64
    );
    for (_, view) in board.views() {
        println!("{}", view.draw());
    }
    Ok(())
}

fn list_actions(board: &Path) -> Result<(), HarnessError> {
    let (mut board, _) = load_board(board)?;
    for (target, actions) in board.action_tables() {
        for action in actions {
            println!("{target}::{}({}) - {}", action.name, action.arity, action.help);
        }
    }
    Ok(())
}

fn list_lines(board: &Path) -> Result<(), HarnessError> {
    let (board, _) = load_board(board)?;
    for (handle, spec) in board.wiring().iter() {
        let owner = board.line_owner(handle).unwrap_or("external");
        println!("{handle:>4} {:<24} {:>2} bit  {owner}", spec.name, spec.width);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Run {
            board,
            script,
            trace,
            jsonl,
            sample_cycles,
        } => run(board, script, trace.as_deref(), jsonl.as_deref(), *sample_cycles),
        Commands::Actions { board } => list_actions(board),
        Commands::Lines { board } => list_lines(board),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
