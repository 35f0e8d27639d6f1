// src/main.rs - board-host: runs one simulated board and serves the inspection API
use boardsim::config::{self, Config};
use boardsim::web;
use boardsim_simulator::{Board, SimDriver, SimHandle, load_settings};
use std::env;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Get configuration file path
    let args: Vec<String> = env::args().collect();
    let config_path = args.get(1).map(String::as_str);

    let loaded = match config_path {
        Some(path) => config::load_config(path).map(Some),
        None => Ok(None),
    };
    let level = match &loaded {
        Ok(Some(cfg)) => cfg.host.level().unwrap_or(tracing::Level::INFO),
        _ => tracing::Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    tracing::info!("Starting boardsim host");
    let config = match loaded {
        Ok(Some(cfg)) => {
            tracing::info!("Loaded configuration from: {}", config_path.unwrap_or_default());
            cfg
        }
        Ok(None) => {
            tracing::info!("No configuration file given, using defaults");
            Config::default()
        }
        Err(e) => {
            tracing::error!("Failed to load config from '{}': {}", config_path.unwrap_or_default(), e);
            return Err(Box::new(e) as BoxError);
        }
    };

    let settings = load_settings(&config.host.board).map_err(|e| {
        tracing::error!("Failed to load board '{}': {}", config.host.board.display(), e);
        Box::new(e) as BoxError
    })?;
    let board = Board::new(&settings).map_err(|e| {
        tracing::error!("Failed to build board '{}': {}", settings.board.name, e);
        Box::new(e) as BoxError
    })?;
    tracing::info!(
        "Board: {} @ {} Hz, {} lines",
        board.name(),
        board.clock_hz(),
        board.wiring().len()
    );

    let driver = SimDriver::spawn(board, config.pacing.to_pacing())?;
    let handle = driver.handle();

    if config.web.draw_interval_ms > 0 {
        tokio::spawn(log_views(handle.clone(), Duration::from_millis(config.web.draw_interval_ms)));
    }

    let app = web::api::create_router(handle);
    let listener = tokio::net::TcpListener::bind(&config.web.bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(board) = tokio::task::spawn_blocking(move || driver.shutdown()).await? {
        tracing::info!("Simulation stopped at cycle {}", board.now());
    }
    Ok(())
}

/// Periodically logs every device's one-line rendering.
async fn log_views(sim: SimHandle, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let line = sim
            .views()
            .iter()
            .map(|(_, view)| view.draw_simple())
            .collect::<Vec<_>>()
            .join(" | ");
        tracing::info!(cycle = sim.cycle(), "{line}");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
