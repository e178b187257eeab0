//! Ready_Ai server: background coordination for AI-chat completion alerts.

use anyhow::Result;
use clap::Parser;
use readyai_core::IdleProbeScheduler;
use readyai_server::{app, config::Config, logging, state::AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use logging::{LogConfig, LogFormat};

/// Watches AI chat tabs and tells you when an answer is ready.
#[derive(Parser, Debug)]
#[command(name = "readyai-server")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the settings file from config
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long)]
    debug: bool,

    #[arg(long)]
    trace: bool,

    /// Warnings and errors only
    #[arg(short, long)]
    quiet: bool,

    /// Per-target level, e.g. "probe=debug". Repeatable; targets get the
    /// "readyai::" prefix automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    ));

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(settings) = cli.settings {
        config.settings_path = settings;
    }

    tracing::info!(
        target: "readyai::startup",
        "Loaded configuration (port: {}, settings: {})",
        config.port,
        config.settings_path.display()
    );

    let state = Arc::new(AppState::new(config.clone())?);

    IdleProbeScheduler::with_settle_delay(
        state.coordinator.clone(),
        Duration::from_millis(config.settle_delay_ms),
    )
    .spawn(state.coordinator.subscribe_settings());
    tracing::info!(target: "readyai::startup", "Idle probe scheduler started");

    // Tabs already announced by a host that connected first.
    let kicked = state.coordinator.kick_all_tabs("startup").await;
    tracing::debug!(target: "readyai::startup", "Startup kick reached {} tabs", kicked);

    let app = app::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(target: "readyai::startup", "Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
