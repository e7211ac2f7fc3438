//! LTP Relay Bot - Entry Point
//!
//! Relays last-traded-price updates for configured instruments from the
//! market-data WebSocket feed to a Telegram chat.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// LTP Relay Bot
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via LTP_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    ltp_ws::init_crypto();

    let args = Args::parse();

    ltp_telemetry::init_logging()?;

    info!("Starting LTP relay v{}", env!("CARGO_PKG_VERSION"));

    // Determine config path: CLI arg > LTP_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("LTP_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = ltp_bot::AppConfig::load(&config_path)?;

    // Secrets come from the environment; missing ones fail fast here.
    let credentials = ltp_bot::Credentials::from_env()?;

    let app = ltp_bot::Application::new(config, credentials)?;
    app.run().await?;

    Ok(())
}
