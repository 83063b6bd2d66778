//! API server binary entry point

use anyhow::{Context, Result};
use clap::Parser;
use sheetlink_server::{AppConfig, AppState, start_server};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sheetlink-server")]
#[command(about = "HTTP API that links form workbooks with cross-sheet formulas", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file (TOML); defaults to ./sheetlink.toml when present
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bind address, overriding the config file and SHEETLINK_ADDR
    #[arg(long, value_name = "ADDR")]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sheetlink_server=info,sheetlink_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?.with_addr_override(cli.addr);

    let state = AppState::new(&config);
    tracing::info!(
        addr = %config.server.addr,
        max_upload_bytes = config.server.max_upload_bytes,
        "starting Excel Formula Processor API"
    );
    start_server(&config.server.addr, state)
        .await
        .with_context(|| format!("Server on {} failed", config.server.addr))?;

    Ok(())
}
