//! Questplay remote-play server binary.

mod error;
mod routes;
mod state;
mod ws;

use anyhow::Context;
use clap::Parser;
use questplay_config::{logging, Config};
use questplay_database::AsyncDatabase;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "questplay-server", about = "Remote-play session event server")]
struct Args {
    /// Path to a JSON config file.
    #[arg(long, env = "QUESTPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database path (overrides config).
    #[arg(long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path).context("loading config file")?,
        None => Config::new(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }

    logging::init_logging(&config.log_level)
        .map_err(|err| anyhow::anyhow!("failed to initialize logging: {err}"))?;

    info!(
        port = config.port,
        database = %config.database_path,
        "Starting questplay-server"
    );

    let db = AsyncDatabase::open(std::path::Path::new(&config.database_path))
        .await
        .context("opening database")?;
    let state = AppState::new(db);
    let router = routes::build_router(state, &config.cors_origins);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, router)
        .await
        .context("server error")?;

    Ok(())
}
