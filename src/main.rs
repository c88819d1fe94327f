use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use parley_server::ServerConfig;
use parley_settings::ParleySettings;
use parley_store::{Database, MessageRepo, MessageStore};
use parley_telemetry::TelemetryConfig;

/// Chat message relay: WebSocket clients in, SQLite out.
#[derive(Debug, Parser)]
#[command(name = "parley", version)]
struct Cli {
    /// Settings file. Defaults to ~/.parley/settings.json.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `server.port`.
    #[arg(long)]
    port: Option<u16>,

    /// Override `store.db_path`.
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    let telemetry = TelemetryConfig::from_levels(
        &settings.logging.level,
        settings
            .logging
            .modules
            .iter()
            .map(|(module, level)| (module.as_str(), level.as_str())),
        settings.logging.json,
    )
    .context("invalid logging settings")?;
    parley_telemetry::init_telemetry(&telemetry).context("failed to initialize logging")?;

    tracing::info!("starting parley server");

    let db_path = &settings.store.db_path;
    let db = Database::open(db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;

    let store: Arc<dyn MessageStore> = Arc::new(MessageRepo::new(db));
    let handle = parley_server::start(ServerConfig::from(&settings.server), store)
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port(), "parley server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

fn load(cli: &Cli) -> anyhow::Result<ParleySettings> {
    let mut settings = match &cli.config {
        Some(path) => parley_settings::load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => parley_settings::load_settings().context("failed to load settings")?,
    };
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(db) = &cli.db {
        settings.store.db_path = db.clone();
    }
    Ok(settings)
}
